// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Frame codec
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// On-disk frame format (integers little-endian):
//   [4 bytes: payload_length (u32)]
//   [N bytes: payload]              -- one compact JSON object + '\n'
//   [4 bytes: crc32c(payload)]
//
// The payload's `t` key tags the frame: "V" segment header, "M" mint record,
// "S" segment summary (compressed segments only). The same `FrameReader`
// decodes raw segment files and gzip streams.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::error::{WalError, WalResult};
use crate::record::MintRecord;

/// Safety ceiling for a single payload: 512 MiB. Any frame declaring a
/// larger payload is treated as corruption.
pub const MAX_FRAME_BYTES: usize = 512 * 1024 * 1024;

/// Bytes added around a payload by framing (length prefix + checksum).
pub const FRAME_OVERHEAD: usize = 4 + 4;

/// Format version written into every segment header.
pub const FORMAT_VERSION: u32 = 1;

/// Engine tag written into every segment header.
pub const ENGINE_TAG: &str = "valuestore";

// ---------------------------------------------------------------------------
// Payload model
// ---------------------------------------------------------------------------

/// The first frame of every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    /// Format version.
    #[serde(rename = "ver")]
    pub version: u32,
    /// Identifier of the store that owns the log.
    #[serde(rename = "store")]
    pub store_id: String,
    /// Engine tag.
    pub engine: String,
    /// Creation time, Unix seconds.
    pub created: i64,
    /// Segment sequence number (1-based, contiguous).
    #[serde(rename = "segment")]
    pub sequence: u64,
    /// First dictionary id minted into this segment, when known.
    #[serde(
        rename = "firstId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub first_id: Option<i64>,
}

/// Trailer appended to a segment just before it is gzip-compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// Highest id minted into the segment.
    #[serde(rename = "lastId")]
    pub last_id: i64,
    /// IEEE CRC32 over the segment bytes as they were before compression.
    pub crc32: u32,
}

/// Wire form of a mint record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintPayload {
    pub lsn: u64,
    pub id: i64,
    #[serde(rename = "vk")]
    pub kind: crate::record::ValueKind,
    #[serde(rename = "lex")]
    pub lexical: String,
    #[serde(rename = "dt", default)]
    pub datatype: String,
    #[serde(rename = "lang", default)]
    pub language: String,
    #[serde(default)]
    pub hash: i32,
}

impl From<MintRecord> for MintPayload {
    fn from(record: MintRecord) -> Self {
        Self {
            lsn: record.lsn,
            id: record.id,
            kind: record.kind,
            lexical: record.lexical,
            datatype: record.datatype,
            language: record.language,
            hash: record.hash,
        }
    }
}

impl From<MintPayload> for MintRecord {
    fn from(payload: MintPayload) -> Self {
        Self {
            lsn: payload.lsn,
            id: payload.id,
            kind: payload.kind,
            lexical: payload.lexical,
            datatype: payload.datatype,
            language: payload.language,
            hash: payload.hash,
        }
    }
}

/// A decoded frame payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FramePayload {
    /// Segment header.
    #[serde(rename = "V")]
    Header(SegmentHeader),
    /// A minted dictionary entry.
    #[serde(rename = "M")]
    Mint(MintPayload),
    /// Summary of a compressed segment.
    #[serde(rename = "S")]
    Summary(SegmentSummary),
    /// A well-formed object with a type tag this version does not know.
    #[serde(other)]
    Unknown,
}

impl FramePayload {
    /// The LSN carried by the payload, if any.
    pub fn lsn(&self) -> Option<u64> {
        match self {
            FramePayload::Mint(mint) => Some(mint.lsn),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize a payload to its NDJSON line.
pub fn encode_payload(payload: &FramePayload) -> WalResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(payload)?;
    bytes.push(b'\n');
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(WalError::FrameTooLarge {
            length: bytes.len(),
            max_length: MAX_FRAME_BYTES,
        });
    }
    Ok(bytes)
}

/// Append `[length][payload][crc32c]` for an already-encoded payload.
pub fn write_frame(out: &mut Vec<u8>, payload: &[u8]) {
    out.reserve(payload.len() + FRAME_OVERHEAD);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&frame_checksum(payload).to_le_bytes());
}

/// Encode a payload into a complete frame.
pub fn encode_frame(payload: &FramePayload) -> WalResult<Vec<u8>> {
    let bytes = encode_payload(payload)?;
    let mut frame = Vec::with_capacity(bytes.len() + FRAME_OVERHEAD);
    write_frame(&mut frame, &bytes);
    Ok(frame)
}

/// Checksum stored after every payload.
pub fn frame_checksum(payload: &[u8]) -> u32 {
    crc32c::crc32c(payload)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A checksum-valid frame as read from a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// The stored (and verified) checksum.
    pub checksum: u32,
}

impl Frame {
    /// Parse the payload.
    pub fn decode(&self) -> Result<FramePayload, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Feed the frame's exact on-disk bytes into a CRC32 hasher.
    pub fn hash_raw(&self, hasher: &mut crc32fast::Hasher) {
        hasher.update(&(self.payload.len() as u32).to_le_bytes());
        hasher.update(&self.payload);
        hasher.update(&self.checksum.to_le_bytes());
    }
}

/// Why a frame could not be read in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// Fewer than 4 bytes of length prefix.
    Length,
    /// Length prefix is zero or above [`MAX_FRAME_BYTES`].
    BadLength(u32),
    /// Payload shorter than declared.
    Payload,
    /// Fewer than 4 bytes of checksum.
    Checksum,
    /// Stored checksum does not match the payload.
    ChecksumMismatch {
        /// Checksum found on disk.
        expected: u32,
        /// Checksum computed over the payload.
        actual: u32,
    },
}

/// Outcome of reading one frame.
#[derive(Debug)]
pub enum FrameRead {
    /// A complete, checksum-valid frame.
    Frame(Frame),
    /// Clean end of the segment: the stream ended exactly on a frame boundary.
    End,
    /// The segment ends in a partial or corrupt frame.
    Truncated(Truncation),
}

/// Reads length-prefixed frames from any byte source.
pub struct FrameReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a byte source positioned at a frame boundary.
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next frame.
    ///
    /// Truncation and checksum mismatches are reported as
    /// [`FrameRead::Truncated`]; only errors from the underlying source are
    /// returned as `Err`.
    pub fn next_frame(&mut self) -> io::Result<FrameRead> {
        let mut len_bytes = [0u8; 4];
        match self.read_fully(&mut len_bytes)? {
            0 => return Ok(FrameRead::End),
            4 => {}
            _ => return Ok(FrameRead::Truncated(Truncation::Length)),
        }
        let length = u32::from_le_bytes(len_bytes);
        if length == 0 || length as usize > MAX_FRAME_BYTES {
            return Ok(FrameRead::Truncated(Truncation::BadLength(length)));
        }

        let mut payload = vec![0u8; length as usize];
        if self.read_fully(&mut payload)? < payload.len() {
            return Ok(FrameRead::Truncated(Truncation::Payload));
        }

        let mut crc_bytes = [0u8; 4];
        if self.read_fully(&mut crc_bytes)? < 4 {
            return Ok(FrameRead::Truncated(Truncation::Checksum));
        }
        let expected = u32::from_le_bytes(crc_bytes);
        let actual = frame_checksum(&payload);
        if expected != actual {
            return Ok(FrameRead::Truncated(Truncation::ChecksumMismatch {
                expected,
                actual,
            }));
        }

        Ok(FrameRead::Frame(Frame {
            payload,
            checksum: expected,
        }))
    }

    /// Fill `buf` as far as the source allows; returns the bytes read.
    fn read_fully(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }
}
