// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for WAL frame decoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use verisim_dict_wal::frame::{FrameRead, FrameReader};

fuzz_target!(|data: &[u8]| {
    // Arbitrary segment bytes must decode to frames, a clean end, or a
    // truncation, never a panic.
    let mut frames = FrameReader::new(data);
    while let Ok(FrameRead::Frame(frame)) = frames.next_frame() {
        let _ = frame.decode();
        assert!(frames.offset() as usize <= data.len());
    }
});
