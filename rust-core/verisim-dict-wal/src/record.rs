// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Value Dictionary WAL - Record types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A mint record is the unit of logging: one newly interned RDF term together
// with the dictionary id it was assigned.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Log sequence number. Strictly increasing in append order.
pub type Lsn = u64;

/// Sentinel meaning "no LSN". The first LSN handed out is 1.
pub const NO_LSN: Lsn = 0;

// ---------------------------------------------------------------------------
// ValueKind
// ---------------------------------------------------------------------------

/// The kind of dictionary entry being minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// An IRI.
    #[serde(rename = "I")]
    Iri,
    /// A blank node label.
    #[serde(rename = "B")]
    BlankNode,
    /// A literal, optionally with datatype or language tag.
    #[serde(rename = "L")]
    Literal,
    /// A namespace prefix IRI.
    #[serde(rename = "N")]
    Namespace,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Iri => "iri",
            Self::BlankNode => "bnode",
            Self::Literal => "literal",
            Self::Namespace => "namespace",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// MintRecord
// ---------------------------------------------------------------------------

/// One dictionary entry minted by the owning value store.
///
/// `datatype` and `language` are empty strings when absent; they are never
/// `None` on the wire, so the empty string is the only "absent" encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRecord {
    /// Position of the record in append order.
    pub lsn: Lsn,
    /// Dictionary id being minted.
    pub id: i64,
    /// What kind of term the id refers to.
    pub kind: ValueKind,
    /// Lexical form (IRI string, blank node label, literal label, namespace).
    pub lexical: String,
    /// Datatype IRI for literals, empty if none.
    pub datatype: String,
    /// Language tag for literals, empty if none.
    pub language: String,
    /// Hash the value store computed for the term.
    pub hash: i32,
}

impl MintRecord {
    /// The dictionary value this record describes.
    pub fn to_term(&self) -> Term {
        match self.kind {
            ValueKind::Iri => Term::Iri(self.lexical.clone()),
            ValueKind::BlankNode => Term::BlankNode(self.lexical.clone()),
            ValueKind::Namespace => Term::Namespace(self.lexical.clone()),
            ValueKind::Literal => Term::Literal {
                label: self.lexical.clone(),
                datatype: non_empty(&self.datatype),
                language: non_empty(&self.language),
            },
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

/// A dictionary value as returned by point lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// An IRI.
    Iri(String),
    /// A blank node with its label.
    BlankNode(String),
    /// A literal.
    Literal {
        /// Lexical label.
        label: String,
        /// Datatype IRI, if any.
        datatype: Option<String>,
        /// Language tag, if any.
        language: Option<String>,
    },
    /// A namespace IRI.
    Namespace(String),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(label) => write!(f, "_:{label}"),
            Term::Namespace(ns) => write!(f, "namespace <{ns}>"),
            Term::Literal {
                label,
                datatype,
                language,
            } => {
                write!(f, "\"{label}\"")?;
                if let Some(language) = language {
                    write!(f, "@{language}")
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{datatype}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}
