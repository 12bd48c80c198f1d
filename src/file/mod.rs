//! Low-level binary reading and writing used by the container codec.
//!
//! This module provides the byte-level plumbing underneath the module container
//! format: a bounds-checked cursor for decoding ([`Parser`]), a growable
//! little-endian sink for encoding ([`Writer`]), and an atomically-finalized
//! output file ([`Output`]).
//!
//! # Key Components
//!
//! - [`Parser`] - Cursor-based reader over a byte slice with bounds checking
//! - [`Writer`] - Append-only little-endian byte sink
//! - [`Output`] - Write-to-temp-then-rename file persistence
//! - [`LeIO`] - Trait unifying the primitive types both sides understand
//!
//! All multi-byte values in the container format are little-endian; this module
//! does not offer a big-endian path.

mod output;
pub(crate) mod parser;
pub(crate) mod writer;

pub use output::Output;
pub use parser::{LeIO, Parser};
pub use writer::Writer;
