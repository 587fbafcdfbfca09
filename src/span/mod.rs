//! Line/column addressable text cursor.
//!
//! [`SpanReader`] walks a seekable UTF-8 stream one character at a time while
//! tracking a 1-based [`Position`]. It is used to cut verbatim source text out
//! of a document whose element boundaries were located by a separate
//! structural parser.

mod errors;
mod reader;

pub use errors::SpanError;
pub use reader::{Position, SpanReader};
