use crate::span::{Position, SpanError, SpanReader};
use std::io::{Read, Seek};

/// Structural-side cursor: turns the byte offsets reported by the XML parser
/// into line/column positions.
///
/// Runs its own [`SpanReader`] over an independent handle to the document so
/// that it never disturbs the verbatim cursor.
pub struct PositionTracker<R> {
    reader: SpanReader<R>,
}

impl<R: Read + Seek> PositionTracker<R> {
    pub fn new(source: R) -> Result<Self, SpanError> {
        Ok(Self {
            reader: SpanReader::new(source)?,
        })
    }

    /// Position of the character starting at byte `offset`.
    pub fn position_at(&mut self, offset: u64) -> Result<Position, SpanError> {
        self.reader.advance_to_offset(offset)
    }
}
