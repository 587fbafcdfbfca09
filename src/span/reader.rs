use super::SpanError;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

/// A 1-based line/column location in a text stream.
///
/// A line break is `\n`, or `\r` not immediately followed by `\n`. Columns
/// count characters, not bytes. Ordering is document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const START: Position = Position { line: 1, column: 1 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Both coordinates are 1-based; zero is never addressable.
    pub fn is_valid(&self) -> bool {
        self.line > 0 && self.column > 0
    }

    /// The position one character to the right on the same line.
    pub fn next_column(self) -> Self {
        Self {
            line: self.line,
            column: self.column + 1,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::START
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    /// Position of the next character to be read
    position: Position,
    last_read: Option<char>,
    /// Byte offset of the next character in the underlying stream
    offset: u64,
}

/// Forward-only character cursor over a seekable UTF-8 stream.
///
/// The cursor position always names the *next* character to be read.
/// Moving backwards is implemented by seeking the stream to its start and
/// replaying forward, so callers that only ever move forward pay for a
/// single pass over the input.
pub struct SpanReader<R> {
    source: BufReader<R>,
    cursor: Cursor,
}

impl<R: Read + Seek> SpanReader<R> {
    /// Open a reader positioned at the start of `source` (1:1).
    pub fn new(source: R) -> Result<Self, SpanError> {
        let mut source = BufReader::new(source);
        source.seek(SeekFrom::Start(0))?;
        Ok(Self {
            source,
            cursor: Cursor::default(),
        })
    }

    pub fn position(&self) -> Position {
        self.cursor.position
    }

    pub fn offset(&self) -> u64 {
        self.cursor.offset
    }

    pub fn last_read(&self) -> Option<char> {
        self.cursor.last_read
    }

    /// Read the next character and advance the position past it.
    pub fn read(&mut self) -> Result<char, SpanError> {
        let ch = self.next_char()?.ok_or(SpanError::EndOfInput {
            position: self.cursor.position,
        })?;

        let line_break = match ch {
            '\n' => true,
            '\r' => self.peek_byte()? != Some(b'\n'),
            _ => false,
        };

        if line_break {
            self.cursor.position.line += 1;
            self.cursor.position.column = 1;
        } else {
            self.cursor.position.column += 1;
        }
        self.cursor.last_read = Some(ch);
        Ok(ch)
    }

    /// Read through the next line break, inclusive.
    pub fn read_line(&mut self) -> Result<String, SpanError> {
        let line = self.cursor.position.line;
        let mut text = String::new();
        while self.cursor.position.line == line {
            text.push(self.read()?);
        }
        Ok(text)
    }

    /// Move the cursor so that the next character read is the one at `target`.
    ///
    /// Targets behind the cursor rewind the stream and replay from 1:1.
    pub fn navigate_to(&mut self, target: Position) -> Result<(), SpanError> {
        if !target.is_valid() {
            return Err(self.invalid(target, "line and column must be positive"));
        }
        if target < self.cursor.position {
            log::debug!(
                "rewinding span reader from {} to reach {}",
                self.cursor.position,
                target
            );
            self.rewind()?;
        }
        self.advance_to(target, None)
    }

    /// Return the text from the most recently read character up to the
    /// character at `target`, leaving the cursor on `target`.
    ///
    /// After `navigate_to(p)`, the most recently read character is the one
    /// just before `p`, so navigating to the column after a `<` and reading
    /// until the position following a `>` yields the whole tag verbatim.
    pub fn read_until(&mut self, target: Position) -> Result<String, SpanError> {
        if !target.is_valid() || target <= self.cursor.position {
            return Err(self.invalid(target, "target must lie after the current position"));
        }

        let mut text = String::new();
        if let Some(ch) = self.cursor.last_read {
            text.push(ch);
        }
        self.advance_to(target, Some(&mut text))?;
        Ok(text)
    }

    /// Advance to an absolute byte offset and report the position there.
    ///
    /// The offset must fall on a character boundary.
    pub fn advance_to_offset(&mut self, offset: u64) -> Result<Position, SpanError> {
        if offset < self.cursor.offset {
            self.rewind()?;
        }
        while self.cursor.offset < offset {
            match self.read() {
                Ok(_) => {}
                Err(SpanError::EndOfInput { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        if self.cursor.offset != offset {
            return Err(SpanError::InvalidOffset {
                target: offset,
                current: self.cursor.offset,
            });
        }
        Ok(self.cursor.position)
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    fn advance_to(
        &mut self,
        target: Position,
        mut captured: Option<&mut String>,
    ) -> Result<(), SpanError> {
        // Every read moves strictly forward in document order, so this
        // either lands on the target or steps past it.
        while self.cursor.position < target {
            match self.read() {
                Ok(ch) => {
                    if let Some(text) = captured.as_deref_mut() {
                        text.push(ch);
                    }
                }
                Err(SpanError::EndOfInput { .. }) => {
                    return Err(self.invalid(target, "end of input before target"));
                }
                Err(e) => return Err(e),
            }
        }
        if self.cursor.position != target {
            return Err(self.invalid(target, "target is past the end of its line"));
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), SpanError> {
        self.source.seek(SeekFrom::Start(0))?;
        self.cursor = Cursor::default();
        Ok(())
    }

    fn invalid(&self, target: Position, reason: &'static str) -> SpanError {
        SpanError::InvalidNavigation {
            target,
            current: self.cursor.position,
            reason,
        }
    }

    fn next_char(&mut self) -> Result<Option<char>, SpanError> {
        let start = self.cursor.offset;
        let Some(lead) = self.next_byte()? else {
            return Ok(None);
        };

        let width = match lead {
            0x00..=0x7F => return Ok(Some(char::from(lead))),
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return Err(SpanError::InvalidUtf8 { offset: start }),
        };

        let mut bytes = [lead, 0, 0, 0];
        for slot in bytes.iter_mut().take(width).skip(1) {
            *slot = self
                .next_byte()?
                .ok_or(SpanError::InvalidUtf8 { offset: start })?;
        }

        std::str::from_utf8(&bytes[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .map(Some)
            .ok_or(SpanError::InvalidUtf8 { offset: start })
    }

    fn next_byte(&mut self) -> Result<Option<u8>, SpanError> {
        let byte = self.source.fill_buf()?.first().copied();
        if byte.is_some() {
            self.source.consume(1);
            self.cursor.offset += 1;
        }
        Ok(byte)
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, SpanError> {
        Ok(self.source.fill_buf()?.first().copied())
    }
}
