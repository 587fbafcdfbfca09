use super::{ElementChild, NodeCopier, ParsedElement, PositionTracker, PumpError};
use crate::span::SpanReader;
use crate::transform::ElementTransform;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, Write};
use std::path::Path;

/// Qualified name of the per-object wrapper nodes that transforms receive.
pub const TARGET_ELEMENT: &str = "Element";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Counters from one pass over a model document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Outermost `Element` nodes handed to the transform
    pub target_elements: usize,
    /// Nodes re-emitted unchanged by the copier
    pub copied_nodes: usize,
}

/// Streams a model document to a sink, handing every outermost `Element`
/// below the root to a transform together with its exact source text.
///
/// An `Element` nested inside another one travels inside its parent's span
/// and is never offered separately.
///
/// Three cursors run over the same document: the structural XML reader, a
/// [`PositionTracker`] that maps its byte offsets to line/column positions,
/// and a [`SpanReader`] that cuts the verbatim text. All three only move
/// forward.
pub struct ElementEditPump<S, R, W: Write> {
    structure: Reader<S>,
    tracker: PositionTracker<R>,
    spans: SpanReader<R>,
    copier: NodeCopier<W>,
    /// Bytes skipped ahead of the parser (a UTF-8 BOM)
    base_offset: u64,
}

impl<W: Write> ElementEditPump<BufReader<File>, File, W> {
    /// Open three independent handles to the document at `path`.
    pub fn from_path(path: &Path, sink: W) -> Result<Self, PumpError> {
        let structure = BufReader::new(File::open(path)?);
        Self::new(structure, File::open(path)?, File::open(path)?, sink)
    }
}

impl<S, R, W> ElementEditPump<S, R, W>
where
    S: BufRead,
    R: Read + Seek,
    W: Write,
{
    pub fn new(
        mut structure: S,
        tracker_source: R,
        span_source: R,
        sink: W,
    ) -> Result<Self, PumpError> {
        let base_offset = if structure.fill_buf()?.starts_with(UTF8_BOM) {
            structure.consume(UTF8_BOM.len());
            UTF8_BOM.len() as u64
        } else {
            0
        };

        let mut structure = Reader::from_reader(structure);
        structure.config_mut().trim_text(false);

        Ok(Self {
            structure,
            tracker: PositionTracker::new(tracker_source)?,
            spans: SpanReader::new(span_source)?,
            copier: NodeCopier::new(sink),
            base_offset,
        })
    }

    /// Run the document through once, writing the result to the sink.
    pub fn run<T>(&mut self, transform: &mut T) -> Result<PumpStats, PumpError>
    where
        T: ElementTransform + ?Sized,
    {
        if self.base_offset > 0 {
            self.copier.write_raw("\u{FEFF}")?;
        }

        let mut stats = PumpStats::default();
        let mut depth = 0usize;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match self.next_event(&mut buf)? {
                Event::Start(start) if depth > 0 && is_target(&start) => {
                    // `<` + name/attributes + `>`
                    let from = self.offset() - (start.len() as u64 + 2);
                    let element =
                        ParsedElement::from_start(&start).map_err(|e| self.malformed(e))?;
                    let element = self.read_subtree(element)?;
                    let to = self.offset();
                    self.emit_target(&element, from, to, transform)?;
                    stats.target_elements += 1;
                }
                Event::Empty(start) if depth > 0 && is_target(&start) => {
                    // `<` + name/attributes + `/>`
                    let to = self.offset();
                    let from = to - (start.len() as u64 + 3);
                    let element =
                        ParsedElement::from_start(&start).map_err(|e| self.malformed(e))?;
                    self.emit_target(&element, from, to, transform)?;
                    stats.target_elements += 1;
                }
                Event::Start(start) => {
                    depth += 1;
                    self.copier.copy(Event::Start(start))?;
                }
                Event::End(end) => {
                    depth = depth.checked_sub(1).ok_or(PumpError::UnbalancedEnd {
                        position: self.offset(),
                    })?;
                    self.copier.copy(Event::End(end))?;
                }
                Event::Eof => break,
                other => self.copier.copy(other)?,
            }
        }

        if depth != 0 {
            return Err(PumpError::UnclosedElements { depth });
        }

        stats.copied_nodes = self.copier.copied();
        log::debug!(
            "pump finished: {} target elements, {} copied nodes",
            stats.target_elements,
            stats.copied_nodes
        );
        Ok(stats)
    }

    pub fn into_inner(self) -> W {
        self.copier.into_inner()
    }

    fn next_event<'b>(&mut self, buf: &'b mut Vec<u8>) -> Result<Event<'b>, PumpError> {
        match self.structure.read_event_into(buf) {
            Ok(event) => Ok(event),
            Err(source) => Err(self.malformed(source)),
        }
    }

    /// Absolute byte offset of the structural reader in the source document.
    fn offset(&self) -> u64 {
        self.base_offset + self.structure.buffer_position() as u64
    }

    fn malformed(&self, source: quick_xml::Error) -> PumpError {
        PumpError::MalformedDocument {
            position: self.offset(),
            source,
        }
    }

    /// Consume events up to and including the close of `root`.
    fn read_subtree(&mut self, root: ParsedElement) -> Result<ParsedElement, PumpError> {
        let mut stack = vec![root];
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match self.next_event(&mut buf)? {
                Event::Start(start) => {
                    let element =
                        ParsedElement::from_start(&start).map_err(|e| self.malformed(e))?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element =
                        ParsedElement::from_start(&start).map_err(|e| self.malformed(e))?;
                    push_child(&mut stack, ElementChild::Element(element));
                }
                Event::End(_) => {
                    let Some(done) = stack.pop() else {
                        return Err(PumpError::UnbalancedEnd {
                            position: self.offset(),
                        });
                    };
                    if stack.is_empty() {
                        return Ok(done);
                    }
                    push_child(&mut stack, ElementChild::Element(done));
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| self.malformed(quick_xml::Error::from(e)))?;
                    push_child(&mut stack, ElementChild::Text(text.into_owned()));
                }
                Event::CData(data) => {
                    let data = String::from_utf8_lossy(&data).into_owned();
                    push_child(&mut stack, ElementChild::CData(data));
                }
                Event::Eof => {
                    let element = stack
                        .first()
                        .map(|root| root.name.clone())
                        .unwrap_or_default();
                    return Err(PumpError::UnexpectedEof { element });
                }
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }
    }

    fn emit_target<T>(
        &mut self,
        element: &ParsedElement,
        from: u64,
        to: u64,
        transform: &mut T,
    ) -> Result<(), PumpError>
    where
        T: ElementTransform + ?Sized,
    {
        let start = self.tracker.position_at(from)?;
        let end = self.tracker.position_at(to)?;

        // Land just past `<` so it is the last character read.
        self.spans.navigate_to(start.next_column())?;
        let verbatim = self.spans.read_until(end)?;

        log::trace!(
            "{} {} spans {}..{}",
            element.name,
            element.attribute("Name").unwrap_or("<unnamed>"),
            start,
            end
        );

        for fragment in transform.transform(element, &verbatim) {
            self.copier.write_raw(&fragment)?;
        }
        Ok(())
    }
}

fn is_target(start: &BytesStart<'_>) -> bool {
    start.name().as_ref() == TARGET_ELEMENT.as_bytes()
}

fn push_child(stack: &mut [ParsedElement], child: ElementChild) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(child);
    }
}
