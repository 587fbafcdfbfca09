use super::PumpError;
use quick_xml::events::Event;
use quick_xml::Writer;
use std::io::Write;

/// Re-emits parsed nodes that the pump does not intercept.
///
/// Start tags keep their raw name and attribute bytes, text keeps its
/// original escaping, and end tags are always written in long form so every
/// open element gets a matching close.
pub struct NodeCopier<W: Write> {
    writer: Writer<W>,
    copied: usize,
}

impl<W: Write> NodeCopier<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: Writer::new(sink),
            copied: 0,
        }
    }

    pub fn copy(&mut self, event: Event<'_>) -> Result<(), PumpError> {
        match event {
            Event::Start(start) => self.writer.write_event(Event::Start(start))?,
            Event::Empty(start) => self.writer.write_event(Event::Empty(start))?,
            Event::End(end) => self.writer.write_event(Event::End(end))?,
            Event::Text(text) => self.writer.write_event(Event::Text(text))?,
            Event::CData(data) => self.writer.write_event(Event::CData(data))?,
            Event::Comment(comment) => self.writer.write_event(Event::Comment(comment))?,
            Event::Decl(decl) => self.writer.write_event(Event::Decl(decl))?,
            Event::PI(pi) => self.writer.write_event(Event::PI(pi))?,
            Event::DocType(doctype) => self.writer.write_event(Event::DocType(doctype))?,
            Event::Eof => return Ok(()),
        }
        self.copied += 1;
        Ok(())
    }

    /// Write a literal fragment with no escaping or structural checks.
    pub fn write_raw(&mut self, fragment: &str) -> Result<(), PumpError> {
        self.writer.get_mut().write_all(fragment.as_bytes())?;
        Ok(())
    }

    /// Number of nodes re-emitted so far.
    pub fn copied(&self) -> usize {
        self.copied
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}
