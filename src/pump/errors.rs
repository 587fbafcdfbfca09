use crate::span::SpanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PumpError {
    #[error("malformed document near byte {position}: {source}")]
    MalformedDocument {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("document ended inside element '{element}'")]
    UnexpectedEof { element: String },

    #[error("document ended with {depth} unclosed element(s)")]
    UnclosedElements { depth: usize },

    #[error("closing tag without an open element near byte {position}")]
    UnbalancedEnd { position: u64 },

    #[error("verbatim span extraction failed: {0}")]
    Span(#[from] SpanError),

    #[error("XML write error: {0}")]
    Write(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
