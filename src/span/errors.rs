use super::Position;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpanError {
    #[error("end of input reached at {position}")]
    EndOfInput { position: Position },

    #[error("cannot navigate to {target} from {current}: {reason}")]
    InvalidNavigation {
        target: Position,
        current: Position,
        reason: &'static str,
    },

    #[error("cannot advance to byte offset {target} from {current}")]
    InvalidOffset { target: u64, current: u64 },

    #[error("invalid UTF-8 sequence at byte offset {offset}")]
    InvalidUtf8 { offset: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
