//! Streaming copy/patch engine for model documents.

mod copier;
mod element;
mod engine;
mod errors;
mod tracker;

pub use copier::NodeCopier;
pub use element::{ElementChild, ParsedElement};
pub use engine::{ElementEditPump, PumpStats, TARGET_ELEMENT};
pub use errors::PumpError;
pub use tracker::PositionTracker;
