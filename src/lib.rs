//! DACPAC Patcher: edit the model of a DACPAC package without reformatting it
//!
//! A DACPAC is a ZIP package whose `model.xml` lists one `Element` node per
//! database object, and whose `Origin.xml` records a checksum of the model.
//! Tools that consume the package compare bytes, so editing the model by
//! deserializing and re-serializing it is not an option.
//!
//! # Architecture
//!
//! The model is streamed once through an [`ElementEditPump`]. Everything
//! outside the target elements is copied node by node; each target element
//! is cut out of the source text by position with a [`SpanReader`] and
//! handed to an [`ElementTransform`] that decides what replaces it. After the
//! rewrite the [`OriginPatcher`] stores the new checksum, and
//! [`DacPackage`] swaps both parts into the archive in one atomic rename.
//!
//! # Example
//!
//! ```no_run
//! use dacpac_patcher::{process_package, FilterRules, FilterTransform, ProcessOptions};
//! use std::path::Path;
//!
//! let rules = FilterRules::from_lines(r#"Type="SqlUser""#, "").unwrap();
//! let mut filter = FilterTransform::new(rules);
//!
//! match process_package(Path::new("db.dacpac"), &mut filter, &ProcessOptions::default()) {
//!     Ok(report) => println!("{} elements, {} dropped", report.stats.target_elements, filter.stats().dropped),
//!     Err(e) => eprintln!("Filter failed: {}", e),
//! }
//! ```

pub mod config;
pub mod origin;
pub mod package;
pub mod process;
pub mod pump;
pub mod span;
pub mod transform;

// Re-exports
pub use config::{load_profile, parse_profile, FilterProfile, FilterRules, RulesError};
pub use origin::{checksum_bytes, checksum_file, OriginError, OriginPatcher};
pub use package::{DacPackage, PackageError, MODEL_PART, ORIGIN_PART};
pub use process::{
    check_input_files, process_package, rewrite_model, ProcessError, ProcessOptions,
    ProcessReport,
};
pub use pump::{ElementEditPump, NodeCopier, ParsedElement, PumpError, PumpStats};
pub use span::{Position, SpanError, SpanReader};
pub use transform::{AddBeforeFirst, ElementTransform, FilterStats, FilterTransform, PassThrough};
