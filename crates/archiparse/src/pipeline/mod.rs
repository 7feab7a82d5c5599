//! Validation, parsing and transformation of uploaded IFCXML files.

pub mod context;
pub mod error;
pub mod ifc;
pub mod parser;
pub mod progress;
pub mod runner;
pub mod scan;
pub mod transform;
pub mod validation;

pub use context::PipelineContext;
pub use error::{PipelineError, PipelineWarning};
pub use parser::ParsedDocument;
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::Pipeline;
pub use transform::Transformed;
pub use validation::{detect_version, ValidationReport};
