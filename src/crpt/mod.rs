pub mod document;
pub mod submitter;

pub use document::{Document, Product};
pub use submitter::{build_request, DocumentSubmitter, SubmissionOutcome};
