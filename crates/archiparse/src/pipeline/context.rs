use crate::job::Job;
use crate::worker::job::ProcessingJob;

use super::error::PipelineWarning;
use super::parser::ParsedDocument;
use super::transform::Transformed;
use super::validation::ValidationReport;

pub struct PipelineContext {
    // Input
    pub request: ProcessingJob,

    // Set once the claim succeeds, kept current after every transition
    pub job: Option<Job>,

    // Validation result, also kept when validation rejects the file
    pub report: Option<ValidationReport>,

    // Parsing result
    pub document: Option<ParsedDocument>,

    // Transformation result, persisted before completion
    pub transformed: Option<Transformed>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(request: ProcessingJob) -> Self {
        Self {
            request,
            job: None,
            report: None,
            document: None,
            transformed: None,
            warnings: Vec::new(),
        }
    }
}
