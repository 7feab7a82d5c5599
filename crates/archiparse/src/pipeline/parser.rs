//! Parsing stage: turns a validated file into an indexed entity set.

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use super::error::PipelineError;
use super::scan::{self, Entity};

/// Entities of one document, addressable by XML id or GlobalId.
#[derive(Debug)]
pub struct ParsedDocument {
    pub entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl ParsedDocument {
    pub fn new(entities: Vec<Entity>) -> Self {
        let mut index = HashMap::with_capacity(entities.len());
        for (i, entity) in entities.iter().enumerate() {
            index.entry(entity.key.clone()).or_insert(i);
        }
        // GlobalIds only fill gaps; an XML id always wins.
        for (i, entity) in entities.iter().enumerate() {
            if let Some(guid) = entity.global_id() {
                index.entry(guid.to_string()).or_insert(i);
            }
        }
        Self { entities, index }
    }

    /// Position of the entity a reference points at.
    pub fn resolve(&self, target: &str) -> Option<usize> {
        self.index.get(target).copied()
    }

    pub fn get(&self, target: &str) -> Option<&Entity> {
        self.resolve(target).map(|i| &self.entities[i])
    }

    pub fn of_type<'a>(&'a self, ifc_type: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.entities.iter().filter(move |e| e.ifc_type == ifc_type)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Parses the file at `path`. A well-formedness error aborts the stage.
pub fn parse_path(path: &Path) -> Result<ParsedDocument, PipelineError> {
    let scan = scan::scan_path(path).map_err(|e| PipelineError::io(path, e))?;

    if let Some(syntax) = scan.syntax_error {
        let (line, column) = scan::line_columns(path, &[syntax.offset])
            .map_err(|e| PipelineError::io(path, e))?
            .first()
            .copied()
            .unwrap_or((1, 1));
        return Err(PipelineError::Syntax {
            line,
            column,
            message: syntax.message,
        });
    }

    debug!(
        "Parsed {} entities from {}",
        scan.entities.len(),
        crate::sanitize::redact_path(path)
    );
    Ok(ParsedDocument::new(scan.entities))
}
