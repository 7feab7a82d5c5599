//! Structural validation of an IFCXML document.
//!
//! Checks well-formedness, detects the schema version and verifies the
//! identity rules every product must follow. Content models and attribute
//! types from the IFC XSD files are not checked. Collected errors are capped
//! at [`MAX_VALIDATION_ERRORS`]; the report keeps the full count.

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use crate::job::{IfcVersion, ValidationError, MAX_VALIDATION_ERRORS};

use super::error::PipelineError;
use super::ifc;
use super::scan::{self, Entity, Scan};

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub version: Option<IfcVersion>,
    /// The first [`MAX_VALIDATION_ERRORS`] errors, in document order.
    pub errors: Vec<ValidationError>,
    pub total_errors: usize,
    pub entity_count: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.total_errors == 0
    }

    pub fn failure_message(&self) -> String {
        format!("Validation failed: {} error(s)", self.total_errors)
    }
}

/// Detects the IFC schema version of a scanned document.
///
/// Namespace declarations win: the first URI mentioning `ifcxml` together
/// with `ifc2x3` or `ifc4` decides. Otherwise the root element's namespace
/// and name are inspected.
pub fn detect_version(scan: &Scan) -> Option<IfcVersion> {
    for uri in &scan.namespaces {
        let uri = uri.to_lowercase();
        if !uri.contains("ifcxml") {
            continue;
        }
        if let Some(version) = version_marker(&uri) {
            return Some(version);
        }
    }

    let root = scan.root.as_deref()?.to_lowercase();
    let namespace = scan
        .root_namespace
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    version_marker(&namespace).or_else(|| version_marker(&root))
}

fn version_marker(text: &str) -> Option<IfcVersion> {
    if text.contains("ifc2x3") {
        Some(IfcVersion::Ifc2x3)
    } else if text.contains("ifc4") {
        Some(IfcVersion::Ifc4)
    } else {
        None
    }
}

/// Validates the file at `path`.
pub fn validate_path(path: &Path) -> Result<ValidationReport, PipelineError> {
    let scan = scan::scan_path(path).map_err(|e| PipelineError::io(path, e))?;
    let (mut report, offsets) = validate_scan(&scan);

    let positions =
        scan::line_columns(path, &offsets).map_err(|e| PipelineError::io(path, e))?;
    for (error, (line, column)) in report.errors.iter_mut().zip(positions) {
        error.line = Some(line);
        error.column = Some(column);
    }

    debug!(
        "Validated {}: {} entities, {} error(s), version {:?}",
        crate::sanitize::redact_path(path),
        report.entity_count,
        report.total_errors,
        report.version
    );
    Ok(report)
}

/// Validates an already scanned document.
///
/// Returns the report together with the byte offset of every kept error so
/// the caller can resolve line and column numbers against the source.
pub fn validate_scan(scan: &Scan) -> (ValidationReport, Vec<u64>) {
    let mut collector = Collector::default();

    if let Some(syntax) = &scan.syntax_error {
        collector.push(
            syntax.offset,
            ValidationError::new(format!("XML syntax error: {}", syntax.message)),
        );
    }

    let version = detect_version(scan);
    match &scan.root {
        None if scan.syntax_error.is_none() => {
            collector.push(0, ValidationError::new("Missing root element"));
        }
        Some(root) if version.is_none() => {
            collector.push(
                0,
                ValidationError::new("Unable to detect IFC schema version")
                    .element(root.clone()),
            );
        }
        _ => {}
    }

    let mut seen: HashMap<&str, &Entity> = HashMap::new();
    for entity in &scan.entities {
        match entity.global_id() {
            Some(guid) => {
                if let Some(first) = seen.get(guid) {
                    collector.push(
                        entity.offset,
                        ValidationError::new(format!(
                            "Duplicate GlobalId '{}' (first used by {})",
                            guid,
                            describe(first)
                        ))
                        .element(describe(entity)),
                    );
                } else {
                    seen.insert(guid, entity);
                }
            }
            None if ifc::is_product(&entity.ifc_type) => {
                collector.push(
                    entity.offset,
                    ValidationError::new(format!("{} has no GlobalId", entity.ifc_type))
                        .element(describe(entity)),
                );
            }
            None => {}
        }
    }

    let report = ValidationReport {
        version,
        errors: collector.errors,
        total_errors: collector.total,
        entity_count: scan.entities.len(),
    };
    (report, collector.offsets)
}

/// `IfcWall#w1`, or just the type for anonymous entities.
fn describe(entity: &Entity) -> String {
    if entity.key.starts_with('_') {
        entity.ifc_type.clone()
    } else {
        format!("{}#{}", entity.ifc_type, entity.key)
    }
}

#[derive(Default)]
struct Collector {
    errors: Vec<ValidationError>,
    offsets: Vec<u64>,
    total: usize,
}

impl Collector {
    fn push(&mut self, offset: u64, error: ValidationError) {
        self.total += 1;
        if self.errors.len() < MAX_VALIDATION_ERRORS {
            self.errors.push(error);
            self.offsets.push(offset);
        }
    }
}
