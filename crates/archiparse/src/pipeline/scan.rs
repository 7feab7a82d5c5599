//! Streaming scan of an IFCXML document into flat entity records.
//!
//! The scan never builds a DOM. Elements are classified as they stream by:
//!
//! - an `Ifc*` element carrying `ref`/`href` is a reference to another entity;
//! - an `Ifc*` element with an `id`, a `GlobalId` attribute, or a tracked
//!   type name is an entity definition;
//! - any other `Ifc*` element (value wrappers such as `IfcLabel`) is
//!   transparent;
//! - a non-`Ifc` element inside an entity is an attribute role (`Name`,
//!   `RelatingObject`, `HasProperties`...).
//!
//! Text is stored on the owning entity under the outermost role beneath it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ifc;

/// A link from one entity to another under a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub role: String,
    pub target: String,
}

/// One entity definition found in the document.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub ifc_type: String,
    /// XML `id` when present, otherwise a synthetic `_N` key.
    pub key: String,
    /// Index of the enclosing entity, for inline definitions.
    pub parent: Option<usize>,
    /// Role under which the entity is nested in its parent.
    pub role: Option<String>,
    /// Byte offset of the start tag.
    pub offset: u64,
    pub fields: BTreeMap<String, String>,
    pub references: Vec<Reference>,
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn global_id(&self) -> Option<&str> {
        self.field("GlobalId")
    }

    /// Targets referenced under `role`, in document order.
    pub fn targets<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.references
            .iter()
            .filter(move |r| r.role == role)
            .map(|r| r.target.as_str())
    }
}

/// A well-formedness error; the scan stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: u64,
    pub message: String,
}

/// Everything a scan collected.
#[derive(Debug, Default)]
pub struct Scan {
    /// Local name of the document element.
    pub root: Option<String>,
    /// Namespace URI of the document element.
    pub root_namespace: Option<String>,
    /// Every namespace URI declared in the document, first occurrence order.
    pub namespaces: Vec<String>,
    pub entities: Vec<Entity>,
    pub syntax_error: Option<SyntaxError>,
}

enum Frame {
    Entity(usize),
    Role(String),
    Transparent,
}

struct Scanner {
    scan: Scan,
    stack: Vec<Frame>,
}

/// Scans a file on disk.
pub fn scan_path(path: &Path) -> io::Result<Scan> {
    let file = File::open(path)?;
    Ok(scan_reader(BufReader::new(file)))
}

/// Scans any buffered reader. I/O failures are reported as syntax errors.
pub fn scan_reader<R: BufRead>(input: R) -> Scan {
    let mut reader = Reader::from_reader(input);
    let mut scanner = Scanner {
        scan: Scan::default(),
        stack: Vec::new(),
    };
    let mut buf = Vec::new();

    loop {
        let offset = reader.buffer_position() as u64;
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                scanner.fail(reader.error_position() as u64, e.to_string());
                break;
            }
        };
        let outcome = match event {
            Event::Start(e) => scanner.open(&e, offset, false),
            Event::Empty(e) => scanner.open(&e, offset, true),
            Event::End(_) => {
                scanner.close();
                Ok(())
            }
            Event::Text(t) => {
                scanner.text(&String::from_utf8_lossy(&t));
                Ok(())
            }
            Event::CData(c) => {
                scanner.text(&String::from_utf8_lossy(&c));
                Ok(())
            }
            Event::GeneralRef(r) => {
                scanner.text(&resolve_entity_ref(&String::from_utf8_lossy(&r)));
                Ok(())
            }
            Event::Eof => {
                if !scanner.stack.is_empty() {
                    scanner.fail(offset, "Unexpected end of file: unclosed element".into());
                }
                break;
            }
            _ => Ok(()),
        };
        if let Err(message) = outcome {
            scanner.fail(offset, message);
            break;
        }
        buf.clear();
    }

    scanner.finish()
}

impl Scanner {
    fn fail(&mut self, offset: u64, message: String) {
        if self.scan.syntax_error.is_none() {
            self.scan.syntax_error = Some(SyntaxError { offset, message });
        }
    }

    fn finish(mut self) -> Scan {
        for entity in &mut self.scan.entities {
            entity.fields.retain(|_, value| {
                let trimmed = value.trim();
                if trimmed.len() != value.len() {
                    *value = trimmed.to_string();
                }
                !value.is_empty()
            });
        }
        self.scan
    }

    /// Nearest enclosing entity and the outermost role beneath it.
    fn owner(&self) -> Option<(usize, Option<String>)> {
        let mut role = None;
        for frame in self.stack.iter().rev() {
            match frame {
                Frame::Entity(idx) => return Some((*idx, role.map(str::to_string))),
                Frame::Role(name) => role = Some(name.as_str()),
                Frame::Transparent => {}
            }
        }
        None
    }

    fn open(&mut self, e: &BytesStart<'_>, offset: u64, empty: bool) -> Result<(), String> {
        let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        let mut attrs: Vec<(String, String)> = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| err.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            let value = quick_xml::escape::unescape(&raw)
                .map(|v| v.into_owned())
                .unwrap_or(raw);
            attrs.push((key, value));
        }

        for (key, value) in &attrs {
            if (key == "xmlns" || key.starts_with("xmlns:"))
                && !self.scan.namespaces.contains(value)
            {
                self.scan.namespaces.push(value.clone());
            }
        }

        if self.scan.root.is_none() {
            let prefix_key = match qname.split_once(':') {
                Some((prefix, _)) => format!("xmlns:{}", prefix),
                None => "xmlns".to_string(),
            };
            self.scan.root_namespace = attrs
                .iter()
                .find(|(k, _)| *k == prefix_key)
                .map(|(_, v)| v.clone());
            self.scan.root = Some(local.clone());
        }

        // Separate consecutive text values of the same field.
        self.separate_values();

        let target = attrs
            .iter()
            .find(|(k, _)| k == "ref" || k == "href")
            .map(|(_, v)| v.trim_start_matches('#').to_string());

        let frame = if let Some(target) = target {
            let role = if local.starts_with("Ifc") {
                self.owner()
                    .and_then(|(_, role)| role)
                    .unwrap_or_else(|| local.clone())
            } else {
                local.clone()
            };
            if let Some((idx, _)) = self.owner() {
                self.scan.entities[idx]
                    .references
                    .push(Reference { role, target });
            }
            Frame::Transparent
        } else if local.starts_with("Ifc") && is_entity_start(&local, &attrs) {
            Frame::Entity(self.push_entity(local, offset, attrs))
        } else if local.starts_with("Ifc") {
            Frame::Transparent
        } else {
            Frame::Role(local)
        };

        if !empty {
            self.stack.push(frame);
        }
        Ok(())
    }

    fn push_entity(
        &mut self,
        ifc_type: String,
        offset: u64,
        attrs: Vec<(String, String)>,
    ) -> usize {
        let idx = self.scan.entities.len();
        let key = attrs
            .iter()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| format!("_{}", idx));

        let (parent, role) = match self.owner() {
            Some((p, role)) => (Some(p), Some(role.unwrap_or_else(|| ifc_type.clone()))),
            None => (None, None),
        };
        if let (Some(p), Some(role)) = (parent, role.as_ref()) {
            self.scan.entities[p].references.push(Reference {
                role: role.clone(),
                target: key.clone(),
            });
        }

        let fields = attrs
            .into_iter()
            .filter(|(k, _)| k != "id" && !k.contains(':') && k != "xmlns")
            .collect();

        self.scan.entities.push(Entity {
            ifc_type,
            key,
            parent,
            role,
            offset,
            fields,
            references: Vec::new(),
        });
        idx
    }

    fn close(&mut self) {
        self.stack.pop();
    }

    fn separate_values(&mut self) {
        if let Some((idx, Some(role))) = self.owner() {
            if let Some(value) = self.scan.entities[idx].fields.get_mut(&role) {
                if !value.is_empty() && !value.ends_with(' ') {
                    value.push(' ');
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        if text.trim().is_empty() {
            // Whitespace only matters between two pieces of one value.
            self.separate_values();
            return;
        }
        if let Some((idx, Some(role))) = self.owner() {
            self.scan.entities[idx]
                .fields
                .entry(role)
                .or_default()
                .push_str(text);
        }
    }
}

fn is_entity_start(local: &str, attrs: &[(String, String)]) -> bool {
    attrs.iter().any(|(k, _)| k == "id" || k == "GlobalId") || ifc::is_tracked(local)
}

fn resolve_entity_ref(name: &str) -> String {
    if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(name) {
        return resolved.to_string();
    }
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_else(|| format!("&{};", name))
}

/// Resolves byte offsets to 1-based `(line, column)` pairs by rescanning.
pub fn line_columns(path: &Path, offsets: &[u64]) -> io::Result<Vec<(u64, u64)>> {
    let mut order: Vec<usize> = (0..offsets.len()).collect();
    order.sort_by_key(|&i| offsets[i]);

    let mut result = vec![(1, 1); offsets.len()];
    let mut reader = BufReader::new(File::open(path)?);
    let mut chunk = [0u8; 64 * 1024];
    let (mut pos, mut line, mut col) = (0u64, 1u64, 1u64);
    let mut next = 0;

    'outer: loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        for &byte in &chunk[..n] {
            while next < order.len() && offsets[order[next]] <= pos {
                result[order[next]] = (line, col);
                next += 1;
            }
            if next == order.len() {
                break 'outer;
            }
            if byte == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
            pos += 1;
        }
    }
    for &i in &order[next..] {
        result[i] = (line, col);
    }
    Ok(result)
}
