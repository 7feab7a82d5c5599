//! Building-model records produced by the transformation stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::timestamp;

/// Entity counts recorded for a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatistics {
    #[serde(default)]
    pub elements: u64,
    #[serde(default)]
    pub spaces: u64,
    #[serde(default)]
    pub storeys: u64,
    #[serde(default)]
    pub relationships: u64,
}

/// Normalized output of one successfully transformed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_guid: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub statistics: ModelStatistics,
    /// Spatial tree: project, sites, buildings, storeys, spaces.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub tree: serde_json::Value,
    #[serde(with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
}

/// A typed entity within a model, as listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: Uuid,
    #[serde(default)]
    pub model_id: Option<Uuid>,
    pub guid: String,
    pub ifc_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub storey_id: Option<Uuid>,
    #[serde(default)]
    pub space_id: Option<Uuid>,
}

/// An element with its property, quantity and attribute payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDetail {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantities: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// Kind of a relation between two elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    Contains,
    Aggregates,
    Voids,
    Fills,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Contains => "CONTAINS",
            RelationshipKind::Aggregates => "AGGREGATES",
            RelationshipKind::Voids => "VOIDS",
            RelationshipKind::Fills => "FILLS",
        }
    }

    /// Maps an IFC relation entity type to a kind.
    pub fn from_ifc_type(ifc_type: &str) -> Option<Self> {
        match ifc_type {
            "IfcRelContainedInSpatialStructure" => Some(RelationshipKind::Contains),
            "IfcRelAggregates" => Some(RelationshipKind::Aggregates),
            "IfcRelVoidsElement" => Some(RelationshipKind::Voids),
            "IfcRelFillsElement" => Some(RelationshipKind::Fills),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONTAINS" => Ok(RelationshipKind::Contains),
            "AGGREGATES" => Ok(RelationshipKind::Aggregates),
            "VOIDS" => Ok(RelationshipKind::Voids),
            "FILLS" => Ok(RelationshipKind::Fills),
            other => Err(format!("Unknown relationship kind '{}'", other)),
        }
    }
}

/// A directed relation between two elements of the same model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub from_element_id: Uuid,
    pub to_element_id: Uuid,
}

/// One page of a tenant-scoped listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) >= self.total
    }
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}
