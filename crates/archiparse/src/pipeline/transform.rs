//! Transformation stage: normalizes parsed entities into model, element and
//! relationship records.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::db::{element_repo, model_repo, Database};
use crate::job::{timestamp, Job};
use crate::model::{Element, ElementDetail, Model, ModelStatistics, Relationship, RelationshipKind};

use super::error::{PipelineError, PipelineWarning};
use super::ifc;
use super::parser::ParsedDocument;
use super::scan::Entity;

/// Fields stored as element columns rather than attributes.
const COLUMN_FIELDS: [&str; 4] = ["GlobalId", "Name", "Description", "Tag"];

/// Records produced for one job, ready to persist.
#[derive(Debug)]
pub struct Transformed {
    pub model: Model,
    pub elements: Vec<ElementDetail>,
    pub relationships: Vec<Relationship>,
    pub warnings: Vec<PipelineWarning>,
}

/// Builds the model of `job` from a parsed document.
pub fn transform(doc: &ParsedDocument, job: &Job) -> Result<Transformed, PipelineError> {
    let mut builder = Builder::new(doc)?;
    builder.link_relations();
    builder.link_contained_in_structure();
    builder.attach_definitions();
    Ok(builder.finish(job))
}

/// Writes a transformation result in a single transaction.
pub fn persist(db: &Database, transformed: &Transformed) -> Result<(), PipelineError> {
    let model = &transformed.model;
    db.with_transaction(|tx| {
        model_repo::insert_in(tx, model)?;
        for element in &transformed.elements {
            element_repo::insert_in(tx, model.tenant_id, element)?;
        }
        for relationship in &transformed.relationships {
            element_repo::insert_relationship_in(tx, model.id, model.tenant_id, relationship)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn roles(kind: RelationshipKind) -> (&'static str, &'static str) {
    match kind {
        RelationshipKind::Contains => ("RelatingStructure", "RelatedElements"),
        RelationshipKind::Aggregates => ("RelatingObject", "RelatedObjects"),
        RelationshipKind::Voids => ("RelatingBuildingElement", "RelatedOpeningElement"),
        RelationshipKind::Fills => ("RelatingOpeningElement", "RelatedBuildingElement"),
    }
}

struct Builder<'a> {
    doc: &'a ParsedDocument,
    /// Product entities in document order with their new element ids.
    products: Vec<(usize, Uuid)>,
    ids: HashMap<usize, Uuid>,
    storey_of: HashMap<usize, usize>,
    space_of: HashMap<usize, usize>,
    /// Relating product of each relation entity.
    relating_of: HashMap<usize, usize>,
    children: HashMap<usize, Vec<usize>>,
    has_parent: HashSet<usize>,
    relationships: Vec<Relationship>,
    seen_relationships: HashSet<(RelationshipKind, Uuid, Uuid)>,
    properties: HashMap<usize, Map<String, Value>>,
    quantities: HashMap<usize, Map<String, Value>>,
    warnings: Vec<PipelineWarning>,
}

impl<'a> Builder<'a> {
    fn new(doc: &'a ParsedDocument) -> Result<Self, PipelineError> {
        let mut products = Vec::new();
        let mut ids = HashMap::new();
        let mut guids = HashSet::new();

        for (idx, entity) in doc.entities.iter().enumerate() {
            if !ifc::is_product(&entity.ifc_type) {
                continue;
            }
            let guid = entity.global_id().ok_or_else(|| {
                PipelineError::Transform(format!(
                    "{} '{}' has no GlobalId",
                    entity.ifc_type, entity.key
                ))
            })?;
            if !guids.insert(guid) {
                return Err(PipelineError::Transform(format!(
                    "Duplicate GlobalId '{}'",
                    guid
                )));
            }
            let id = Uuid::new_v4();
            products.push((idx, id));
            ids.insert(idx, id);
        }

        Ok(Self {
            doc,
            products,
            ids,
            storey_of: HashMap::new(),
            space_of: HashMap::new(),
            relating_of: HashMap::new(),
            children: HashMap::new(),
            has_parent: HashSet::new(),
            relationships: Vec::new(),
            seen_relationships: HashSet::new(),
            properties: HashMap::new(),
            quantities: HashMap::new(),
            warnings: Vec::new(),
        })
    }

    fn entity(&self, idx: usize) -> &'a Entity {
        let doc: &'a ParsedDocument = self.doc;
        &doc.entities[idx]
    }

    fn is_product(&self, idx: usize) -> bool {
        self.ids.contains_key(&idx)
    }

    /// Resolves the targets of `role`, warning about dangling references.
    fn targets(&mut self, entity: &Entity, role: &str) -> Vec<usize> {
        let mut found = Vec::new();
        for target in entity.targets(role) {
            match self.doc.resolve(target) {
                Some(idx) => found.push(idx),
                None => self.warnings.push(PipelineWarning::UnresolvedReference {
                    role: role.to_string(),
                    target: target.to_string(),
                }),
            }
        }
        found
    }

    /// Relation endpoints; an inline relation stands in for its parent on
    /// whichever side it leaves open.
    fn endpoints(
        &mut self,
        entity: &Entity,
        relating_role: &str,
        related_role: &str,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut relating = self.targets(entity, relating_role);
        let mut related = self.targets(entity, related_role);
        if relating.is_empty() && relating_role != "RelatingObject" {
            relating = self.targets(entity, "RelatingObject");
        }
        if related.is_empty() && related_role != "RelatedObjects" {
            related = self.targets(entity, "RelatedObjects");
        }
        if let Some(parent) = entity.parent {
            if relating.is_empty() && !related.contains(&parent) {
                relating.push(parent);
            } else if related.is_empty() && !relating.contains(&parent) {
                related.push(parent);
            }
        }
        (relating, related)
    }

    fn link_relations(&mut self) {
        for idx in 0..self.doc.entities.len() {
            let entity = self.entity(idx);
            let Some(kind) = RelationshipKind::from_ifc_type(&entity.ifc_type) else {
                continue;
            };
            let (relating_role, related_role) = roles(kind);
            let (relating, related) = self.endpoints(entity, relating_role, related_role);
            let Some(&from) = relating.iter().find(|&&i| self.is_product(i)) else {
                continue;
            };
            self.relating_of.insert(idx, from);
            for to in related {
                self.relate(kind, from, to);
            }
        }
    }

    fn relate(&mut self, kind: RelationshipKind, from: usize, to: usize) {
        let (Some(&from_id), Some(&to_id)) = (self.ids.get(&from), self.ids.get(&to)) else {
            return;
        };
        if from == to || !self.seen_relationships.insert((kind, from_id, to_id)) {
            return;
        }
        self.relationships.push(Relationship {
            kind,
            from_element_id: from_id,
            to_element_id: to_id,
        });

        let from_type = self.entity(from).ifc_type.as_str();
        let to_type = self.entity(to).ifc_type.as_str();
        match kind {
            RelationshipKind::Contains => self.contain(to, from),
            RelationshipKind::Aggregates => {
                if from_type == "IfcBuildingStorey" && to_type == "IfcSpace" {
                    self.storey_of.entry(to).or_insert(from);
                }
                if ifc::is_hierarchy(from_type)
                    && ifc::is_hierarchy(to_type)
                    && self.has_parent.insert(to)
                {
                    self.children.entry(from).or_default().push(to);
                }
            }
            RelationshipKind::Voids | RelationshipKind::Fills => {}
        }
    }

    fn contain(&mut self, element: usize, structure: usize) {
        match self.entity(structure).ifc_type.as_str() {
            "IfcBuildingStorey" => {
                self.storey_of.entry(element).or_insert(structure);
            }
            "IfcSpace" => {
                self.space_of.entry(element).or_insert(structure);
            }
            _ => {}
        }
    }

    /// Follows `ContainedInStructure` references that point at a spatial
    /// element or at a containment relation.
    fn link_contained_in_structure(&mut self) {
        for i in 0..self.products.len() {
            let product = self.products[i].0;
            let entity = self.entity(product);
            for target in self.targets(entity, "ContainedInStructure") {
                let target_type = self.entity(target).ifc_type.as_str();
                let structure = if target_type == "IfcRelContainedInSpatialStructure" {
                    self.relating_of.get(&target).copied()
                } else if ifc::is_hierarchy(target_type) {
                    Some(target)
                } else {
                    None
                };
                if let Some(structure) = structure {
                    self.relate(RelationshipKind::Contains, structure, product);
                }
            }
        }
    }

    /// Attaches property and quantity sets through
    /// `IfcRelDefinesByProperties`, whether stated on the relation or
    /// through a product's `IsDefinedBy`.
    fn attach_definitions(&mut self) {
        let mut pairs: Vec<(usize, usize)> = Vec::new();

        for idx in 0..self.doc.entities.len() {
            let entity = self.entity(idx);
            if entity.ifc_type != "IfcRelDefinesByProperties" {
                continue;
            }
            let (definitions, objects) =
                self.endpoints(entity, "RelatingPropertyDefinition", "RelatedObjects");
            for &object in objects.iter().filter(|&&o| self.is_product(o)) {
                for &definition in &definitions {
                    pairs.push((object, definition));
                }
            }
        }

        for i in 0..self.products.len() {
            let product = self.products[i].0;
            let entity = self.entity(product);
            for target in self.targets(entity, "IsDefinedBy") {
                let target_entity = self.entity(target);
                if target_entity.ifc_type == "IfcRelDefinesByProperties" {
                    for definition in self.targets(target_entity, "RelatingPropertyDefinition") {
                        pairs.push((product, definition));
                    }
                } else if ifc::is_property_definition(&target_entity.ifc_type) {
                    pairs.push((product, target));
                }
            }
        }

        let mut seen = HashSet::new();
        for (product, definition) in pairs {
            if seen.insert((product, definition)) {
                self.apply_definition(product, definition);
            }
        }
    }

    fn apply_definition(&mut self, product: usize, definition: usize) {
        let set = self.entity(definition);
        let set_name = set.field("Name").unwrap_or(set.ifc_type.as_str()).to_string();
        let is_quantity = set.ifc_type == "IfcElementQuantity";
        let role = if is_quantity { "Quantities" } else { "HasProperties" };

        let mut values = Map::new();
        for member in self.targets(set, role) {
            let member = self.entity(member);
            let Some(name) = member.field("Name") else {
                continue;
            };
            let value = if is_quantity {
                member
                    .fields
                    .iter()
                    .find(|(key, _)| key.ends_with("Value"))
                    .map(|(_, raw)| typed_value(raw))
            } else {
                member
                    .field("NominalValue")
                    .or_else(|| member.field("EnumerationValues"))
                    .or_else(|| member.field("ListValues"))
                    .map(typed_value)
            };
            values.insert(name.to_string(), value.unwrap_or(Value::Null));
        }

        let target = if is_quantity {
            self.quantities.entry(product).or_default()
        } else {
            self.properties.entry(product).or_default()
        };
        match target.get_mut(&set_name) {
            Some(Value::Object(existing)) => existing.extend(values),
            _ => {
                target.insert(set_name, Value::Object(values));
            }
        }
    }

    fn tree_node(&self, idx: usize, visited: &mut HashSet<usize>) -> Option<Value> {
        if !visited.insert(idx) {
            return None;
        }
        let entity = self.entity(idx);
        let mut children = self.children.get(&idx).cloned().unwrap_or_default();
        children.sort_by_key(|&c| spatial_order(self.entity(c)));
        let children: Vec<Value> = children
            .into_iter()
            .filter_map(|c| self.tree_node(c, visited))
            .collect();
        Some(json!({
            "id": self.ids.get(&idx),
            "guid": entity.global_id(),
            "type": entity.ifc_type,
            "name": entity.field("Name"),
            "children": children,
        }))
    }

    /// Spatial roots (the project first) with their aggregated children.
    fn spatial_tree(&self) -> Value {
        let mut roots: Vec<usize> = self
            .products
            .iter()
            .map(|&(idx, _)| idx)
            .filter(|&idx| {
                ifc::is_hierarchy(&self.entity(idx).ifc_type) && !self.has_parent.contains(&idx)
            })
            .collect();
        if roots.is_empty() {
            return Value::Null;
        }
        roots.sort_by_key(|&idx| spatial_order(self.entity(idx)));

        let mut visited = HashSet::new();
        Value::Array(
            roots
                .into_iter()
                .filter_map(|idx| self.tree_node(idx, &mut visited))
                .collect(),
        )
    }

    fn finish(mut self, job: &Job) -> Transformed {
        let project = self
            .products
            .iter()
            .map(|&(idx, _)| self.entity(idx))
            .find(|e| e.ifc_type == "IfcProject");
        if project.is_none() {
            self.warnings.push(PipelineWarning::NoProject);
        }
        if !self
            .products
            .iter()
            .any(|&(idx, _)| ifc::is_element(&self.entity(idx).ifc_type))
        {
            self.warnings.push(PipelineWarning::NoElements);
        }

        let model_id = Uuid::new_v4();
        let tree = self.spatial_tree();
        let mut statistics = ModelStatistics::default();

        let mut elements = Vec::with_capacity(self.products.len());
        for &(idx, id) in &self.products {
            let entity = self.entity(idx);
            match entity.ifc_type.as_str() {
                "IfcSpace" => statistics.spaces += 1,
                "IfcBuildingStorey" => statistics.storeys += 1,
                _ => {}
            }

            let space = self.space_of.get(&idx).copied();
            let storey = self
                .storey_of
                .get(&idx)
                .or_else(|| space.and_then(|s| self.storey_of.get(&s)))
                .copied();

            let attributes = entity
                .fields
                .iter()
                .filter(|(key, _)| !COLUMN_FIELDS.contains(&key.as_str()))
                .map(|(key, raw)| (key.clone(), typed_value(raw)))
                .collect();

            elements.push(ElementDetail {
                element: Element {
                    id,
                    model_id: Some(model_id),
                    guid: entity.global_id().unwrap_or_default().to_string(),
                    ifc_type: entity.ifc_type.clone(),
                    name: entity.field("Name").map(str::to_string),
                    description: entity.field("Description").map(str::to_string),
                    tag: entity.field("Tag").map(str::to_string),
                    storey_id: storey.and_then(|s| self.ids.get(&s).copied()),
                    space_id: space.and_then(|s| self.ids.get(&s).copied()),
                },
                properties: self.properties.remove(&idx).unwrap_or_default(),
                quantities: self.quantities.remove(&idx).unwrap_or_default(),
                attributes,
                relationships: Vec::new(),
            });
        }
        statistics.elements = elements.len() as u64;
        statistics.relationships = self.relationships.len() as u64;

        let model = Model {
            id: model_id,
            job_id: job.id,
            tenant_id: job.tenant_id,
            name: Some(job.filename.clone()),
            description: project.and_then(|p| p.field("Description")).map(str::to_string),
            project_guid: project.and_then(|p| p.global_id()).map(str::to_string),
            statistics,
            tree,
            created_at: timestamp::now(),
        };

        Transformed {
            model,
            elements,
            relationships: self.relationships,
            warnings: self.warnings,
        }
    }
}

fn spatial_order(entity: &Entity) -> (usize, String) {
    let rank = ifc::HIERARCHY_TYPES
        .iter()
        .position(|t| *t == entity.ifc_type)
        .unwrap_or(ifc::HIERARCHY_TYPES.len());
    (rank, entity.field("Name").unwrap_or_default().to_string())
}

/// Interprets a text value as boolean or number when it reads as one.
fn typed_value(raw: &str) -> Value {
    match raw {
        "true" | ".T." => return Value::Bool(true),
        "false" | ".F." => return Value::Bool(false),
        _ => {}
    }
    let numeric = raw
        .strip_prefix('-')
        .unwrap_or(raw)
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit());
    if numeric {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::from(n);
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::scan;
    use std::io::Cursor;

    const IFC4_MODEL: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<ifcXML xmlns="http://www.buildingsmart-tech.org/ifcXML/IFC4/Add2">
  <IfcProject id="p1" GlobalId="G-PROJECT" Name="Tower" Description="Main tower"/>
  <IfcSite id="site1" GlobalId="G-SITE" Name="Site"/>
  <IfcBuilding id="b1" GlobalId="G-BUILDING" Name="Building"/>
  <IfcBuildingStorey id="st1" GlobalId="G-L1" Name="Level 1" Elevation="3.5"/>
  <IfcBuildingStorey id="st0" GlobalId="G-L0" Name="Level 0" Elevation="0"/>
  <IfcSpace id="sp1" GlobalId="G-SPACE" Name="Office"/>
  <IfcWall id="w1" GlobalId="G-WALL" Name="Wall 1" Tag="W-001" PredefinedType="SOLIDWALL">
    <ContainedInStructure><IfcRelContainedInSpatialStructure ref="rc1"/></ContainedInStructure>
  </IfcWall>
  <IfcDoor id="d1" GlobalId="G-DOOR" Name="Door 1"/>
  <IfcOpeningElement id="o1" GlobalId="G-OPEN"/>
  <IfcRelAggregates id="ra1" GlobalId="R1">
    <RelatingObject><IfcProject ref="p1"/></RelatingObject>
    <RelatedObjects><IfcSite ref="site1"/></RelatedObjects>
  </IfcRelAggregates>
  <IfcRelAggregates id="ra2" GlobalId="R2">
    <RelatingObject><IfcSite ref="site1"/></RelatingObject>
    <RelatedObjects><IfcBuilding ref="b1"/></RelatedObjects>
  </IfcRelAggregates>
  <IfcRelAggregates id="ra3" GlobalId="R3">
    <RelatingObject><IfcBuilding ref="b1"/></RelatingObject>
    <RelatedObjects><IfcBuildingStorey ref="st1"/><IfcBuildingStorey ref="st0"/></RelatedObjects>
  </IfcRelAggregates>
  <IfcRelAggregates id="ra4" GlobalId="R4">
    <RelatingObject><IfcBuildingStorey ref="st1"/></RelatingObject>
    <RelatedObjects><IfcSpace ref="sp1"/></RelatedObjects>
  </IfcRelAggregates>
  <IfcRelContainedInSpatialStructure id="rc1" GlobalId="R5">
    <RelatingStructure><IfcBuildingStorey ref="st1"/></RelatingStructure>
  </IfcRelContainedInSpatialStructure>
  <IfcRelContainedInSpatialStructure id="rc2" GlobalId="R6">
    <RelatingStructure><IfcSpace ref="sp1"/></RelatingStructure>
    <RelatedElements><IfcDoor ref="d1"/></RelatedElements>
  </IfcRelContainedInSpatialStructure>
  <IfcRelVoidsElement id="rv1" GlobalId="R7">
    <RelatingBuildingElement><IfcWall ref="w1"/></RelatingBuildingElement>
    <RelatedOpeningElement><IfcOpeningElement ref="o1"/></RelatedOpeningElement>
  </IfcRelVoidsElement>
  <IfcRelFillsElement id="rf1" GlobalId="R8">
    <RelatingOpeningElement><IfcOpeningElement ref="o1"/></RelatingOpeningElement>
    <RelatedBuildingElement><IfcDoor ref="d1"/></RelatedBuildingElement>
  </IfcRelFillsElement>
  <IfcRelDefinesByProperties id="rp1" GlobalId="R9">
    <RelatedObjects><IfcWall ref="w1"/></RelatedObjects>
    <RelatingPropertyDefinition><IfcPropertySet ref="ps1"/></RelatingPropertyDefinition>
  </IfcRelDefinesByProperties>
  <IfcPropertySet id="ps1" GlobalId="PS1" Name="Pset_WallCommon">
    <HasProperties>
      <IfcPropertySingleValue Name="IsExternal">
        <NominalValue><IfcBoolean-wrapper>true</IfcBoolean-wrapper></NominalValue>
      </IfcPropertySingleValue>
      <IfcPropertySingleValue Name="FireRating">
        <NominalValue><IfcLabel-wrapper>REI60</IfcLabel-wrapper></NominalValue>
      </IfcPropertySingleValue>
    </HasProperties>
  </IfcPropertySet>
  <IfcRelDefinesByProperties id="rp2" GlobalId="R10">
    <RelatedObjects><IfcWall ref="w1"/></RelatedObjects>
    <RelatingPropertyDefinition>
      <IfcElementQuantity GlobalId="Q1" Name="Qto_WallBaseQuantities">
        <Quantities>
          <IfcQuantityLength Name="Length"><LengthValue>5.25</LengthValue></IfcQuantityLength>
          <IfcQuantityCount Name="Layers" CountValue="3"/>
        </Quantities>
      </IfcElementQuantity>
    </RelatingPropertyDefinition>
  </IfcRelDefinesByProperties>
</ifcXML>"##;

    fn parse(xml: &str) -> ParsedDocument {
        let scan = scan::scan_reader(Cursor::new(xml.as_bytes().to_vec()));
        assert!(scan.syntax_error.is_none(), "{:?}", scan.syntax_error);
        ParsedDocument::new(scan.entities)
    }

    fn job() -> Job {
        Job::new(Uuid::new_v4(), "tower.ifcxml", 1, "/tmp/tower.ifcxml")
    }

    fn by_guid<'a>(t: &'a Transformed, guid: &str) -> &'a ElementDetail {
        t.elements
            .iter()
            .find(|e| e.element.guid == guid)
            .unwrap_or_else(|| panic!("no element {}", guid))
    }

    #[test]
    fn test_model_and_statistics() {
        let job = job();
        let t = transform(&parse(IFC4_MODEL), &job).unwrap();

        assert_eq!(t.model.job_id, job.id);
        assert_eq!(t.model.tenant_id, job.tenant_id);
        assert_eq!(t.model.name.as_deref(), Some("tower.ifcxml"));
        assert_eq!(t.model.description.as_deref(), Some("Main tower"));
        assert_eq!(t.model.project_guid.as_deref(), Some("G-PROJECT"));
        assert_eq!(
            t.model.statistics,
            ModelStatistics {
                elements: 9,
                spaces: 1,
                storeys: 2,
                relationships: 9,
            }
        );
        assert!(t.warnings.is_empty(), "{:?}", t.warnings);
        assert!(t.elements.iter().all(|e| e.element.model_id == Some(t.model.id)));
    }

    #[test]
    fn test_containment_resolution() {
        let t = transform(&parse(IFC4_MODEL), &job()).unwrap();
        let level1 = by_guid(&t, "G-L1").element.id;
        let space = by_guid(&t, "G-SPACE").element.id;

        let wall = &by_guid(&t, "G-WALL").element;
        assert_eq!(wall.storey_id, Some(level1));
        assert_eq!(wall.space_id, None);

        let door = &by_guid(&t, "G-DOOR").element;
        assert_eq!(door.space_id, Some(space));
        assert_eq!(door.storey_id, Some(level1));

        assert_eq!(by_guid(&t, "G-SPACE").element.storey_id, Some(level1));
    }

    #[test]
    fn test_relationship_kinds() {
        let t = transform(&parse(IFC4_MODEL), &job()).unwrap();
        let wall = by_guid(&t, "G-WALL").element.id;
        let opening = by_guid(&t, "G-OPEN").element.id;
        let door = by_guid(&t, "G-DOOR").element.id;

        assert!(t.relationships.contains(&Relationship {
            kind: RelationshipKind::Voids,
            from_element_id: wall,
            to_element_id: opening,
        }));
        assert!(t.relationships.contains(&Relationship {
            kind: RelationshipKind::Fills,
            from_element_id: opening,
            to_element_id: door,
        }));
        let count = |kind| t.relationships.iter().filter(|r| r.kind == kind).count();
        assert_eq!(count(RelationshipKind::Aggregates), 5);
        assert_eq!(count(RelationshipKind::Contains), 2);
    }

    #[test]
    fn test_properties_quantities_and_attributes() {
        let t = transform(&parse(IFC4_MODEL), &job()).unwrap();
        let wall = by_guid(&t, "G-WALL");

        assert_eq!(wall.element.tag.as_deref(), Some("W-001"));
        assert_eq!(wall.properties["Pset_WallCommon"]["IsExternal"], json!(true));
        assert_eq!(wall.properties["Pset_WallCommon"]["FireRating"], json!("REI60"));
        assert_eq!(wall.quantities["Qto_WallBaseQuantities"]["Length"], json!(5.25));
        assert_eq!(wall.quantities["Qto_WallBaseQuantities"]["Layers"], json!(3));
        assert_eq!(wall.attributes["PredefinedType"], json!("SOLIDWALL"));
        assert!(!wall.attributes.contains_key("GlobalId"));
        assert!(!wall.attributes.contains_key("Tag"));

        let storey = by_guid(&t, "G-L1");
        assert_eq!(storey.attributes["Elevation"], json!(3.5));
    }

    #[test]
    fn test_spatial_tree() {
        let t = transform(&parse(IFC4_MODEL), &job()).unwrap();
        let roots = t.model.tree.as_array().unwrap();
        assert_eq!(roots.len(), 1);

        let project = &roots[0];
        assert_eq!(project["type"], "IfcProject");
        let building = &project["children"][0]["children"][0];
        assert_eq!(building["type"], "IfcBuilding");

        let storeys = building["children"].as_array().unwrap();
        assert_eq!(storeys[0]["name"], "Level 0");
        assert_eq!(storeys[1]["name"], "Level 1");
        assert_eq!(storeys[1]["children"][0]["type"], "IfcSpace");
    }

    #[test]
    fn test_inline_relations_use_parent() {
        let t = transform(
            &parse(
                r#"<ifcXML>
                  <IfcBuildingStorey id="st" GlobalId="S">
                    <ContainsElements>
                      <IfcRelContainedInSpatialStructure GlobalId="R">
                        <RelatedElements>
                          <IfcSlab GlobalId="SLAB"/>
                        </RelatedElements>
                      </IfcRelContainedInSpatialStructure>
                    </ContainsElements>
                  </IfcBuildingStorey>
                  <IfcColumn GlobalId="COL">
                    <IsDefinedBy>
                      <IfcRelDefinesByProperties GlobalId="RP">
                        <RelatingPropertyDefinition>
                          <IfcPropertySet GlobalId="PS" Name="Pset_ColumnCommon">
                            <HasProperties>
                              <IfcPropertySingleValue Name="LoadBearing" NominalValue=".T."/>
                            </HasProperties>
                          </IfcPropertySet>
                        </RelatingPropertyDefinition>
                      </IfcRelDefinesByProperties>
                    </IsDefinedBy>
                  </IfcColumn>
                </ifcXML>"#,
            ),
            &job(),
        )
        .unwrap();

        let storey = by_guid(&t, "S").element.id;
        assert_eq!(by_guid(&t, "SLAB").element.storey_id, Some(storey));
        assert_eq!(
            by_guid(&t, "COL").properties["Pset_ColumnCommon"]["LoadBearing"],
            json!(true)
        );
        assert!(t.warnings.contains(&PipelineWarning::NoProject));
    }

    #[test]
    fn test_duplicate_global_id_fails() {
        let err = transform(
            &parse(r#"<ifcXML><IfcWall GlobalId="X"/><IfcSlab GlobalId="X"/></ifcXML>"#),
            &job(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Duplicate GlobalId 'X'");
    }

    #[test]
    fn test_typed_value() {
        assert_eq!(typed_value("true"), json!(true));
        assert_eq!(typed_value(".F."), json!(false));
        assert_eq!(typed_value("42"), json!(42));
        assert_eq!(typed_value("-0.5"), json!(-0.5));
        assert_eq!(typed_value("inf"), json!("inf"));
        assert_eq!(typed_value("2O2Fr$t4X7"), json!("2O2Fr$t4X7"));
    }

    #[test]
    fn test_persist_writes_everything() {
        let db = Database::open_in_memory().unwrap();
        let job = job();
        crate::db::job_repo::insert(&db, &job).unwrap();
        let t = transform(&parse(IFC4_MODEL), &job).unwrap();

        persist(&db, &t).unwrap();

        let stored = model_repo::find_by_job(&db, job.tenant_id, job.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.statistics, t.model.statistics);
        let wall = by_guid(&t, "G-WALL").element.id;
        let detail = element_repo::find_detail(&db, job.tenant_id, wall)
            .unwrap()
            .unwrap();
        assert_eq!(detail.properties, by_guid(&t, "G-WALL").properties);
        assert_eq!(detail.relationships.len(), 2);
    }
}
