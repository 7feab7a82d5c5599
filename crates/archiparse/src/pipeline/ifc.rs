//! IFC type classification.

/// Spatial hierarchy types, outermost first.
pub const HIERARCHY_TYPES: [&str; 5] = [
    "IfcProject",
    "IfcSite",
    "IfcBuilding",
    "IfcBuildingStorey",
    "IfcSpace",
];

const ELEMENT_TYPES: [&str; 15] = [
    "IfcWall",
    "IfcSlab",
    "IfcDoor",
    "IfcWindow",
    "IfcBeam",
    "IfcColumn",
    "IfcRoof",
    "IfcStair",
    "IfcRailing",
    "IfcCurtainWall",
    "IfcPlate",
    "IfcMember",
    "IfcCovering",
    "IfcOpeningElement",
    "IfcBuildingElementProxy",
];

pub fn is_hierarchy(ifc_type: &str) -> bool {
    HIERARCHY_TYPES.contains(&ifc_type)
}

/// Building elements, including `*StandardCase` variants and any
/// `IfcBuildingElement*` subtype.
pub fn is_element(ifc_type: &str) -> bool {
    let base = ifc_type.strip_suffix("StandardCase").unwrap_or(ifc_type);
    ELEMENT_TYPES.contains(&base) || ifc_type.starts_with("IfcBuildingElement")
}

/// Types that become rows of the element table.
pub fn is_product(ifc_type: &str) -> bool {
    is_hierarchy(ifc_type) || is_element(ifc_type)
}

pub fn is_relation(ifc_type: &str) -> bool {
    ifc_type.starts_with("IfcRel")
}

pub fn is_property_definition(ifc_type: &str) -> bool {
    matches!(ifc_type, "IfcPropertySet" | "IfcElementQuantity")
        || ifc_type.starts_with("IfcProperty")
        || ifc_type.starts_with("IfcQuantity")
}

/// Types the scanner records as entities even without an `id`.
pub fn is_tracked(ifc_type: &str) -> bool {
    is_product(ifc_type) || is_relation(ifc_type) || is_property_definition(ifc_type)
}
