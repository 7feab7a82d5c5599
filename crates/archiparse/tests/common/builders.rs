//! Builders for IFCXML documents and seeded jobs.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use archiparse::db::{job_repo, Database};
use archiparse::job::{Job, JobStatus};

const IFC4_NAMESPACE: &str = "http://www.buildingsmart-tech.org/ifcXML/IFC4/Add2";
const IFC2X3_NAMESPACE: &str = "http://www.iai-tech.org/ifcXML/IFC2x3/FINAL";

struct Storey {
    id: String,
    guid: String,
    name: String,
}

struct Product {
    ifc_type: String,
    id: String,
    guid: Option<String>,
    name: String,
    storey: Option<String>,
}

/// Builds a small IFCXML building: a project, storeys aggregated under it
/// and products contained in storeys.
pub struct IfcxmlBuilder {
    namespace: &'static str,
    project_name: String,
    storeys: Vec<Storey>,
    products: Vec<Product>,
}

impl IfcxmlBuilder {
    pub fn new() -> Self {
        Self {
            namespace: IFC4_NAMESPACE,
            project_name: "Project".to_string(),
            storeys: Vec::new(),
            products: Vec::new(),
        }
    }

    pub fn ifc2x3(mut self) -> Self {
        self.namespace = IFC2X3_NAMESPACE;
        self
    }

    pub fn project(mut self, name: &str) -> Self {
        self.project_name = name.to_string();
        self
    }

    pub fn storey(mut self, id: &str, name: &str) -> Self {
        self.storeys.push(Storey {
            id: id.to_string(),
            guid: format!("G-{}", id.to_uppercase()),
            name: name.to_string(),
        });
        self
    }

    /// Adds a product contained in `storey` (a storey id) when given.
    pub fn product(mut self, ifc_type: &str, id: &str, name: &str, storey: Option<&str>) -> Self {
        self.products.push(Product {
            ifc_type: ifc_type.to_string(),
            id: id.to_string(),
            guid: Some(format!("G-{}", id.to_uppercase())),
            name: name.to_string(),
            storey: storey.map(str::to_string),
        });
        self
    }

    /// Adds a product without a GlobalId.
    pub fn anonymous(mut self, ifc_type: &str, id: &str) -> Self {
        self.products.push(Product {
            ifc_type: ifc_type.to_string(),
            id: id.to_string(),
            guid: None,
            name: id.to_string(),
            storey: None,
        });
        self
    }

    pub fn build(&self) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ifcXML xmlns=\"{}\">\n",
            self.namespace
        );
        xml.push_str(&format!(
            "  <IfcProject id=\"p1\" GlobalId=\"G-PROJECT\" Name=\"{}\"/>\n",
            self.project_name
        ));
        for storey in &self.storeys {
            xml.push_str(&format!(
                "  <IfcBuildingStorey id=\"{}\" GlobalId=\"{}\" Name=\"{}\"/>\n",
                storey.id, storey.guid, storey.name
            ));
        }
        for product in &self.products {
            match &product.guid {
                Some(guid) => xml.push_str(&format!(
                    "  <{} id=\"{}\" GlobalId=\"{}\" Name=\"{}\"/>\n",
                    product.ifc_type, product.id, guid, product.name
                )),
                None => xml.push_str(&format!(
                    "  <{} id=\"{}\" Name=\"{}\"/>\n",
                    product.ifc_type, product.id, product.name
                )),
            }
        }

        if !self.storeys.is_empty() {
            xml.push_str("  <IfcRelAggregates id=\"agg1\" GlobalId=\"G-AGG1\">\n");
            xml.push_str("    <RelatingObject><IfcProject ref=\"p1\"/></RelatingObject>\n");
            xml.push_str("    <RelatedObjects>");
            for storey in &self.storeys {
                xml.push_str(&format!("<IfcBuildingStorey ref=\"{}\"/>", storey.id));
            }
            xml.push_str("</RelatedObjects>\n  </IfcRelAggregates>\n");
        }

        for (i, storey) in self.storeys.iter().enumerate() {
            let contained: Vec<&Product> = self
                .products
                .iter()
                .filter(|p| p.storey.as_deref() == Some(storey.id.as_str()))
                .collect();
            if contained.is_empty() {
                continue;
            }
            xml.push_str(&format!(
                "  <IfcRelContainedInSpatialStructure id=\"rc{i}\" GlobalId=\"G-RC{i}\">\n"
            ));
            xml.push_str(&format!(
                "    <RelatingStructure><IfcBuildingStorey ref=\"{}\"/></RelatingStructure>\n",
                storey.id
            ));
            xml.push_str("    <RelatedElements>");
            for product in contained {
                xml.push_str(&format!("<{} ref=\"{}\"/>", product.ifc_type, product.id));
            }
            xml.push_str("</RelatedElements>\n  </IfcRelContainedInSpatialStructure>\n");
        }

        xml.push_str("</ifcXML>\n");
        xml
    }
}

/// A two-storey building with five products.
pub fn sample_building() -> String {
    IfcxmlBuilder::new()
        .project("Riverside Offices")
        .storey("st0", "Ground Floor")
        .storey("st1", "First Floor")
        .product("IfcWall", "w1", "Wall A", Some("st0"))
        .product("IfcWall", "w2", "Wall B", Some("st0"))
        .product("IfcDoor", "d1", "Entrance", Some("st0"))
        .product("IfcWall", "w3", "Wall C", Some("st1"))
        .product("IfcSlab", "s1", "Roof", None)
        .build()
}

/// Inserts a job directly in `status`, created `age_secs` after `base`.
pub fn seed_job(
    db: &Database,
    tenant_id: Uuid,
    status: JobStatus,
    base: DateTime<Utc>,
    age_secs: i64,
) -> Job {
    let created_at = base + Duration::seconds(age_secs);
    let mut job = Job::new(
        tenant_id,
        format!("seed-{age_secs:03}.ifcxml"),
        1024,
        format!("/srv/uploads/seed-{age_secs:03}.ifcxml"),
    );
    job.created_at = created_at;

    if status == JobStatus::Echoue {
        job.fail("Parsing error: seeded failure", None, created_at)
            .expect("seeded failure");
    } else {
        while job.status != status {
            let next = job.status.next().expect("status on the success path");
            job.advance(next, created_at).expect("seeded transition");
        }
    }

    job_repo::insert(db, &job).expect("seed insert");
    job
}
