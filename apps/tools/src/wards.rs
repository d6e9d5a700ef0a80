//! Builds the nested location catalog from the flat wards export.
//!
//! Columns used, by position: 0 longitude, 1 latitude, 3 ward, 4 ward code,
//! 5 state, 6 state code, 7 district, 8 district code. The first row is a
//! header.

use std::io::Read;

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};

const WARD_COLUMNS: usize = 9;

/// Same shape `LocationCatalog` reads; children keep first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRoot {
    pub child_admin_level: &'static str,
    #[serde(serialize_with = "ordered_children")]
    pub children: Vec<(String, CatalogNode)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogNode {
    pub code: String,
    pub centroid_lat: Option<f64>,
    pub centroid_lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_admin_level: Option<&'static str>,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "ordered_children"
    )]
    pub children: Vec<(String, CatalogNode)>,
}

impl CatalogNode {
    fn parent(code: &str, child_admin_level: &'static str) -> Self {
        Self {
            code: code.to_string(),
            centroid_lat: None,
            centroid_lng: None,
            child_admin_level: Some(child_admin_level),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WardImport {
    pub catalog: CatalogRoot,
    pub rows: usize,
    pub wards: usize,
}

fn ordered_children<S: Serializer>(
    children: &[(String, CatalogNode)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(children.iter().map(|(name, node)| (name, node)))
}

/// Returns the child called `name`, appending a fresh one built by `create`
/// when it is not there yet.
fn child_mut<'a>(
    children: &'a mut Vec<(String, CatalogNode)>,
    name: &str,
    create: impl FnOnce() -> CatalogNode,
) -> &'a mut CatalogNode {
    let index = match children.iter().position(|(existing, _)| existing == name) {
        Some(index) => index,
        None => {
            children.push((name.to_string(), create()));
            children.len() - 1
        }
    };
    &mut children[index].1
}

pub fn build_catalog<R: Read>(input: R) -> Result<WardImport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut catalog = CatalogRoot {
        child_admin_level: "state",
        children: Vec::new(),
    };
    let mut rows = 0;
    let mut wards = 0;
    for (index, record) in reader.records().enumerate() {
        // the header is line 1
        let line = index + 2;
        let record = record.with_context(|| format!("unreadable wards row at line {line}"))?;
        anyhow::ensure!(
            record.len() >= WARD_COLUMNS,
            "wards row at line {line} has {} columns, expected at least {WARD_COLUMNS}",
            record.len()
        );
        let field = |column: usize| record.get(column).unwrap_or_default().trim();
        let (state, district, ward) = (field(5), field(7), field(3));
        anyhow::ensure!(
            !state.is_empty() && !district.is_empty() && !ward.is_empty(),
            "wards row at line {line} is missing a state, district or ward name"
        );

        let state_node = child_mut(&mut catalog.children, state, || {
            CatalogNode::parent(field(6), "district")
        });
        let district_node = child_mut(&mut state_node.children, district, || {
            CatalogNode::parent(field(8), "ward")
        });
        if !district_node.children.iter().any(|(name, _)| name == ward) {
            district_node.children.push((
                ward.to_string(),
                CatalogNode {
                    code: field(4).to_string(),
                    centroid_lat: field(1).parse().ok(),
                    centroid_lng: field(0).parse().ok(),
                    child_admin_level: None,
                    children: Vec::new(),
                },
            ));
            wards += 1;
        }
        rows += 1;
    }

    Ok(WardImport {
        catalog,
        rows,
        wards,
    })
}

#[cfg(test)]
#[path = "tests/wards_tests.rs"]
mod tests;
