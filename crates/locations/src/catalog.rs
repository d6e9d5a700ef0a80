use std::{fs, path::Path};

use serde::Deserialize;
use serde_json::{Map, Value};
use shared::domain::{AdminLevel, Centroid, Place};
use thiserror::Error;
use tracing::info;

const DEFAULT_LEVEL_NAME: &str = "location";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read location catalog '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("location catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("location node '{path}' is malformed: {source}")]
    Node {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("location node '{0}' has no code")]
    MissingCode(String),
}

/// One administrative unit. The root node is nameless and codeless; every
/// other node carries a non-empty code.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationNode {
    pub name: String,
    pub code: String,
    pub centroid: Option<Centroid>,
    /// Name of the level below this one ("district", "ward", ...).
    pub child_level_name: String,
    /// Children in catalog order.
    pub children: Vec<LocationNode>,
}

impl LocationNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&LocationNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn child_by_code(&self, code: &str) -> Option<&LocationNode> {
        self.children
            .iter()
            .find(|child| child.code.eq_ignore_ascii_case(code))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationCatalog {
    root: LocationNode,
}

impl LocationCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            top_level_units = catalog.root.children.len(),
            "location catalog loaded"
        );
        Ok(catalog)
    }

    /// Parses the nested `{childAdminLevel, children: {NAME: {code, ...}}}`
    /// document. Children keep the key order of the document.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let raw: RawNode = serde_json::from_str(raw)?;
        let root = LocationNode {
            name: String::new(),
            code: String::new(),
            centroid: None,
            child_level_name: raw.level_name(),
            children: raw.into_children("")?,
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &LocationNode {
        &self.root
    }

    /// Follows child names from the root. An empty path is the root itself.
    pub fn walk(&self, path: &[String]) -> Option<&LocationNode> {
        path.iter()
            .try_fold(&self.root, |node, name| node.child(name))
    }

    /// Builds the place for a path of child names, or `None` when the path is
    /// empty or leaves the catalog.
    pub fn place_for_path(&self, path: &[String]) -> Option<Place> {
        if path.is_empty() {
            return None;
        }
        let mut node = &self.root;
        let mut levels = Vec::with_capacity(path.len());
        let mut centroid = None;
        for name in path {
            let child = node.child(name)?;
            levels.push(AdminLevel {
                level_name: node.child_level_name.clone(),
                value: child.name.clone(),
                code: child.code.clone(),
            });
            centroid = child.centroid.or(centroid);
            node = child;
        }
        Some(Place { levels, centroid })
    }

    /// Resolves a dot-separated code path such as `so.22.8`, ignoring case.
    pub fn find_by_code_path(&self, code_path: &str) -> Option<Place> {
        let codes: Vec<&str> = code_path.trim().split('.').collect();
        if codes.iter().any(|code| code.is_empty()) {
            return None;
        }
        let mut node = &self.root;
        let mut names = Vec::with_capacity(codes.len());
        for code in codes {
            node = node.child_by_code(code)?;
            names.push(node.name.clone());
        }
        self.place_for_path(&names)
    }
}

/// On-disk shape of one catalog node. `children` stays a JSON map so the
/// document's key order survives.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    code: Option<RawCode>,
    #[serde(default)]
    centroid_lat: Option<f64>,
    #[serde(default)]
    centroid_lng: Option<f64>,
    #[serde(default)]
    child_admin_level: Option<String>,
    #[serde(default)]
    children: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCode {
    Text(String),
    Number(serde_json::Number),
}

impl RawNode {
    fn level_name(&self) -> String {
        self.child_admin_level
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_LEVEL_NAME)
            .to_string()
    }

    fn into_children(self, parent_path: &str) -> Result<Vec<LocationNode>, CatalogError> {
        let mut nodes = Vec::with_capacity(self.children.len());
        for (name, child) in self.children {
            let path = if parent_path.is_empty() {
                name.clone()
            } else {
                format!("{parent_path}/{name}")
            };
            let raw: RawNode = serde_json::from_value(child).map_err(|source| {
                CatalogError::Node {
                    path: path.clone(),
                    source,
                }
            })?;
            let code = match &raw.code {
                Some(RawCode::Text(code)) => code.trim().to_string(),
                Some(RawCode::Number(code)) => code.to_string(),
                None => String::new(),
            };
            if code.is_empty() {
                return Err(CatalogError::MissingCode(path));
            }
            let centroid = match (raw.centroid_lat, raw.centroid_lng) {
                (Some(lat), Some(lng)) => Some(Centroid { lat, lng }),
                _ => None,
            };
            let child_level_name = raw.level_name();
            nodes.push(LocationNode {
                name,
                code,
                centroid,
                child_level_name,
                children: raw.into_children(&path)?,
            });
        }
        Ok(nodes)
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
