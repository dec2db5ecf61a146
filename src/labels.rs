//! Atlas label trees.
//!
//! A label tree maps the integer values of an atlas volume to brain areas.
//! It is read either from a delimited text table (`id, parent_id, name,
//! ...` with a header row) or from the nested JSON structure graph
//! published with the Allen atlases, which is flattened into the same rows.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use serde_json::Value;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("File not found: {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Label files must be .csv or .json: {path:?}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid label JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub id: i64,
    pub parent: Option<i64>,
    pub name: String,
    /// Remaining columns keyed by header name.
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct LabelTree {
    labels: HashMap<i64, Label>,
    order: Vec<i64>,
}

const SEPARATORS: [char; 3] = ['|', '\t', ','];

/// Pick the first of `|`, tab and `,` that occurs at least once per line.
pub fn guess_separator(contents: &str) -> char {
    let lines = contents.matches('\n').count();
    SEPARATORS
        .into_iter()
        .find(|sep| contents.matches(*sep).count() >= lines)
        .unwrap_or(',')
}

fn parse_parent(field: &str) -> Option<i64> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().map(|v| v as i64)
}

impl LabelTree {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LabelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let tree = match extension.as_deref() {
            Some("csv") => {
                let contents = fs::read_to_string(path)?;
                Self::from_delimited(&contents, guess_separator(&contents))?
            }
            Some("json") => Self::from_json(&fs::read_to_string(path)?)?,
            _ => {
                return Err(LabelError::UnsupportedFormat {
                    path: path.to_path_buf(),
                });
            }
        };
        log::info!("Loaded {} labels from {path:?}", tree.len());
        Ok(tree)
    }

    /// Parse a table whose first row names the columns. The first column is
    /// the id, the second the parent id; the name comes from a `name`
    /// column, or the third column if there is none.
    pub fn from_delimited(contents: &str, separator: char) -> Result<Self, LabelError> {
        let mut lines = contents.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let Some((_, header)) = lines.next() else {
            return Ok(Self::default());
        };
        let columns: Vec<String> = header
            .split(separator)
            .map(|c| c.trim().to_string())
            .collect();
        if columns.len() < 3 {
            return Err(LabelError::Parse {
                line: 1,
                message: format!("expected at least 3 columns, found {}", columns.len()),
            });
        }
        let name_column = columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case("name"))
            .unwrap_or(2);

        let mut tree = Self::default();
        for (i, line) in lines {
            let fields: Vec<&str> = line.split(separator).map(str::trim).collect();
            if fields.len() < 2 {
                return Err(LabelError::Parse {
                    line: i + 1,
                    message: "missing parent column".into(),
                });
            }
            let id = fields[0]
                .parse::<f64>()
                .map(|v| v as i64)
                .map_err(|_| LabelError::Parse {
                    line: i + 1,
                    message: format!("'{}' is not an id", fields[0]),
                })?;
            let mut data = BTreeMap::new();
            for (column, value) in columns.iter().zip(&fields).skip(2) {
                data.insert(column.clone(), value.to_string());
            }
            tree.insert(Label {
                id,
                parent: parse_parent(fields[1]),
                name: fields.get(name_column).unwrap_or(&"").to_string(),
                data,
            });
        }
        Ok(tree)
    }

    /// Parse `{"msg": [...]}` (or a bare array) of nested structures.
    pub fn from_json(contents: &str) -> Result<Self, LabelError> {
        let root: Value = serde_json::from_str(contents)?;
        let top = match &root {
            Value::Object(map) => map.get("msg").cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let Value::Array(nodes) = top else {
            return Err(LabelError::Parse {
                line: 0,
                message: "expected a \"msg\" array of structures".into(),
            });
        };
        let mut tree = Self::default();
        for node in &nodes {
            tree.flatten(node)?;
        }
        Ok(tree)
    }

    fn flatten(&mut self, node: &Value) -> Result<(), LabelError> {
        let Value::Object(map) = node else {
            return Ok(());
        };
        let id = map
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| LabelError::Parse {
                line: 0,
                message: "structure without an integer id".into(),
            })?;
        let parent = map.get("parent_structure_id").and_then(Value::as_i64);
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let data = map
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "id" | "parent_structure_id" | "children"))
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key.clone(), text))
            })
            .collect();
        self.insert(Label {
            id,
            parent,
            name,
            data,
        });
        if let Some(Value::Array(children)) = map.get("children") {
            for child in children {
                self.flatten(child)?;
            }
        }
        Ok(())
    }

    fn insert(&mut self, label: Label) {
        if self.labels.insert(label.id, label.clone()).is_some() {
            log::warn!("Duplicate label id {}; keeping the last one", label.id);
        } else {
            self.order.push(label.id);
        }
    }

    pub fn get(&self, id: i64) -> Option<&Label> {
        self.labels.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.labels.contains_key(&id)
    }

    pub fn name(&self, id: i64) -> Option<&str> {
        self.get(id).map(|label| label.name.as_str())
    }

    pub fn children(&self, id: i64) -> impl Iterator<Item = &Label> {
        self.iter().filter(move |label| label.parent == Some(id))
    }

    /// Labels in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.order.iter().filter_map(|id| self.labels.get(id))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
