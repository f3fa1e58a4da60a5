//! Session scripts
//!
//! A script is a JSON document that declares user markers and lists the
//! `process`, `bind` and `refine` calls to replay against a fresh session:
//!
//! ```json
//! {
//!   "config": { "marker_prefix": "R" },
//!   "markers": [
//!     { "name": "app.Named", "columns": { "name": "String" } },
//!     { "name": "app.Person", "columns": { "age": "Int" }, "bases": ["app.Named"] }
//!   ],
//!   "steps": [
//!     { "process": { "age": "Int", "city": "String?", "address": { "group": { "street": "String" } } } },
//!     { "bind": "app.Person" },
//!     { "refine": { "bases": ["R1"], "columns": { "city": "String" } } }
//!   ]
//! }
//! ```

use crate::config::{ConfigError, SessionConfig};
use crate::error::SynthesisError;
use crate::provider::StaticMarker;
use crate::schema::{ColumnKind, ColumnSchema, DataSchema, SchemaError};
use crate::session::{ProcessResult, Session};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Unknown marker: {0}")]
    UnknownMarker(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Step {step} failed: {source}")]
    Step {
        step: usize,
        #[source]
        source: SynthesisError,
    },
}

/// Column written as `"Int"`, `"String?"`, `{"group": {..}}` or `{"frame": {..}}`
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ColumnDocument {
    Value(String),
    Group {
        group: SchemaDocument,
        #[serde(default)]
        nullable: bool,
    },
    Frame {
        frame: SchemaDocument,
        #[serde(default)]
        nullable: bool,
    },
}

pub type SchemaDocument = BTreeMap<String, ColumnDocument>;

/// Convert the JSON form of a schema
pub fn schema_from_document(document: &SchemaDocument) -> Result<DataSchema, SchemaError> {
    let mut columns = Vec::with_capacity(document.len());
    for (name, column) in document {
        columns.push(match column {
            ColumnDocument::Value(text) => ColumnSchema::parse(name, text)?,
            ColumnDocument::Group { group, nullable } => ColumnSchema::new(
                name.as_str(),
                ColumnKind::Group(schema_from_document(group)?),
                *nullable,
            ),
            ColumnDocument::Frame { frame, nullable } => ColumnSchema::new(
                name.as_str(),
                ColumnKind::Frame(schema_from_document(frame)?),
                *nullable,
            ),
        });
    }
    DataSchema::new(columns)
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarkerDocument {
    pub name: String,
    #[serde(default)]
    pub columns: SchemaDocument,
    #[serde(default)]
    pub bases: Vec<String>,
    /// Declared, but its columns cannot be inspected
    #[serde(default)]
    pub opaque: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Process(SchemaDocument),
    Bind(String),
    Refine {
        bases: Vec<String>,
        #[serde(default)]
        columns: SchemaDocument,
    },
}

#[derive(Clone, Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub config: Option<SessionConfig>,
    #[serde(default)]
    pub markers: Vec<MarkerDocument>,
    pub steps: Vec<Step>,
}

/// Result of one replayed step
#[derive(Clone, Debug, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub description: String,
    pub result: ProcessResult,
}

impl Script {
    /// Parse a script from JSON text
    pub fn from_json(text: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(text).map_err(|e| ScriptError::DeserializationError(e.to_string()))
    }

    /// Read and parse a script file
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|e| ScriptError::IoError(e.to_string()))?;
        Self::from_json(&text)
    }

    /// A fresh session configured by this script
    pub fn session(&self) -> Result<Session, ScriptError> {
        let config = self.config.clone().unwrap_or_default();
        Ok(Session::with_config(config)?)
    }

    fn static_markers(&self) -> Result<HashMap<String, Arc<StaticMarker>>, ScriptError> {
        let mut markers: HashMap<String, Arc<StaticMarker>> = HashMap::new();
        for document in &self.markers {
            let mut marker = if document.opaque {
                StaticMarker::opaque(document.name.as_str())
            } else {
                let columns = schema_from_document(&document.columns)?.columns().cloned().collect();
                StaticMarker::new(document.name.as_str(), columns)
            };
            for base in &document.bases {
                let base = markers
                    .get(base)
                    .ok_or_else(|| ScriptError::UnknownMarker(base.clone()))?;
                marker = marker.extending(Arc::clone(base));
            }
            markers.insert(document.name.clone(), Arc::new(marker));
        }
        Ok(markers)
    }

    /// Replay every step against `session`, stopping at the first failure
    pub fn run(&self, session: &mut Session) -> Result<Vec<StepOutcome>, ScriptError> {
        let markers = self.static_markers()?;
        let mut outcomes = Vec::with_capacity(self.steps.len());

        for (step, entry) in self.steps.iter().enumerate() {
            let failed = |source| ScriptError::Step { step, source };
            let (description, result) = match entry {
                Step::Process(document) => {
                    let schema = schema_from_document(document)?;
                    let result = session.process(&schema).map_err(failed)?;
                    (format!("process {}", schema), result)
                }
                Step::Bind(name) => {
                    let result = match markers.get(name) {
                        Some(marker) => session.process_marker(&**marker),
                        None => session.process_marker(&StaticMarker::opaque(name.as_str())),
                    }
                    .map_err(failed)?;
                    (format!("bind {}", name), result)
                }
                Step::Refine { bases, columns } => {
                    let ids = bases
                        .iter()
                        .map(|name| {
                            session
                                .lookup_marker(name)
                                .map(|marker| marker.id)
                                .ok_or_else(|| ScriptError::UnknownMarker(name.clone()))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let overrides = schema_from_document(columns)?;
                    let result = session
                        .process_refinement(&ids, &overrides)
                        .map_err(failed)?;
                    (format!("refine {} with {}", bases.join(", "), overrides), result)
                }
            };
            log::debug!("step {}: {} -> {:?}", step, description, result.marker_name);
            outcomes.push(StepOutcome {
                step,
                description,
                result,
            });
        }
        Ok(outcomes)
    }
}
