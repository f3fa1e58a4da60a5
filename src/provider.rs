//! Schema providers for user-declared markers
//!
//! Markers written by hand are introduced to a session through the
//! [`SchemaProvider`] capability instead of runtime reflection. Any type can
//! implement it; [`StaticMarker`] covers the common data-driven case.

use crate::schema::ColumnSchema;
use std::sync::Arc;

pub trait SchemaProvider {
    /// Fully qualified name, unique within a session
    fn qualified_name(&self) -> &str;

    /// Short name: the last `.` or `::` separated segment of the qualified name
    fn simple_name(&self) -> &str {
        let name = self.qualified_name();
        let tail = name.rsplit("::").next().unwrap_or(name);
        tail.rsplit('.').next().unwrap_or(tail)
    }

    /// Columns declared directly on the marker; `None` if it cannot be inspected
    fn declared_columns(&self) -> Option<Vec<ColumnSchema>>;

    /// Markers this one extends
    fn declared_bases(&self) -> Vec<&dyn SchemaProvider> {
        Vec::new()
    }
}

/// A marker described entirely by data
#[derive(Clone, Debug)]
pub struct StaticMarker {
    qualified_name: String,
    columns: Option<Vec<ColumnSchema>>,
    bases: Vec<Arc<StaticMarker>>,
}

impl StaticMarker {
    /// A marker with the given declared columns and no bases
    pub fn new(qualified_name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            columns: Some(columns),
            bases: Vec::new(),
        }
    }

    /// A marker whose columns cannot be inspected
    pub fn opaque(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            columns: None,
            bases: Vec::new(),
        }
    }

    /// Add `base` to the markers this one extends
    pub fn extending(mut self, base: Arc<StaticMarker>) -> Self {
        self.bases.push(base);
        self
    }
}

impl SchemaProvider for StaticMarker {
    fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    fn declared_columns(&self) -> Option<Vec<ColumnSchema>> {
        self.columns.clone()
    }

    fn declared_bases(&self) -> Vec<&dyn SchemaProvider> {
        self.bases
            .iter()
            .map(|base| base.as_ref() as &dyn SchemaProvider)
            .collect()
    }
}
