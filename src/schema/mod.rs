//! Structural schemas of tabular values
//!
//! A [`DataSchema`] is the set of columns a tabular value exposes. Two schemas
//! are the same schema when their columns agree on name, kind and nullability,
//! regardless of the order the columns were observed in.

mod column;
mod types;

pub use column::{ColumnKind, ColumnSchema};
pub use types::{TypeArg, TypeParseError, TypeRef};

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Invalid type for column {column}: {source}")]
    InvalidType {
        column: String,
        #[source]
        source: TypeParseError,
    },
}

/// Immutable structural description of a tabular value
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DataSchema {
    /// Columns keyed by name; the key order is the canonical column order
    columns: BTreeMap<String, ColumnSchema>,
}

impl DataSchema {
    /// Create a schema with no columns
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a schema, rejecting repeated column names
    pub fn new(columns: impl IntoIterator<Item = ColumnSchema>) -> Result<Self, SchemaError> {
        let mut map = BTreeMap::new();
        for column in columns {
            if map.contains_key(column.name()) {
                return Err(SchemaError::DuplicateColumn(column.name().to_string()));
            }
            map.insert(column.name().to_string(), column);
        }
        Ok(Self { columns: map })
    }

    /// Build a schema of value columns from `(name, "Type?")` pairs
    pub fn parse<'a>(
        columns: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, SchemaError> {
        let columns = columns
            .into_iter()
            .map(|(name, ty)| ColumnSchema::parse(name, ty))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns)
    }

    /// Column with the given name
    pub fn get(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.get(name)
    }

    /// True if a column with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Columns in canonical (name) order
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.values()
    }

    /// Column names in canonical order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True for a schema with no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Copy of this schema with `column` added or replacing the same-named one
    pub fn with_column(&self, column: ColumnSchema) -> Self {
        let mut columns = self.columns.clone();
        columns.insert(column.name().to_string(), column);
        Self { columns }
    }

    /// Hex SHA-256 of the canonical text; equal schemas share a fingerprint
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl FromIterator<ColumnSchema> for DataSchema {
    /// Later columns replace earlier ones with the same name.
    fn from_iter<I: IntoIterator<Item = ColumnSchema>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|column| (column.name().to_string(), column))
                .collect(),
        }
    }
}

impl fmt::Display for DataSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, column) in self.columns().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", column)?;
        }
        f.write_str("}")
    }
}

/// Anything that can report the structural schema of a tabular value
pub trait SchemaSource {
    fn data_schema(&self) -> DataSchema;
}

impl SchemaSource for DataSchema {
    fn data_schema(&self) -> DataSchema {
        self.clone()
    }
}

impl<T: SchemaSource + ?Sized> SchemaSource for &T {
    fn data_schema(&self) -> DataSchema {
        (**self).data_schema()
    }
}
