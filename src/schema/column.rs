use super::types::TypeRef;
use super::{DataSchema, SchemaError};
use serde::Serialize;
use std::fmt;

/// What a column holds
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Plain values of one element type
    Value(TypeRef),
    /// A nested row: every cell is a record of the inner schema
    Group(DataSchema),
    /// A nested frame: every cell is a table of the inner schema
    Frame(DataSchema),
}

impl ColumnKind {
    /// The inner schema of group and frame columns
    pub fn nested_schema(&self) -> Option<&DataSchema> {
        match self {
            ColumnKind::Value(_) => None,
            ColumnKind::Group(schema) | ColumnKind::Frame(schema) => Some(schema),
        }
    }
}

/// Name, kind and nullability of a single column
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnSchema {
    name: String,
    kind: ColumnKind,
    nullable: bool,
}

impl ColumnSchema {
    /// Create a column of any kind
    pub fn new(name: impl Into<String>, kind: ColumnKind, nullable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable,
        }
    }

    /// A non-null value column
    pub fn value(name: impl Into<String>, ty: TypeRef) -> Self {
        Self::new(name, ColumnKind::Value(ty), false)
    }

    /// A non-null column group
    pub fn group(name: impl Into<String>, schema: DataSchema) -> Self {
        Self::new(name, ColumnKind::Group(schema), false)
    }

    /// A non-null frame column
    pub fn frame(name: impl Into<String>, schema: DataSchema) -> Self {
        Self::new(name, ColumnKind::Frame(schema), false)
    }

    /// Parse a value column from text like `Int` or `String?`
    pub fn parse(name: &str, text: &str) -> Result<Self, SchemaError> {
        let trimmed = text.trim();
        let (ty_text, nullable) = match trimmed.strip_suffix('?') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };
        let ty = ty_text.parse().map_err(|source| SchemaError::InvalidType {
            column: name.to_string(),
            source,
        })?;
        Ok(Self::new(name, ColumnKind::Value(ty), nullable))
    }

    /// Same column, marked nullable
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Same column with the given nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Column name, unique within its schema
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value type or nested schema of the column
    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    /// True if the column may hold nulls
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Schema of a group or frame column, `None` for value columns
    pub fn nested_schema(&self) -> Option<&DataSchema> {
        self.kind.nested_schema()
    }

    /// The column's type without its name, e.g. `String?`
    pub fn type_text(&self) -> String {
        let mut text = match &self.kind {
            ColumnKind::Value(ty) => ty.to_string(),
            ColumnKind::Group(schema) => schema.to_string(),
            ColumnKind::Frame(schema) => format!("[{}]", schema),
        };
        if self.nullable {
            text.push('?');
        }
        text
    }
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.type_text())
    }
}
