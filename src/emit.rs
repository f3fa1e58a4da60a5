//! Declaration rendering
//!
//! Turns a synthesized marker into the records a consumer needs to make it
//! usable: one marker declaration and one accessor per column the marker
//! declares itself. Rendering is pure, so equal drafts give equal output.

use crate::config::EmitOptions;
use crate::schema::{ColumnKind, ColumnSchema};
use serde::Serialize;
use std::fmt;

/// One generated declaration
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Marker {
        name: String,
        bases: Vec<String>,
    },
    Accessor {
        marker: String,
        column: String,
        column_type: String,
        nullable: bool,
    },
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Marker { name, bases } if bases.is_empty() => write!(f, "marker {}", name),
            Declaration::Marker { name, bases } => {
                write!(f, "marker {} : {}", name, bases.join(", "))
            }
            Declaration::Accessor {
                marker,
                column,
                column_type,
                nullable,
            } => {
                write!(f, "accessor {}.{}: {}", marker, column, column_type)?;
                if *nullable {
                    f.write_str("?")?;
                }
                Ok(())
            }
        }
    }
}

/// A residual column together with the marker of its nested schema, if any
#[derive(Clone, Debug)]
pub struct ColumnDraft {
    pub column: ColumnSchema,
    pub nested_marker: Option<String>,
}

/// Everything needed to render a synthesized marker
#[derive(Clone, Debug)]
pub struct MarkerDraft {
    pub name: String,
    /// Qualified base names, in cover order
    pub bases: Vec<String>,
    pub columns: Vec<ColumnDraft>,
}

fn column_type(draft: &ColumnDraft, options: &EmitOptions) -> String {
    let nested = |container: &str| match &draft.nested_marker {
        Some(marker) => format!("{}<{}>", container, marker),
        None => format!("{}<*>", container),
    };
    match draft.column.kind() {
        ColumnKind::Value(ty) => ty.to_string(),
        ColumnKind::Group(_) => nested(&options.row_type),
        ColumnKind::Frame(_) => nested(&options.frame_type),
    }
}

/// Render the marker declaration followed by its accessors
pub fn render(draft: &MarkerDraft, options: &EmitOptions) -> Vec<Declaration> {
    let mut declarations = Vec::with_capacity(draft.columns.len() + 1);
    declarations.push(Declaration::Marker {
        name: draft.name.clone(),
        bases: draft.bases.clone(),
    });
    for column in &draft.columns {
        declarations.push(Declaration::Accessor {
            marker: draft.name.clone(),
            column: column.column.name().to_string(),
            column_type: column_type(column, options),
            nullable: column.column.is_nullable(),
        });
    }
    declarations
}

/// Newline-separated text of a declaration list
pub fn to_text(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
