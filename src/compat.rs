//! Structural comparison of schemas
//!
//! Pure functions over [`DataSchema`]. Two relations are provided:
//! - subset: every column of `a` appears in `b`, with `a`'s column at least as narrow;
//! - refinement: every column of `m` appears in `s`, with `s`'s column at least as narrow.
//!
//! A column is narrower than another when it is non-null where the other is
//! nullable, when its element type is assignable to the other's, or when its
//! nested schema refines the other's.

use crate::error::SchemaConflict;
use crate::schema::{ColumnKind, ColumnSchema, DataSchema};

#[derive(Clone, Copy)]
enum Relation {
    Subset,
    Refinement,
}

impl Relation {
    fn nested(self, narrow: &DataSchema, wide: &DataSchema) -> bool {
        match self {
            Relation::Subset => is_structural_subset_of(narrow, wide),
            Relation::Refinement => is_refinement_of(narrow, wide),
        }
    }
}

fn column_fits(narrow: &ColumnSchema, wide: &ColumnSchema, relation: Relation) -> bool {
    if narrow.is_nullable() && !wide.is_nullable() {
        return false;
    }
    match (narrow.kind(), wide.kind()) {
        (ColumnKind::Value(a), ColumnKind::Value(b)) => a.is_assignable_to(b),
        (ColumnKind::Group(a), ColumnKind::Group(b)) => relation.nested(a, b),
        (ColumnKind::Frame(a), ColumnKind::Frame(b)) => relation.nested(a, b),
        _ => false,
    }
}

/// True if every column of `a` has a same-named, equal or wider counterpart in `b`
pub fn is_structural_subset_of(a: &DataSchema, b: &DataSchema) -> bool {
    a.columns().all(|column| {
        b.get(column.name())
            .is_some_and(|other| column_fits(column, other, Relation::Subset))
    })
}

/// True if a value of schema `s` can be used where schema `m` is expected
pub fn is_refinement_of(s: &DataSchema, m: &DataSchema) -> bool {
    m.columns().all(|expected| {
        s.get(expected.name())
            .is_some_and(|actual| column_fits(actual, expected, Relation::Refinement))
    })
}

fn conflict(left: &ColumnSchema, right: &ColumnSchema) -> SchemaConflict {
    SchemaConflict {
        column: left.name().to_string(),
        left: left.type_text(),
        right: right.type_text(),
    }
}

fn join_nested(a: &DataSchema, b: &DataSchema) -> Option<DataSchema> {
    if is_refinement_of(a, b) {
        Some(b.clone())
    } else if is_refinement_of(b, a) {
        Some(a.clone())
    } else {
        None
    }
}

fn join_kinds(a: &ColumnKind, b: &ColumnKind) -> Option<ColumnKind> {
    match (a, b) {
        (ColumnKind::Value(x), ColumnKind::Value(y)) => x.join(y).map(ColumnKind::Value),
        (ColumnKind::Group(x), ColumnKind::Group(y)) => join_nested(x, y).map(ColumnKind::Group),
        (ColumnKind::Frame(x), ColumnKind::Frame(y)) => join_nested(x, y).map(ColumnKind::Frame),
        _ => None,
    }
}

/// Merge two declarations of one column: nullable unless both are non-null,
/// and the more general of the two kinds.
pub fn join_columns(a: &ColumnSchema, b: &ColumnSchema) -> Result<ColumnSchema, SchemaConflict> {
    let kind = join_kinds(a.kind(), b.kind()).ok_or_else(|| conflict(a, b))?;
    Ok(ColumnSchema::new(
        a.name(),
        kind,
        a.is_nullable() || b.is_nullable(),
    ))
}

/// Check whether two schemas can be merged without a conflict
pub fn is_union_compatible(a: &DataSchema, b: &DataSchema) -> bool {
    union(a, b).is_ok()
}

/// Merge the column sets of two schemas
pub fn union(a: &DataSchema, b: &DataSchema) -> Result<DataSchema, SchemaConflict> {
    let mut merged = a.clone();
    for column in b.columns() {
        let joined = match a.get(column.name()) {
            Some(existing) => join_columns(existing, column)?,
            None => column.clone(),
        };
        merged = merged.with_column(joined);
    }
    Ok(merged)
}

/// Merge any number of schemas; the empty union is the empty schema
pub fn union_all<'a>(
    schemas: impl IntoIterator<Item = &'a DataSchema>,
) -> Result<DataSchema, SchemaConflict> {
    schemas
        .into_iter()
        .try_fold(DataSchema::empty(), |acc, schema| union(&acc, schema))
}

/// Columns of `a` without an identical counterpart in `b`
pub fn difference(a: &DataSchema, b: &DataSchema) -> DataSchema {
    a.columns()
        .filter(|column| b.get(column.name()) != Some(*column))
        .cloned()
        .collect()
}

/// Apply `own` columns on top of an inherited schema.
///
/// An own column may only narrow the inherited column it replaces.
pub fn extend(inherited: &DataSchema, own: &DataSchema) -> Result<DataSchema, SchemaConflict> {
    let mut schema = inherited.clone();
    for column in own.columns() {
        if let Some(base) = inherited.get(column.name()) {
            if !column_fits(column, base, Relation::Refinement) {
                return Err(conflict(base, column));
            }
        }
        schema = schema.with_column(column.clone());
    }
    Ok(schema)
}
