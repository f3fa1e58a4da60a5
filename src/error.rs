use crate::registry::MarkerId;
use crate::schema::SchemaError;
use thiserror::Error;

/// Two declarations of one column that no schema can satisfy at once
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("column '{column}' is declared as both {left} and {right}")]
pub struct SchemaConflict {
    pub column: String,
    pub left: String,
    pub right: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Irreconcilable schema conflict: {0}")]
    IrreconcilableSchemaConflict(#[from] SchemaConflict),

    #[error("Unknown marker: {0}")]
    UnknownMarker(MarkerId),

    #[error("Cyclic marker inheritance through {0}")]
    CyclicMarker(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}
