// schema_markers - incremental marker synthesis for interactive tabular sessions

pub mod compat;
pub mod config;
pub mod cover;
pub mod emit;
pub mod error;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod script;
pub mod session;

pub use config::{ConfigError, EmitOptions, SessionConfig};
pub use cover::CoverPlan;
pub use emit::Declaration;
pub use error::{SchemaConflict, SynthesisError};
pub use provider::{SchemaProvider, StaticMarker};
pub use registry::{Marker, MarkerId, MarkerOrigin, MarkerRegistry};
pub use schema::{ColumnKind, ColumnSchema, DataSchema, SchemaError, SchemaSource, TypeRef};
pub use session::{ProcessResult, Session, SharedSession};
