//! Interactive synthesis sessions
//!
//! A [`Session`] owns the marker registry of one interactive session and runs
//! every `process` call against it:
//! - an identical schema returns the known marker with no declarations,
//! - nested group and frame schemas get their markers first,
//! - otherwise the cover solver picks bases and a new marker is declared.
//!
//! Calls are atomic: when one fails or panics, markers it added are discarded
//! and the name counter is restored.

use crate::compat::{extend, union_all};
use crate::config::{ConfigError, SessionConfig};
use crate::cover::{self, CoverPlan};
use crate::emit::{self, ColumnDraft, Declaration, MarkerDraft};
use crate::error::SynthesisError;
use crate::provider::SchemaProvider;
use crate::registry::{Marker, MarkerId, MarkerRegistry};
use crate::schema::{DataSchema, SchemaSource};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// What a `process` call produced
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
    /// Marker to bind the value against; `None` for unknown, opaque markers
    pub marker: Option<MarkerId>,
    pub marker_name: Option<String>,
    /// Newly emitted declarations, empty when nothing new was needed
    pub declarations: Vec<Declaration>,
}

impl ProcessResult {
    /// True when the call declared nothing new
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Declarations as newline-separated text
    pub fn code(&self) -> String {
        emit::to_text(&self.declarations)
    }
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    registry: MarkerRegistry,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session with the default config
    pub fn new() -> Self {
        Self::create(SessionConfig::default())
    }

    /// Create a session, rejecting configs that fail [`SessionConfig::validate`]
    pub fn with_config(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::create(config))
    }

    fn create(config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        log::debug!("session {} created with prefix {:?}", id, config.marker_prefix);
        Self {
            id,
            config,
            registry: MarkerRegistry::new(),
        }
    }

    /// Session id, included in log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Config the session was created with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Every marker known to the session
    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    /// Marker with the given id
    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.registry.get(id)
    }

    /// Find a marker by qualified or simple name
    pub fn lookup_marker(&self, name: &str) -> Option<&Marker> {
        self.registry.find_by_any_name(name)
    }

    /// Derive the schema of a tabular value and make sure a marker exists for it
    pub fn process<S: SchemaSource + ?Sized>(
        &mut self,
        value: &S,
    ) -> Result<ProcessResult, SynthesisError> {
        let schema = value.data_schema();
        self.atomically(|session| {
            let mut declarations = Vec::new();
            let id = session.synthesize(&schema, &mut declarations)?;
            Ok(session.result(Some(id), declarations))
        })
    }

    /// Bind a user-declared marker, and its bases, without declaring anything
    pub fn process_marker(
        &mut self,
        provider: &dyn SchemaProvider,
    ) -> Result<ProcessResult, SynthesisError> {
        self.atomically(|session| {
            let id = session.bind(provider, &mut Vec::new())?;
            Ok(session.result(id, Vec::new()))
        })
    }

    /// Process the schema of `bases` narrowed or extended by `overrides`
    pub fn process_refinement(
        &mut self,
        bases: &[MarkerId],
        overrides: &DataSchema,
    ) -> Result<ProcessResult, SynthesisError> {
        self.atomically(|session| {
            let mut inherited = Vec::with_capacity(bases.len());
            for id in bases {
                let marker = session
                    .registry
                    .get(*id)
                    .ok_or(SynthesisError::UnknownMarker(*id))?;
                inherited.push(&marker.schema);
            }
            let target = extend(&union_all(inherited)?, overrides)?;

            let mut declarations = Vec::new();
            let id = session.synthesize(&target, &mut declarations)?;
            Ok(session.result(Some(id), declarations))
        })
    }

    fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, SynthesisError>,
    ) -> Result<T, SynthesisError> {
        let checkpoint = self.registry.checkpoint();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| op(self))) {
            Ok(result) => result,
            Err(payload) => {
                log::warn!("session {}: call panicked, rolling back", self.id);
                self.registry.rollback(checkpoint);
                panic::resume_unwind(payload);
            }
        };
        if let Err(e) = &result {
            log::warn!("session {}: call failed, rolling back: {}", self.id, e);
            self.registry.rollback(checkpoint);
        }
        result
    }

    fn result(&self, id: Option<MarkerId>, declarations: Vec<Declaration>) -> ProcessResult {
        ProcessResult {
            marker: id,
            marker_name: id
                .and_then(|id| self.registry.get(id))
                .map(|marker| marker.qualified_name.clone()),
            declarations,
        }
    }

    fn synthesize(
        &mut self,
        schema: &DataSchema,
        out: &mut Vec<Declaration>,
    ) -> Result<MarkerId, SynthesisError> {
        if let Some(id) = self.registry.lookup_exact(schema) {
            return Ok(id);
        }

        for column in schema.columns() {
            if let Some(nested) = column.nested_schema() {
                self.synthesize(nested, out)?;
            }
        }

        let plan = cover::solve(&self.registry, schema)?;
        let diamond = plan.is_diamond();
        let (bases, residual) = match plan {
            CoverPlan::Existing(id) => return Ok(id),
            CoverPlan::Synthesize { bases, residual } => (bases, residual),
        };

        let name = self.registry.allocate_name(&self.config.marker_prefix);
        let draft = self.draft(&name, &bases, &residual);
        log::info!(
            "session {}: synthesized {} ({} bases, {} own columns{})",
            self.id,
            name,
            bases.len(),
            residual.len(),
            if diamond { ", diamond" } else { "" }
        );
        let id = self
            .registry
            .register_synthesized(name, schema.clone(), residual, bases);
        out.extend(emit::render(&draft, &self.config.emit));
        Ok(id)
    }

    fn draft(&self, name: &str, bases: &[MarkerId], residual: &DataSchema) -> MarkerDraft {
        let qualified = |id: MarkerId| {
            self.registry
                .get(id)
                .map(|marker| marker.qualified_name.clone())
        };
        MarkerDraft {
            name: name.to_string(),
            bases: bases.iter().filter_map(|id| qualified(*id)).collect(),
            columns: residual
                .columns()
                .map(|column| ColumnDraft {
                    column: column.clone(),
                    nested_marker: column
                        .nested_schema()
                        .and_then(|nested| self.registry.lookup_exact(nested))
                        .and_then(qualified),
                })
                .collect(),
        }
    }

    fn bind(
        &mut self,
        provider: &dyn SchemaProvider,
        in_progress: &mut Vec<String>,
    ) -> Result<Option<MarkerId>, SynthesisError> {
        let qualified_name = provider.qualified_name();
        if let Some(marker) = self.registry.find(qualified_name) {
            return Ok(Some(marker.id));
        }
        if in_progress.iter().any(|name| name == qualified_name) {
            return Err(SynthesisError::CyclicMarker(qualified_name.to_string()));
        }
        let Some(columns) = provider.declared_columns() else {
            log::debug!("session {}: {} cannot be inspected", self.id, qualified_name);
            return Ok(None);
        };

        in_progress.push(qualified_name.to_string());
        let mut bases = Vec::new();
        for base in provider.declared_bases() {
            if let Some(id) = self.bind(base, in_progress)? {
                bases.push(id);
            }
        }
        in_progress.pop();

        let own = DataSchema::new(columns)?;
        let inherited = union_all(
            bases
                .iter()
                .filter_map(|id| self.registry.get(*id))
                .map(|marker| &marker.schema),
        )?;
        let schema = extend(&inherited, &own)?;

        let id = self.registry.register_external(
            qualified_name.to_string(),
            provider.simple_name().to_string(),
            schema,
            own,
            bases,
        );
        log::info!("session {}: bound external marker {}", self.id, qualified_name);
        Ok(Some(id))
    }
}

/// A session shared between callers; each call holds the lock until it is done
#[derive(Clone, Debug)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}

impl SharedSession {
    /// Share `session` between callers
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Run `f` with exclusive access to the session
    pub fn with<T>(&self, f: impl FnOnce(&mut Session) -> T) -> T {
        // Calls roll back when they fail or panic, so a poisoned session is still consistent.
        let mut session = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    /// See [`Session::process`]
    pub fn process<S: SchemaSource + ?Sized>(
        &self,
        value: &S,
    ) -> Result<ProcessResult, SynthesisError> {
        self.with(|session| session.process(value))
    }

    /// See [`Session::process_marker`]
    pub fn process_marker(
        &self,
        provider: &dyn SchemaProvider,
    ) -> Result<ProcessResult, SynthesisError> {
        self.with(|session| session.process_marker(provider))
    }

    /// See [`Session::process_refinement`]
    pub fn process_refinement(
        &self,
        bases: &[MarkerId],
        overrides: &DataSchema,
    ) -> Result<ProcessResult, SynthesisError> {
        self.with(|session| session.process_refinement(bases, overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaConflict;
    use crate::provider::StaticMarker;
    use crate::schema::ColumnSchema;

    fn schema(columns: &[(&str, &str)]) -> DataSchema {
        DataSchema::parse(columns.iter().copied()).unwrap()
    }

    fn person() -> DataSchema {
        schema(&[
            ("age", "Int"),
            ("city", "String?"),
            ("name", "String"),
            ("weight", "Int?"),
        ])
    }

    #[test]
    fn test_first_process_declares_all_columns() {
        let mut session = Session::new();
        let result = session.process(&person()).unwrap();
        assert_eq!(result.marker_name.as_deref(), Some("R0"));
        assert_eq!(
            result.code(),
            "marker R0\n\
             accessor R0.age: Int\n\
             accessor R0.city: String?\n\
             accessor R0.name: String\n\
             accessor R0.weight: Int?"
        );
    }

    #[test]
    fn test_idempotent() {
        let mut session = Session::new();
        let first = session.process(&person()).unwrap();
        let second = session.process(&person()).unwrap();
        assert_eq!(first.marker, second.marker);
        assert!(second.is_empty());
        assert_eq!(session.registry().len(), 1);
    }

    #[test]
    fn test_rebinding_known_marker_is_empty() {
        let mut session = Session::new();
        let r0 = session.process(&person()).unwrap().marker;
        let columns: Vec<ColumnSchema> = person().columns().cloned().collect();
        let result = session.process_marker(&StaticMarker::new("R0", columns)).unwrap();
        assert_eq!(result.marker, r0);
        assert!(result.is_empty());
    }

    #[test]
    fn test_refinement_declares_only_narrowed_column() {
        let mut session = Session::new();
        let r0 = session.process(&person()).unwrap().marker.unwrap();
        let result = session
            .process_refinement(&[r0], &schema(&[("city", "String")]))
            .unwrap();
        assert_eq!(
            result.code(),
            "marker R1 : R0\n\
             accessor R1.city: String"
        );
        let r1 = session.marker(result.marker.unwrap()).unwrap();
        assert_eq!(r1.bases, vec![r0]);
        assert_eq!(r1.own_columns, schema(&[("city", "String")]));
    }

    #[test]
    fn test_conflict_leaves_registry_unchanged() {
        let mut session = Session::new();
        let int_marker = session.process(&schema(&[("a", "Int")])).unwrap().marker.unwrap();
        let str_marker = session
            .process(&schema(&[("a", "String")]))
            .unwrap()
            .marker
            .unwrap();

        let err = session
            .process_refinement(&[int_marker, str_marker], &DataSchema::empty())
            .unwrap_err();
        assert_eq!(
            err,
            SynthesisError::IrreconcilableSchemaConflict(SchemaConflict {
                column: "a".to_string(),
                left: "Int".to_string(),
                right: "String".to_string(),
            })
        );
        assert_eq!(session.registry().len(), 2);

        let next = session.process(&schema(&[("b", "Int")])).unwrap();
        assert_eq!(next.marker_name.as_deref(), Some("R2"));
    }

    #[test]
    fn test_override_with_other_type_is_a_conflict() {
        let mut session = Session::new();
        let r0 = session.process(&person()).unwrap().marker.unwrap();
        let err = session
            .process_refinement(&[r0], &schema(&[("age", "String")]))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::IrreconcilableSchemaConflict(c) if c.column == "age"));
    }

    #[test]
    fn test_unknown_marker_in_refinement() {
        let mut session = Session::new();
        let mut other = Session::new();
        let foreign = other.process(&person()).unwrap().marker.unwrap();
        assert_eq!(
            session.process_refinement(&[foreign], &DataSchema::empty()),
            Err(SynthesisError::UnknownMarker(foreign))
        );
    }

    #[test]
    fn test_nested_schemas_processed_first() {
        let mut session = Session::new();
        let address = schema(&[("city", "String"), ("street", "String")]);
        let outer = DataSchema::new([
            ColumnSchema::group("address", address.clone()),
            ColumnSchema::parse("name", "String").unwrap(),
            ColumnSchema::frame("previous", address.clone()).nullable(),
        ])
        .unwrap();

        let result = session.process(&outer).unwrap();
        assert_eq!(
            result.code(),
            "marker R0\n\
             accessor R0.city: String\n\
             accessor R0.street: String\n\
             marker R1\n\
             accessor R1.address: DataRow<R0>\n\
             accessor R1.name: String\n\
             accessor R1.previous: DataFrame<R0>?"
        );
        assert_eq!(session.lookup_marker("R0").unwrap().schema, address);
    }

    #[test]
    fn test_opaque_marker_yields_empty_result() {
        let mut session = Session::new();
        let result = session.process_marker(&StaticMarker::opaque("app.Hidden")).unwrap();
        assert_eq!(result, ProcessResult::default());
        assert!(session.registry().is_empty());
        // Still unknown, and still safe to ask again.
        assert!(session.process_marker(&StaticMarker::opaque("app.Hidden")).unwrap().marker.is_none());
    }

    #[test]
    fn test_external_bases_bound_first() {
        let mut session = Session::new();
        let base = Arc::new(StaticMarker::new(
            "app.Named",
            vec![ColumnSchema::parse("name", "String").unwrap()],
        ));
        let derived = StaticMarker::new(
            "app.Person",
            vec![ColumnSchema::parse("age", "Int").unwrap()],
        )
        .extending(base);

        let result = session.process_marker(&derived).unwrap();
        assert!(result.is_empty());
        let person = session.lookup_marker("app.Person").unwrap();
        assert!(person.is_external());
        assert_eq!(person.schema, schema(&[("age", "Int"), ("name", "String")]));
        assert_eq!(person.bases.len(), 1);
        assert_eq!(session.lookup_marker("Named").unwrap().qualified_name, "app.Named");
    }

    #[test]
    fn test_conflicting_external_bases_roll_back() {
        let mut session = Session::new();
        let left = Arc::new(StaticMarker::new(
            "app.Left",
            vec![ColumnSchema::parse("a", "Int").unwrap()],
        ));
        let right = Arc::new(StaticMarker::new(
            "app.Right",
            vec![ColumnSchema::parse("a", "String").unwrap()],
        ));
        let both = StaticMarker::new("app.Both", vec![])
            .extending(left)
            .extending(right);

        let err = session.process_marker(&both).unwrap_err();
        assert!(matches!(err, SynthesisError::IrreconcilableSchemaConflict(_)));
        assert!(session.registry().is_empty());
    }

    #[test]
    fn test_shared_session_serializes_calls() {
        let shared = SharedSession::new(Session::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    let column = format!("c{}", i % 4);
                    let s = DataSchema::parse([(column.as_str(), "Int")]).unwrap();
                    shared.process(&s).unwrap().marker.unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        shared.with(|session| {
            assert_eq!(session.registry().len(), 4);
            let mut names: Vec<_> = session.registry().markers().map(|m| m.name.clone()).collect();
            names.sort();
            assert_eq!(names, vec!["R0", "R1", "R2", "R3"]);
        });
    }

    /// Binds its base, then panics before it can be registered itself
    struct PanickingMarker {
        base: StaticMarker,
    }

    impl SchemaProvider for PanickingMarker {
        fn qualified_name(&self) -> &str {
            "app.Broken"
        }

        fn simple_name(&self) -> &str {
            panic!("simple name unavailable")
        }

        fn declared_columns(&self) -> Option<Vec<ColumnSchema>> {
            Some(vec![])
        }

        fn declared_bases(&self) -> Vec<&dyn SchemaProvider> {
            vec![&self.base as &dyn SchemaProvider]
        }
    }

    fn panicking_marker() -> PanickingMarker {
        PanickingMarker {
            base: StaticMarker::new("app.Base", vec![ColumnSchema::parse("a", "Int").unwrap()]),
        }
    }

    #[test]
    fn test_panicking_provider_rolls_back() {
        let mut session = Session::new();
        let marker = panicking_marker();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| session.process_marker(&marker)));
        assert!(outcome.is_err());
        assert!(session.registry().is_empty());
        assert!(session.lookup_marker("app.Base").is_none());
    }

    #[test]
    fn test_poisoned_shared_session_stays_usable() {
        let shared = SharedSession::new(Session::new());
        let worker = shared.clone();
        let joined = std::thread::spawn(move || worker.process_marker(&panicking_marker())).join();
        assert!(joined.is_err());

        assert!(shared.with(|session| session.registry().is_empty()));
        let result = shared.process(&schema(&[("a", "Int")])).unwrap();
        assert_eq!(result.marker_name.as_deref(), Some("R0"));
    }

    #[test]
    fn test_with_config_rejects_empty_prefix() {
        let config = SessionConfig {
            marker_prefix: String::new(),
            ..SessionConfig::default()
        };
        assert!(matches!(
            Session::with_config(config),
            Err(ConfigError::Invalid(_))
        ));

        let config = SessionConfig {
            marker_prefix: "Df".to_string(),
            ..SessionConfig::default()
        };
        let mut session = Session::with_config(config).unwrap();
        let result = session.process(&schema(&[("a", "Int")])).unwrap();
        assert_eq!(result.marker_name.as_deref(), Some("Df0"));
    }
}
