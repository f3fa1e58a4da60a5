//! Session-scoped marker registry
//!
//! Markers live in an append-only arena and refer to their bases by index.
//! A marker can only name bases that already exist, so the inheritance graph
//! stays acyclic without any bookkeeping.

use crate::schema::DataSchema;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Stable index of a marker within its registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MarkerId(usize);

impl MarkerId {
    /// Position of the marker in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a marker came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerOrigin {
    /// Declared by the engine; it owns the declarations
    Synthesized,
    /// Declared by user code and bound through a schema provider
    External,
}

/// A named node of the schema lattice
#[derive(Clone, Debug, Serialize)]
pub struct Marker {
    pub id: MarkerId,
    pub name: String,
    pub qualified_name: String,
    /// Full structural schema, inherited columns included
    pub schema: DataSchema,
    /// Columns declared on this marker itself
    pub own_columns: DataSchema,
    pub bases: Vec<MarkerId>,
    pub origin: MarkerOrigin,
    pub fingerprint: String,
}

impl Marker {
    /// True for markers declared by user code
    pub fn is_external(&self) -> bool {
        self.origin == MarkerOrigin::External
    }
}

/// Registry state at a point in time, for undoing a failed call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
    counter: u64,
}

/// All markers known to one session
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    markers: Vec<Marker>,
    /// Index: fingerprint -> markers with that exact schema
    by_fingerprint: HashMap<String, Vec<MarkerId>>,
    /// Index: qualified name -> marker
    by_name: HashMap<String, MarkerId>,
    /// Next candidate suffix for synthesized names
    counter: u64,
}

impl MarkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered markers
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// True before any marker is registered
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Marker with the given id
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(id.0)
    }

    /// All markers in creation order
    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    /// Look up a marker by qualified name
    pub fn find(&self, qualified_name: &str) -> Option<&Marker> {
        self.by_name.get(qualified_name).and_then(|id| self.get(*id))
    }

    /// Look up a marker by qualified or simple name, qualified names first
    pub fn find_by_any_name(&self, name: &str) -> Option<&Marker> {
        self.find(name)
            .or_else(|| self.markers.iter().find(|m| m.name == name))
    }

    /// A marker whose schema is structurally identical to `schema`.
    ///
    /// External markers win over synthesized ones, then the earliest created.
    pub fn lookup_exact(&self, schema: &DataSchema) -> Option<MarkerId> {
        let ids = self.by_fingerprint.get(&schema.fingerprint())?;
        let mut matches = ids
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|marker| &marker.schema == schema);
        let first = matches.next()?;
        if first.is_external() {
            return Some(first.id);
        }
        Some(
            matches
                .find(|marker| marker.is_external())
                .map_or(first.id, |marker| marker.id),
        )
    }

    /// Every transitive base of `id`
    pub fn ancestors(&self, id: MarkerId) -> Vec<MarkerId> {
        let mut seen = Vec::new();
        let mut stack: Vec<MarkerId> = self
            .get(id)
            .map(|m| m.bases.clone())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if seen.contains(&next) {
                continue;
            }
            seen.push(next);
            if let Some(marker) = self.get(next) {
                stack.extend(marker.bases.iter().copied());
            }
        }
        seen.sort();
        seen
    }

    /// True if `ancestor` is a transitive base of `id`
    pub fn is_ancestor_of(&self, ancestor: MarkerId, id: MarkerId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    fn is_name_taken(&self, name: &str) -> bool {
        self.by_name.contains_key(name) || self.markers.iter().any(|m| m.name == name)
    }

    /// Reserve the next `<prefix><counter>` name not used by any marker
    pub fn allocate_name(&mut self, prefix: &str) -> String {
        loop {
            let name = format!("{}{}", prefix, self.counter);
            self.counter += 1;
            if !self.is_name_taken(&name) {
                return name;
            }
        }
    }

    /// Add a marker declared by the engine
    pub fn register_synthesized(
        &mut self,
        name: String,
        schema: DataSchema,
        own_columns: DataSchema,
        bases: Vec<MarkerId>,
    ) -> MarkerId {
        debug_assert!(
            self.markers
                .iter()
                .all(|m| m.is_external() || m.schema != schema),
            "synthesized markers must have distinct schemas"
        );
        self.insert(name.clone(), name, schema, own_columns, bases, MarkerOrigin::Synthesized)
    }

    /// Add a marker declared by user code; it never receives declarations
    pub fn register_external(
        &mut self,
        qualified_name: String,
        name: String,
        schema: DataSchema,
        own_columns: DataSchema,
        bases: Vec<MarkerId>,
    ) -> MarkerId {
        self.insert(name, qualified_name, schema, own_columns, bases, MarkerOrigin::External)
    }

    fn insert(
        &mut self,
        name: String,
        qualified_name: String,
        schema: DataSchema,
        own_columns: DataSchema,
        mut bases: Vec<MarkerId>,
        origin: MarkerOrigin,
    ) -> MarkerId {
        let id = MarkerId(self.markers.len());
        debug_assert!(bases.iter().all(|base| *base < id), "bases must already exist");
        bases.sort();
        bases.dedup();

        let fingerprint = schema.fingerprint();
        self.by_fingerprint
            .entry(fingerprint.clone())
            .or_default()
            .push(id);
        self.by_name.insert(qualified_name.clone(), id);
        self.markers.push(Marker {
            id,
            name,
            qualified_name,
            schema,
            own_columns,
            bases,
            origin,
            fingerprint,
        });
        id
    }

    /// Snapshot of the registry size and name counter
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.markers.len(),
            counter: self.counter,
        }
    }

    /// Drop every marker added after `checkpoint` and restore the name counter
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        for marker in self.markers.drain(checkpoint.len..) {
            self.by_name.remove(&marker.qualified_name);
            if let Some(ids) = self.by_fingerprint.get_mut(&marker.fingerprint) {
                ids.retain(|id| *id != marker.id);
                if ids.is_empty() {
                    self.by_fingerprint.remove(&marker.fingerprint);
                }
            }
        }
        self.counter = checkpoint.counter;
    }
}
