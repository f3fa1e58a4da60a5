//! Minimal inheritance cover for a target schema
//!
//! Given the markers already in a registry, pick the smallest set of bases a
//! new marker for `target` should extend, and the residual columns it has to
//! declare itself.

use crate::compat::{difference, is_refinement_of, is_union_compatible, union_all};
use crate::error::SchemaConflict;
use crate::registry::{Marker, MarkerId, MarkerRegistry};
use crate::schema::DataSchema;

/// Outcome of solving a target schema against a registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverPlan {
    /// A marker with exactly this schema already exists
    Existing(MarkerId),
    /// A new marker is needed
    Synthesize {
        /// Minimal cover, in creation order
        bases: Vec<MarkerId>,
        /// Columns the new marker declares itself
        residual: DataSchema,
    },
}

impl CoverPlan {
    /// A junction of two or more bases that adds no columns of its own
    pub fn is_diamond(&self) -> bool {
        matches!(self, CoverPlan::Synthesize { bases, residual } if bases.len() >= 2 && residual.is_empty())
    }
}

pub fn solve(registry: &MarkerRegistry, target: &DataSchema) -> Result<CoverPlan, SchemaConflict> {
    if let Some(id) = registry.lookup_exact(target) {
        return Ok(CoverPlan::Existing(id));
    }

    let candidates: Vec<&Marker> = registry
        .markers()
        .filter(|marker| !marker.schema.is_empty() && is_refinement_of(target, &marker.schema))
        .collect();
    log::debug!(
        "{} candidate bases for {}: {:?}",
        candidates.len(),
        target,
        candidates.iter().map(|m| &m.name).collect::<Vec<_>>()
    );

    let candidates = collapse_identical(candidates);
    let candidates = drop_conflicting(candidates);
    let cover = drop_redundant(candidates);

    let inherited = union_all(cover.iter().map(|m| &m.schema))?;
    let residual = difference(target, &inherited);
    let bases: Vec<MarkerId> = cover.iter().map(|m| m.id).collect();

    if residual.is_empty() && bases.len() == 1 {
        // Only reachable if the exact lookup missed an identical schema.
        return Ok(CoverPlan::Existing(bases[0]));
    }
    Ok(CoverPlan::Synthesize { bases, residual })
}

/// Keep one marker per schema: external markers first, then the earliest.
fn collapse_identical(candidates: Vec<&Marker>) -> Vec<&Marker> {
    let mut kept: Vec<&Marker> = Vec::new();
    for candidate in candidates {
        match kept.iter_mut().find(|m| m.schema == candidate.schema) {
            Some(existing) => {
                if !existing.is_external() && candidate.is_external() {
                    *existing = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }
    kept.sort_by_key(|m| m.id);
    kept
}

/// Keep candidates, in creation order, that merge cleanly with every kept one.
fn drop_conflicting(candidates: Vec<&Marker>) -> Vec<&Marker> {
    let mut kept: Vec<&Marker> = Vec::new();
    for candidate in candidates {
        if kept
            .iter()
            .all(|m| is_union_compatible(&m.schema, &candidate.schema))
        {
            kept.push(candidate);
        } else {
            log::debug!("dropping base {}: conflicts with an earlier base", candidate.name);
        }
    }
    kept
}

/// Remove bases whose schema the remaining bases already provide.
///
/// This also drops an ancestor of a kept base, since the base refines it.
/// Later markers are tried first so that ties keep the earliest ones.
fn drop_redundant(mut cover: Vec<&Marker>) -> Vec<&Marker> {
    loop {
        let redundant = (0..cover.len()).rev().find(|&i| {
            let others = cover
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, m)| &m.schema);
            union_all(others).is_ok_and(|provided| is_refinement_of(&provided, &cover[i].schema))
        });
        match redundant {
            Some(i) => {
                log::debug!("dropping redundant base {}", cover[i].name);
                cover.remove(i);
            }
            None => return cover,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(columns: &[(&str, &str)]) -> DataSchema {
        DataSchema::parse(columns.iter().copied()).unwrap()
    }

    fn synthesized(registry: &mut MarkerRegistry, name: &str, columns: &[(&str, &str)]) -> MarkerId {
        let s = schema(columns);
        registry.register_synthesized(name.to_string(), s.clone(), s, vec![])
    }

    #[test]
    fn test_exact_match() {
        let mut registry = MarkerRegistry::new();
        let r0 = synthesized(&mut registry, "R0", &[("a", "Int")]);
        assert_eq!(solve(&registry, &schema(&[("a", "Int")])).unwrap(), CoverPlan::Existing(r0));
    }

    #[test]
    fn test_empty_registry_declares_everything() {
        let registry = MarkerRegistry::new();
        let target = schema(&[("a", "Int"), ("b", "String?")]);
        assert_eq!(
            solve(&registry, &target).unwrap(),
            CoverPlan::Synthesize {
                bases: vec![],
                residual: target,
            }
        );
    }

    #[test]
    fn test_diamond() {
        let mut registry = MarkerRegistry::new();
        let m1 = synthesized(&mut registry, "M1", &[("a", "Int"), ("b", "Int")]);
        let m2 = synthesized(&mut registry, "M2", &[("c", "Int"), ("d", "Int")]);
        let plan = solve(
            &registry,
            &schema(&[("a", "Int"), ("b", "Int"), ("c", "Int"), ("d", "Int")]),
        )
        .unwrap();
        assert!(plan.is_diamond());
        assert_eq!(
            plan,
            CoverPlan::Synthesize {
                bases: vec![m1, m2],
                residual: DataSchema::empty(),
            }
        );
    }

    #[test]
    fn test_subsumed_base_is_dropped() {
        let mut registry = MarkerRegistry::new();
        synthesized(&mut registry, "M1", &[("a", "Int")]);
        let m2 = synthesized(&mut registry, "M2", &[("a", "Int"), ("b", "Int")]);
        let plan = solve(&registry, &schema(&[("a", "Int"), ("b", "Int"), ("c", "Int")])).unwrap();
        assert_eq!(
            plan,
            CoverPlan::Synthesize {
                bases: vec![m2],
                residual: schema(&[("c", "Int")]),
            }
        );
    }

    #[test]
    fn test_redundant_union_keeps_earliest() {
        let mut registry = MarkerRegistry::new();
        let ab = synthesized(&mut registry, "AB", &[("a", "Int"), ("b", "Int")]);
        let cd = synthesized(&mut registry, "CD", &[("c", "Int"), ("d", "Int")]);
        // Covered by AB + CD together.
        synthesized(&mut registry, "BC", &[("b", "Int"), ("c", "Int")]);
        let plan = solve(
            &registry,
            &schema(&[("a", "Int"), ("b", "Int"), ("c", "Int"), ("d", "Int"), ("e", "Int")]),
        )
        .unwrap();
        assert_eq!(
            plan,
            CoverPlan::Synthesize {
                bases: vec![ab, cd],
                residual: schema(&[("e", "Int")]),
            }
        );
    }

    #[test]
    fn test_narrowed_column_is_redeclared() {
        let mut registry = MarkerRegistry::new();
        let r0 = synthesized(
            &mut registry,
            "R0",
            &[("age", "Int"), ("city", "String?"), ("name", "String"), ("weight", "Int?")],
        );
        let target = schema(&[("age", "Int"), ("city", "String"), ("name", "String"), ("weight", "Int?")]);
        assert_eq!(
            solve(&registry, &target).unwrap(),
            CoverPlan::Synthesize {
                bases: vec![r0],
                residual: schema(&[("city", "String")]),
            }
        );
    }

    #[test]
    fn test_widened_schema_is_not_a_refinement() {
        let mut registry = MarkerRegistry::new();
        synthesized(&mut registry, "R0", &[("a", "Int"), ("b", "Int")]);
        let target = schema(&[("a", "Int?"), ("b", "Int")]);
        assert_eq!(
            solve(&registry, &target).unwrap(),
            CoverPlan::Synthesize {
                bases: vec![],
                residual: target,
            }
        );
    }

    #[test]
    fn test_ancestor_of_a_base_is_redundant() {
        let mut registry = MarkerRegistry::new();
        let a = synthesized(&mut registry, "A", &[("x", "List<*>")]);
        let s = schema(&[("x", "List<*>"), ("y", "Int")]);
        let b = registry.register_synthesized("B".into(), s, schema(&[("y", "Int")]), vec![a]);
        let plan = solve(&registry, &schema(&[("x", "List<Int>"), ("y", "Int")])).unwrap();
        assert_eq!(
            plan,
            CoverPlan::Synthesize {
                bases: vec![b],
                residual: schema(&[("x", "List<Int>")]),
            }
        );
    }

    #[test]
    fn test_identical_candidates_prefer_external() {
        let mut registry = MarkerRegistry::new();
        let s = schema(&[("a", "Int")]);
        synthesized(&mut registry, "R0", &[("a", "Int")]);
        let ext = registry.register_external("app.A".into(), "A".into(), s.clone(), s, vec![]);
        let plan = solve(&registry, &schema(&[("a", "Int"), ("b", "Int")])).unwrap();
        assert_eq!(
            plan,
            CoverPlan::Synthesize {
                bases: vec![ext],
                residual: schema(&[("b", "Int")]),
            }
        );
    }

    #[test]
    fn test_conflicting_candidates_are_filtered() {
        let mut registry = MarkerRegistry::new();
        let first = synthesized(&mut registry, "P1", &[("p", "Pair<*, Int>")]);
        synthesized(&mut registry, "P2", &[("p", "Pair<Int, *>"), ("q", "Int")]);
        let target = schema(&[("p", "Pair<Int, Int>"), ("q", "Int")]);
        assert_eq!(
            solve(&registry, &target).unwrap(),
            CoverPlan::Synthesize {
                bases: vec![first],
                residual: target,
            }
        );
    }

    #[test]
    fn test_conflict_filter_keeps_ancestor_of_dropped_candidate() {
        let mut registry = MarkerRegistry::new();
        let r0 = synthesized(&mut registry, "R0", &[("q", "Int")]);
        let r1 = synthesized(&mut registry, "R1", &[("p", "Pair<*, Int>")]);
        registry.register_synthesized(
            "R2".into(),
            schema(&[("p", "Pair<Int, *>"), ("q", "Int")]),
            schema(&[("p", "Pair<Int, *>")]),
            vec![r0],
        );
        // R2 conflicts with R1 and is filtered out; its base R0 still provides `q`.
        let plan = solve(&registry, &schema(&[("p", "Pair<Int, Int>"), ("q", "Int")])).unwrap();
        assert_eq!(
            plan,
            CoverPlan::Synthesize {
                bases: vec![r0, r1],
                residual: schema(&[("p", "Pair<Int, Int>")]),
            }
        );
    }
}
