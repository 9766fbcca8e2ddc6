//! Pre-execution query planning.
//!
//! Before any data-source call, the engine walks the dependency graph of the
//! requested metrics: unknown requested ids and dependency cycles fail the
//! whole query fast, and the surviving graph is arranged into topological
//! levels. Metrics within one level do not depend on each other, so they can
//! be evaluated concurrently; every level only reads values produced by
//! earlier levels.

use crate::error::EngineError;
use core_types::referenced_metrics;
use registry::MetricRegistry;
use std::collections::{HashMap, HashSet};

/// The evaluation order for one query: leaves first.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPlan {
    pub levels: Vec<Vec<String>>,
}

impl EvaluationPlan {
    /// Every metric id the plan evaluates, across all levels.
    pub fn metric_ids(&self) -> impl Iterator<Item = &String> {
        self.levels.iter().flatten()
    }
}

/// Builds the evaluation plan for a set of requested metric ids.
///
/// Fails with `UnknownMetrics` when a requested id is not registered and with
/// `CyclicDependency` when the dependency graph cycles back on itself.
/// References to unregistered metrics from within a calculation are tolerated
/// here (they fold to 0 at evaluation) but logged.
pub fn build_plan(
    registry: &MetricRegistry,
    requested: &[String],
) -> Result<EvaluationPlan, EngineError> {
    let unknown: Vec<String> = requested
        .iter()
        .filter(|id| !registry.contains(id))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(EngineError::UnknownMetrics(unknown));
    }

    let mut planner = Planner {
        registry,
        depths: HashMap::new(),
        path: Vec::new(),
        warned: HashSet::new(),
    };
    for id in requested {
        planner.visit(id)?;
    }

    let max_depth = planner.depths.values().copied().max().unwrap_or(0);
    let mut levels: Vec<Vec<String>> = vec![Vec::new(); max_depth + 1];
    for (id, depth) in planner.depths {
        levels[depth].push(id);
    }
    for level in &mut levels {
        level.sort();
    }
    levels.retain(|level| !level.is_empty());

    Ok(EvaluationPlan { levels })
}

struct Planner<'a> {
    registry: &'a MetricRegistry,
    /// Depth of each registered metric: 0 for leaves, 1 + max(dep depths)
    /// otherwise.
    depths: HashMap<String, usize>,
    /// The current DFS path, for cycle reporting.
    path: Vec<String>,
    warned: HashSet<String>,
}

impl Planner<'_> {
    fn visit(&mut self, id: &str) -> Result<usize, EngineError> {
        if let Some(depth) = self.depths.get(id) {
            return Ok(*depth);
        }
        if let Some(position) = self.path.iter().position(|p| p == id) {
            let mut cycle = self.path[position..].to_vec();
            cycle.push(id.to_string());
            return Err(EngineError::CyclicDependency(cycle));
        }
        let Some(definition) = self.registry.get(id) else {
            // The executor folds unresolved references to 0; nothing to plan.
            if self.warned.insert(id.to_string()) {
                tracing::warn!(
                    metric = id,
                    "referenced metric is not registered; it will contribute 0"
                );
            }
            return Ok(0);
        };

        self.path.push(id.to_string());
        let mut depth = 0;
        for dependency in referenced_metrics(&definition.calculation) {
            depth = depth.max(self.visit(&dependency)? + 1);
        }
        self.path.pop();

        self.depths.insert(id.to_string(), depth);
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Calculation, MetricCategory, MetricDefinition, MetricUnit, RatioOperand};

    fn count(id: &str) -> MetricDefinition {
        MetricDefinition::new(
            id,
            id,
            MetricCategory::Cases,
            MetricUnit::Count,
            "cases",
            Calculation::SimpleCount {
                table: "cases".to_string(),
            },
        )
    }

    fn composite(id: &str, expression: &str, deps: &[&str]) -> MetricDefinition {
        MetricDefinition::new(
            id,
            id,
            MetricCategory::Finances,
            MetricUnit::Currency,
            "invoices",
            Calculation::Composite {
                expression: expression.to_string(),
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
            },
        )
    }

    fn ratio(id: &str, numerator: &str, denominator: &str) -> MetricDefinition {
        MetricDefinition::new(
            id,
            id,
            MetricCategory::Cases,
            MetricUnit::Percentage,
            "cases",
            Calculation::Ratio {
                numerator: RatioOperand::MetricRef(numerator.to_string()),
                denominator: RatioOperand::MetricRef(denominator.to_string()),
                percentage: true,
            },
        )
    }

    #[test]
    fn leaves_come_before_dependents() {
        let registry = MetricRegistry::new(vec![
            count("a"),
            count("b"),
            ratio("rate", "a", "b"),
            composite("net", "rate + a", &["rate", "a"]),
        ])
        .unwrap();

        let plan = build_plan(&registry, &["net".to_string()]).unwrap();
        assert_eq!(plan.levels.len(), 3);
        assert_eq!(plan.levels[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(plan.levels[1], vec!["rate".to_string()]);
        assert_eq!(plan.levels[2], vec!["net".to_string()]);
    }

    #[test]
    fn unknown_requested_ids_fail_fast() {
        let registry = MetricRegistry::new(vec![count("a")]).unwrap();
        let err = build_plan(&registry, &["a".to_string(), "missing".to_string()]).unwrap_err();
        assert_eq!(err, EngineError::UnknownMetrics(vec!["missing".to_string()]));
    }

    #[test]
    fn cycles_are_detected() {
        let registry = MetricRegistry::new(vec![
            composite("x", "y", &["y"]),
            composite("y", "x", &["x"]),
        ])
        .unwrap();

        let err = build_plan(&registry, &["x".to_string()]).unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency(_)));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let registry = MetricRegistry::new(vec![composite("x", "x", &["x"])]).unwrap();
        let err = build_plan(&registry, &["x".to_string()]).unwrap_err();
        assert_eq!(
            err,
            EngineError::CyclicDependency(vec!["x".to_string(), "x".to_string()])
        );
    }

    #[test]
    fn unregistered_references_are_tolerated() {
        let registry =
            MetricRegistry::new(vec![composite("net", "ghost + net2", &["ghost", "net2"])])
                .unwrap();
        // "ghost" and "net2" are unregistered; the plan still evaluates "net".
        let plan = build_plan(&registry, &["net".to_string()]).unwrap();
        assert_eq!(plan.levels.len(), 1);
        assert_eq!(plan.levels[0], vec!["net".to_string()]);
    }

    #[test]
    fn shared_dependencies_are_planned_once() {
        let registry = MetricRegistry::new(vec![
            count("shared"),
            count("other"),
            ratio("r1", "shared", "other"),
            ratio("r2", "shared", "other"),
        ])
        .unwrap();

        let plan = build_plan(&registry, &["r1".to_string(), "r2".to_string()]).unwrap();
        let occurrences = plan.metric_ids().filter(|id| *id == "shared").count();
        assert_eq!(occurrences, 1);
    }
}
