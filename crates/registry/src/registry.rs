use crate::error::{RegistryError, ValidationReport};
use core_types::{
    Calculation, CompositeTerm, MetricCategory, MetricDefinition, parse_composite,
    referenced_metrics,
};
use std::collections::HashMap;

/// The process-lifetime catalog of metric definitions.
///
/// Construction parses every composite expression into signed terms so the
/// executor never re-splits the textual form, and rejects duplicate ids.
/// Dependency-cycle detection is deliberately not done here: the query
/// planner walks the dependency graph of each request and fails fast before
/// any data-source call.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    metrics: HashMap<String, MetricDefinition>,
    /// Catalog order, for stable listings.
    order: Vec<String>,
    /// Parsed composite expressions, keyed by metric id.
    composites: HashMap<String, Vec<CompositeTerm>>,
}

impl MetricRegistry {
    pub fn new(definitions: Vec<MetricDefinition>) -> Result<Self, RegistryError> {
        let mut metrics = HashMap::with_capacity(definitions.len());
        let mut order = Vec::with_capacity(definitions.len());
        let mut composites = HashMap::new();

        for definition in definitions {
            if metrics.contains_key(&definition.id) {
                return Err(RegistryError::DuplicateMetric(definition.id));
            }
            if let Calculation::Composite { expression, .. } = &definition.calculation {
                let terms = parse_composite(expression).map_err(|source| {
                    RegistryError::InvalidExpression {
                        metric: definition.id.clone(),
                        source,
                    }
                })?;
                composites.insert(definition.id.clone(), terms);
            }
            order.push(definition.id.clone());
            metrics.insert(definition.id.clone(), definition);
        }

        Ok(Self {
            metrics,
            order,
            composites,
        })
    }

    pub fn get(&self, id: &str) -> Option<&MetricDefinition> {
        self.metrics.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.metrics.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All definitions in catalog order.
    pub fn all(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.order.iter().filter_map(|id| self.metrics.get(id))
    }

    pub fn by_category(&self, category: MetricCategory) -> Vec<&MetricDefinition> {
        self.all().filter(|m| m.category == category).collect()
    }

    /// The dependency ids a metric declares in its audit info.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.metrics
            .get(id)
            .map(|m| m.audit.dependencies.clone())
            .unwrap_or_default()
    }

    /// The pre-parsed signed terms of a composite metric.
    pub fn composite_terms(&self, id: &str) -> Option<&[CompositeTerm]> {
        self.composites.get(id).map(Vec::as_slice)
    }

    /// Walks every definition's declared and calculation-referenced
    /// dependencies and reports any id that is not itself registered.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();

        for definition in self.all() {
            let mut seen = Vec::new();
            let declared = definition.audit.dependencies.iter().cloned();
            let referenced = referenced_metrics(&definition.calculation);

            for dependency in declared.chain(referenced) {
                if seen.contains(&dependency) {
                    continue;
                }
                if !self.metrics.contains_key(&dependency) {
                    errors.push(RegistryError::UnknownDependency {
                        metric: definition.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
                seen.push(dependency);
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}
