use crate::error::CoreError;
use crate::filter::Filter;
use serde::{Deserialize, Serialize};

/// The business area a metric belongs to. Used for catalog listings only;
/// it carries no execution semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Cases,
    Finances,
    Activities,
    Productivity,
    Storage,
    Sales,
    Expense,
}

/// The unit a metric's value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    Count,
    Currency,
    Hours,
    Percentage,
    Bytes,
    Days,
}

/// How stale a metric's backing data is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFreshness {
    RealTime,
    Hourly,
    Daily,
}

/// The unit for elapsed-time calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Hours,
    Days,
}

impl DurationUnit {
    /// Milliseconds per unit, for converting raw elapsed time.
    pub fn millis(&self) -> f64 {
        match self {
            DurationUnit::Hours => 3_600_000.0,
            DurationUnit::Days => 86_400_000.0,
        }
    }
}

/// One side of a ratio: either a reference to another registered metric or an
/// inline recipe evaluated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioOperand {
    MetricRef(String),
    Inline(Box<Calculation>),
}

/// The closed set of calculation recipes. The executor matches exhaustively
/// on this enum, so adding a variant is a compile error until every dispatch
/// site handles it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calculation {
    /// Row count of a table, no predicate beyond the tenant scope.
    SimpleCount { table: String },
    /// Row count under a filter list.
    ConditionalCount { table: String, conditions: Vec<Filter> },
    /// Sum of a numeric column.
    Sum {
        table: String,
        field: String,
        conditions: Vec<Filter>,
    },
    /// Arithmetic mean of a numeric column; an empty result set yields 0.
    Average {
        table: String,
        field: String,
        conditions: Vec<Filter>,
    },
    /// Numerator over denominator with a zero-safe division rule.
    Ratio {
        numerator: RatioOperand,
        denominator: RatioOperand,
        percentage: bool,
    },
    /// Average elapsed time between two timestamp columns, over rows where
    /// both are non-null.
    Duration {
        table: String,
        start_field: String,
        end_field: String,
        conditions: Vec<Filter>,
        unit: DurationUnit,
    },
    /// A signed sum of other metrics' values, e.g. `"a + b - c"`.
    Composite {
        expression: String,
        dependencies: Vec<String>,
    },
}

/// The term sign in a parsed composite expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Plus,
    Minus,
}

/// One `(sign, metric id)` pair of a parsed composite expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeTerm {
    pub sign: Sign,
    pub metric_id: String,
}

/// Parses a composite expression of the form `termId (+|- termId)*` into
/// signed terms. Done once at registry load, never per evaluation.
pub fn parse_composite(expression: &str) -> Result<Vec<CompositeTerm>, CoreError> {
    let mut tokens = expression.split_whitespace();
    let mut terms = Vec::new();

    let first = tokens.next().ok_or_else(|| {
        CoreError::InvalidExpression(expression.to_string(), "expression is empty".to_string())
    })?;
    if first == "+" || first == "-" {
        return Err(CoreError::InvalidExpression(
            expression.to_string(),
            "expression must start with a term, not an operator".to_string(),
        ));
    }
    terms.push(CompositeTerm {
        sign: Sign::Plus,
        metric_id: first.to_string(),
    });

    loop {
        let Some(op) = tokens.next() else {
            return Ok(terms);
        };
        let sign = match op {
            "+" => Sign::Plus,
            "-" => Sign::Minus,
            other => {
                return Err(CoreError::InvalidExpression(
                    expression.to_string(),
                    format!("expected '+' or '-', found '{other}'"),
                ));
            }
        };
        let term = tokens.next().ok_or_else(|| {
            CoreError::InvalidExpression(
                expression.to_string(),
                format!("dangling operator '{op}' at end of expression"),
            )
        })?;
        terms.push(CompositeTerm {
            sign,
            metric_id: term.to_string(),
        });
    }
}

/// The metric ids a calculation reads at evaluation time. Used by the query
/// planner to order evaluation and detect cycles.
pub fn referenced_metrics(calculation: &Calculation) -> Vec<String> {
    match calculation {
        Calculation::SimpleCount { .. }
        | Calculation::ConditionalCount { .. }
        | Calculation::Sum { .. }
        | Calculation::Average { .. }
        | Calculation::Duration { .. } => Vec::new(),
        Calculation::Ratio {
            numerator,
            denominator,
            ..
        } => {
            let mut ids = Vec::new();
            for operand in [numerator, denominator] {
                match operand {
                    RatioOperand::MetricRef(id) => ids.push(id.clone()),
                    RatioOperand::Inline(inner) => ids.extend(referenced_metrics(inner)),
                }
            }
            ids
        }
        Calculation::Composite { dependencies, .. } => dependencies.clone(),
    }
}

/// Audit information attached to every metric definition: the formula text
/// reproduced in audit trails, the metric ids this metric declares it depends
/// on, and how fresh the backing data is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub formula: String,
    pub dependencies: Vec<String>,
    pub freshness: DataFreshness,
}

/// A single registered business metric. Created once at process start from
/// the static catalog and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: MetricCategory,
    pub unit: MetricUnit,
    pub source_table: String,
    pub calculation: Calculation,
    pub drill_down_target: Option<String>,
    pub audit: AuditInfo,
}

impl MetricDefinition {
    pub fn new(
        id: &str,
        name: &str,
        category: MetricCategory,
        unit: MetricUnit,
        source_table: &str,
        calculation: Calculation,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            category,
            unit,
            source_table: source_table.to_string(),
            calculation,
            drill_down_target: None,
            audit: AuditInfo {
                formula: String::new(),
                dependencies: Vec::new(),
                freshness: DataFreshness::RealTime,
            },
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_formula(mut self, formula: &str) -> Self {
        self.audit.formula = formula.to_string();
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.audit.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_freshness(mut self, freshness: DataFreshness) -> Self {
        self.audit.freshness = freshness;
        self
    }

    pub fn with_drill_down(mut self, target_key: &str) -> Self {
        self.drill_down_target = Some(target_key.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signed_terms() {
        let terms = parse_composite("a + b - c").unwrap();
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0].sign, Sign::Plus);
        assert_eq!(terms[0].metric_id, "a");
        assert_eq!(terms[1].sign, Sign::Plus);
        assert_eq!(terms[2].sign, Sign::Minus);
        assert_eq!(terms[2].metric_id, "c");
    }

    #[test]
    fn parses_single_term() {
        let terms = parse_composite("finances.total_revenue").unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].metric_id, "finances.total_revenue");
    }

    #[test]
    fn rejects_dangling_operator() {
        assert!(parse_composite("a +").is_err());
        assert!(parse_composite("+ a").is_err());
        assert!(parse_composite("").is_err());
        assert!(parse_composite("a * b").is_err());
    }

    #[test]
    fn ratio_references_both_operands() {
        let calc = Calculation::Ratio {
            numerator: RatioOperand::MetricRef("cases.closed".to_string()),
            denominator: RatioOperand::MetricRef("cases.total".to_string()),
            percentage: true,
        };
        assert_eq!(referenced_metrics(&calc), vec!["cases.closed", "cases.total"]);
    }

    #[test]
    fn inline_operands_reference_nothing() {
        let calc = Calculation::Ratio {
            numerator: RatioOperand::Inline(Box::new(Calculation::SimpleCount {
                table: "cases".to_string(),
            })),
            denominator: RatioOperand::MetricRef("cases.total".to_string()),
            percentage: false,
        };
        assert_eq!(referenced_metrics(&calc), vec!["cases.total"]);
    }
}
