//! The built-in metric catalog.
//!
//! This is configuration, not engine logic: every entry is data describing
//! how a number is derived. The engine never special-cases an id.

use core_types::{
    Calculation, DataFreshness, DurationUnit, FilterBuilder, MetricCategory, MetricDefinition,
    MetricUnit, RatioOperand,
};
use serde_json::json;

fn metric_ref(id: &str) -> RatioOperand {
    RatioOperand::MetricRef(id.to_string())
}

/// The standard catalog of practice-management metrics, spanning every
/// category. Loaded once at process start; `MetricRegistry::validate` over
/// this catalog must report zero errors.
pub fn standard_catalog() -> Vec<MetricDefinition> {
    let mut metrics = Vec::new();

    metrics.extend(case_metrics());
    metrics.extend(finance_metrics());
    metrics.extend(activity_metrics());
    metrics.extend(productivity_metrics());
    metrics.extend(storage_metrics());
    metrics.extend(sales_metrics());
    metrics.extend(expense_metrics());

    metrics
}

fn case_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "cases.total",
            "Total Cases",
            MetricCategory::Cases,
            MetricUnit::Count,
            "cases",
            Calculation::SimpleCount {
                table: "cases".to_string(),
            },
        )
        .with_description("All cases ever opened for the organization.")
        .with_formula("COUNT(cases)"),
        MetricDefinition::new(
            "cases.open",
            "Open Cases",
            MetricCategory::Cases,
            MetricUnit::Count,
            "cases",
            Calculation::ConditionalCount {
                table: "cases".to_string(),
                conditions: FilterBuilder::new().eq("status", "open").build(),
            },
        )
        .with_description("Cases currently being worked.")
        .with_formula("COUNT(cases WHERE status = open)")
        .with_drill_down("cases.open"),
        MetricDefinition::new(
            "cases.closed",
            "Closed Cases",
            MetricCategory::Cases,
            MetricUnit::Count,
            "cases",
            Calculation::ConditionalCount {
                table: "cases".to_string(),
                conditions: FilterBuilder::new().eq("status", "closed").build(),
            },
        )
        .with_formula("COUNT(cases WHERE status = closed)"),
        MetricDefinition::new(
            "cases.closure_rate",
            "Case Closure Rate",
            MetricCategory::Cases,
            MetricUnit::Percentage,
            "cases",
            Calculation::Ratio {
                numerator: metric_ref("cases.closed"),
                denominator: metric_ref("cases.total"),
                percentage: true,
            },
        )
        .with_description("Share of all cases that have been closed.")
        .with_formula("cases.closed / cases.total * 100")
        .with_dependencies(&["cases.closed", "cases.total"]),
        MetricDefinition::new(
            "cases.avg_duration_days",
            "Average Case Duration",
            MetricCategory::Cases,
            MetricUnit::Days,
            "cases",
            Calculation::Duration {
                table: "cases".to_string(),
                start_field: "opened_at".to_string(),
                end_field: "closed_at".to_string(),
                conditions: Vec::new(),
                unit: DurationUnit::Days,
            },
        )
        .with_description("Average days from opening a case to closing it.")
        .with_formula("AVG(closed_at - opened_at)"),
    ]
}

fn finance_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "finances.total_revenue",
            "Total Revenue",
            MetricCategory::Finances,
            MetricUnit::Currency,
            "invoice_payments",
            Calculation::Sum {
                table: "invoice_payments".to_string(),
                field: "amount".to_string(),
                conditions: Vec::new(),
            },
        )
        .with_description("Payments actually received against invoices.")
        .with_formula("SUM(invoice_payments.amount)")
        .with_freshness(DataFreshness::Hourly),
        MetricDefinition::new(
            "finances.total_billed",
            "Total Billed",
            MetricCategory::Finances,
            MetricUnit::Currency,
            "invoices",
            Calculation::Sum {
                table: "invoices".to_string(),
                field: "total".to_string(),
                conditions: Vec::new(),
            },
        )
        .with_formula("SUM(invoices.total)")
        .with_freshness(DataFreshness::Hourly),
        MetricDefinition::new(
            "finances.outstanding_balance",
            "Outstanding Balance",
            MetricCategory::Finances,
            MetricUnit::Currency,
            "invoices",
            Calculation::Sum {
                table: "invoices".to_string(),
                field: "balance_due".to_string(),
                conditions: FilterBuilder::new()
                    .not_in("status", vec![json!("paid"), json!("void")])
                    .build(),
            },
        )
        .with_description("Unpaid balance across open invoices.")
        .with_formula("SUM(invoices.balance_due WHERE status NOT IN [paid, void])")
        .with_drill_down("invoices.outstanding"),
        MetricDefinition::new(
            "finances.avg_invoice_value",
            "Average Invoice Value",
            MetricCategory::Finances,
            MetricUnit::Currency,
            "invoices",
            Calculation::Average {
                table: "invoices".to_string(),
                field: "total".to_string(),
                conditions: Vec::new(),
            },
        )
        .with_formula("AVG(invoices.total)"),
        MetricDefinition::new(
            "finances.collection_rate",
            "Collection Rate",
            MetricCategory::Finances,
            MetricUnit::Percentage,
            "invoices",
            Calculation::Ratio {
                numerator: metric_ref("finances.total_revenue"),
                denominator: metric_ref("finances.total_billed"),
                percentage: true,
            },
        )
        .with_description("Revenue collected as a share of the amount billed.")
        .with_formula("finances.total_revenue / finances.total_billed * 100")
        .with_dependencies(&["finances.total_revenue", "finances.total_billed"]),
        MetricDefinition::new(
            "finances.net_revenue",
            "Net Revenue",
            MetricCategory::Finances,
            MetricUnit::Currency,
            "invoice_payments",
            Calculation::Composite {
                expression: "finances.total_revenue - expense.total_expenses".to_string(),
                dependencies: vec![
                    "finances.total_revenue".to_string(),
                    "expense.total_expenses".to_string(),
                ],
            },
        )
        .with_description("Revenue received minus expenses incurred.")
        .with_formula("finances.total_revenue - expense.total_expenses")
        .with_dependencies(&["finances.total_revenue", "expense.total_expenses"]),
        MetricDefinition::new(
            "finances.avg_days_to_payment",
            "Average Days To Payment",
            MetricCategory::Finances,
            MetricUnit::Days,
            "invoices",
            Calculation::Duration {
                table: "invoices".to_string(),
                start_field: "issued_at".to_string(),
                end_field: "paid_at".to_string(),
                conditions: Vec::new(),
                unit: DurationUnit::Days,
            },
        )
        .with_formula("AVG(paid_at - issued_at)"),
    ]
}

fn activity_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "activities.total_tasks",
            "Total Tasks",
            MetricCategory::Activities,
            MetricUnit::Count,
            "tasks",
            Calculation::SimpleCount {
                table: "tasks".to_string(),
            },
        )
        .with_formula("COUNT(tasks)"),
        MetricDefinition::new(
            "activities.completed_tasks",
            "Completed Tasks",
            MetricCategory::Activities,
            MetricUnit::Count,
            "tasks",
            Calculation::ConditionalCount {
                table: "tasks".to_string(),
                conditions: FilterBuilder::new().eq("status", "completed").build(),
            },
        )
        .with_formula("COUNT(tasks WHERE status = completed)"),
        MetricDefinition::new(
            "activities.overdue_tasks",
            "Overdue Tasks",
            MetricCategory::Activities,
            MetricUnit::Count,
            "tasks",
            Calculation::ConditionalCount {
                table: "tasks".to_string(),
                conditions: FilterBuilder::new().eq("status", "overdue").build(),
            },
        )
        .with_formula("COUNT(tasks WHERE status = overdue)")
        .with_drill_down("tasks.overdue"),
        MetricDefinition::new(
            "activities.completion_rate",
            "Task Completion Rate",
            MetricCategory::Activities,
            MetricUnit::Percentage,
            "tasks",
            Calculation::Ratio {
                numerator: metric_ref("activities.completed_tasks"),
                denominator: metric_ref("activities.total_tasks"),
                percentage: true,
            },
        )
        .with_formula("activities.completed_tasks / activities.total_tasks * 100")
        .with_dependencies(&["activities.completed_tasks", "activities.total_tasks"]),
    ]
}

fn productivity_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "productivity.billable_hours",
            "Billable Hours",
            MetricCategory::Productivity,
            MetricUnit::Hours,
            "time_entries",
            Calculation::Sum {
                table: "time_entries".to_string(),
                field: "hours".to_string(),
                conditions: FilterBuilder::new().eq("billable", true).build(),
            },
        )
        .with_formula("SUM(time_entries.hours WHERE billable = true)"),
        MetricDefinition::new(
            "productivity.non_billable_hours",
            "Non-Billable Hours",
            MetricCategory::Productivity,
            MetricUnit::Hours,
            "time_entries",
            Calculation::Sum {
                table: "time_entries".to_string(),
                field: "hours".to_string(),
                conditions: FilterBuilder::new().eq("billable", false).build(),
            },
        )
        .with_formula("SUM(time_entries.hours WHERE billable = false)"),
        MetricDefinition::new(
            "productivity.utilization_rate",
            "Utilization Rate",
            MetricCategory::Productivity,
            MetricUnit::Percentage,
            "time_entries",
            Calculation::Ratio {
                numerator: metric_ref("productivity.billable_hours"),
                // Inline recipe: all hours regardless of billable flag.
                denominator: RatioOperand::Inline(Box::new(Calculation::Sum {
                    table: "time_entries".to_string(),
                    field: "hours".to_string(),
                    conditions: Vec::new(),
                })),
                percentage: true,
            },
        )
        .with_description("Billable hours as a share of all hours logged.")
        .with_formula("productivity.billable_hours / SUM(time_entries.hours) * 100")
        .with_dependencies(&["productivity.billable_hours"]),
        MetricDefinition::new(
            "productivity.avg_task_turnaround_hours",
            "Average Task Turnaround",
            MetricCategory::Productivity,
            MetricUnit::Hours,
            "tasks",
            Calculation::Duration {
                table: "tasks".to_string(),
                start_field: "created_at".to_string(),
                end_field: "completed_at".to_string(),
                conditions: Vec::new(),
                unit: DurationUnit::Hours,
            },
        )
        .with_formula("AVG(completed_at - created_at)"),
    ]
}

fn storage_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "storage.document_count",
            "Documents Stored",
            MetricCategory::Storage,
            MetricUnit::Count,
            "documents",
            Calculation::SimpleCount {
                table: "documents".to_string(),
            },
        )
        .with_formula("COUNT(documents)")
        .with_freshness(DataFreshness::Daily)
        .with_drill_down("documents.all"),
        MetricDefinition::new(
            "storage.total_bytes",
            "Storage Used",
            MetricCategory::Storage,
            MetricUnit::Bytes,
            "documents",
            Calculation::Sum {
                table: "documents".to_string(),
                field: "size_bytes".to_string(),
                conditions: Vec::new(),
            },
        )
        .with_formula("SUM(documents.size_bytes)")
        .with_freshness(DataFreshness::Daily),
        MetricDefinition::new(
            "storage.avg_document_size",
            "Average Document Size",
            MetricCategory::Storage,
            MetricUnit::Bytes,
            "documents",
            Calculation::Average {
                table: "documents".to_string(),
                field: "size_bytes".to_string(),
                conditions: Vec::new(),
            },
        )
        .with_formula("AVG(documents.size_bytes)")
        .with_freshness(DataFreshness::Daily),
    ]
}

fn sales_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "sales.new_leads",
            "New Leads",
            MetricCategory::Sales,
            MetricUnit::Count,
            "leads",
            Calculation::SimpleCount {
                table: "leads".to_string(),
            },
        )
        .with_formula("COUNT(leads)")
        .with_drill_down("leads.new"),
        MetricDefinition::new(
            "sales.converted_leads",
            "Converted Leads",
            MetricCategory::Sales,
            MetricUnit::Count,
            "leads",
            Calculation::ConditionalCount {
                table: "leads".to_string(),
                conditions: FilterBuilder::new().eq("status", "converted").build(),
            },
        )
        .with_formula("COUNT(leads WHERE status = converted)"),
        MetricDefinition::new(
            "sales.conversion_rate",
            "Lead Conversion Rate",
            MetricCategory::Sales,
            MetricUnit::Percentage,
            "leads",
            Calculation::Ratio {
                numerator: metric_ref("sales.converted_leads"),
                denominator: metric_ref("sales.new_leads"),
                percentage: true,
            },
        )
        .with_formula("sales.converted_leads / sales.new_leads * 100")
        .with_dependencies(&["sales.converted_leads", "sales.new_leads"]),
        MetricDefinition::new(
            "sales.pipeline_value",
            "Pipeline Value",
            MetricCategory::Sales,
            MetricUnit::Currency,
            "leads",
            Calculation::Sum {
                table: "leads".to_string(),
                field: "estimated_value".to_string(),
                conditions: FilterBuilder::new()
                    .is_in("status", vec![json!("qualified"), json!("proposal")])
                    .build(),
            },
        )
        .with_description("Estimated value of leads still in the pipeline.")
        .with_formula("SUM(leads.estimated_value WHERE status IN [qualified, proposal])"),
    ]
}

fn expense_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(
            "expense.total_expenses",
            "Total Expenses",
            MetricCategory::Expense,
            MetricUnit::Currency,
            "expenses",
            Calculation::Sum {
                table: "expenses".to_string(),
                field: "amount".to_string(),
                conditions: Vec::new(),
            },
        )
        .with_formula("SUM(expenses.amount)"),
        MetricDefinition::new(
            "expense.billable_expenses",
            "Billable Expenses",
            MetricCategory::Expense,
            MetricUnit::Currency,
            "expenses",
            Calculation::Sum {
                table: "expenses".to_string(),
                field: "amount".to_string(),
                conditions: FilterBuilder::new().eq("billable", true).build(),
            },
        )
        .with_formula("SUM(expenses.amount WHERE billable = true)"),
        MetricDefinition::new(
            "expense.avg_expense",
            "Average Expense",
            MetricCategory::Expense,
            MetricUnit::Currency,
            "expenses",
            Calculation::Average {
                table: "expenses".to_string(),
                field: "amount".to_string(),
                conditions: Vec::new(),
            },
        )
        .with_formula("AVG(expenses.amount)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetricRegistry;

    #[test]
    fn standard_catalog_validates_cleanly() {
        let registry = MetricRegistry::new(standard_catalog()).unwrap();
        let report = registry.validate();
        assert!(report.valid, "validation errors: {:?}", report.errors);
    }

    #[test]
    fn every_category_is_represented() {
        let registry = MetricRegistry::new(standard_catalog()).unwrap();
        for category in [
            MetricCategory::Cases,
            MetricCategory::Finances,
            MetricCategory::Activities,
            MetricCategory::Productivity,
            MetricCategory::Storage,
            MetricCategory::Sales,
            MetricCategory::Expense,
        ] {
            assert!(
                !registry.by_category(category).is_empty(),
                "no metrics in {category:?}"
            );
        }
    }

    #[test]
    fn net_revenue_composite_is_parsed_at_load() {
        let registry = MetricRegistry::new(standard_catalog()).unwrap();
        let terms = registry.composite_terms("finances.net_revenue").unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].metric_id, "finances.total_revenue");
        assert_eq!(terms[1].metric_id, "expense.total_expenses");
    }
}
