//! # Meridian Drill-Down Resolver
//!
//! Maps a metric (or ad-hoc key) plus contextual parameters to a navigable
//! target: a route and a query string. Purely computational — no data-source
//! access, no recursion. An unknown key resolves to `None`, never an error:
//! not every metric has somewhere to drill into.

use core_types::Filter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A static navigation target: the route to a record view plus the query
/// parameters that scope it to the metric's underlying rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillDownTarget {
    pub route: String,
    /// Static query parameters, in declaration order.
    pub params: Vec<(String, String)>,
    /// Filters the record view should apply, mirroring the metric's
    /// conditions. Carried for the UI; not used when rendering the URL.
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl DrillDownTarget {
    pub fn new(route: &str, params: &[(&str, &str)]) -> Self {
        Self {
            route: route.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }
}

/// A resolved navigation descriptor, ready to hand to a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub route: String,
    pub url: String,
}

/// Looks up static targets by key and merges caller context (case id,
/// account id, user id) into the query string.
#[derive(Debug, Clone, Default)]
pub struct DrillDownResolver {
    targets: HashMap<String, DrillDownTarget>,
}

impl DrillDownResolver {
    pub fn new(targets: Vec<(&str, DrillDownTarget)>) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|(key, target)| (key.to_string(), target))
                .collect(),
        }
    }

    /// The built-in targets matching the standard metric catalog.
    pub fn standard() -> Self {
        Self::new(vec![
            (
                "cases.open",
                DrillDownTarget::new("/cases", &[("status", "open")]),
            ),
            (
                "invoices.outstanding",
                DrillDownTarget::new("/invoices", &[("status", "unpaid")]),
            ),
            (
                "tasks.overdue",
                DrillDownTarget::new("/tasks", &[("status", "overdue")]),
            ),
            ("leads.new", DrillDownTarget::new("/leads", &[])),
            ("documents.all", DrillDownTarget::new("/documents", &[])),
        ])
    }

    /// Resolves a target key, merging context parameters after the static
    /// ones. Static parameters keep their declaration order; a context
    /// parameter with the same key overwrites the static value in place.
    pub fn resolve(&self, key: &str, context: &[(String, String)]) -> Option<ResolvedTarget> {
        let target = self.targets.get(key)?;

        let mut params = target.params.clone();
        for (ctx_key, ctx_value) in context {
            if let Some(existing) = params.iter_mut().find(|(k, _)| k == ctx_key) {
                existing.1 = ctx_value.clone();
            } else {
                params.push((ctx_key.clone(), ctx_value.clone()));
            }
        }

        let url = if params.is_empty() {
            target.route.clone()
        } else {
            let query: Vec<String> = params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            format!("{}?{}", target.route, query.join("&"))
        };

        Some(ResolvedTarget {
            route: target.route.clone(),
            url,
        })
    }
}

/// URL encoding helper
mod urlencoding {
    pub fn encode(s: &str) -> String {
        let mut result = String::with_capacity(s.len() * 3);
        for c in s.chars() {
            match c {
                'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => {
                    result.push(c);
                }
                ' ' => result.push_str("%20"),
                _ => {
                    for byte in c.to_string().as_bytes() {
                        result.push_str(&format!("%{byte:02X}"));
                    }
                }
            }
        }
        result
    }
}
