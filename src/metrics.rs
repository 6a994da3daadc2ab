//! Metric registry over a built position set
//!
//! Metrics form an explicit directed acyclic graph: each one is registered
//! under a name with its dependency list and a compute closure. Evaluation
//! validates the graph (unknown names, cycles) before running anything, then
//! executes in topological order with results memoized per request.
//!
//! Anything needing the account's total assets takes it from the evaluation
//! context, which the caller fills in explicitly. There is no ambient
//! total-assets state to read.

use std::collections::{BTreeMap, HashMap, VecDeque};

use thiserror::Error;

use crate::types::{Money, Position};

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("unknown metric: {0}")]
    Unknown(String),

    #[error("dependency cycle involving metric '{0}'")]
    Cycle(String),

    #[error("metric '{0}' requires total assets in the context")]
    MissingTotalAssets(String),
}

/// Inputs a metric may read. `total_assets` is optional because only
/// percentage-of-account metrics need it.
pub struct MetricContext<'a> {
    pub positions: &'a [Position],
    pub total_assets: Option<Money>,
}

/// Results of dependencies already computed this run, keyed by metric name
pub type Resolved = HashMap<String, f64>;

type MetricFn = Box<dyn Fn(&MetricContext, &Resolved) -> Result<f64, MetricError>>;

struct MetricNode {
    deps: Vec<String>,
    compute: MetricFn,
}

/// Named metric computations with declared dependencies
#[derive(Default)]
pub struct MetricGraph {
    nodes: HashMap<String, MetricNode>,
}

impl MetricGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, deps: &[&str], compute: F)
    where
        F: Fn(&MetricContext, &Resolved) -> Result<f64, MetricError> + 'static,
    {
        self.nodes.insert(
            name.to_string(),
            MetricNode {
                deps: deps.iter().map(|d| d.to_string()).collect(),
                compute: Box::new(compute),
            },
        );
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate the requested metrics (and everything they depend on).
    ///
    /// The subgraph reachable from the request is checked for unknown names
    /// and cycles up front; execution order comes from a Kahn queue and each
    /// metric runs at most once per call.
    pub fn compute(
        &self,
        requested: &[&str],
        ctx: &MetricContext,
    ) -> Result<BTreeMap<String, f64>, MetricError> {
        // Reachable subgraph from the request
        let mut needed: Vec<String> = Vec::new();
        let mut pending: VecDeque<String> = requested.iter().map(|s| s.to_string()).collect();
        while let Some(name) = pending.pop_front() {
            if needed.contains(&name) {
                continue;
            }
            let node = self
                .nodes
                .get(&name)
                .ok_or_else(|| MetricError::Unknown(name.clone()))?;
            for dep in &node.deps {
                pending.push_back(dep.clone());
            }
            needed.push(name);
        }

        // Kahn's algorithm over the subgraph
        let mut in_degree: HashMap<&str, usize> = needed
            .iter()
            .map(|name| (name.as_str(), self.nodes[name].deps.len()))
            .collect();
        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();

        let mut cache: Resolved = HashMap::new();
        while let Some(name) = ready.pop_front() {
            let value = (self.nodes[name].compute)(ctx, &cache)?;
            cache.insert(name.to_string(), value);

            for other in &needed {
                if self.nodes[other.as_str()].deps.iter().any(|d| d == name) {
                    if let Some(degree) = in_degree.get_mut(other.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(other.as_str());
                        }
                    }
                }
            }
        }

        if let Some(stuck) = needed.iter().find(|n| !cache.contains_key(*n)) {
            return Err(MetricError::Cycle(stuck.clone()));
        }

        Ok(requested
            .iter()
            .map(|name| (name.to_string(), cache[*name]))
            .collect())
    }
}

/// The stock set of portfolio metrics
pub fn standard_registry() -> MetricGraph {
    let mut graph = MetricGraph::new();

    graph.register("total_realized_pnl", &[], |ctx, _| {
        Ok(ctx.positions.iter().map(|p| p.realized_pnl).sum::<Money>().to_f64())
    });

    graph.register("closed_positions", &[], |ctx, _| {
        Ok(ctx.positions.iter().filter(|p| !p.is_active()).count() as f64)
    });

    graph.register("active_positions", &[], |ctx, _| {
        Ok(ctx.positions.iter().filter(|p| p.is_active()).count() as f64)
    });

    graph.register(
        "total_positions",
        &["closed_positions", "active_positions"],
        |_, resolved| Ok(resolved["closed_positions"] + resolved["active_positions"]),
    );

    graph.register("win_rate", &["closed_positions"], |ctx, resolved| {
        let closed = resolved["closed_positions"];
        if closed == 0.0 {
            return Ok(0.0);
        }
        let wins = ctx
            .positions
            .iter()
            .filter(|p| !p.is_active() && p.realized_pnl > Money::ZERO)
            .count() as f64;
        Ok(wins / closed * 100.0)
    });

    graph.register(
        "avg_pnl_per_closed",
        &["total_realized_pnl", "closed_positions"],
        |ctx, resolved| {
            let closed = resolved["closed_positions"];
            if closed == 0.0 {
                return Ok(0.0);
            }
            let closed_pnl: Money = ctx
                .positions
                .iter()
                .filter(|p| !p.is_active())
                .map(|p| p.realized_pnl)
                .sum();
            Ok(closed_pnl.to_f64() / closed)
        },
    );

    graph.register(
        "return_on_assets",
        &["total_realized_pnl"],
        |ctx, resolved| {
            let total = ctx
                .total_assets
                .ok_or_else(|| MetricError::MissingTotalAssets("return_on_assets".into()))?;
            if total.is_zero() {
                return Ok(0.0);
            }
            Ok(resolved["total_realized_pnl"] / total.to_f64() * 100.0)
        },
    );

    graph
}
