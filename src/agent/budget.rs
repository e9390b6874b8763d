//! Shared spend budget.
//!
//! One `SpendBudget` is shared (`Arc`) between the main agent and every
//! subagent it spawns. Each model call records its cost here; once the total
//! reaches the ceiling the budget latches exhausted and every loop sharing
//! it stops before its next call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{info, warn};

/// Spend attributed to one source (`"agent"`, `"subagent:{id}"`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSpend {
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
}

#[derive(Debug, Default)]
struct Totals {
    cost: f64,
    input_tokens: u64,
    output_tokens: u64,
    by_source: HashMap<String, SourceSpend>,
}

/// Cost and token accounting with an optional ceiling.
///
/// `record` is a single critical section, so concurrent callers never lose
/// an update. `is_exhausted` is a lock-free read of a flag that only ever
/// goes from `false` to `true`.
///
/// # Example
///
/// ```rust
/// use nanoclaw::agent::SpendBudget;
///
/// let budget = SpendBudget::new(Some(1.0));
/// budget.record(0.4, 1000, 200, "agent");
/// assert!(!budget.is_exhausted());
/// budget.record(0.6, 1000, 200, "subagent:ab12cd34");
/// assert!(budget.is_exhausted());
/// assert_eq!(budget.input_tokens(), 2000);
/// ```
#[derive(Debug)]
pub struct SpendBudget {
    ceiling: Option<f64>,
    totals: Mutex<Totals>,
    exhausted: AtomicBool,
}

impl SpendBudget {
    pub fn new(ceiling: Option<f64>) -> Self {
        Self {
            ceiling,
            totals: Mutex::new(Totals::default()),
            exhausted: AtomicBool::new(false),
        }
    }

    /// A budget that only counts.
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn ceiling(&self) -> Option<f64> {
        self.ceiling
    }

    /// Records one model call.
    pub fn record(&self, cost: f64, input_tokens: u64, output_tokens: u64, source: &str) {
        let mut totals = self.lock();
        totals.cost += cost;
        totals.input_tokens += input_tokens;
        totals.output_tokens += output_tokens;

        let entry = totals.by_source.entry(source.to_string()).or_default();
        entry.cost += cost;
        entry.input_tokens += input_tokens;
        entry.output_tokens += output_tokens;
        entry.calls += 1;

        if let Some(ceiling) = self.ceiling {
            if totals.cost >= ceiling && !self.exhausted.swap(true, Ordering::SeqCst) {
                warn!(
                    total_cost = totals.cost,
                    ceiling = ceiling,
                    source = source,
                    "Spend budget exhausted"
                );
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    pub fn total_cost(&self) -> f64 {
        self.lock().cost
    }

    pub fn input_tokens(&self) -> u64 {
        self.lock().input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.lock().output_tokens
    }

    /// Snapshot of per-source spend.
    pub fn breakdown(&self) -> HashMap<String, SourceSpend> {
        self.lock().by_source.clone()
    }

    /// Money left before the ceiling; `None` when unlimited.
    pub fn remaining(&self) -> Option<f64> {
        self.ceiling.map(|c| (c - self.total_cost()).max(0.0))
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let totals = self.lock();
        let mut out = format!(
            "Spent ${:.4} ({} input / {} output tokens)",
            totals.cost, totals.input_tokens, totals.output_tokens
        );
        if let Some(ceiling) = self.ceiling {
            out.push_str(&format!(" of ${:.4} budget", ceiling));
        }
        out.push('.');
        out
    }

    /// Emits the current totals as a structured log line.
    pub fn emit_usage(&self, reason: &str) {
        let totals = self.lock();
        info!(
            event = "spend_summary",
            reason = reason,
            total_cost = totals.cost,
            input_tokens = totals.input_tokens,
            output_tokens = totals.output_tokens,
            sources = totals.by_source.len(),
            exhausted = self.is_exhausted(),
            "Spend budget"
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Totals> {
        // A poisoned lock still holds consistent totals: every update is
        // plain arithmetic that cannot panic halfway.
        self.totals.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SpendBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}
