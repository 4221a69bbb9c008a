//! Output layer: human-readable text or stable JSON per command.

use std::io::{self, Write};

use serde::Serialize;

/// The two output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Key/value lines for humans.
    Human,
    /// One JSON object per command result.
    Json,
}

/// Counters reported after every state-mutating command.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub nodes: usize,
    pub edges: usize,
    pub components: usize,
    pub isolated: usize,
    pub seeds: usize,
    pub infected: usize,
    pub principals: usize,
    pub deleted_nodes: u64,
    /// Command-specific figure: edges added, nodes removed, or scan reach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<(&'static str, u64)>,
}

impl Summary {
    #[must_use]
    pub fn of(poisoned: &percol_core::PoisonGraph) -> Self {
        let store = poisoned.graph().store();
        Self {
            nodes: store.node_count(),
            edges: store.edge_count(),
            components: store.components_with_singletons().len(),
            isolated: store.isolated().len(),
            seeds: poisoned.initial_poison().len(),
            infected: poisoned.infected().len(),
            principals: poisoned.principals().len(),
            deleted_nodes: store.deleted_nodes(),
            outcome: None,
        }
    }

    #[must_use]
    pub const fn with_outcome(mut self, label: &'static str, value: u64) -> Self {
        self.outcome = Some((label, value));
        self
    }
}

/// Print a summary in the requested mode.
pub fn print_summary(mode: OutputMode, summary: &Summary) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut out, summary)?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            if let Some((label, value)) = summary.outcome {
                writeln!(out, "{label}: {value}")?;
            }
            writeln!(
                out,
                "nodes={} edges={} components={} isolated={}",
                summary.nodes, summary.edges, summary.components, summary.isolated
            )?;
            writeln!(
                out,
                "seeds={} infected={} principals={} deleted={}",
                summary.seeds, summary.infected, summary.principals, summary.deleted_nodes
            )?;
        }
    }
    Ok(())
}
