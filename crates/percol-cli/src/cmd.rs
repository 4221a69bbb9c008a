//! Command handlers. Every command checks one graph state file out,
//! applies a single engine operation, and writes the state back — the
//! file plays the single-slot registry role, so there is never more than
//! one live engine per state.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use percol_core::{GraphEngine, NodeId, PoisonGraph, PoisonState};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::debug;

use crate::output::{OutputMode, Summary, print_summary};

/// Read and rehydrate a state file. Restoration re-validates every
/// structural invariant, so a hand-edited file fails here, not later.
pub fn load(path: &Path, seed: Option<u64>) -> Result<PoisonGraph> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read state file {}", path.display()))?;
    let state: PoisonState =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    let poisoned = match seed {
        Some(seed) => PoisonGraph::restore_with_seed(state, seed),
        None => PoisonGraph::restore(state),
    }
    .with_context(|| format!("restore graph from {}", path.display()))?;
    Ok(poisoned)
}

/// Serialize the graph back to its state file.
pub fn save(path: &Path, poisoned: &PoisonGraph) -> Result<()> {
    let json = serde_json::to_string(&poisoned.export_state()).context("serialize state")?;
    fs::write(path, json).with_context(|| format!("write state file {}", path.display()))?;
    debug!(path = %path.display(), "state saved");
    Ok(())
}

pub fn run_generate(
    path: &Path,
    nodes: usize,
    edges: usize,
    poison: usize,
    gamma: f64,
    seed: Option<u64>,
    mode: OutputMode,
) -> Result<()> {
    let poisoned = match seed {
        Some(seed) => PoisonGraph::generate_with_seed(nodes, edges, poison, gamma, seed),
        None => PoisonGraph::generate(nodes, edges, poison, gamma),
    }
    .context("generate graph")?;
    save(path, &poisoned)?;
    print_summary(mode, &Summary::of(&poisoned))
}

pub fn run_add(
    path: &Path,
    nodes: usize,
    edges: usize,
    seed: Option<u64>,
    mode: OutputMode,
) -> Result<()> {
    let mut poisoned = load(path, seed)?;
    let added = poisoned.add_dynamic(nodes, edges);
    save(path, &poisoned)?;
    print_summary(
        mode,
        &Summary::of(&poisoned).with_outcome("edges_added", added as u64),
    )
}

pub fn run_delete(
    path: &Path,
    ids: &[NodeId],
    random: Option<usize>,
    seed: Option<u64>,
    mode: OutputMode,
) -> Result<()> {
    let mut poisoned = load(path, seed)?;
    let victims: Vec<NodeId> = if let Some(count) = random {
        // The victim sampler follows --seed too, so seeded runs stay
        // reproducible end to end.
        let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        poisoned
            .graph()
            .store()
            .nodes()
            .choose_multiple(&mut rng, count)
            .copied()
            .collect()
    } else {
        ids.to_vec()
    };
    let removed = poisoned.del_nodes_from(&victims);
    save(path, &poisoned)?;
    print_summary(
        mode,
        &Summary::of(&poisoned).with_outcome("nodes_removed", removed as u64),
    )
}

pub fn run_poison(path: &Path, count: usize, seed: Option<u64>, mode: OutputMode) -> Result<()> {
    let mut poisoned = load(path, seed)?;
    poisoned.add_poison(count).context("mark poison seeds")?;
    save(path, &poisoned)?;
    print_summary(mode, &Summary::of(&poisoned))
}

pub fn run_scan(
    path: &Path,
    principals: usize,
    seed: Option<u64>,
    mode: OutputMode,
) -> Result<()> {
    let mut poisoned = load(path, seed)?;
    let reach = poisoned.scan_poison(principals);
    save(path, &poisoned)?;
    print_summary(
        mode,
        &Summary::of(&poisoned).with_outcome("infected_reach", reach as u64),
    )
}

pub fn run_contain(path: &Path, seed: Option<u64>, mode: OutputMode) -> Result<()> {
    let mut poisoned = load(path, seed)?;
    let principals = poisoned.principals().to_vec();
    let removed = poisoned.del_poison_from(&principals);
    save(path, &poisoned)?;
    print_summary(
        mode,
        &Summary::of(&poisoned).with_outcome("nodes_removed", removed as u64),
    )
}

/// Degree and component figures for `stats`.
#[derive(Debug, Serialize)]
struct StatsReport {
    nodes: usize,
    edges: usize,
    max_degree: usize,
    mean_degree: f64,
    components: usize,
    largest_component: usize,
    isolated: usize,
    seeds: usize,
    infected: usize,
    deleted_nodes: u64,
}

impl StatsReport {
    fn of(poisoned: &PoisonGraph) -> Self {
        let store = poisoned.graph().store();
        let engine: &GraphEngine = poisoned.graph();
        let max_degree = store.nodes().iter().map(|&v| store.degree(v)).max().unwrap_or(0);
        let node_count = store.node_count();
        let mean_degree = if node_count == 0 {
            0.0
        } else {
            precise_ratio(store.connected_nodes().len(), node_count)
        };
        Self {
            nodes: node_count,
            edges: store.edge_count(),
            max_degree,
            mean_degree,
            components: engine.components_with_singletons().len(),
            largest_component: store.components().iter().map(Vec::len).max().unwrap_or(0),
            isolated: store.isolated().len(),
            seeds: poisoned.initial_poison().len(),
            infected: poisoned.infected().len(),
            deleted_nodes: store.deleted_nodes(),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn precise_ratio(num: usize, den: usize) -> f64 {
    num as f64 / den as f64
}

pub fn run_stats(path: &Path, mode: OutputMode) -> Result<()> {
    let poisoned = load(path, None)?;
    let report = StatsReport::of(&poisoned);
    let mut out = io::stdout().lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut out, &report)?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            writeln!(out, "nodes:             {}", report.nodes)?;
            writeln!(out, "edges:             {}", report.edges)?;
            writeln!(out, "max degree:        {}", report.max_degree)?;
            writeln!(out, "mean degree:       {:.3}", report.mean_degree)?;
            writeln!(out, "components:        {}", report.components)?;
            writeln!(out, "largest component: {}", report.largest_component)?;
            writeln!(out, "isolated:          {}", report.isolated)?;
            writeln!(out, "seeds:             {}", report.seeds)?;
            writeln!(out, "infected:          {}", report.infected)?;
            writeln!(out, "deleted:           {}", report.deleted_nodes)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputMode;

    fn state_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("graph.json")
    }

    #[test]
    fn generate_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = state_file(&dir);
        run_generate(&path, 50, 120, 5, 3.0, Some(7), OutputMode::Json).expect("generate");

        let poisoned = load(&path, Some(7)).expect("load");
        assert_eq!(poisoned.graph().store().node_count(), 50);
        assert_eq!(poisoned.initial_poison().len(), 5);
    }

    #[test]
    fn full_cycle_over_a_state_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = state_file(&dir);
        run_generate(&path, 60, 150, 0, 3.0, Some(11), OutputMode::Json).expect("generate");
        run_add(&path, 10, 30, Some(1), OutputMode::Json).expect("add");
        run_poison(&path, 4, Some(2), OutputMode::Json).expect("poison");
        run_scan(&path, 2, Some(3), OutputMode::Json).expect("scan");
        run_contain(&path, Some(4), OutputMode::Json).expect("contain");
        run_stats(&path, OutputMode::Json).expect("stats");

        let poisoned = load(&path, None).expect("load");
        poisoned.graph().store().check_invariants().expect("invariants");
        assert!(poisoned.graph().store().node_count() <= 70);
    }

    #[test]
    fn delete_by_explicit_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = state_file(&dir);
        run_generate(&path, 20, 0, 0, 3.0, Some(5), OutputMode::Json).expect("generate");
        run_delete(&path, &[0, 1, 2], None, None, OutputMode::Json).expect("delete");

        let poisoned = load(&path, None).expect("load");
        assert_eq!(poisoned.graph().store().node_count(), 17);
    }

    #[test]
    fn seeded_random_delete_is_reproducible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = state_file(&dir);
        run_generate(&first, 40, 80, 0, 3.0, Some(13), OutputMode::Json).expect("generate");
        let second = dir.path().join("copy.json");
        fs::copy(&first, &second).expect("copy");

        run_delete(&first, &[], Some(10), Some(99), OutputMode::Json).expect("delete first");
        run_delete(&second, &[], Some(10), Some(99), OutputMode::Json).expect("delete second");

        let survivors = |path: &Path| -> Vec<NodeId> {
            load(path, None).expect("load").graph().store().nodes().to_vec()
        };
        assert_eq!(survivors(&first), survivors(&second));
        assert!(survivors(&first).len() < 40);
    }

    #[test]
    fn load_rejects_corrupt_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = state_file(&dir);
        fs::write(&path, "{\"not\": \"a graph\"}").expect("write");
        assert!(load(&path, None).is_err());
    }
}
