//! Poison-spread containment on top of the graph engine.
//!
//! # Overview
//!
//! [`PoisonGraph`] wraps a [`GraphEngine`] with infection bookkeeping:
//! the seed set (`initial_poison`), the cumulative infected set, the
//! principal containment candidates, and the running deletion counter
//! (shared with the store).
//!
//! The spread model saturates: poison fills every component it touches,
//! so the reach of a seed set is the union of all components intersecting
//! it. [`PoisonGraph::scan_poison`] computes that reach and picks one
//! principal per infected component, largest components first;
//! [`PoisonGraph::del_poison_from`] then removes the principals and
//! quarantines whatever is left of their components.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use tracing::{debug, instrument};

use crate::engine::GraphEngine;
use crate::error::{GraphError, Result};
use crate::store::NodeId;

/// Infection bookkeeping layered over an engine. Exported field-by-field
/// through [`crate::state::PoisonState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PoisonLedger {
    /// Seed nodes, in marking order.
    pub initial_poison: Vec<NodeId>,
    /// Cumulative set of nodes reached by the poison (deduplicated,
    /// discovery order).
    pub infected: Vec<NodeId>,
    /// Containment candidates chosen by the last scan, drained by removal.
    pub principals: Vec<NodeId>,
    /// Whether a scan has completed since the last seeding; the next
    /// `add_poison` after a scan starts a fresh containment cycle.
    pub scanned: bool,
}

/// A graph engine plus poison-spread analysis.
#[derive(Debug, Clone)]
pub struct PoisonGraph {
    graph: GraphEngine,
    ledger: PoisonLedger,
}

impl PoisonGraph {
    /// Generate a fresh graph and mark `poison_count` random seeds.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidParameter`] for a bad `gamma`;
    /// [`GraphError::InsufficientNodes`] if `poison_count > node_count`.
    pub fn generate(
        node_count: usize,
        edge_budget: usize,
        poison_count: usize,
        gamma: f64,
    ) -> Result<Self> {
        let mut poisoned = Self::from_engine(GraphEngine::generate(node_count, edge_budget, gamma)?);
        poisoned.add_poison(poison_count)?;
        Ok(poisoned)
    }

    /// Reproducible variant of [`PoisonGraph::generate`].
    ///
    /// # Errors
    ///
    /// Same as [`PoisonGraph::generate`].
    pub fn generate_with_seed(
        node_count: usize,
        edge_budget: usize,
        poison_count: usize,
        gamma: f64,
        seed: u64,
    ) -> Result<Self> {
        let engine = GraphEngine::generate_with_seed(node_count, edge_budget, gamma, seed)?;
        let mut poisoned = Self::from_engine(engine);
        poisoned.add_poison(poison_count)?;
        Ok(poisoned)
    }

    /// Wrap an existing engine with empty infection state.
    #[must_use]
    pub fn from_engine(graph: GraphEngine) -> Self {
        Self {
            graph,
            ledger: PoisonLedger::default(),
        }
    }

    pub(crate) fn from_parts(graph: GraphEngine, ledger: PoisonLedger) -> Self {
        Self { graph, ledger }
    }

    pub(crate) fn ledger(&self) -> &PoisonLedger {
        &self.ledger
    }

    // -- read surface -------------------------------------------------------

    /// The wrapped engine.
    #[must_use]
    pub fn graph(&self) -> &GraphEngine {
        &self.graph
    }

    /// Seed nodes in marking order.
    #[must_use]
    pub fn initial_poison(&self) -> &[NodeId] {
        &self.ledger.initial_poison
    }

    /// Every node the poison has reached so far (cumulative).
    #[must_use]
    pub fn infected(&self) -> &[NodeId] {
        &self.ledger.infected
    }

    /// Containment candidates chosen by the last scan.
    #[must_use]
    pub fn principals(&self) -> &[NodeId] {
        &self.ledger.principals
    }

    /// Nodes removed by deletion operations since creation.
    #[must_use]
    pub fn deleted_nodes(&self) -> u64 {
        self.graph.store().deleted_nodes()
    }

    // -- seeding ------------------------------------------------------------

    /// Mark `count` additional distinct active nodes as poison seeds,
    /// sampled uniformly from the unseeded pool, and return the number
    /// newly marked (always `count` — seeding is all-or-nothing). Seeding
    /// after a completed scan starts a fresh containment cycle: the
    /// infected set and the principal list are reset first.
    ///
    /// # Errors
    ///
    /// [`GraphError::InsufficientNodes`] if fewer than `count` unseeded
    /// active nodes exist; nothing is marked in that case.
    #[instrument(skip(self))]
    pub fn add_poison(&mut self, count: usize) -> Result<usize> {
        if self.ledger.scanned {
            self.ledger.infected.clear();
            self.ledger.principals.clear();
            self.ledger.scanned = false;
        }
        let seeded: HashSet<NodeId> = self.ledger.initial_poison.iter().copied().collect();
        let pool: Vec<NodeId> = self
            .graph
            .store()
            .nodes()
            .iter()
            .copied()
            .filter(|v| !seeded.contains(v))
            .collect();
        if count > pool.len() {
            return Err(GraphError::InsufficientNodes {
                requested: count,
                available: pool.len(),
            });
        }
        let picks: Vec<NodeId> = pool
            .choose_multiple(self.graph.rng_mut(), count)
            .copied()
            .collect();
        self.ledger.initial_poison.extend(picks);
        debug!(seeds = self.ledger.initial_poison.len(), "poison seeded");
        Ok(count)
    }

    // -- scanning -----------------------------------------------------------

    /// Compute the poison's total reach and choose up to
    /// `principal_budget` containment candidates.
    ///
    /// Poison saturates every component it touches: each component
    /// intersecting the seed set contributes its full size to the count,
    /// and one representative from the intersection joins the principals.
    /// Components are walked in descending size order so the largest
    /// infected components are contained first. Seeds in no stored
    /// component (isolated) count themselves. If the budget exceeds the
    /// number of infected components, the remainder is sampled from seeds
    /// not already chosen.
    ///
    /// Short-circuit: a budget of at least `|seeds| − 1` buys no
    /// containment — every seed becomes its own principal and the seed
    /// count is returned as-is.
    #[instrument(skip(self))]
    pub fn scan_poison(&mut self, principal_budget: usize) -> usize {
        self.ledger.scanned = true;
        let seeds = self.ledger.initial_poison.clone();
        if seeds.is_empty() {
            return 0;
        }
        if principal_budget >= seeds.len() - 1 {
            self.ledger.principals = seeds.clone();
            extend_dedup(&mut self.ledger.infected, &seeds);
            return seeds.len();
        }

        let mut pending: HashSet<NodeId> = seeds.iter().copied().collect();
        extend_dedup(&mut self.ledger.infected, &seeds);

        let mut components: Vec<Vec<NodeId>> = self.graph.store().components().to_vec();
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        let mut counted = 0;
        for component in &components {
            let hit: Vec<NodeId> = component
                .iter()
                .copied()
                .filter(|v| pending.contains(v))
                .collect();
            if hit.is_empty() {
                continue;
            }
            counted += component.len();
            extend_dedup(&mut self.ledger.infected, component);
            if self.ledger.principals.len() < principal_budget {
                if let Some(&principal) = hit.choose(self.graph.rng_mut()) {
                    self.ledger.principals.push(principal);
                }
            }
            for v in component {
                pending.remove(v);
            }
            if pending.is_empty() {
                break;
            }
        }
        // Seeds outside every stored component are isolated: they infect
        // only themselves.
        counted += pending.len();

        if self.ledger.principals.len() < principal_budget {
            // Fallback for an unfilled budget: draw from seeds not already
            // chosen. The short-circuit above guarantees the pool suffices.
            let chosen: HashSet<NodeId> = self.ledger.principals.iter().copied().collect();
            let leftover: Vec<NodeId> = seeds
                .iter()
                .copied()
                .filter(|v| !chosen.contains(v))
                .collect();
            let need = principal_budget - self.ledger.principals.len();
            let extra: Vec<NodeId> = leftover
                .choose_multiple(self.graph.rng_mut(), need.min(leftover.len()))
                .copied()
                .collect();
            self.ledger.principals.extend(extra);
        }
        debug!(
            infected = counted,
            principals = self.ledger.principals.len(),
            "poison scan complete"
        );
        counted
    }

    // -- removal ------------------------------------------------------------

    /// Cascading containment removal.
    ///
    /// Phase 1 removes every active id in `nodes` with the per-node
    /// removal primitive, leaving the stored partition as the pre-call
    /// snapshot. Phase 2 walks that snapshot in descending size order:
    /// every component that intersected `nodes` has all surviving members
    /// enumerated by explicit-stack DFS (covering every fragment the
    /// removal split off) and removed — the quarantine sweep. A component
    /// whose remainder is a single node is left alone; it is trivially
    /// contained. The walk stops once every requested id is accounted for.
    ///
    /// Finishes by recomputing the partition and scrubbing removed ids
    /// from the poison ledger. Returns the total number of nodes removed.
    #[instrument(skip(self, nodes), fields(requested = nodes.len()))]
    pub fn del_poison_from(&mut self, nodes: &[NodeId]) -> usize {
        let snapshot: Vec<Vec<NodeId>> = {
            let mut components = self.graph.store().components().to_vec();
            components.sort_by_key(|c| std::cmp::Reverse(c.len()));
            components
        };
        let mut removed = 0;
        for &v in nodes {
            if self.graph.store_mut().remove_node(v) {
                removed += 1;
            }
        }

        let mut pending: HashSet<NodeId> = nodes.iter().copied().collect();
        for component in &snapshot {
            if !component.iter().any(|v| pending.contains(v)) {
                continue;
            }
            let survivors: Vec<NodeId> = component
                .iter()
                .copied()
                .filter(|&v| self.graph.store().contains(v))
                .collect();
            if survivors.len() > 1 {
                for v in self.graph.store().dfs_collect(&survivors) {
                    if self.graph.store_mut().remove_node(v) {
                        removed += 1;
                    }
                }
            }
            for v in component {
                pending.remove(v);
            }
            if pending.is_empty() {
                break;
            }
        }

        self.graph.store_mut().update_components();
        self.scrub();
        debug!(removed, remaining = self.graph.store().node_count(), "containment removal");
        removed
    }

    // -- engine passthroughs ------------------------------------------------

    /// [`GraphEngine::add_dynamic`] on the wrapped engine.
    pub fn add_dynamic(&mut self, add_node_count: usize, add_edge_budget: usize) -> usize {
        self.graph.add_dynamic(add_node_count, add_edge_budget)
    }

    /// [`GraphEngine::del_nodes_from`] on the wrapped engine, keeping the
    /// poison ledger consistent with the shrunken active set.
    pub fn del_nodes_from(&mut self, nodes: &[NodeId]) -> usize {
        let removed = self.graph.del_nodes_from(nodes);
        self.scrub();
        removed
    }

    /// Drop removed ids from every poison list.
    fn scrub(&mut self) {
        let store = self.graph.store();
        self.ledger.initial_poison.retain(|&v| store.contains(v));
        self.ledger.infected.retain(|&v| store.contains(v));
        self.ledger.principals.retain(|&v| store.contains(v));
    }
}

/// Append `items` to `list`, skipping anything already present.
fn extend_dedup(list: &mut Vec<NodeId>, items: &[NodeId]) {
    let present: HashSet<NodeId> = list.iter().copied().collect();
    list.extend(items.iter().copied().filter(|v| !present.contains(v)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;

    const GAMMA: f64 = 3.0;

    /// Engine with a fixed topology: a 4-node path, a 3-node triangle,
    /// a 2-node pair, and two isolated nodes (11 nodes, ids 0..=10).
    fn fixture() -> GraphEngine {
        let mut engine = GraphEngine::generate_with_seed(11, 0, GAMMA, 0).expect("generate");
        for (u, v) in [(0, 1), (1, 2), (2, 3), (4, 5), (5, 6), (6, 4), (7, 8)] {
            engine.store_mut().insert_edge(u, v);
        }
        engine.store_mut().update_components();
        engine
    }

    fn check(store: &GraphStore) {
        store.check_invariants().expect("invariants");
    }

    #[test]
    fn add_poison_marks_distinct_active_nodes() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        assert_eq!(poisoned.add_poison(5).expect("seed"), 5);
        let unique: HashSet<NodeId> = poisoned.initial_poison().iter().copied().collect();
        assert_eq!(unique.len(), 5);
        assert!(unique.iter().all(|&v| poisoned.graph().store().contains(v)));
    }

    #[test]
    fn add_poison_rejects_oversized_requests() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        poisoned.add_poison(10).expect("seed");
        let err = poisoned.add_poison(2).expect_err("only one unseeded node left");
        assert_eq!(
            err,
            GraphError::InsufficientNodes {
                requested: 2,
                available: 1,
            }
        );
        // The failed call must not mark anything.
        assert_eq!(poisoned.initial_poison().len(), 10);
    }

    #[test]
    fn scan_saturates_touched_components() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        // Seed the path (4 nodes) and the pair (2 nodes) by hand.
        poisoned.ledger.initial_poison = vec![0, 1, 7];
        let reach = poisoned.scan_poison(1);
        assert_eq!(reach, 6, "4-node path + 2-node pair");
        assert_eq!(poisoned.principals().len(), 1);
        // Largest component first: the principal comes from the path's
        // seed intersection.
        assert!([0, 1].contains(&poisoned.principals()[0]));
        let infected: HashSet<NodeId> = poisoned.infected().iter().copied().collect();
        assert_eq!(infected, HashSet::from([0, 1, 2, 3, 7, 8]));
    }

    #[test]
    fn scan_counts_isolated_seeds_as_themselves() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        poisoned.ledger.initial_poison = vec![9, 10, 0];
        assert_eq!(poisoned.scan_poison(1), 4 + 2, "path component + two isolated seeds");
    }

    #[test]
    fn scan_short_circuits_on_generous_budget() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        poisoned.ledger.initial_poison = vec![0, 4, 9];
        let reach = poisoned.scan_poison(2);
        assert_eq!(reach, 3, "budget ≥ |seeds| − 1 returns the seed count");
        assert_eq!(poisoned.principals(), &[0, 4, 9]);
    }

    #[test]
    fn scan_fills_budget_from_leftover_seeds() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        // Four seeds, two in the same component: two infected components
        // but a budget of three.
        poisoned.ledger.initial_poison = vec![0, 1, 4, 9, 10];
        let reach = poisoned.scan_poison(3);
        assert_eq!(reach, 4 + 3 + 2);
        assert_eq!(poisoned.principals().len(), 3);
        let chosen: HashSet<NodeId> = poisoned.principals().iter().copied().collect();
        assert_eq!(chosen.len(), 3, "principals are distinct");
        assert!(chosen.iter().all(|v| poisoned.initial_poison().contains(v)));
    }

    #[test]
    fn scan_on_empty_seed_set_is_zero() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        assert_eq!(poisoned.scan_poison(3), 0);
        assert!(poisoned.principals().is_empty());
    }

    #[test]
    fn reseeding_after_a_scan_resets_the_cycle() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        poisoned.ledger.initial_poison = vec![0];
        poisoned.scan_poison(0);
        assert!(!poisoned.infected().is_empty());
        poisoned.add_poison(1).expect("reseed");
        assert!(poisoned.infected().is_empty(), "fresh cycle starts clean");
        assert!(poisoned.principals().is_empty());
    }

    #[test]
    fn del_poison_sweeps_the_rest_of_the_component() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        poisoned.ledger.initial_poison = vec![1];
        poisoned.scan_poison(0);
        // Remove seed 1 from the path 0-1-2-3. The remainder {0, 2, 3}
        // still exceeds one node, so the quarantine removes it all.
        let removed = poisoned.del_poison_from(&[1]);
        assert_eq!(removed, 4);
        for v in [0, 1, 2, 3] {
            assert!(!poisoned.graph().store().contains(v));
        }
        // Other components untouched.
        assert!(poisoned.graph().store().contains(4));
        assert!(poisoned.graph().store().contains(7));
        assert_eq!(poisoned.deleted_nodes(), 4);
        check(poisoned.graph().store());
    }

    #[test]
    fn del_poison_spares_a_single_survivor() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        // Pair component {7, 8}: delete 7, the lone survivor 8 stays.
        let removed = poisoned.del_poison_from(&[7]);
        assert_eq!(removed, 1);
        assert!(poisoned.graph().store().contains(8));
        assert!(poisoned.graph().store().isolated().contains(&8));
        check(poisoned.graph().store());
    }

    #[test]
    fn del_poison_sweeps_fragments_after_cut_vertex_removal() {
        // Star: 0 is a cut vertex between 1, 2, 3.
        let mut engine = GraphEngine::generate_with_seed(4, 0, GAMMA, 0).expect("generate");
        for v in [1, 2, 3] {
            engine.store_mut().insert_edge(0, v);
        }
        engine.store_mut().update_components();
        let mut poisoned = PoisonGraph::from_engine(engine);
        let removed = poisoned.del_poison_from(&[0]);
        // The three stranded leaves are separate fragments of the old
        // component; DFS from each survivor catches them all.
        assert_eq!(removed, 4);
        assert_eq!(poisoned.graph().store().node_count(), 0);
        check(poisoned.graph().store());
    }

    #[test]
    fn del_poison_scrubs_the_ledger() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        poisoned.ledger.initial_poison = vec![0, 4];
        poisoned.scan_poison(1);
        poisoned.del_poison_from(&[0]);
        assert!(!poisoned.initial_poison().contains(&0));
        assert!(poisoned.infected().iter().all(|&v| poisoned.graph().store().contains(v)));
        assert!(poisoned
            .principals()
            .iter()
            .all(|&v| poisoned.graph().store().contains(v)));
    }

    #[test]
    fn del_nodes_passthrough_scrubs_seeds() {
        let mut poisoned = PoisonGraph::from_engine(fixture());
        poisoned.ledger.initial_poison = vec![9];
        poisoned.del_nodes_from(&[9]);
        assert!(poisoned.initial_poison().is_empty());
        check(poisoned.graph().store());
    }
}
