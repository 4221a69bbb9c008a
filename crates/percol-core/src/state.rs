//! Exported state surface: plain serde structs the transport collaborator
//! serializes, and restoration back into live engines.
//!
//! The core produces and consumes one canonical shape — adjacency as a
//! mapping from node id to neighbour sequence. A collaborator receiving
//! looser wire forms (positional sequences, string keys) normalizes them
//! before handing state back here. Restoration adopts the provided
//! component partition without re-deriving it, but re-validates every
//! structural invariant first and refuses inconsistent state.

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::engine::GraphEngine;
use crate::error::{GraphError, Result};
use crate::poison::{PoisonGraph, PoisonLedger};
use crate::store::{GraphStore, NodeId};

/// The engine's public state, ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    /// Active nodes in insertion order.
    pub nodes: Vec<NodeId>,
    /// Undirected edges as `(lo, hi)` pairs.
    pub edges: Vec<(NodeId, NodeId)>,
    /// Adjacency mapping (canonical shape).
    pub adjacency: BTreeMap<NodeId, Vec<NodeId>>,
    /// The connected-nodes tally.
    pub connected_nodes: Vec<NodeId>,
    /// Isolated nodes.
    pub isolated: Vec<NodeId>,
    /// Components of size ≥ 2.
    pub components: Vec<Vec<NodeId>>,
    /// Next id the store would allocate.
    pub next_id: NodeId,
    /// Running deletion counter.
    pub deleted_nodes: u64,
    /// Shape parameter the engine was running with.
    pub gamma: f64,
}

/// [`GraphState`] plus containment bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoisonState {
    /// The wrapped engine's state.
    pub graph: GraphState,
    /// Poison seed nodes.
    pub initial_poison: Vec<NodeId>,
    /// Cumulative infected set.
    pub infected: Vec<NodeId>,
    /// Principal containment candidates.
    pub principals: Vec<NodeId>,
    /// Whether a scan has completed since the last seeding.
    pub scanned: bool,
}

impl GraphEngine {
    /// Snapshot the public state surface.
    #[must_use]
    pub fn export_state(&self) -> GraphState {
        let store = self.store();
        GraphState {
            nodes: store.nodes().to_vec(),
            edges: store.edges().to_vec(),
            adjacency: store
                .adjacency()
                .iter()
                .map(|(&v, list)| (v, list.clone()))
                .collect(),
            connected_nodes: store.connected_nodes().to_vec(),
            isolated: store.isolated().iter().copied().collect(),
            components: store.components().to_vec(),
            next_id: store.next_id(),
            deleted_nodes: store.deleted_nodes(),
            gamma: self.gamma(),
        }
    }

    /// Rehydrate an engine from exported state, entropy-seeded.
    ///
    /// Components are adopted as given (call
    /// [`GraphEngine::refresh_components`] to re-derive them); the state
    /// is validated before any mutation is accepted.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidParameter`] for a bad `gamma`;
    /// [`GraphError::InvariantViolation`] if the state is structurally
    /// inconsistent.
    pub fn restore(state: GraphState) -> Result<Self> {
        Self::restore_with_rng(state, StdRng::from_entropy())
    }

    /// Reproducible variant of [`GraphEngine::restore`].
    ///
    /// # Errors
    ///
    /// Same as [`GraphEngine::restore`].
    pub fn restore_with_seed(state: GraphState, seed: u64) -> Result<Self> {
        Self::restore_with_rng(state, StdRng::seed_from_u64(seed))
    }

    fn restore_with_rng(state: GraphState, rng: StdRng) -> Result<Self> {
        if !state.gamma.is_finite() || state.gamma < 1.0 {
            return Err(GraphError::InvalidParameter {
                what: "gamma",
                value: format!("{}", state.gamma),
            });
        }
        let isolated: BTreeSet<NodeId> = state.isolated.into_iter().collect();
        let store = GraphStore::from_parts(
            state.nodes,
            state.edges,
            state.adjacency.into_iter().collect(),
            state.connected_nodes,
            isolated,
            state.components,
            state.next_id,
            state.deleted_nodes,
        );
        store.check_invariants()?;
        Ok(Self::from_store(store, state.gamma, rng))
    }

    /// Re-derive the component partition from the current adjacency.
    pub fn refresh_components(&mut self) {
        self.store_mut().update_components();
    }
}

impl PoisonGraph {
    /// Snapshot the engine state plus the poison ledger.
    #[must_use]
    pub fn export_state(&self) -> PoisonState {
        let ledger = self.ledger();
        PoisonState {
            graph: self.graph().export_state(),
            initial_poison: ledger.initial_poison.clone(),
            infected: ledger.infected.clone(),
            principals: ledger.principals.clone(),
            scanned: ledger.scanned,
        }
    }

    /// Rehydrate a poison graph from exported state, entropy-seeded.
    ///
    /// # Errors
    ///
    /// Everything [`GraphEngine::restore`] rejects, plus
    /// [`GraphError::InvariantViolation`] when the poison lists reference
    /// non-active nodes or the seed list holds duplicates.
    pub fn restore(state: PoisonState) -> Result<Self> {
        let engine = GraphEngine::restore(state.graph)?;
        Self::restore_onto(engine, state.initial_poison, state.infected, state.principals, state.scanned)
    }

    /// Reproducible variant of [`PoisonGraph::restore`].
    ///
    /// # Errors
    ///
    /// Same as [`PoisonGraph::restore`].
    pub fn restore_with_seed(state: PoisonState, seed: u64) -> Result<Self> {
        let engine = GraphEngine::restore_with_seed(state.graph, seed)?;
        Self::restore_onto(engine, state.initial_poison, state.infected, state.principals, state.scanned)
    }

    fn restore_onto(
        engine: GraphEngine,
        initial_poison: Vec<NodeId>,
        infected: Vec<NodeId>,
        principals: Vec<NodeId>,
        scanned: bool,
    ) -> Result<Self> {
        let seed_set: BTreeSet<NodeId> = initial_poison.iter().copied().collect();
        if seed_set.len() != initial_poison.len() {
            return Err(GraphError::InvariantViolation(
                "duplicate poison seeds".to_owned(),
            ));
        }
        for (name, list) in [
            ("initial_poison", &initial_poison),
            ("infected", &infected),
            ("principals", &principals),
        ] {
            if let Some(&v) = list.iter().find(|&&v| !engine.store().contains(v)) {
                return Err(GraphError::InvariantViolation(format!(
                    "{name} references non-active node {v}"
                )));
            }
        }
        Ok(Self::from_parts(
            engine,
            PoisonLedger {
                initial_poison,
                infected,
                principals,
                scanned,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_the_partition() {
        let mut engine = GraphEngine::generate_with_seed(60, 150, 3.0, 9).expect("generate");
        engine.add_dynamic(10, 30);
        let before = engine.components_with_singletons();

        let json = serde_json::to_string(&engine.export_state()).expect("serialize");
        let state: GraphState = serde_json::from_str(&json).expect("deserialize");
        let restored = GraphEngine::restore(state).expect("restore");

        let sort = |mut partition: Vec<Vec<NodeId>>| {
            for c in &mut partition {
                c.sort_unstable();
            }
            partition.sort();
            partition
        };
        assert_eq!(sort(restored.components_with_singletons()), sort(before));
        restored.store().check_invariants().expect("invariants");
    }

    #[test]
    fn restored_engine_accepts_mutation() {
        let engine = GraphEngine::generate_with_seed(30, 60, 2.0, 4).expect("generate");
        let mut restored =
            GraphEngine::restore_with_seed(engine.export_state(), 5).expect("restore");
        restored.add_dynamic(5, 10);
        assert_eq!(restored.store().node_count(), 35);
        restored.store().check_invariants().expect("invariants");
    }

    #[test]
    fn restore_normalizes_edge_orientation() {
        let engine = GraphEngine::generate_with_seed(10, 20, 3.0, 2).expect("generate");
        let mut state = engine.export_state();
        for edge in &mut state.edges {
            *edge = (edge.1, edge.0);
        }
        let restored = GraphEngine::restore(state).expect("reversed pairs are normalized");
        restored.store().check_invariants().expect("invariants");
    }

    #[test]
    fn restore_rejects_tampered_state() {
        let engine = GraphEngine::generate_with_seed(20, 40, 3.0, 8).expect("generate");

        let mut missing_edge = engine.export_state();
        missing_edge.edges.pop();
        assert!(matches!(
            GraphEngine::restore(missing_edge),
            Err(GraphError::InvariantViolation(_))
        ));

        let mut bad_tally = engine.export_state();
        bad_tally.connected_nodes.push(0);
        assert!(GraphEngine::restore(bad_tally).is_err());

        let mut bad_next_id = engine.export_state();
        bad_next_id.next_id = 0;
        assert!(GraphEngine::restore(bad_next_id).is_err());

        let mut bad_gamma = engine.export_state();
        bad_gamma.gamma = 0.0;
        assert!(matches!(
            GraphEngine::restore(bad_gamma),
            Err(GraphError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn poison_round_trip_keeps_the_ledger() {
        let mut poisoned =
            PoisonGraph::generate_with_seed(40, 80, 6, 3.0, 12).expect("generate");
        poisoned.scan_poison(2);

        let json = serde_json::to_string(&poisoned.export_state()).expect("serialize");
        let state: PoisonState = serde_json::from_str(&json).expect("deserialize");
        let restored = PoisonGraph::restore(state).expect("restore");

        assert_eq!(restored.initial_poison(), poisoned.initial_poison());
        assert_eq!(restored.infected(), poisoned.infected());
        assert_eq!(restored.principals(), poisoned.principals());
        assert_eq!(restored.deleted_nodes(), poisoned.deleted_nodes());
    }

    #[test]
    fn poison_restore_rejects_stale_seeds() {
        let poisoned = PoisonGraph::generate_with_seed(15, 20, 3, 3.0, 1).expect("generate");
        let mut state = poisoned.export_state();
        state.initial_poison.push(9_999);
        assert!(matches!(
            PoisonGraph::restore(state),
            Err(GraphError::InvariantViolation(_))
        ));
    }
}
