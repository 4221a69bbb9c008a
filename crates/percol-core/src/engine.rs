//! Graph engine: power-law generation, dynamic mutation, and traversal.
//!
//! # Overview
//!
//! [`GraphEngine`] owns a [`GraphStore`], the shape parameter `gamma`, and
//! a seedable RNG. Generation and [`GraphEngine::add_dynamic`] sample
//! edges with a degree-biased policy; [`GraphEngine::del_nodes_from`]
//! removes nodes and prunes the trivial fragments the removal leaves
//! behind. Every operation runs to completion and leaves the store with a
//! fresh component partition, so a caller streaming "grow to N in steps of
//! K" as repeated `add_dynamic` calls can stop between calls without
//! observing a half-applied step.
//!
//! ## Edge sampling
//!
//! Each endpoint is drawn independently: with probability `1 − 1/gamma`
//! uniformly from the connected-nodes tally (where a node appears once per
//! incident edge, so the draw is proportional to current degree), and
//! otherwise uniformly from all active nodes. Preferential attachment of
//! this kind yields the heavy-tailed degree distribution; raising `gamma`
//! strengthens the bias, concentrating edges on a small hub set and
//! pulling the component-size distribution the opposite way. Candidate
//! edges that would be self-loops or duplicates are rejected and redrawn;
//! sampling stops at the edge budget or after
//! [`MAX_SAMPLE_MISSES`] consecutive rejections.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument};

use crate::error::{GraphError, Result};
use crate::store::{GraphStore, NodeId};

/// Consecutive rejected samples after which edge sampling concludes that
/// no further valid edge is likely (budget left unspent).
pub const MAX_SAMPLE_MISSES: u32 = 512;

/// Breadth-first traversal record for one visited node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BfsVisit {
    /// Predecessor on a shortest path from the start (`None` at the start).
    pub parent: Option<NodeId>,
    /// Unweighted distance from the start.
    pub distance: u32,
}

/// Result of a breadth-first search: every node reachable from the start,
/// with parent pointers and distances for shortest-path reconstruction.
#[derive(Debug, Clone)]
pub struct BfsTree {
    start: NodeId,
    visits: HashMap<NodeId, BfsVisit>,
}

impl BfsTree {
    /// The traversal's start node.
    #[must_use]
    pub const fn start(&self) -> NodeId {
        self.start
    }

    /// Visited nodes mapped to their parent/distance records.
    #[must_use]
    pub fn visits(&self) -> &HashMap<NodeId, BfsVisit> {
        &self.visits
    }

    /// Number of nodes reached (including the start).
    #[must_use]
    pub fn reached(&self) -> usize {
        self.visits.len()
    }

    /// Distance from the start to `id`, if reached.
    #[must_use]
    pub fn distance(&self, id: NodeId) -> Option<u32> {
        self.visits.get(&id).map(|v| v.distance)
    }

    /// Reconstruct the shortest unweighted path from the start to
    /// `target`, inclusive of both endpoints. `None` if unreached.
    #[must_use]
    pub fn path_to(&self, target: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![target];
        let mut cursor = self.visits.get(&target)?;
        while let Some(parent) = cursor.parent {
            path.push(parent);
            cursor = self.visits.get(&parent)?;
        }
        path.reverse();
        Some(path)
    }
}

/// Generation, dynamic add/delete, and traversal over a [`GraphStore`].
#[derive(Debug, Clone)]
pub struct GraphEngine {
    store: GraphStore,
    gamma: f64,
    rng: StdRng,
}

impl GraphEngine {
    /// Generate a graph with `node_count` nodes and up to `edge_budget`
    /// degree-biased edges, seeding the RNG from entropy.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidParameter`] if `gamma` is non-finite or below
    /// 1.0. (Counts are unsigned, so negative inputs are unrepresentable.)
    pub fn generate(node_count: usize, edge_budget: usize, gamma: f64) -> Result<Self> {
        Self::build(node_count, edge_budget, gamma, StdRng::from_entropy())
    }

    /// Reproducible variant of [`GraphEngine::generate`].
    ///
    /// # Errors
    ///
    /// Same as [`GraphEngine::generate`].
    pub fn generate_with_seed(
        node_count: usize,
        edge_budget: usize,
        gamma: f64,
        seed: u64,
    ) -> Result<Self> {
        Self::build(node_count, edge_budget, gamma, StdRng::seed_from_u64(seed))
    }

    #[instrument(skip(rng))]
    fn build(node_count: usize, edge_budget: usize, gamma: f64, rng: StdRng) -> Result<Self> {
        validate_gamma(gamma)?;
        let mut engine = Self {
            store: GraphStore::new(),
            gamma,
            rng,
        };
        for _ in 0..node_count {
            engine.store.push_node();
        }
        let added = engine.sample_edges(edge_budget);
        engine.store.update_components();
        debug!(
            nodes = node_count,
            edges = added,
            components = engine.store.components().len(),
            "generated graph"
        );
        Ok(engine)
    }

    /// Adopt an already-populated store (used by state restoration).
    pub(crate) fn from_store(store: GraphStore, gamma: f64, rng: StdRng) -> Self {
        Self { store, gamma, rng }
    }

    // -- read surface -------------------------------------------------------

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// The shape parameter the edge sampler runs with.
    #[must_use]
    pub const fn gamma(&self) -> f64 {
        self.gamma
    }

    /// The full component partition, isolated nodes as singletons.
    #[must_use]
    pub fn components_with_singletons(&self) -> Vec<Vec<NodeId>> {
        self.store.components_with_singletons()
    }

    pub(crate) fn store_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    // -- mutation -----------------------------------------------------------

    /// Append `add_node_count` fresh nodes (ids continue the sequence),
    /// then sample up to `add_edge_budget` new edges across the union of
    /// old and new nodes. Returns the number of edges actually added.
    #[instrument(skip(self))]
    pub fn add_dynamic(&mut self, add_node_count: usize, add_edge_budget: usize) -> usize {
        for _ in 0..add_node_count {
            self.store.push_node();
        }
        let added = self.sample_edges(add_edge_budget);
        self.store.update_components();
        debug!(
            nodes = self.store.node_count(),
            added_edges = added,
            "dynamic add complete"
        );
        added
    }

    /// Remove every currently-active id in `nodes`, then prune the trivial
    /// fragments: any node left isolated by the removal that was connected
    /// before the call — the sole survivor of a fragmented component — is
    /// removed as well. Ids not in the active set are silently ignored.
    ///
    /// Returns the total number of nodes removed (both phases); the
    /// store's deletion counter accumulates the same amount.
    #[instrument(skip(self, nodes), fields(requested = nodes.len()))]
    pub fn del_nodes_from(&mut self, nodes: &[NodeId]) -> usize {
        let was_isolated: BTreeSet<NodeId> = self.store.isolated().clone();
        let mut removed = 0;
        for &v in nodes {
            if self.store.remove_node(v) {
                removed += 1;
            }
        }
        let stranded: Vec<NodeId> = self
            .store
            .isolated()
            .iter()
            .copied()
            .filter(|v| !was_isolated.contains(v))
            .collect();
        for v in stranded {
            if self.store.remove_node(v) {
                removed += 1;
            }
        }
        self.store.update_components();
        debug!(removed, remaining = self.store.node_count(), "deletion complete");
        removed
    }

    // -- traversal ----------------------------------------------------------

    /// Iterative breadth-first search from `start`.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownNode`] if `start` is not active.
    pub fn bfs(&self, start: NodeId) -> Result<BfsTree> {
        if !self.store.contains(start) {
            return Err(GraphError::UnknownNode(start));
        }
        let mut visits = HashMap::new();
        visits.insert(
            start,
            BfsVisit {
                parent: None,
                distance: 0,
            },
        );
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(v) = queue.pop_front() {
            let distance = visits[&v].distance;
            if let Some(list) = self.store.neighbours(v) {
                for &n in list {
                    if !visits.contains_key(&n) {
                        visits.insert(
                            n,
                            BfsVisit {
                                parent: Some(v),
                                distance: distance + 1,
                            },
                        );
                        queue.push_back(n);
                    }
                }
            }
        }
        Ok(BfsTree { start, visits })
    }

    // -- sampling -----------------------------------------------------------

    /// Sample up to `budget` degree-biased edges into the store. Stops
    /// early after [`MAX_SAMPLE_MISSES`] consecutive invalid candidates.
    fn sample_edges(&mut self, budget: usize) -> usize {
        let bias = 1.0 - self.gamma.recip();
        let mut added = 0;
        let mut misses = 0;
        while added < budget && misses < MAX_SAMPLE_MISSES {
            let (Some(u), Some(v)) = (self.sample_endpoint(bias), self.sample_endpoint(bias))
            else {
                break;
            };
            if self.store.insert_edge(u, v) {
                added += 1;
                misses = 0;
            } else {
                misses += 1;
            }
        }
        added
    }

    /// Draw one endpoint: degree-proportionally from the tally with
    /// probability `bias`, uniformly from all active nodes otherwise.
    fn sample_endpoint(&mut self, bias: f64) -> Option<NodeId> {
        if !self.store.connected_nodes().is_empty() && self.rng.gen_bool(bias) {
            self.store.connected_nodes().choose(&mut self.rng).copied()
        } else {
            self.store.nodes().choose(&mut self.rng).copied()
        }
    }
}

fn validate_gamma(gamma: f64) -> Result<()> {
    if !gamma.is_finite() || gamma < 1.0 {
        return Err(GraphError::InvalidParameter {
            what: "gamma",
            value: format!("{gamma}"),
        });
    }
    Ok(())
}
