//! Mutable graph state: nodes, undirected edges, adjacency, and the
//! bookkeeping the engine's invariants rest on.
//!
//! # Overview
//!
//! [`GraphStore`] holds the active node set, the edge list (one entry per
//! undirected edge, normalized `(lo, hi)`), a symmetric adjacency map, the
//! connected-nodes tally (the multiset of all adjacency entries — its
//! length must always equal twice the edge count), the isolated-node set,
//! and the connected-component partition.
//!
//! The store exposes low-level mutation primitives (`push_node`,
//! `insert_edge`, `remove_node`) and derivations (`update_components`,
//! `dfs_collect`). Policy — which edges to sample, which nodes to delete,
//! when to recompute the partition — lives in [`crate::engine`] and
//! [`crate::poison`].
//!
//! ## Component bookkeeping
//!
//! Only components of size ≥ 2 are stored; isolated nodes are tracked in
//! their own set for O(1) lookup and surfaced as singleton sets by
//! [`GraphStore::components_with_singletons`]. `remove_node` deliberately
//! leaves the stored partition stale — callers decide when to recompute,
//! and the containment cascade relies on reading the pre-removal snapshot.
//!
//! ## Consistency
//!
//! [`GraphStore::check_invariants`] re-derives every relationship between
//! the fields, including an independent union-find over the edge list to
//! cross-check the stored partition. Any mismatch surfaces as
//! [`GraphError::InvariantViolation`]; nothing is silently patched.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::unionfind::UnionFind;

use crate::error::{GraphError, Result};

/// Node identifier. Allocated from a monotonic counter; ids of removed
/// nodes are never reused. Dense ids are not required.
pub type NodeId = u64;

/// Normalize an undirected edge to `(lo, hi)` form.
#[must_use]
pub fn edge_key(u: NodeId, v: NodeId) -> (NodeId, NodeId) {
    if u < v { (u, v) } else { (v, u) }
}

/// The mutable node/edge/adjacency state plus component bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    /// Active nodes in insertion order.
    nodes: Vec<NodeId>,
    /// Membership index for `nodes`.
    node_set: HashSet<NodeId>,
    /// Undirected edges, one `(lo, hi)` entry each.
    edges: Vec<(NodeId, NodeId)>,
    /// Duplicate-edge index for `edges`.
    edge_set: HashSet<(NodeId, NodeId)>,
    /// Symmetric adjacency; every active node has an entry.
    adjacency: HashMap<NodeId, Vec<NodeId>>,
    /// Multiset of all adjacency entries. Length == 2 × edge count.
    connected_nodes: Vec<NodeId>,
    /// Active nodes with empty adjacency.
    isolated: BTreeSet<NodeId>,
    /// Connected components of size ≥ 2. May be stale between
    /// `remove_node` and the next `update_components`.
    components: Vec<Vec<NodeId>>,
    /// Next id to hand out.
    next_id: NodeId,
    /// Running count of nodes removed by deletion operations.
    deleted_nodes: u64,
}

impl GraphStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- accessors ----------------------------------------------------------

    /// Active nodes, in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of active nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Undirected edges as normalized `(lo, hi)` pairs.
    #[must_use]
    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether `id` is currently active.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node_set.contains(&id)
    }

    /// Neighbour list for `id`, if active.
    #[must_use]
    pub fn neighbours(&self, id: NodeId) -> Option<&[NodeId]> {
        self.adjacency.get(&id).map(Vec::as_slice)
    }

    /// Degree of `id` (0 for unknown ids).
    #[must_use]
    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency.get(&id).map_or(0, Vec::len)
    }

    /// Full adjacency mapping.
    #[must_use]
    pub fn adjacency(&self) -> &HashMap<NodeId, Vec<NodeId>> {
        &self.adjacency
    }

    /// The connected-nodes tally: every adjacency entry, flattened.
    /// Its length equals twice the edge count and the sum of all degrees;
    /// an entry appears once per incident edge, so sampling uniformly from
    /// it is sampling nodes proportionally to degree.
    #[must_use]
    pub fn connected_nodes(&self) -> &[NodeId] {
        &self.connected_nodes
    }

    /// Active nodes with no incident edges.
    #[must_use]
    pub fn isolated(&self) -> &BTreeSet<NodeId> {
        &self.isolated
    }

    /// Stored components of size ≥ 2. Stale until the next
    /// [`GraphStore::update_components`] after a removal.
    #[must_use]
    pub fn components(&self) -> &[Vec<NodeId>] {
        &self.components
    }

    /// The full partition: stored components plus one singleton set per
    /// isolated node.
    #[must_use]
    pub fn components_with_singletons(&self) -> Vec<Vec<NodeId>> {
        let mut all = self.components.clone();
        all.extend(self.isolated.iter().map(|&v| vec![v]));
        all
    }

    /// Next id the store would allocate.
    #[must_use]
    pub const fn next_id(&self) -> NodeId {
        self.next_id
    }

    /// Nodes removed by deletion operations since creation.
    #[must_use]
    pub const fn deleted_nodes(&self) -> u64 {
        self.deleted_nodes
    }

    // -- mutation primitives ------------------------------------------------

    /// Allocate and activate a fresh node with empty adjacency.
    pub fn push_node(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push(id);
        self.node_set.insert(id);
        self.adjacency.insert(id, Vec::new());
        self.isolated.insert(id);
        id
    }

    /// Insert the undirected edge `(u, v)`.
    ///
    /// Returns `false` without mutating anything if the edge would be a
    /// self-loop or a duplicate, or if either endpoint is not active.
    pub fn insert_edge(&mut self, u: NodeId, v: NodeId) -> bool {
        if u == v || !self.contains(u) || !self.contains(v) {
            return false;
        }
        let key = edge_key(u, v);
        if !self.edge_set.insert(key) {
            return false;
        }
        self.edges.push(key);
        if let Some(list) = self.adjacency.get_mut(&u) {
            list.push(v);
        }
        if let Some(list) = self.adjacency.get_mut(&v) {
            list.push(u);
        }
        self.connected_nodes.push(u);
        self.connected_nodes.push(v);
        self.isolated.remove(&u);
        self.isolated.remove(&v);
        true
    }

    /// Remove `id` and every incident edge.
    ///
    /// Neighbours losing their last edge are demoted to the isolated set.
    /// Returns `false` (a no-op) if `id` is not active, so removal is
    /// idempotent by identifier. The stored component partition is left
    /// untouched; callers recompute when their operation completes.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if !self.node_set.remove(&id) {
            return false;
        }
        let neighbours = self.adjacency.remove(&id).unwrap_or_default();
        // Every tally entry naming `id` belongs to one of its edges.
        self.connected_nodes.retain(|&n| n != id);
        for n in neighbours {
            if let Some(list) = self.adjacency.get_mut(&n) {
                list.retain(|&w| w != id);
                if list.is_empty() {
                    self.isolated.insert(n);
                }
            }
            if let Some(pos) = self.connected_nodes.iter().position(|&w| w == n) {
                self.connected_nodes.swap_remove(pos);
            }
            let key = edge_key(id, n);
            self.edge_set.remove(&key);
            if let Some(pos) = self.edges.iter().position(|&e| e == key) {
                self.edges.swap_remove(pos);
            }
        }
        if let Some(pos) = self.nodes.iter().position(|&v| v == id) {
            self.nodes.remove(pos);
        }
        self.isolated.remove(&id);
        self.deleted_nodes += 1;
        true
    }

    // -- derivations --------------------------------------------------------

    /// Recompute the component partition from the current adjacency.
    ///
    /// Iterative BFS over every connected node; isolated nodes stay in
    /// their own set and do not appear in the stored components.
    pub fn update_components(&mut self) {
        let mut components = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::with_capacity(self.nodes.len());
        for &start in &self.nodes {
            if self.degree(start) == 0 || visited.contains(&start) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            visited.insert(start);
            while let Some(v) = queue.pop_front() {
                component.push(v);
                if let Some(list) = self.adjacency.get(&v) {
                    for &n in list {
                        if visited.insert(n) {
                            queue.push_back(n);
                        }
                    }
                }
            }
            components.push(component);
        }
        self.components = components;
    }

    /// Enumerate every node reachable from any of `roots` over the current
    /// adjacency, using an explicit-stack depth-first traversal. Roots that
    /// are no longer active are skipped; disconnected fragments are covered
    /// by seeding the stack from each unvisited root in turn.
    #[must_use]
    pub fn dfs_collect(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut collected = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        for &root in roots {
            if !self.contains(root) || !visited.insert(root) {
                continue;
            }
            stack.push(root);
            while let Some(v) = stack.pop() {
                collected.push(v);
                if let Some(list) = self.adjacency.get(&v) {
                    for &n in list {
                        if visited.insert(n) {
                            stack.push(n);
                        }
                    }
                }
            }
        }
        collected
    }

    // -- restoration --------------------------------------------------------

    /// Rebuild a store from exported state.
    ///
    /// Edge pairs are normalized to `(lo, hi)`; everything else is adopted
    /// as given — [`GraphStore::check_invariants`] is the gatekeeper and is
    /// run by the engine-level restore before the store accepts mutations.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        nodes: Vec<NodeId>,
        edges: Vec<(NodeId, NodeId)>,
        adjacency: HashMap<NodeId, Vec<NodeId>>,
        connected_nodes: Vec<NodeId>,
        isolated: BTreeSet<NodeId>,
        components: Vec<Vec<NodeId>>,
        next_id: NodeId,
        deleted_nodes: u64,
    ) -> Self {
        let edges: Vec<(NodeId, NodeId)> =
            edges.into_iter().map(|(u, v)| edge_key(u, v)).collect();
        let node_set = nodes.iter().copied().collect();
        let edge_set = edges.iter().copied().collect();
        Self {
            nodes,
            node_set,
            edges,
            edge_set,
            adjacency,
            connected_nodes,
            isolated,
            components,
            next_id,
            deleted_nodes,
        }
    }

    // -- invariants ---------------------------------------------------------

    /// Verify every structural invariant of the store.
    ///
    /// Checks, in order: node uniqueness and id headroom, edge
    /// normalization and endpoint liveness, adjacency symmetry and
    /// edge-set consistency, the tally multiset, the isolated set, and the
    /// stored partition (cross-checked against an independent union-find
    /// over the edge list).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvariantViolation`] describing the first
    /// inconsistency found.
    pub fn check_invariants(&self) -> Result<()> {
        if self.nodes.len() != self.node_set.len() {
            return Err(violation("duplicate ids in the active node list"));
        }
        if let Some(&max) = self.nodes.iter().max() {
            if self.next_id <= max {
                return Err(violation(format!(
                    "next_id {} would reuse an active id (max {max})",
                    self.next_id
                )));
            }
        }
        if self.edges.len() != self.edge_set.len() {
            return Err(violation("duplicate entries in the edge list"));
        }
        for &(u, v) in &self.edges {
            if u >= v {
                return Err(violation(format!("edge ({u}, {v}) is not normalized")));
            }
            if !self.contains(u) || !self.contains(v) {
                return Err(violation(format!(
                    "edge ({u}, {v}) references a non-active node"
                )));
            }
        }
        self.check_adjacency()?;
        self.check_tally()?;
        self.check_isolated()?;
        self.check_partition()
    }

    fn check_adjacency(&self) -> Result<()> {
        if self.adjacency.len() != self.nodes.len() {
            return Err(violation(format!(
                "adjacency has {} entries for {} active nodes",
                self.adjacency.len(),
                self.nodes.len()
            )));
        }
        for (&v, list) in &self.adjacency {
            if !self.contains(v) {
                return Err(violation(format!("adjacency entry for non-active node {v}")));
            }
            let mut seen = HashSet::with_capacity(list.len());
            for &n in list {
                if n == v {
                    return Err(violation(format!("self-loop in adjacency of {v}")));
                }
                if !seen.insert(n) {
                    return Err(violation(format!("duplicate neighbour {n} for {v}")));
                }
                if !self.edge_set.contains(&edge_key(v, n)) {
                    return Err(violation(format!(
                        "adjacency pair ({v}, {n}) has no edge entry"
                    )));
                }
            }
        }
        // Edge ⇒ adjacency direction; together with the loop above this
        // gives symmetry (u ∈ adj(v) ⇔ v ∈ adj(u) ⇔ edge exists).
        for &(u, v) in &self.edges {
            let u_has_v = self.adjacency.get(&u).is_some_and(|l| l.contains(&v));
            let v_has_u = self.adjacency.get(&v).is_some_and(|l| l.contains(&u));
            if !u_has_v || !v_has_u {
                return Err(violation(format!(
                    "edge ({u}, {v}) missing from adjacency"
                )));
            }
        }
        Ok(())
    }

    fn check_tally(&self) -> Result<()> {
        let degree_sum: usize = self.adjacency.values().map(Vec::len).sum();
        if self.connected_nodes.len() != 2 * self.edges.len()
            || self.connected_nodes.len() != degree_sum
        {
            return Err(violation(format!(
                "tally length {} != 2 × {} edges (degree sum {degree_sum})",
                self.connected_nodes.len(),
                self.edges.len()
            )));
        }
        let mut counts: HashMap<NodeId, i64> = HashMap::new();
        for &v in &self.connected_nodes {
            *counts.entry(v).or_insert(0) += 1;
        }
        for (&v, list) in &self.adjacency {
            *counts.entry(v).or_insert(0) -= i64::try_from(list.len()).unwrap_or(i64::MAX);
        }
        if counts.values().any(|&c| c != 0) {
            return Err(violation(
                "tally multiset does not match the adjacency entries",
            ));
        }
        Ok(())
    }

    fn check_isolated(&self) -> Result<()> {
        for &v in &self.isolated {
            if !self.contains(v) {
                return Err(violation(format!("isolated set holds non-active node {v}")));
            }
            if self.degree(v) != 0 {
                return Err(violation(format!(
                    "node {v} is in the isolated set but has degree {}",
                    self.degree(v)
                )));
            }
        }
        let zero_degree = self.nodes.iter().filter(|&&v| self.degree(v) == 0).count();
        if zero_degree != self.isolated.len() {
            return Err(violation(format!(
                "{zero_degree} zero-degree nodes but {} in the isolated set",
                self.isolated.len()
            )));
        }
        Ok(())
    }

    /// Cross-check the stored partition against an independent union-find
    /// over the edge list.
    fn check_partition(&self) -> Result<()> {
        let index: HashMap<NodeId, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, &v)| (v, i))
            .collect();
        let mut uf: UnionFind<usize> = UnionFind::new(self.nodes.len());
        for &(u, v) in &self.edges {
            uf.union(index[&u], index[&v]);
        }
        let mut classes: HashMap<usize, BTreeSet<NodeId>> = HashMap::new();
        for &v in &self.nodes {
            if self.degree(v) > 0 {
                classes.entry(uf.find(index[&v])).or_default().insert(v);
            }
        }
        let expected: HashSet<BTreeSet<NodeId>> = classes.into_values().collect();
        let stored: HashSet<BTreeSet<NodeId>> = self
            .components
            .iter()
            .map(|c| c.iter().copied().collect())
            .collect();
        if stored.len() != self.components.len() {
            return Err(violation("duplicate stored components"));
        }
        if stored != expected {
            return Err(violation(format!(
                "stored partition ({} components) disagrees with union-find ({})",
                stored.len(),
                expected.len()
            )));
        }
        Ok(())
    }
}

fn violation(msg: impl Into<String>) -> GraphError {
    GraphError::InvariantViolation(msg.into())
}
