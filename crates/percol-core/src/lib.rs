#![forbid(unsafe_code)]
//! percol-core: a dynamically mutable graph whose degree and
//! component-size distributions follow a power law, with an
//! epidemic-containment ("poison") extension on top.
//!
//! # Layout
//!
//! - [`store`] — the mutable node/edge/adjacency state and its invariants.
//! - [`engine`] — generation, dynamic add/delete, BFS, components.
//! - [`poison`] — seeding, infection scan, principal selection, cascading
//!   containment removal.
//! - [`state`] — the serializable state surface and restoration.
//!
//! # Conventions
//!
//! - **Errors**: [`GraphError`] via `thiserror`; deletion by id is a
//!   no-op for absent ids, everything else fails fast.
//! - **Logging**: `tracing` macros; operations are `#[instrument]`ed.
//! - **Concurrency**: engines are plain owned values with no internal
//!   locking. A caller wanting to share one across tasks must serialize
//!   access (single-owner checkout); every operation runs to completion
//!   and leaves the store consistent, so multi-step growth can be
//!   cancelled between calls.

pub mod engine;
pub mod error;
pub mod poison;
pub mod state;
pub mod store;

pub use engine::{BfsTree, BfsVisit, GraphEngine, MAX_SAMPLE_MISSES};
pub use error::{GraphError, Result};
pub use poison::PoisonGraph;
pub use state::{GraphState, PoisonState};
pub use store::{GraphStore, NodeId};
