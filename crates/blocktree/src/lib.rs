//! Replicated tree CRDT for outline documents.
//!
//! Independent sites concurrently edit a tree of nested ordered blocks
//! and converge to an identical structure without coordination. The
//! engine is a composition of small CRDTs:
//!
//! - [`VectorClock`]: per-site Lamport counters allocating and validating
//!   operation ids.
//! - [`List`](list::List): an RGA ordered sequence per parent, resolving
//!   concurrent sibling inserts deterministically.
//! - [`Tree`]: node registry plus an id-sorted moves log with undo/redo
//!   replay, rejecting cycles while accepting every operation.
//! - [`LwwRegister`]: a generic last-writer-wins slot for scalar fields.
//!
//! The structure is single-writer per instance: callers serialize all
//! mutating calls and read results through [`Tree::iter`]. Network
//! transport, persistence, and document diffing live outside this crate;
//! they drive the mutation API with a site id and ship operations between
//! replicas in whatever format suits them.

pub mod clock;
pub mod iter;
pub mod list;
pub mod lww;
pub mod tree;

pub use clock::{ClockError, OpId, SiteId, VectorClock};
pub use iter::Iter;
pub use list::{ListError, Position, PositionValue};
pub use lww::LwwRegister;
pub use tree::{MoveRecord, Node, PosRef, Tree, TreeError, ROOT_NODE_ID, TRASH_NODE_ID};

use rand::Rng;

/// Generates a random site id for a new replica.
pub fn generate_site_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:032x}", rng.gen::<u128>())
}

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
