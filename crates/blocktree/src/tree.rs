//! Tree CRDT with ordered siblings and support for moves.
//!
//! Nodes are registered once and then repositioned; sibling order inside
//! each parent is delegated to a per-parent [`List`], and a node is
//! "linked" to one live position at a time. Deletion moves a node under
//! the reserved trash parent, so its identity and children survive for a
//! later resurrecting move.
//!
//! Concurrent and out-of-order moves follow Kleppmann's replicated-tree
//! approach (<https://martin.kleppmann.com/papers/move-op.pdf>): every
//! move is kept in an id-sorted log together with the position it
//! displaced. Integrating an operation older than the newest log entry
//! undoes all newer moves, splices the incoming one into sorted order,
//! applies it, and redoes the rest — reproducing exactly the state of
//! in-order delivery. A move that would make a node its own ancestor is
//! accepted into the clock and the log but never linked, so the visible
//! tree stays acyclic on every replica.

use crate::clock::{ClockError, OpId, VectorClock};
use crate::iter::Iter;
use crate::list::{List, ListError, Position, ROOT_SLOT};
use std::collections::HashMap;
use thiserror::Error;

/// Reserved parent id of the visible subtree. Never a real node id.
pub const ROOT_NODE_ID: &str = "$ROOT$";

/// Reserved parent id under which deleted nodes are parked.
pub const TRASH_NODE_ID: &str = "$TRASH$";

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("node {0} already exists")]
    DuplicateNode(String),
    #[error("node {0} is not in the tree")]
    NodeNotFound(String),
    #[error("subtree {parent} does not have child {child}")]
    NotChild { parent: String, child: String },
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    List(#[from] ListError),
}

/// Reference to one position inside one parent's sibling list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosRef {
    pub(crate) list: String,
    pub(crate) slot: u32,
}

impl PosRef {
    /// Id of the parent node whose list holds the position.
    pub fn list_id(&self) -> &str {
        &self.list
    }
}

/// A registered node of the tree.
#[derive(Debug, Clone)]
pub struct Node {
    op_id: OpId,
    id: String,
    pub(crate) pos: Option<PosRef>,
}

impl Node {
    /// Id of the operation that first registered the node.
    pub fn op_id(&self) -> &OpId {
        &self.op_id
    }

    pub fn node_id(&self) -> &str {
        &self.id
    }

    /// Current live position, if the node is linked anywhere at all.
    pub fn position(&self) -> Option<&PosRef> {
        self.pos.as_ref()
    }

    /// Id of the parent currently containing the node.
    pub fn parent_id(&self) -> Option<&str> {
        self.pos.as_ref().map(|p| p.list.as_str())
    }
}

/// One entry of the id-sorted moves log. `old_position` is the inverse
/// needed to undo the move during out-of-order replay.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    id: OpId,
    node_id: String,
    parent_id: String,
    left_ref: OpId,
    old_position: Option<PosRef>,
}

impl MoveRecord {
    pub fn id(&self) -> &OpId {
        &self.id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    /// The causal anchor the move was produced against.
    pub fn left_ref(&self) -> &OpId {
        &self.left_ref
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) lists: HashMap<String, List>,
    clock: VectorClock,
    moves_log: Vec<MoveRecord>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let mut lists = HashMap::new();
        lists.insert(ROOT_NODE_ID.to_string(), List::new(ROOT_NODE_ID));
        lists.insert(TRASH_NODE_ID.to_string(), List::new(TRASH_NODE_ID));
        Self {
            nodes: HashMap::new(),
            lists,
            clock: VectorClock::new(),
            moves_log: Vec::new(),
        }
    }

    /// Allocates a fresh operation id for `site` without recording it.
    /// Used by reconcilers that need the id of an operation before
    /// integrating it (for example to ship it to other sites).
    pub fn new_id(&self, site: &str) -> OpId {
        self.clock.new_id(site)
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// The id-sorted moves log.
    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves_log
    }

    /// Resolves a position reference.
    pub fn position(&self, pos: &PosRef) -> Option<&Position> {
        self.lists.get(&pos.list).map(|l| l.position(pos.slot))
    }

    /// Registers a new node at the given position. Fails with
    /// [`TreeError::DuplicateNode`] if `node_id` is already in the tree.
    pub fn create_node(
        &mut self,
        site: &str,
        node_id: &str,
        parent_id: &str,
        left_ref: &OpId,
    ) -> Result<(), TreeError> {
        if node_id.is_empty() {
            return Err(TreeError::InvalidOperation(
                "node id must not be empty".to_string(),
            ));
        }
        if self.nodes.contains_key(node_id) {
            return Err(TreeError::DuplicateNode(node_id.to_string()));
        }
        let id = self.new_id(site);
        self.integrate(id, node_id, parent_id, left_ref)
    }

    /// Moves an existing node to a new position. If the node is already
    /// where it should be, no operation is produced.
    pub fn move_node(
        &mut self,
        site: &str,
        node_id: &str,
        parent_id: &str,
        left_ref: &OpId,
    ) -> Result<(), TreeError> {
        if node_id.is_empty() {
            return Err(TreeError::InvalidOperation(
                "node id must not be empty".to_string(),
            ));
        }
        if !self.nodes.contains_key(node_id) {
            return Err(TreeError::NodeNotFound(node_id.to_string()));
        }
        let parent_id = normalize_parent(parent_id);
        if self.already_in_place(parent_id, left_ref, node_id) {
            return Ok(());
        }
        let id = self.new_id(site);
        self.integrate(id, node_id, parent_id, left_ref)
    }

    /// Moves the node under the trash parent. The node stays known to the
    /// tree; moving it elsewhere later resurrects it with its children.
    pub fn delete_node(&mut self, site: &str, node_id: &str) -> Result<(), TreeError> {
        self.move_node(site, node_id, TRASH_NODE_ID, &OpId::list_end())
    }

    /// Positions a node in terms of node ids: the parent and the left
    /// sibling node (empty string places at the head of the parent's
    /// children). Creates the node if it does not exist yet.
    pub fn set_node_position(
        &mut self,
        site: &str,
        node_id: &str,
        parent_id: &str,
        left_node: &str,
    ) -> Result<(), TreeError> {
        let parent_id = normalize_parent(parent_id);
        let left = self.find_child_position(parent_id, left_node)?;
        let left_ref = match self.position(&left) {
            Some(pos) => pos.id().clone(),
            None => OpId::list_start(),
        };
        if self.already_in_place(parent_id, &left_ref, node_id) {
            return Ok(());
        }
        let id = self.new_id(site);
        self.integrate(id, node_id, parent_id, &left_ref)
    }

    /// Integrates a move operation carrying its original id. This is the
    /// entry point for operations received from other sites; the local
    /// convenience methods above all funnel into it. Unknown nodes are
    /// registered lazily: creation and move are the same operation kind.
    ///
    /// The caller must guarantee that the operation's causal anchor has
    /// already been integrated; otherwise the call fails with a not-found
    /// error and may be retried once the anchor arrives.
    pub fn integrate(
        &mut self,
        id: OpId,
        node_id: &str,
        parent_id: &str,
        left_ref: &OpId,
    ) -> Result<(), TreeError> {
        let parent_id = normalize_parent(parent_id);
        if node_id.is_empty() {
            return Err(TreeError::InvalidOperation(
                "node id must not be empty".to_string(),
            ));
        }
        if node_id == parent_id {
            return Err(TreeError::InvalidOperation(format!(
                "cannot move node {node_id} under itself"
            )));
        }

        let anchor = self.subtree_mut(parent_id)?.find_slot(left_ref)?;

        if !self.nodes.contains_key(node_id) {
            self.nodes.insert(
                node_id.to_string(),
                Node {
                    op_id: id.clone(),
                    id: node_id.to_string(),
                    pos: None,
                },
            );
        }

        // The clock advances before the ancestorship check on purpose:
        // a cycle-forming move still allocates its position and occupies
        // its slot in the log on every replica, it just never links.
        self.clock.track(&id)?;

        let record = MoveRecord {
            id: id.clone(),
            node_id: node_id.to_string(),
            parent_id: parent_id.to_string(),
            left_ref: left_ref.clone(),
            old_position: self.nodes[node_id].pos.clone(),
        };

        let list = self
            .lists
            .get_mut(parent_id)
            .expect("subtree resolved above");
        let slot = list.integrate(id, anchor, node_id.to_string())?;
        let pos = PosRef {
            list: parent_id.to_string(),
            slot,
        };

        let count = self.moves_log.len();
        if count == 0 || self.moves_log[count - 1].id < record.id {
            self.moves_log.push(record);
            self.do_move(node_id, pos);
            return Ok(());
        }

        // Late arrival: undo everything newer, splice, apply, redo.
        let mut dest = 0;
        for i in (0..count).rev() {
            if self.moves_log[i].id < record.id {
                dest = i + 1;
                break;
            }
            self.undo_move(i);
        }

        self.moves_log.insert(dest, record);
        self.do_move(node_id, pos);

        for i in dest + 1..self.moves_log.len() {
            self.redo_move(i);
        }

        Ok(())
    }

    /// Current position of a node, or `None` when the node is registered
    /// but not linked anywhere.
    pub fn find_node_position(&self, node_id: &str) -> Result<Option<&PosRef>, TreeError> {
        if node_id.is_empty() {
            return Err(TreeError::InvalidOperation(
                "must specify node to find position".to_string(),
            ));
        }
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;
        Ok(node.pos.as_ref())
    }

    /// Position of `child` within `parent`'s sibling list. An empty child
    /// names the head-of-list position of the parent.
    pub fn find_child_position(&self, parent_id: &str, child: &str) -> Result<PosRef, TreeError> {
        let parent_id = normalize_parent(parent_id);
        if !self.is_known_parent(parent_id) {
            return Err(TreeError::NodeNotFound(parent_id.to_string()));
        }
        if child.is_empty() {
            return Ok(PosRef {
                list: parent_id.to_string(),
                slot: ROOT_SLOT,
            });
        }
        let node = self
            .nodes
            .get(child)
            .ok_or_else(|| TreeError::NodeNotFound(child.to_string()))?;
        match &node.pos {
            Some(pos) if pos.list == parent_id => Ok(pos.clone()),
            _ => Err(TreeError::NotChild {
                parent: parent_id.to_string(),
                child: child.to_string(),
            }),
        }
    }

    /// Node id of the live left sibling of `child` under `parent`, or
    /// `None` when `child` is first.
    pub fn find_left_sibling(
        &self,
        parent_id: &str,
        child: &str,
    ) -> Result<Option<&str>, TreeError> {
        let pos = self.find_child_position(parent_id, child)?;
        let Some(list) = self.lists.get(&pos.list) else {
            return Ok(None);
        };
        Ok(list
            .prev_alive(pos.slot)
            .and_then(|slot| list.position(slot).value().node_id()))
    }

    /// Depth-first pre-order traversal of the live tree.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    fn is_known_parent(&self, parent_id: &str) -> bool {
        parent_id == ROOT_NODE_ID
            || parent_id == TRASH_NODE_ID
            || self.nodes.contains_key(parent_id)
    }

    fn subtree_mut(&mut self, parent_id: &str) -> Result<&mut List, TreeError> {
        if !self.is_known_parent(parent_id) {
            return Err(TreeError::NodeNotFound(parent_id.to_string()));
        }
        Ok(self
            .lists
            .entry(parent_id.to_string())
            .or_insert_with(|| List::new(parent_id)))
    }

    /// True when the live position right of the anchor already holds the
    /// node, in which case a move would be a visible no-op.
    fn already_in_place(&self, parent_id: &str, left_ref: &OpId, node_id: &str) -> bool {
        let Some(list) = self.lists.get(parent_id) else {
            return false;
        };
        let Ok(anchor) = list.find_slot(left_ref) else {
            return false;
        };
        list.next_alive(anchor)
            .and_then(|slot| list.position(slot).value().node_id())
            == Some(node_id)
    }

    /// Links a node to its freshly integrated position, unless that would
    /// make the node an ancestor of itself — then the position is left
    /// tombstoned and the node stays where it was.
    fn do_move(&mut self, node_id: &str, pos: PosRef) {
        if self.is_ancestor(node_id, &pos.list) {
            self.tombstone(&pos);
            return;
        }

        let node = self
            .nodes
            .get_mut(node_id)
            .expect("node registered before move");
        let old = node.pos.replace(pos.clone());
        if let Some(old) = old {
            self.tombstone(&old);
        }
        self.set_live(&pos, node_id);
    }

    /// Reverts the move at `idx`: relinks the node to the position it held
    /// before, tombstoning the one being undone.
    fn undo_move(&mut self, idx: usize) {
        let record = self.moves_log[idx].clone();
        let node = self
            .nodes
            .get_mut(&record.node_id)
            .expect("BUG: moves log references unknown node");

        let current = node.pos.take();
        node.pos = record.old_position.clone();

        if let Some(current) = current {
            self.tombstone(&current);
        }
        if let Some(old) = &record.old_position {
            self.set_live(old, &record.node_id);
        }
    }

    /// Reapplies the move at `idx`. The list position was created when the
    /// operation was first integrated and is only re-linked here, with the
    /// same cycle check as [`Self::do_move`]. `old_position` is rewritten
    /// to whatever was current just before the redo, so that a further
    /// undo pass stays correct.
    fn redo_move(&mut self, idx: usize) {
        let record = self.moves_log[idx].clone();
        let list = self
            .lists
            .get(&record.parent_id)
            .expect("BUG: redo of a move whose subtree is gone");
        let slot = list
            .slot_of(&record.id)
            .expect("BUG: redo of a move whose position was never integrated");
        let pos = PosRef {
            list: record.parent_id.clone(),
            slot,
        };

        if self.is_ancestor(&record.node_id, &pos.list) {
            self.tombstone(&pos);
            return;
        }

        let node = self
            .nodes
            .get_mut(&record.node_id)
            .expect("BUG: moves log references unknown node");
        let prev = node.pos.replace(pos.clone());
        if let Some(prev) = &prev {
            self.tombstone(prev);
        }
        self.moves_log[idx].old_position = prev;
        self.set_live(&pos, &record.node_id);
    }

    /// True if `a` is an ancestor of `b`, transitively. Walks the chain of
    /// containing parents; the reserved parents terminate the walk.
    fn is_ancestor(&self, a: &str, b: &str) -> bool {
        let mut cur = b;
        loop {
            let Some(node) = self.nodes.get(cur) else {
                return false;
            };
            let Some(pos) = &node.pos else {
                return false;
            };
            if pos.list == a {
                return true;
            }
            cur = &pos.list;
        }
    }

    fn set_live(&mut self, pos: &PosRef, node_id: &str) {
        self.lists
            .get_mut(&pos.list)
            .expect("BUG: position references unknown list")
            .set_live(pos.slot, node_id.to_string());
    }

    fn tombstone(&mut self, pos: &PosRef) {
        self.lists
            .get_mut(&pos.list)
            .expect("BUG: position references unknown list")
            .tombstone(pos.slot);
    }
}

fn normalize_parent(parent_id: &str) -> &str {
    if parent_id.is_empty() {
        ROOT_NODE_ID
    } else {
        parent_id
    }
}
