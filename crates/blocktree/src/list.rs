//! RGA-style ordered sequence of sibling positions.
//!
//! Each parent node of the tree owns one [`List`]. Positions live in a
//! `Vec` arena and are addressed by `u32` slots; slot 0 is the sentinel
//! root of a circular doubly linked sequence, acting both as "before
//! first" and "after last". Positions are created once and never removed,
//! only tombstoned.

use crate::clock::OpId;
use thiserror::Error;

pub(crate) const ROOT_SLOT: u32 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListError {
    #[error("position {0} is already integrated")]
    DuplicateId(OpId),
    #[error("position {0} not found")]
    NotFound(OpId),
}

/// Payload of a position. A tombstoned position stays in the sequence for
/// future ordering reference but is invisible to live traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionValue {
    Live(String),
    Tombstone,
}

impl PositionValue {
    pub fn is_live(&self) -> bool {
        matches!(self, PositionValue::Live(_))
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            PositionValue::Live(id) => Some(id),
            PositionValue::Tombstone => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Position {
    id: OpId,
    anchor: OpId,
    pub(crate) left: u32,
    pub(crate) right: u32,
    pub(crate) value: PositionValue,
}

impl Position {
    pub fn id(&self) -> &OpId {
        &self.id
    }

    /// Causal anchor: the id of the position this one was inserted after.
    pub fn anchor(&self) -> &OpId {
        &self.anchor
    }

    pub fn value(&self) -> &PositionValue {
        &self.value
    }
}

#[derive(Debug, Clone)]
pub struct List {
    owner: String,
    arena: Vec<Position>,
}

impl List {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            arena: vec![Position {
                id: OpId::list_start(),
                anchor: OpId::list_start(),
                left: ROOT_SLOT,
                right: ROOT_SLOT,
                value: PositionValue::Tombstone,
            }],
        }
    }

    /// The id of the parent node owning this sibling sequence.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn position(&self, slot: u32) -> &Position {
        &self.arena[slot as usize]
    }

    /// Number of positions ever integrated, tombstones included.
    pub fn len(&self) -> usize {
        self.arena.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 1
    }

    pub(crate) fn slot_of(&self, id: &OpId) -> Option<u32> {
        self.arena
            .iter()
            .position(|p| p.id == *id)
            .map(|slot| slot as u32)
    }

    /// Resolves an anchor id to its slot. The start sentinel resolves to the
    /// root, the end sentinel to the last structural position.
    pub fn find_slot(&self, id: &OpId) -> Result<u32, ListError> {
        if id.is_list_start() {
            return Ok(ROOT_SLOT);
        }
        if id.is_list_end() {
            return Ok(self.arena[ROOT_SLOT as usize].left);
        }
        self.slot_of(id).ok_or_else(|| ListError::NotFound(id.clone()))
    }

    /// Integrates a new position with id `id` after the position at
    /// `anchor`, skipping right past concurrent inserts at the same anchor
    /// whose ids are greater. This single rule makes concurrent inserts
    /// sharing an anchor converge regardless of delivery order.
    pub fn integrate(&mut self, id: OpId, anchor: u32, value: String) -> Result<u32, ListError> {
        if self.slot_of(&id).is_some() {
            return Err(ListError::DuplicateId(id));
        }

        let mut left = anchor;
        loop {
            let right = self.arena[left as usize].right;
            if right == ROOT_SLOT {
                break;
            }
            if self.arena[right as usize].id < id {
                break;
            }
            left = right;
        }

        let right = self.arena[left as usize].right;
        let slot = self.arena.len() as u32;
        let anchor_id = self.arena[anchor as usize].id.clone();
        self.arena.push(Position {
            id,
            anchor: anchor_id,
            left,
            right,
            value: PositionValue::Live(value),
        });
        self.arena[left as usize].right = slot;
        self.arena[right as usize].left = slot;
        Ok(slot)
    }

    /// Integrates after the last structural position.
    pub fn append(&mut self, id: OpId, value: String) -> Result<u32, ListError> {
        let last = self.arena[ROOT_SLOT as usize].left;
        self.integrate(id, last, value)
    }

    /// Structural right neighbor, tombstones included.
    pub fn next(&self, slot: u32) -> Option<u32> {
        let right = self.arena[slot as usize].right;
        (right != ROOT_SLOT).then_some(right)
    }

    /// Structural left neighbor, tombstones included.
    pub fn prev(&self, slot: u32) -> Option<u32> {
        let left = self.arena[slot as usize].left;
        (left != ROOT_SLOT).then_some(left)
    }

    /// Nearest live position to the right.
    pub fn next_alive(&self, slot: u32) -> Option<u32> {
        let mut cur = self.arena[slot as usize].right;
        while cur != ROOT_SLOT {
            if self.arena[cur as usize].value.is_live() {
                return Some(cur);
            }
            cur = self.arena[cur as usize].right;
        }
        None
    }

    /// Nearest live position to the left.
    pub fn prev_alive(&self, slot: u32) -> Option<u32> {
        let mut cur = self.arena[slot as usize].left;
        while cur != ROOT_SLOT {
            if self.arena[cur as usize].value.is_live() {
                return Some(cur);
            }
            cur = self.arena[cur as usize].left;
        }
        None
    }

    pub(crate) fn set_live(&mut self, slot: u32, node: String) {
        self.arena[slot as usize].value = PositionValue::Live(node);
    }

    pub(crate) fn tombstone(&mut self, slot: u32) {
        self.arena[slot as usize].value = PositionValue::Tombstone;
    }

    /// Live values in structural order.
    pub fn iter_alive(&self) -> impl Iterator<Item = &str> + '_ {
        AliveIter { list: self, slot: ROOT_SLOT }
    }
}

struct AliveIter<'a> {
    list: &'a List,
    slot: u32,
}

impl<'a> Iterator for AliveIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let next = self.list.next_alive(self.slot)?;
        self.slot = next;
        self.list.position(next).value().node_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(site: &str, clock: i64) -> OpId {
        OpId::new(site, clock, 0)
    }

    fn contents(list: &List) -> String {
        list.iter_alive().collect::<Vec<_>>().join(",")
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut list = List::new("p");
        list.append(id("alice", 1), "a".into()).expect("append a");
        list.append(id("alice", 2), "b".into()).expect("append b");
        list.append(id("alice", 3), "c".into()).expect("append c");
        assert_eq!(contents(&list), "a,b,c");
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut list = List::new("p");
        list.append(id("alice", 1), "a".into()).expect("append a");
        let err = list
            .append(id("alice", 1), "again".into())
            .expect_err("same id twice must fail");
        assert!(matches!(err, ListError::DuplicateId(_)));
    }

    #[test]
    fn find_slot_resolves_sentinels_and_ids() {
        let mut list = List::new("p");
        let a = list.append(id("alice", 1), "a".into()).expect("append a");
        let b = list.append(id("alice", 2), "b".into()).expect("append b");

        assert_eq!(list.find_slot(&OpId::list_start()).expect("start"), ROOT_SLOT);
        assert_eq!(list.find_slot(&OpId::list_end()).expect("end"), b);
        assert_eq!(list.find_slot(&id("alice", 1)).expect("a"), a);
        assert!(matches!(
            list.find_slot(&id("bob", 9)),
            Err(ListError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_inserts_at_same_anchor_sort_by_id_descending() {
        // Two sites insert at the head concurrently; the greater id lands
        // closer to the anchor, whatever the delivery order.
        let mut forward = List::new("p");
        forward
            .integrate(id("alice", 1), ROOT_SLOT, "a".into())
            .expect("alice insert");
        forward
            .integrate(id("bob", 1), ROOT_SLOT, "b".into())
            .expect("bob insert");

        let mut reverse = List::new("p");
        reverse
            .integrate(id("bob", 1), ROOT_SLOT, "b".into())
            .expect("bob insert");
        reverse
            .integrate(id("alice", 1), ROOT_SLOT, "a".into())
            .expect("alice insert");

        assert_eq!(contents(&forward), "b,a");
        assert_eq!(contents(&forward), contents(&reverse));
    }

    #[test]
    fn tombstones_are_skipped_but_keep_structure() {
        let mut list = List::new("p");
        let a = list.append(id("alice", 1), "a".into()).expect("append a");
        let b = list.append(id("alice", 2), "b".into()).expect("append b");
        let c = list.append(id("alice", 3), "c".into()).expect("append c");

        list.tombstone(b);
        assert_eq!(contents(&list), "a,c");

        // Structural neighbors still see the tombstone.
        assert_eq!(list.next(a), Some(b));
        assert_eq!(list.prev(c), Some(b));
        // Live neighbors skip it.
        assert_eq!(list.next_alive(a), Some(c));
        assert_eq!(list.prev_alive(c), Some(a));
        assert_eq!(list.prev_alive(a), None);
        assert_eq!(list.next_alive(c), None);

        // A tombstone stays a valid anchor for later inserts.
        list.integrate(id("bob", 4), b, "x".into()).expect("anchor on tombstone");
        assert_eq!(contents(&list), "a,x,c");
    }
}
