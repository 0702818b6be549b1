//! Depth-first read view over the live tree.

use crate::list::ROOT_SLOT;
use crate::tree::{Node, PosRef, Tree, ROOT_NODE_ID};

/// Finite, non-restartable depth-first pre-order walk over live nodes.
///
/// Holds an explicit stack of frames, one per list being walked; a frame
/// is the next live position to visit, or `None` when that list is
/// exhausted. Tombstoned positions are skipped without descending.
pub struct Iter<'a> {
    tree: &'a Tree,
    stack: Vec<Option<PosRef>>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(tree: &'a Tree) -> Self {
        let root = tree
            .lists
            .get(ROOT_NODE_ID)
            .expect("BUG: tree must have a root subtree");
        let first = root.next_alive(ROOT_SLOT).map(|slot| PosRef {
            list: ROOT_NODE_ID.to_string(),
            slot,
        });
        Self {
            tree,
            stack: vec![first],
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        loop {
            let top = self.stack.last()?.clone();
            let Some(pos) = top else {
                self.stack.pop();
                continue;
            };
            let frame = self.stack.len() - 1;

            let list = self
                .tree
                .lists
                .get(&pos.list)
                .expect("BUG: iterator frame references unknown list");
            let node_id = list
                .position(pos.slot)
                .value()
                .node_id()
                .expect("BUG: iterator frames hold live positions only");
            let node = self
                .tree
                .nodes
                .get(node_id)
                .expect("BUG: live position references unknown node");

            // Advance this frame past the visited position, then descend
            // into the node's own list if it ever had children.
            self.stack[frame] = list.next_alive(pos.slot).map(|slot| PosRef {
                list: pos.list.clone(),
                slot,
            });
            if let Some(children) = self.tree.lists.get(node_id) {
                self.stack.push(children.next_alive(ROOT_SLOT).map(|slot| PosRef {
                    list: node_id.to_string(),
                    slot,
                }));
            }

            return Some(node);
        }
    }
}
