//! Last-writer-wins register.

use crate::clock::OpId;

/// A scalar slot where the write with the greatest operation id wins.
///
/// Writes are kept id-sorted so that out-of-order arrival of older writes
/// never disturbs the current winner.
#[derive(Debug, Clone, Default)]
pub struct LwwRegister<T> {
    entries: Vec<(OpId, T)>,
}

impl<T> LwwRegister<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Records a write. Appends in the common in-order case; otherwise
    /// scans backward for the sorted insertion point.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate id: the caller's clock tracking makes two
    /// writes with the same id impossible.
    pub fn set(&mut self, id: OpId, value: T) {
        match self.entries.last() {
            None => self.entries.push((id, value)),
            Some((last, _)) if *last < id => self.entries.push((id, value)),
            _ => {
                let mut at = self.entries.len();
                while at > 0 {
                    let prev = &self.entries[at - 1].0;
                    if *prev == id {
                        panic!("BUG: duplicate operation id {id} in LWW register");
                    }
                    if *prev < id {
                        break;
                    }
                    at -= 1;
                }
                self.entries.insert(at, (id, value));
            }
        }
    }

    /// The winning value: the one written with the greatest id.
    pub fn get(&self) -> Option<&T> {
        self.entries.last().map(|(_, v)| v)
    }

    /// Id of the winning value.
    pub fn id(&self) -> Option<&OpId> {
        self.entries.last().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
