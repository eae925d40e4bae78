pub type Slot = usize;

/// Entries occupy slots `1..=len` with no gaps; removal shifts later entries down.
#[derive(Debug, Clone)]
pub struct Roster<T> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T> Roster<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn next_free_slot(&self) -> Option<Slot> {
        (!self.is_full()).then_some(self.entries.len() + 1)
    }

    pub fn push(&mut self, entry: T) -> Result<Slot, T> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push(entry);
        Ok(self.entries.len())
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        slot.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        slot.checked_sub(1).and_then(|i| self.entries.get_mut(i))
    }

    pub fn position(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Slot> {
        self.entries.iter().position(|e| pred(e)).map(|i| i + 1)
    }

    pub fn find(&self, pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.position(pred).and_then(|slot| self.get(slot))
    }

    pub fn find_mut(&mut self, pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
        self.position(pred).and_then(|slot| self.get_mut(slot))
    }

    pub fn remove(&mut self, slot: Slot) -> Option<T> {
        let index = slot.checked_sub(1)?;
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if pred(&entry) {
                removed.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        removed
    }

    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &T)> {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, e))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Slot, &mut T)> {
        self.entries.iter_mut().enumerate().map(|(i, e)| (i + 1, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_stay_contiguous_after_removal() {
        let mut roster = Roster::new(4);
        assert_eq!(roster.push("a"), Ok(1));
        assert_eq!(roster.push("b"), Ok(2));
        assert_eq!(roster.push("c"), Ok(3));

        assert_eq!(roster.remove(2), Some("b"));

        let slots: Vec<_> = roster.iter().collect();
        assert_eq!(slots, vec![(1, &"a"), (2, &"c")]);
        assert_eq!(roster.next_free_slot(), Some(3));
    }

    #[test]
    fn full_roster_returns_entry() {
        let mut roster = Roster::new(1);
        roster.push(1).unwrap();
        assert_eq!(roster.push(2), Err(2));
        assert_eq!(roster.next_free_slot(), None);
    }

    #[test]
    fn remove_where_preserves_order() {
        let mut roster = Roster::new(8);
        for i in 0..6 {
            roster.push(i).unwrap();
        }
        let removed = roster.remove_where(|v| v % 2 == 0);
        assert_eq!(removed, vec![0, 2, 4]);
        assert_eq!(roster.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(roster.position(|v| *v == 5), Some(3));
        assert_eq!(roster.find(|v| *v > 1), Some(&3));
    }

    #[test]
    fn slot_zero_is_never_valid() {
        let mut roster = Roster::new(2);
        roster.push('x').unwrap();
        assert!(roster.get(0).is_none());
        assert!(roster.remove(0).is_none());
        assert_eq!(roster.len(), 1);
    }
}
