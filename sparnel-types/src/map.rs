use crate::value::{Value, ValueError};

/// Minimum allocated capacity; always a power of two.
const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Empty,
    /// A deleted entry. Probe chains run through tombstones; rehashing
    /// clears them.
    Tombstone,
    Live {
        hash: u64,
        key: Value,
        value: Value,
    },
}

/// Open-addressing hash table mapping hashable values to values.
///
/// Deletions mark tombstones. The load bound counts tombstones, so a
/// rehash is triggered before probe chains can degrade — lookups stay
/// amortized O(1) after arbitrary insert/delete sequences.
#[derive(Debug, Clone, Default)]
pub struct Map {
    slots: Vec<Slot>,
    live: usize,
    tombstones: usize,
}

impl Map {
    /// Create an empty map; allocates on first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// `true` when no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Look up a key. `Ok(None)` when absent; `Err` when the key is not
    /// hashable.
    pub fn get(&self, key: &Value) -> Result<Option<Value>, ValueError> {
        if self.slots.is_empty() {
            // Still reject unhashable keys on an empty map.
            key.hash_key()?;
            return Ok(None);
        }
        let hash = key.hash_key()?;
        Ok(self.probe(key, hash).map(|i| match &self.slots[i] {
            Slot::Live { value, .. } => value.clone(),
            _ => unreachable!(),
        }))
    }

    /// Insert or replace. Returns the previous value, if any.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<Option<Value>, ValueError> {
        let hash = key.hash_key()?;
        // Keep occupied slots (live + tombstones) at or below 3/4.
        if (self.live + self.tombstones + 1) * 4 > self.capacity() * 3 {
            self.rehash(self.live + 1);
        }

        let mask = self.capacity() - 1;
        let mut i = (hash as usize) & mask;
        let mut first_tombstone = None;
        loop {
            match &mut self.slots[i] {
                Slot::Live {
                    hash: h,
                    key: k,
                    value: v,
                } => {
                    if *h == hash && *k == key {
                        return Ok(Some(core::mem::replace(v, value)));
                    }
                }
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(i);
                    }
                }
                Slot::Empty => {
                    let at = first_tombstone.unwrap_or(i);
                    if matches!(self.slots[at], Slot::Tombstone) {
                        self.tombstones -= 1;
                    }
                    self.slots[at] = Slot::Live { hash, key, value };
                    self.live += 1;
                    return Ok(None);
                }
            }
            i = (i + 1) & mask;
        }
    }

    /// Remove a key, marking its slot as a tombstone. Returns the removed
    /// value, if any.
    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, ValueError> {
        if self.slots.is_empty() {
            key.hash_key()?;
            return Ok(None);
        }
        let hash = key.hash_key()?;
        Ok(self.probe(key, hash).map(|i| {
            let slot = core::mem::replace(&mut self.slots[i], Slot::Tombstone);
            self.live -= 1;
            self.tombstones += 1;
            match slot {
                Slot::Live { value, .. } => value,
                _ => unreachable!(),
            }
        }))
    }

    /// Iterate live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Live { key, value, .. } => Some((key, value)),
            _ => None,
        })
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the live slot holding `key`, if present.
    fn probe(&self, key: &Value, hash: u64) -> Option<usize> {
        let mask = self.capacity() - 1;
        let mut i = (hash as usize) & mask;
        loop {
            match &self.slots[i] {
                Slot::Live { hash: h, key: k, .. } if *h == hash && k == key => return Some(i),
                Slot::Empty => return None,
                _ => {}
            }
            i = (i + 1) & mask;
        }
    }

    /// Reallocate for at least `min_live` entries and reinsert live slots,
    /// discarding tombstones.
    fn rehash(&mut self, min_live: usize) {
        let new_cap = (min_live * 2).max(MIN_CAPACITY).next_power_of_two();
        let old = core::mem::replace(&mut self.slots, vec![Slot::Empty; new_cap]);
        self.live = 0;
        self.tombstones = 0;
        let mask = new_cap - 1;
        for slot in old {
            if let Slot::Live { hash, key, value } = slot {
                let mut i = (hash as usize) & mask;
                while !matches!(self.slots[i], Slot::Empty) {
                    i = (i + 1) & mask;
                }
                self.slots[i] = Slot::Live { hash, key, value };
                self.live += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn insert_get_remove() {
        let mut m = Map::new();
        assert_eq!(m.insert(int(1), int(10)).unwrap(), None);
        assert_eq!(m.insert(int(1), int(11)).unwrap(), Some(int(10)));
        assert_eq!(m.get(&int(1)).unwrap(), Some(int(11)));
        assert_eq!(m.remove(&int(1)).unwrap(), Some(int(11)));
        assert_eq!(m.get(&int(1)).unwrap(), None);
        assert!(m.is_empty());
    }

    #[test]
    fn mixed_key_types() {
        let mut m = Map::new();
        m.insert(Value::Nil, int(0)).unwrap();
        m.insert(Value::Bool(true), int(1)).unwrap();
        m.insert(Value::from("k"), int(2)).unwrap();
        m.insert(Value::Float(2.5), int(3)).unwrap();
        assert_eq!(m.get(&Value::Nil).unwrap(), Some(int(0)));
        assert_eq!(m.get(&Value::Bool(true)).unwrap(), Some(int(1)));
        assert_eq!(m.get(&Value::from("k")).unwrap(), Some(int(2)));
        assert_eq!(m.get(&Value::Float(2.5)).unwrap(), Some(int(3)));
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn integral_float_keys_alias_integers() {
        let mut m = Map::new();
        m.insert(int(3), int(30)).unwrap();
        assert_eq!(m.get(&Value::Float(3.0)).unwrap(), Some(int(30)));
        m.insert(Value::Float(3.0), int(31)).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(&int(3)).unwrap(), Some(int(31)));
    }

    #[test]
    fn aggregates_are_not_hashable() {
        let mut m = Map::new();
        let key = Value::new_array();
        assert!(m.get(&key).is_err());
        assert!(m.insert(key, int(0)).is_err());
    }

    #[test]
    fn heavy_deletion_does_not_poison_probing() {
        let mut m = Map::new();
        // Repeatedly fill and empty; tombstones must never accumulate past
        // the load bound, so every slot scan stays short.
        for round in 0..64 {
            for i in 0..128 {
                m.insert(int(round * 1000 + i), int(i)).unwrap();
            }
            for i in 0..128 {
                assert!(m.remove(&int(round * 1000 + i)).unwrap().is_some());
            }
        }
        assert!(m.is_empty());
        assert!(
            m.capacity() <= 1024,
            "capacity {} implies tombstone leakage",
            m.capacity()
        );
        // A lookup after the churn still terminates against an Empty slot.
        assert_eq!(m.get(&int(7)).unwrap(), None);
    }
}
