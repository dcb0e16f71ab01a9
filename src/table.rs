// File: src/table.rs
//
// Open-addressed, linear-probed, tombstone-aware hash table keyed by
// interned strings. Backs globals, class method tables, instance fields,
// and (as a weak set) the string intern table.

use crate::gc::Gc;
use crate::value::Value;

const TABLE_MAX_LOAD: f64 = 0.75;

/// FNV-1a hash, used to key every interned string.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[derive(Clone, Copy)]
struct Entry {
    key: Option<Gc>,
    value: Value,
}

pub struct Table {
    count: usize,
    entries: Vec<Entry>,
}

fn string_hash(key: &Gc) -> u32 {
    key.as_string().hash
}

impl Table {
    pub fn new() -> Self {
        Self { count: 0, entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Finds the slot `key` belongs in: either the slot already holding it,
    /// or the first tombstone/empty slot probed, matching clox's
    /// `findEntry`. Assumes `entries` is non-empty.
    fn find_entry(entries: &[Entry], capacity: usize, key: &Gc) -> usize {
        let mut index = (string_hash(key) as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                None => {
                    if matches!(entry.value, Value::Nil) {
                        return tombstone.unwrap_or(index);
                    } else if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Some(k) if k == *key => return index,
                Some(_) => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn adjust_capacity(&mut self, new_capacity: usize) {
        let mut new_entries = vec![Entry { key: None, value: Value::Nil }; new_capacity];
        let mut new_count = 0;
        for entry in self.entries.iter() {
            if let Some(key) = entry.key {
                let idx = Self::find_entry(&new_entries, new_capacity, &key);
                new_entries[idx] = Entry { key: Some(key), value: entry.value };
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    /// Returns `true` if this inserted a brand new key (as opposed to
    /// overwriting an existing one).
    pub fn set(&mut self, key: Gc, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * TABLE_MAX_LOAD {
            let new_capacity = if self.capacity() < 8 { 8 } else { self.capacity() * 2 };
            self.adjust_capacity(new_capacity);
        }
        let idx = Self::find_entry(&self.entries, self.capacity(), &key);
        let entry = &mut self.entries[idx];
        let is_new_key = entry.key.is_none();
        if is_new_key && matches!(entry.value, Value::Nil) {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new_key
    }

    /// Upsert-or-fail: writes `value` only if `key` is already present,
    /// without ever performing a transient insert. Returns whether the key
    /// existed.
    pub fn set_existing(&mut self, key: Gc, value: Value) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let idx = Self::find_entry(&self.entries, self.capacity(), &key);
        let entry = &mut self.entries[idx];
        if entry.key.is_none() {
            return false;
        }
        entry.value = value;
        true
    }

    pub fn get(&self, key: &Gc) -> Option<Value> {
        if self.capacity() == 0 {
            return None;
        }
        let idx = Self::find_entry(&self.entries, self.capacity(), key);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    pub fn contains_key(&self, key: &Gc) -> bool {
        self.get(key).is_some()
    }

    pub fn delete(&mut self, key: &Gc) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let idx = Self::find_entry(&self.entries, self.capacity(), key);
        if self.entries[idx].key.is_none() {
            return false;
        }
        // Tombstone: empty key, truthy sentinel value so probing continues past it.
        self.entries[idx] = Entry { key: None, value: Value::Bool(true) };
        true
    }

    /// Copies every entry of `other` into `self`, overwriting on conflict.
    /// Used by `INHERIT` to seed a subclass's method table from its
    /// superclass.
    pub fn add_all(&mut self, other: &Table) {
        for entry in other.entries.iter() {
            if let Some(key) = entry.key {
                self.set(key, entry.value);
            }
        }
    }

    /// Looks up an interned string by content rather than by `Gc` identity,
    /// used during string interning before a candidate's `Gc` handle exists.
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<Gc> {
        if self.capacity() == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) % capacity;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if matches!(entry.value, Value::Nil) {
                        return None;
                    }
                }
                Some(key) => {
                    let s = key.as_string();
                    if s.hash == hash && &*s.chars == chars {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    /// Weak-set sweep: drop every key whose referent did not survive the
    /// mark phase. Called after marking, before sweeping the object heap, so
    /// the intern table never single-handedly keeps a string alive.
    pub fn remove_white(&mut self) {
        for entry in self.entries.iter_mut() {
            if let Some(key) = entry.key {
                if !key.is_marked() {
                    *entry = Entry { key: None, value: Value::Bool(true) };
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Gc, Value)> + '_ {
        self.entries.iter().filter_map(|e| e.key.map(|k| (k, e.value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(fnv1a_hash(b"hello"), fnv1a_hash(b"hello"));
        assert_ne!(fnv1a_hash(b"hello"), fnv1a_hash(b"world"));
    }
}
