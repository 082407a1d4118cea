use crate::error::Result;
use log::trace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

#[derive(Clone, Debug)]
struct TimeStamped<V> {
    time: f64,
    value: V,
}

/// A per-key cache of values that are valid for one simulation time.
#[derive(Debug)]
pub(crate) struct Cache<K, V> {
    entries: RefCell<HashMap<K, TimeStamped<V>>>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Copy + Debug, V: Clone> Cache<K, V> {
    /// Gets the value for `key` at time `now`, computing it with `f` if the
    /// stored value is older. Errors from `f` are returned and not cached.
    ///
    /// # Panics
    /// If the stored value is newer than `now`.
    pub fn get_or_update(&self, key: K, now: f64, f: impl FnOnce() -> Result<V>) -> Result<V> {
        if let Some(entry) = self.entries.borrow().get(&key) {
            if entry.time > now {
                panic!(
                    "Perception of {:?} requested at {} but already updated at {}",
                    key, now, entry.time
                );
            }
            if entry.time == now {
                return Ok(entry.value.clone());
            }
        }
        trace!("Updating perception of {:?} at {}", key, now);
        let value = f()?;
        self.entries.borrow_mut().insert(
            key,
            TimeStamped {
                time: now,
                value: value.clone(),
            },
        );
        Ok(value)
    }

    /// Forgets all values.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}
