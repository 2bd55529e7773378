use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::client::lock::LockError;

/// Small map whose entries expire `ttl` after insertion. Expiry is checked on read.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, key: &K) -> Result<Option<V>, LockError> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Result<Option<V>, LockError> {
        let mut entries = self.entries.lock().map_err(|e| LockError::poisoned("ttl cache", e))?;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Result<(), LockError> {
        let mut entries = self.entries.lock().map_err(|e| LockError::poisoned("ttl cache", e))?;
        entries.insert(key, (value, Instant::now() + self.ttl));
        Ok(())
    }

    pub fn invalidate(&self, key: &K) -> Result<(), LockError> {
        let mut entries = self.entries.lock().map_err(|e| LockError::poisoned("ttl cache", e))?;
        entries.remove(key);
        Ok(())
    }
}
