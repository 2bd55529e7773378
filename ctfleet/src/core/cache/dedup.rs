use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::core::client::lock::LockError;
use crate::types::certificate::CertificateIdentity;

const MIN_CAPACITY: usize = 2;

#[derive(Debug, Default)]
struct Inner {
    members: HashSet<CertificateIdentity>,
    /// Insertion order, oldest first.
    order: VecDeque<CertificateIdentity>,
}

/// Bounded set of certificate identities already accepted by the store.
///
/// When full, the oldest half is evicted in one go. A miss only costs a trip
/// to the store, whose uniqueness constraint stays authoritative.
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(MIN_CAPACITY), inner: Mutex::new(Inner::default()) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_duplicate(&self, identity: &CertificateIdentity) -> Result<bool, LockError> {
        let inner = self.inner.lock().map_err(|e| LockError::poisoned("dedup cache", e))?;
        Ok(inner.members.contains(identity))
    }

    pub fn add(&self, identity: CertificateIdentity) -> Result<(), LockError> {
        let mut inner = self.inner.lock().map_err(|e| LockError::poisoned("dedup cache", e))?;
        if inner.members.contains(&identity) {
            return Ok(());
        }
        if inner.members.len() >= self.capacity {
            let evict = self.capacity / 2;
            for _ in 0..evict {
                match inner.order.pop_front() {
                    Some(old) => {
                        inner.members.remove(&old);
                    }
                    None => break,
                }
            }
        }
        inner.order.push_back(identity.clone());
        inner.members.insert(identity);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, LockError> {
        let inner = self.inner.lock().map_err(|e| LockError::poisoned("dedup cache", e))?;
        Ok(inner.members.len())
    }

    pub fn is_empty(&self) -> Result<bool, LockError> {
        Ok(self.len()? == 0)
    }
}
