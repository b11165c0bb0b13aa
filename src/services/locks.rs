//! Per-object mutation locks.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::ObjectType;

/// Entries are dropped once nobody holds them and the table grows past this.
const PRUNE_THRESHOLD: usize = 256;

/// Lock key for one directory object, e.g. `user:john.doe`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey(String);

impl LockKey {
    #[must_use]
    pub fn new(object_type: ObjectType, name: &str) -> Self {
        Self(format!("{}:{}", object_type.as_str(), name.trim().to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Guards for a set of keys. Released together on drop.
pub struct ObjectGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

/// Keyed lock table serializing mutations of the same directory object.
#[derive(Default)]
pub struct ObjectLocks {
    table: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl ObjectLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every key in sorted order. Duplicates are locked once.
    pub async fn acquire(&self, keys: &[LockKey]) -> ObjectGuard {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut table = self.table.lock().await;
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            keys.iter()
                .map(|key| Arc::clone(table.entry(key.clone()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }

        ObjectGuard { _guards: guards }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_key_is_lowercase() {
        let key = LockKey::new(ObjectType::User, " John.Doe ");
        assert_eq!(key.as_str(), "user:john.doe");
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(ObjectLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks
                    .acquire(&[LockKey::new(ObjectType::Group, "Finance")])
                    .await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_opposite_order_does_not_deadlock() {
        let locks = Arc::new(ObjectLocks::new());
        let user = LockKey::new(ObjectType::User, "john.doe");
        let group = LockKey::new(ObjectType::Group, "Finance");

        let mut handles = Vec::new();
        for i in 0..20 {
            let locks = Arc::clone(&locks);
            let keys = if i % 2 == 0 {
                vec![user.clone(), group.clone()]
            } else {
                vec![group.clone(), user.clone()]
            };
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&keys).await;
                tokio::task::yield_now().await;
            }));
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            for handle in handles {
                handle.await.unwrap();
            }
        })
        .await
        .expect("lock acquisition deadlocked");

        assert_eq!(locks.len().await, 2);
    }
}
