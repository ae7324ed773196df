use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bincode::{deserialize, serialize};
use log::{debug, warn};
use tokio::time::timeout;

use crate::aggregate::{by_rank, HashMapA, ScoredMember};
use crate::error::Result;

type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

/// A store of scored sets, one set per bucket key.
///
/// Implementations must make each call atomic: concurrent increments of the same or
/// different members of one bucket must all be accounted for. The counter built on top
/// takes no locks of its own.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Adds `amount` to the score of `member` in the set `key`, creating the member and the
    /// set when they do not exist yet. Returns the new score.
    async fn increment(&self, key: &str, member: &str, amount: f64) -> Result<f64>;

    /// Returns at most `k` members of the set `key`, highest score first.
    ///
    /// A set that does not exist is empty, not an error.
    async fn top_k(&self, key: &str, k: usize) -> Result<Vec<ScoredMember>>;
}

#[async_trait]
impl<S: BucketStore + ?Sized> BucketStore for Arc<S> {
    #[inline]
    async fn increment(&self, key: &str, member: &str, amount: f64) -> Result<f64> {
        (**self).increment(key, member, amount).await
    }

    #[inline]
    async fn top_k(&self, key: &str, k: usize) -> Result<Vec<ScoredMember>> {
        (**self).top_k(key, k).await
    }
}

/// An in-process implementation of [`BucketStore`].
///
/// Each bucket is a map of member scores held in a sharded concurrent map; an increment
/// holds the bucket's shard lock for its whole read-modify-write.
#[derive(Default)]
pub struct MemStore {
    buckets: DashMap<String, HashMapA<String, f64>>,
}

impl MemStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Score of one member, `None` if the member or the bucket does not exist.
    #[inline]
    pub fn score(&self, key: &str, member: &str) -> Option<f64> {
        self.buckets
            .get(key)
            .and_then(|bucket| bucket.get(member).copied())
    }

    /// Number of buckets held.
    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of members in one bucket.
    #[inline]
    pub fn bucket_len(&self, key: &str) -> usize {
        self.buckets.get(key).map(|b| b.len()).unwrap_or(0)
    }

    /// Drops one bucket, returning whether it existed.
    #[inline]
    pub fn remove(&self, key: &str) -> bool {
        self.buckets.remove(key).is_some()
    }

    /// Serializes every bucket.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let buckets = self
            .buckets
            .iter()
            .map(|entry| {
                let scores = entry
                    .value()
                    .iter()
                    .map(|(m, s)| (m.clone(), *s))
                    .collect::<HashMap<_, _>>();
                (entry.key().clone(), scores)
            })
            .collect::<HashMap<String, HashMap<String, f64>>>();
        Ok(serialize(&buckets)?)
    }

    /// Replaces every bucket with the content of a snapshot.
    pub fn restore(&self, snapshot: &[u8]) -> Result<()> {
        let buckets: HashMap<String, HashMap<String, f64>> = deserialize(snapshot)?;
        self.buckets.clear();
        for (key, scores) in buckets {
            self.buckets.insert(key, scores.into_iter().collect());
        }
        debug!("restored {} buckets", self.buckets.len());
        Ok(())
    }
}

#[async_trait]
impl BucketStore for MemStore {
    async fn increment(&self, key: &str, member: &str, amount: f64) -> Result<f64> {
        let mut bucket = self.buckets.entry(key.to_owned()).or_default();
        let score = match bucket.get_mut(member) {
            Some(score) => {
                *score += amount;
                *score
            }
            None => {
                bucket.insert(member.to_owned(), amount);
                amount
            }
        };
        Ok(score)
    }

    async fn top_k(&self, key: &str, k: usize) -> Result<Vec<ScoredMember>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut members = match self.buckets.get(key) {
            Some(bucket) => bucket
                .iter()
                .map(|(member, score)| ScoredMember::new(member.as_str(), *score))
                .collect::<Vec<_>>(),
            None => return Ok(Vec::new()),
        };
        if members.len() > k {
            members.select_nth_unstable_by(k - 1, by_rank);
            members.truncate(k);
        }
        members.sort_by(by_rank);
        Ok(members)
    }
}

/// Bounds every call of the wrapped store by a deadline.
///
/// A call that does not finish in time fails with [`Error::Elapsed`](crate::Error::Elapsed).
/// Calls are never retried.
pub struct Timeout<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Timeout<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    #[inline]
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    #[inline]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: BucketStore> BucketStore for Timeout<S> {
    async fn increment(&self, key: &str, member: &str, amount: f64) -> Result<f64> {
        match timeout(self.timeout, self.inner.increment(key, member, amount)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("increment timed out, key: {}, member: {}", key, member);
                Err(e.into())
            }
        }
    }

    async fn top_k(&self, key: &str, k: usize) -> Result<Vec<ScoredMember>> {
        match timeout(self.timeout, self.inner.top_k(key, k)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("top_k timed out, key: {}, k: {}", key, k);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn members(ranking: &[ScoredMember]) -> Vec<&str> {
        ranking.iter().map(|m| m.member.as_str()).collect()
    }

    #[tokio::test]
    async fn increment_accumulates() {
        let store = MemStore::new();
        assert_eq!(store.increment("k", "a", 1.0).await.unwrap(), 1.0);
        assert_eq!(store.increment("k", "a", 2.5).await.unwrap(), 3.5);
        assert_eq!(store.increment("k", "a", -0.5).await.unwrap(), 3.0);
        assert_eq!(store.score("k", "a"), Some(3.0));
        assert_eq!(store.score("k", "b"), None);
        assert_eq!(store.score("other", "a"), None);
    }

    #[tokio::test]
    async fn top_k() {
        let store = MemStore::new();
        for (m, s) in [("a", 1.0), ("b", 3.0), ("c", 5.0), ("d", 1.0)] {
            store.increment("k", m, s).await.unwrap();
        }
        assert_eq!(members(&store.top_k("k", 2).await.unwrap()), vec!["c", "b"]);
        assert_eq!(
            members(&store.top_k("k", 10).await.unwrap()),
            vec!["c", "b", "a", "d"]
        );
        assert!(store.top_k("k", 0).await.unwrap().is_empty());
        assert!(store.top_k("missing", 3).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments() {
        let store = Arc::new(MemStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..500 {
                    store.increment("k", "shared", 1.0).await.unwrap();
                    store.increment("k", &format!("own-{i}"), 1.0).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.score("k", "shared"), Some(4_000.0));
        assert_eq!(store.bucket_len("k"), 9);
        assert_eq!(store.score("k", "own-7"), Some(500.0));
    }

    #[tokio::test]
    async fn snapshot_restore() {
        let store = MemStore::new();
        store.increment("k1", "a", 2.0).await.unwrap();
        store.increment("k2", "b", 7.0).await.unwrap();
        let snapshot = store.snapshot().unwrap();

        let restored = MemStore::new();
        restored.increment("stale", "x", 1.0).await.unwrap();
        restored.restore(&snapshot).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.score("k1", "a"), Some(2.0));
        assert_eq!(restored.score("k2", "b"), Some(7.0));
        assert_eq!(restored.score("stale", "x"), None);

        assert!(matches!(restored.restore(&[0xff]), Err(Error::Other(_))));
    }

    #[tokio::test]
    async fn remove_bucket() {
        let store = MemStore::new();
        store.increment("k", "a", 1.0).await.unwrap();
        assert!(store.remove("k"));
        assert!(!store.remove("k"));
        assert!(store.is_empty());
    }

    struct Stalled;

    #[async_trait]
    impl BucketStore for Stalled {
        async fn increment(&self, _key: &str, _member: &str, _amount: f64) -> Result<f64> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0.0)
        }

        async fn top_k(&self, _key: &str, _k: usize) -> Result<Vec<ScoredMember>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_elapses() {
        let store = Timeout::new(Stalled, Duration::from_millis(100));
        assert!(matches!(
            store.increment("k", "a", 1.0).await,
            Err(Error::Elapsed)
        ));
        assert!(matches!(store.top_k("k", 3).await, Err(Error::Elapsed)));
    }

    #[tokio::test]
    async fn timeout_passes_through() {
        let store = Timeout::new(MemStore::new(), Duration::from_secs(5));
        assert_eq!(store.increment("k", "a", 4.0).await.unwrap(), 4.0);
        assert_eq!(
            store.top_k("k", 1).await.unwrap(),
            vec![ScoredMember::new("a", 4.0)]
        );
        assert_eq!(store.get_ref().score("k", "a"), Some(4.0));
    }
}
