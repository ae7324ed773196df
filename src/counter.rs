use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use futures::future::ready;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};

use crate::aggregate::{Aggregate, ScoredMember};
use crate::bucket::{bucket_count, bucket_index, bucket_key, window};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::BucketStore;
use crate::Config;

static ACTIVE_INCREMENTS: AtomicIsize = AtomicIsize::new(0);
static ACTIVE_RANKINGS: AtomicIsize = AtomicIsize::new(0);

/// Number of `incr_count` calls in flight, over all counters of the process.
pub fn active_increments() -> isize {
    ACTIVE_INCREMENTS.load(Ordering::SeqCst)
}

/// Number of rankings in flight, over all counters of the process.
pub fn active_rankings() -> isize {
    ACTIVE_RANKINGS.load(Ordering::SeqCst)
}

/// Counts members per time bucket and ranks them over a window of buckets,
/// discounting older buckets with the configured decay.
///
/// All counts live in the store; the counter itself only holds its configuration.
pub struct TimeSeriesCounter<S, C = SystemClock> {
    store: S,
    clock: C,
    cfg: Arc<Config>,
}

impl<S: BucketStore> TimeSeriesCounter<S> {
    /// Creates a counter over `store` that reads time from the system clock.
    pub fn new(store: S, cfg: Config) -> Result<Self> {
        Self::with_clock(store, SystemClock, cfg)
    }
}

impl<S: BucketStore, C: Clock> TimeSeriesCounter<S, C> {
    /// Creates a counter over `store` that reads time from `clock`.
    ///
    /// Fails with `InvalidConfiguration` if `cfg` does not validate.
    pub fn with_clock(store: S, clock: C, cfg: Config) -> Result<Self> {
        cfg.validate()?;
        info!(
            "time series counter, prefix: {:?}, window: {}m, bucket: {}m, buckets: {}",
            cfg.prefix,
            cfg.total_time_width,
            cfg.bucket_time_width,
            cfg.total_buckets()
        );
        Ok(Self {
            store,
            clock,
            cfg: Arc::new(cfg),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Index of the bucket the current time falls in.
    #[inline]
    pub fn current_bucket(&self) -> i64 {
        bucket_index(self.clock.now_secs(), self.cfg.bucket_time_width)
    }

    /// Key of bucket `index`, or of the current bucket when `index` is `None`.
    #[inline]
    pub fn bucket_key(&self, index: Option<i64>) -> String {
        let index = index.unwrap_or_else(|| self.current_bucket());
        bucket_key(&self.cfg.prefix, index)
    }

    /// Adds `amount` to the count of `member` in the current bucket and returns its new count.
    #[inline]
    pub async fn incr_count(&self, member: &str, amount: f64) -> Result<f64> {
        let (_, count) = self.incr_count_with_bucket(member, amount).await?;
        Ok(count)
    }

    /// Like [`incr_count`](Self::incr_count), also returning the index of the bucket that
    /// was incremented.
    pub async fn incr_count_with_bucket(&self, member: &str, amount: f64) -> Result<(i64, f64)> {
        ACTIVE_INCREMENTS.fetch_add(1, Ordering::SeqCst);
        scopeguard::defer! {
            ACTIVE_INCREMENTS.fetch_sub(1, Ordering::SeqCst);
        }

        let bucket = self.current_bucket();
        let key = self.bucket_key(Some(bucket));
        match self.store.increment(&key, member, amount).await {
            Ok(count) => Ok((bucket, count)),
            Err(e) => {
                warn!("error incrementing {:?} in bucket {}: {:?}", member, key, e);
                Err(e)
            }
        }
    }

    /// The `how_many` highest counts of one bucket, highest first.
    pub async fn get_bucket_count(&self, bucket: i64, how_many: usize) -> Result<Vec<ScoredMember>> {
        let key = self.bucket_key(Some(bucket));
        self.store.top_k(&key, how_many).await
    }

    /// Ranks members over the `time_width` minutes ending now and returns the top `how_many`.
    ///
    /// Each bucket of the window contributes its top `oversample * how_many` members,
    /// weighted by the decay of its age. A member that stays below that cut in every single
    /// bucket is left out even if its combined count would rank. Buckets without data
    /// contribute nothing.
    ///
    /// Buckets are read newest first, with at most `ranking_concurrency` store calls in
    /// flight at any time.
    pub async fn get_ranking(&self, time_width: u64, how_many: usize) -> Result<Vec<ScoredMember>> {
        if how_many == 0 {
            return Ok(Vec::new());
        }

        ACTIVE_RANKINGS.fetch_add(1, Ordering::SeqCst);
        scopeguard::defer! {
            ACTIVE_RANKINGS.fetch_sub(1, Ordering::SeqCst);
        }

        let buckets = bucket_count(time_width, self.cfg.bucket_time_width);
        let first = self.current_bucket();
        let k = self.cfg.oversample.saturating_mul(how_many);

        let aggregate = stream::iter(window(first, buckets))
            .map(|index| {
                let key = bucket_key(&self.cfg.prefix, index);
                async move {
                    let members = self.store.top_k(&key, k).await?;
                    Ok::<_, crate::Error>((first - index, members))
                }
            })
            .buffered(self.cfg.ranking_concurrency)
            .try_fold(Aggregate::new(), |mut aggregate, (age, members)| {
                aggregate.merge(&members, self.cfg.decay.weight(age as u64));
                ready(Ok(aggregate))
            })
            .await
            .map_err(|e| {
                warn!("error ranking {} buckets ending at {}: {:?}", buckets, first, e);
                e
            })?;

        debug!(
            "ranking over {} buckets ending at {}, {} candidates",
            buckets,
            first,
            aggregate.len()
        );
        Ok(aggregate.top(how_many))
    }

    /// Ranks members over the configured window, see [`get_ranking`](Self::get_ranking).
    #[inline]
    pub async fn ranking(&self, how_many: usize) -> Result<Vec<ScoredMember>> {
        self.get_ranking(self.cfg.total_time_width, how_many).await
    }
}
