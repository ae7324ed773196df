//! Time-decayed, bucketed event counters.
//!
//! Occurrences of members are counted per fixed-width time bucket in a [`BucketStore`], and
//! ranked over a window of buckets where older buckets weigh less than recent ones.

use std::sync::Arc;

pub use crate::aggregate::{aggregate_buckets, rank, Aggregate, ScoredMember};
pub use crate::bucket::{bucket_count, bucket_index, bucket_key};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::counter::{active_increments, active_rankings, TimeSeriesCounter};
pub use crate::decay::{exponential_decay, Decay, Exponential, NoDecay, DEFAULT_GRAVITY};
pub use crate::error::{Error, Result};
pub use crate::store::{BucketStore, MemStore, Timeout};

mod aggregate;
mod bucket;
mod clock;
mod counter;
mod decay;
mod error;
mod store;

#[derive(Clone)]
pub struct Config {
    //Prepended to every bucket index to form the store key
    pub prefix: String,
    //Default ranking window, in minutes
    pub total_time_width: u64,
    //Width of one bucket, in minutes
    pub bucket_time_width: u64,
    //Candidates read per bucket, as a multiple of the requested ranking size
    pub oversample: usize,
    //Store calls a ranking keeps in flight at once
    pub ranking_concurrency: usize,
    //Reserved, not applied when ranking
    pub min_count: f64,
    pub decay: Arc<dyn Decay>,
}

impl Config {
    pub fn new<P: Into<String>>(prefix: P, total_time_width: u64, bucket_time_width: u64) -> Self {
        Self {
            prefix: prefix.into(),
            total_time_width,
            bucket_time_width,
            ..Default::default()
        }
    }

    /// Number of buckets in the default ranking window.
    #[inline]
    pub fn total_buckets(&self) -> u64 {
        if self.bucket_time_width == 0 {
            return 0;
        }
        self.total_time_width.div_ceil(self.bucket_time_width)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_time_width == 0 {
            return Err(Error::InvalidConfiguration(
                "bucket width must be greater than zero".into(),
            ));
        }
        if i64::try_from(self.bucket_time_width)
            .ok()
            .and_then(|w| w.checked_mul(60))
            .is_none()
        {
            return Err(Error::InvalidConfiguration(format!(
                "bucket width of {} minutes is out of range",
                self.bucket_time_width
            )));
        }
        if self.total_buckets() == 0 {
            return Err(Error::InvalidConfiguration(
                "window width must cover at least one bucket".into(),
            ));
        }
        if self.oversample == 0 {
            return Err(Error::InvalidConfiguration(
                "oversample must be greater than zero".into(),
            ));
        }
        if self.ranking_concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "ranking concurrency must be greater than zero".into(),
            ));
        }
        if !self.min_count.is_finite() {
            return Err(Error::InvalidConfiguration(format!(
                "min count must be finite, got {}",
                self.min_count
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            total_time_width: 120,
            bucket_time_width: 5,
            oversample: 3,
            ranking_concurrency: 4,
            min_count: 0.0,
            decay: Arc::new(Exponential::default()),
        }
    }
}
