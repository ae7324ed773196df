//! Mapping of wall-clock time to bucket indexes and bucket keys.
//!
//! Time is split into consecutive buckets of `bucket_width` minutes. Every bucket has an
//! integer index that grows by one per bucket width, and a key made of the configured
//! prefix followed by the decimal index. The key is what the store files counts under.
//!
//! Note the units: timestamps are Unix seconds while bucket widths are minutes.

const SECS_PER_MINUTE: i64 = 60;

/// Index of the bucket holding `timestamp`, `ceil(timestamp / bucket_width / 60)`.
///
/// `timestamp` is in seconds and `bucket_width` in minutes. The index stays constant for a
/// whole bucket width and increases by one at each boundary, with no smoothing at the
/// rollover instant. A timestamp falling exactly on a boundary belongs to the bucket that
/// ends there.
///
/// `bucket_width` must be non zero and `bucket_width * 60` must fit an `i64`,
/// which [`Config::validate`](crate::Config::validate) guarantees.
#[inline]
pub fn bucket_index(timestamp: i64, bucket_width: u64) -> i64 {
    let span = bucket_span_secs(bucket_width);
    let index = timestamp.div_euclid(span);
    if timestamp.rem_euclid(span) != 0 {
        index + 1
    } else {
        index
    }
}

/// Key of the bucket with the given index.
#[inline]
pub fn bucket_key(prefix: &str, index: i64) -> String {
    format!("{prefix}{index}")
}

/// Number of buckets needed to cover `time_width` minutes, never less than one.
#[inline]
pub fn bucket_count(time_width: u64, bucket_width: u64) -> u64 {
    time_width.div_ceil(bucket_width).max(1)
}

/// Indexes of the `count` buckets ending at `first`, newest first.
///
/// Stops early rather than going below `i64::MIN`.
#[inline]
pub(crate) fn window(first: i64, count: u64) -> impl Iterator<Item = i64> {
    (0..count).map_while(move |age| i64::try_from(age).ok().and_then(|age| first.checked_sub(age)))
}

#[inline]
fn bucket_span_secs(bucket_width: u64) -> i64 {
    (bucket_width as i64).saturating_mul(SECS_PER_MINUTE)
}
