use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

pub(crate) type HashMapA<K, V> = HashMap<K, V, ahash::RandomState>;

/// A member of a bucket or a ranking with its (possibly weighted) score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

impl ScoredMember {
    #[inline]
    pub fn new<M: Into<String>>(member: M, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

impl<M: Into<String>> From<(M, f64)> for ScoredMember {
    #[inline]
    fn from((member, score): (M, f64)) -> Self {
        Self::new(member, score)
    }
}

/// Adds every score of `bucket`, multiplied by `weight`, to `totals`.
///
/// Members missing from `totals` start at 0, so they show up even when `weight` is 0.
pub fn aggregate_buckets<'a, I, H>(totals: &mut HashMap<String, f64, H>, bucket: I, weight: f64)
where
    I: IntoIterator<Item = &'a ScoredMember>,
    H: BuildHasher,
{
    for item in bucket {
        match totals.get_mut(item.member.as_str()) {
            Some(total) => *total += item.score * weight,
            None => {
                totals.insert(item.member.clone(), item.score * weight);
            }
        }
    }
}

/// Running, weighted totals of the buckets of one window.
#[derive(Debug, Default)]
pub struct Aggregate {
    totals: HashMapA<String, f64>,
}

impl Aggregate {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one bucket snapshot weighted by `weight`.
    #[inline]
    pub fn merge(&mut self, bucket: &[ScoredMember], weight: f64) {
        aggregate_buckets(&mut self.totals, bucket, weight);
    }

    #[inline]
    pub fn get(&self, member: &str) -> Option<f64> {
        self.totals.get(member).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// The `how_many` highest totals, see [`rank`].
    pub fn top(self, how_many: usize) -> Vec<ScoredMember> {
        let mut ranking = self
            .totals
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect::<Vec<_>>();
        rank(&mut ranking);
        ranking.truncate(how_many);
        ranking
    }
}

/// Sorts by score descending. Equal scores are ordered by member ascending.
#[inline]
pub fn rank(members: &mut [ScoredMember]) {
    members.sort_by(by_rank);
}

#[inline]
pub(crate) fn by_rank(a: &ScoredMember, b: &ScoredMember) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.member.cmp(&b.member))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals() -> HashMapA<String, f64> {
        [("1", 1.0), ("2", 5.0), ("3", 3.0), ("4", 1.0)]
            .into_iter()
            .map(|(m, s)| (m.to_owned(), s))
            .collect()
    }

    fn bucket() -> Vec<ScoredMember> {
        vec![
            ScoredMember::new("2", 2.0),
            ScoredMember::new("4", 1.0),
            ScoredMember::new("5", 4.0),
        ]
    }

    fn check(weight: f64, expected: [f64; 5]) {
        let mut a = totals();
        aggregate_buckets(&mut a, &bucket(), weight);
        assert_eq!(a.len(), 5);
        for (i, score) in expected.iter().enumerate() {
            let member = (i + 1).to_string();
            assert_eq!(a[&member], *score, "wrong aggregate '{member}'");
        }
    }

    #[test]
    fn aggregate_buckets_weight_1() {
        check(1.0, [1.0, 7.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn aggregate_buckets_weight_3() {
        check(3.0, [1.0, 11.0, 3.0, 4.0, 12.0]);
    }

    #[test]
    fn aggregate_buckets_weight_0() {
        check(0.0, [1.0, 5.0, 3.0, 1.0, 0.0]);
    }

    #[test]
    fn top_sorts_and_truncates() {
        let mut agg = Aggregate::new();
        agg.merge(&bucket(), 1.0);
        agg.merge(&[ScoredMember::new("4", 10.0)], 0.5);
        assert_eq!(agg.get("4"), Some(6.0));
        assert_eq!(
            agg.top(2),
            vec![ScoredMember::new("4", 6.0), ScoredMember::new("5", 4.0)]
        );
    }

    #[test]
    fn ties_by_member() {
        let mut members = vec![
            ScoredMember::new("b", 1.0),
            ScoredMember::new("c", 2.0),
            ScoredMember::new("a", 1.0),
            ScoredMember::new("z", -1.0),
        ];
        rank(&mut members);
        let order: Vec<&str> = members.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b", "z"]);
    }

    #[test]
    fn empty() {
        let agg = Aggregate::new();
        assert!(agg.is_empty());
        assert!(agg.top(10).is_empty());
    }
}
