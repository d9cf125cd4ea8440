//! Batch buffer and natural-key partitioning

use reviews_common::{NaturalKey, Review};
use std::collections::HashSet;

/// A normalized record with its input line
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub line_number: usize,
    pub review: Review,
}

/// Bounded buffer of records flushed together
#[derive(Debug, Default)]
pub struct Batch {
    entries: Vec<BatchEntry>,
}

/// Result of splitting a batch by natural-key membership
///
/// Every batch record lands in exactly one of `new` or `duplicates`.
#[derive(Debug, Default)]
pub struct Partition {
    /// Records to insert, in input order
    pub new: Vec<Review>,
    /// Records dropped because their key is already stored or appeared
    /// earlier in the same batch
    pub duplicates: Vec<Review>,
    /// Of `duplicates`, how many were already stored
    pub stored_duplicates: usize,
    /// Of `duplicates`, how many repeated a key earlier in the batch
    pub in_batch_duplicates: usize,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, line_number: usize, review: Review) {
        self.entries.push(BatchEntry {
            line_number,
            review,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First and last input line of the batch (`(0, 0)` when empty)
    pub fn line_range(&self) -> (usize, usize) {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => (first.line_number, last.line_number),
            _ => (0, 0),
        }
    }

    /// Distinct natural keys, in first-seen order
    pub fn distinct_keys(&self) -> Vec<NaturalKey> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries
            .iter()
            .map(|e| e.review.natural_key())
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    /// Split into new and duplicate records
    ///
    /// A record is a duplicate if its key is in `existing` or was already
    /// kept earlier in this batch; the first occurrence wins. The batch is
    /// left intact so a retried flush can partition it again.
    pub fn partition(&self, existing: &HashSet<NaturalKey>) -> Partition {
        let mut kept = HashSet::with_capacity(self.entries.len());
        let mut partition = Partition::default();

        for entry in &self.entries {
            let key = entry.review.natural_key();
            if existing.contains(&key) {
                partition.stored_duplicates += 1;
                partition.duplicates.push(entry.review.clone());
            } else if !kept.insert(key) {
                partition.in_batch_duplicates += 1;
                partition.duplicates.push(entry.review.clone());
            } else {
                partition.new.push(entry.review.clone());
            }
        }

        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(asin: &str, user_id: &str, timestamp: i64, rating: f32) -> Review {
        Review {
            asin: asin.to_string(),
            user_id: user_id.to_string(),
            timestamp,
            rating,
            ..Review::default()
        }
    }

    fn batch_of(reviews: Vec<Review>) -> Batch {
        let mut batch = Batch::default();
        for (i, r) in reviews.into_iter().enumerate() {
            batch.push(i + 1, r);
        }
        batch
    }

    #[test]
    fn test_partition_covers_batch_without_overlap() {
        let batch = batch_of(vec![
            review("A1", "U1", 100, 5.0),
            review("A2", "U1", 100, 4.0),
            review("A1", "U2", 100, 3.0),
            review("A3", "U3", 300, 2.0),
        ]);
        let existing: HashSet<NaturalKey> = [
            NaturalKey::new("A2", "U1", 100),
            NaturalKey::new("A9", "U9", 900),
        ]
        .into_iter()
        .collect();

        let partition = batch.partition(&existing);

        assert_eq!(partition.new.len() + partition.duplicates.len(), batch.len());

        let new_keys: HashSet<NaturalKey> = partition.new.iter().map(Review::natural_key).collect();
        let dup_keys: HashSet<NaturalKey> = partition.duplicates.iter().map(Review::natural_key).collect();
        assert!(new_keys.is_disjoint(&dup_keys));
        assert!(new_keys.iter().all(|k| !existing.contains(k)));
        assert!(dup_keys.iter().all(|k| existing.contains(k)));
        assert_eq!(partition.stored_duplicates, 1);
        assert_eq!(partition.in_batch_duplicates, 0);
    }

    #[test]
    fn test_in_batch_duplicates_keep_first_occurrence() {
        let batch = batch_of(vec![
            review("A1", "U1", 100, 5.0),
            review("A1", "U1", 100, 1.0),
            review("A1", "U1", 101, 2.0),
        ]);

        let partition = batch.partition(&HashSet::new());

        assert_eq!(partition.new.len(), 2);
        assert_eq!(partition.new[0].rating, 5.0);
        assert_eq!(partition.new[1].timestamp, 101);
        assert_eq!(partition.in_batch_duplicates, 1);
        assert_eq!(partition.duplicates[0].rating, 1.0);
    }

    #[test]
    fn test_all_stored_yields_empty_new() {
        let batch = batch_of(vec![review("A1", "U1", 100, 5.0), review("A1", "U1", 100, 5.0)]);
        let existing: HashSet<NaturalKey> = [NaturalKey::new("A1", "U1", 100)].into_iter().collect();

        let partition = batch.partition(&existing);

        assert!(partition.new.is_empty());
        assert_eq!(partition.stored_duplicates, 2);
    }

    #[test]
    fn test_repartition_sees_new_stored_keys() {
        let batch = batch_of(vec![review("A1", "U1", 100, 5.0), review("A2", "U1", 100, 4.0)]);

        let first = batch.partition(&HashSet::new());
        let stored: HashSet<NaturalKey> = first.new.iter().map(Review::natural_key).collect();
        let second = batch.partition(&stored);

        assert_eq!(first.new.len(), 2);
        assert!(second.new.is_empty());
        assert_eq!(second.stored_duplicates, 2);
    }

    #[test]
    fn test_distinct_keys_and_line_range() {
        let mut batch = Batch::default();
        assert_eq!(batch.line_range(), (0, 0));
        assert!(batch.distinct_keys().is_empty());

        batch.push(7, review("A1", "U1", 1, 0.0));
        batch.push(9, review("A1", "U1", 1, 0.0));
        batch.push(12, review("A2", "U1", 1, 0.0));

        assert_eq!(batch.line_range(), (7, 12));
        assert_eq!(
            batch.distinct_keys(),
            vec![NaturalKey::new("A1", "U1", 1), NaturalKey::new("A2", "U1", 1)]
        );
    }
}
