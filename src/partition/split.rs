use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::SplitConfig;

/// Three disjoint subsets of one source directory's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSets<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

/// Carves off a seeded-random test fraction, then a val fraction of the
/// remainder; the rest is train. Identical inputs always yield identical sets,
/// on any platform and `rand` release.
pub fn split_files<T: Clone>(files: &[T], config: &SplitConfig) -> SplitSets<T> {
    let (test, rest) = take_fraction(files, config.test_fraction, config.seed);
    let (val, train) = take_fraction(&rest, config.val_fraction, config.seed);
    SplitSets { train, val, test }
}

/// Number of items a fraction claims out of `total`, rounded up.
pub fn fraction_count(total: usize, fraction: f64) -> usize {
    let raw = (total as f64 * fraction - 1e-9).ceil().max(0.0) as usize;
    raw.min(total)
}

fn take_fraction<T: Clone>(items: &[T], fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let count = fraction_count(items.len(), fraction);
    let (taken, rest) = order.split_at(count);
    let pick = |indices: &[usize]| indices.iter().map(|&i| items[i].clone()).collect();
    (pick(taken), pick(rest))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("ab_joy_{i}.0_c.png")).collect()
    }

    #[test]
    fn splits_are_disjoint_and_complete() {
        let files = names(23);
        let sets = split_files(&files, &SplitConfig::default());

        let train: BTreeSet<_> = sets.train.iter().collect();
        let val: BTreeSet<_> = sets.val.iter().collect();
        let test: BTreeSet<_> = sets.test.iter().collect();
        assert!(train.is_disjoint(&val));
        assert!(train.is_disjoint(&test));
        assert!(val.is_disjoint(&test));

        let union: BTreeSet<&String> = train.union(&val).chain(test.iter()).copied().collect();
        let expected: BTreeSet<&String> = files.iter().collect();
        assert_eq!(union, expected);
    }

    #[test]
    fn val_fraction_applies_to_remainder() {
        let sets = split_files(&names(100), &SplitConfig::default());
        assert_eq!(sets.test.len(), 20);
        assert_eq!(sets.val.len(), 16);
        assert_eq!(sets.train.len(), 64);
    }

    #[test]
    fn small_directories_round_up() {
        let sets = split_files(&names(5), &SplitConfig::default());
        assert_eq!((sets.train.len(), sets.val.len(), sets.test.len()), (3, 1, 1));
    }

    #[test]
    fn same_seed_same_split() {
        let files = names(40);
        let first = split_files(&files, &SplitConfig::default());
        let second = split_files(&files, &SplitConfig::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_ratio_stays_within_rounding() {
        let config = SplitConfig::default();
        for total in 1..60 {
            let sets = split_files(&names(total), &config);
            let expected = total as f64 * config.test_fraction;
            assert!((sets.test.len() as f64 - expected).abs() < 1.0, "total {total}");
        }
    }

    #[test]
    fn zero_fractions_keep_everything_in_train() {
        let config = SplitConfig {
            test_fraction: 0.0,
            val_fraction: 0.0,
            seed: 1,
        };
        let sets = split_files(&names(7), &config);
        assert_eq!(sets.train.len(), 7);
        assert!(sets.val.is_empty() && sets.test.is_empty());
    }
}
