//! Stratified, shuffled K-fold cross-validation.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::MlError;

/// Train/test index sets for one fold. Both are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Assign every sample to one of `n_splits` test folds, keeping class
/// proportions roughly equal across folds.
///
/// Classes are encoded in order of first appearance. Per-fold class counts
/// are dealt round-robin over the class-sorted labels, then each class's fold
/// assignment is shuffled with a generator seeded from `seed`, so the same
/// labels and seed always give the same folds.
pub fn stratified_kfold(labels: &[u8], n_splits: usize, seed: u64) -> Result<Vec<Fold>, MlError> {
    let n = labels.len();
    let invalid = |reason: &str| MlError::InvalidSplit {
        samples: n,
        splits: n_splits,
        reason: reason.to_string(),
    };
    if n_splits < 2 {
        return Err(invalid("at least 2 folds are required"));
    }
    if n_splits > n {
        return Err(invalid("more folds than samples"));
    }

    let mut classes: Vec<u8> = Vec::new();
    let encoded: Vec<usize> = labels
        .iter()
        .map(|l| match classes.iter().position(|c| c == l) {
            Some(k) => k,
            None => {
                classes.push(*l);
                classes.len() - 1
            }
        })
        .collect();

    let mut counts = vec![0usize; classes.len()];
    for &k in &encoded {
        counts[k] += 1;
    }
    if counts.iter().all(|&c| c < n_splits) {
        return Err(invalid("every class has fewer members than folds"));
    }
    if let Some(&min) = counts.iter().min()
        && min < n_splits
    {
        warn!(min_class = min, n_splits, "least populated class has fewer members than folds");
    }

    let mut sorted = encoded.clone();
    sorted.sort_unstable();
    // allocation[fold][class]
    let mut allocation = vec![vec![0usize; classes.len()]; n_splits];
    for (i, &k) in sorted.iter().enumerate() {
        allocation[i % n_splits][k] += 1;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut test_fold = vec![0usize; n];
    for k in 0..classes.len() {
        let mut folds_for_class: Vec<usize> = (0..n_splits)
            .flat_map(|f| std::iter::repeat_n(f, allocation[f][k]))
            .collect();
        folds_for_class.shuffle(&mut rng);
        let members = encoded.iter().enumerate().filter(|&(_, &c)| c == k).map(|(i, _)| i);
        for (i, f) in members.zip(folds_for_class) {
            test_fold[i] = f;
        }
    }

    Ok((0..n_splits)
        .map(|f| {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| test_fold[i] == f);
            Fold { train, test }
        })
        .collect())
}

/// Gather rows and labels at the given indices.
pub fn take(rows: &[Vec<f32>], labels: &[u8], idx: &[usize]) -> (Vec<Vec<f32>>, Vec<u8>) {
    (
        idx.iter().map(|&i| rows[i].clone()).collect(),
        idx.iter().map(|&i| labels[i]).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn folds_partition_samples() {
        let labels = [0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let folds = stratified_kfold(&labels, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        for f in &folds {
            assert_eq!(f.test.len(), 2);
            assert_eq!(f.train.len(), 8);
            let positives = f.test.iter().filter(|&&i| labels[i] == 1).count();
            assert_eq!(positives, 1);
        }
    }

    #[test]
    fn same_seed_same_folds() {
        let labels = [0, 0, 0, 1, 1, 1, 0, 1, 0, 0, 1, 1];
        assert_eq!(
            stratified_kfold(&labels, 3, 7).unwrap(),
            stratified_kfold(&labels, 3, 7).unwrap()
        );
    }

    #[test]
    fn too_few_members_everywhere_errors() {
        let labels = [0, 1, 0, 1];
        assert!(matches!(
            stratified_kfold(&labels, 3, 0),
            Err(MlError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn more_folds_than_samples_errors() {
        assert!(stratified_kfold(&[0, 1], 5, 0).is_err());
        assert!(stratified_kfold(&[0, 1, 0], 1, 0).is_err());
    }

    #[test]
    fn minority_class_below_folds_still_splits() {
        let labels = [0, 0, 0, 0, 0, 0, 1, 1];
        let folds = stratified_kfold(&labels, 3, 1).unwrap();
        assert_eq!(folds.iter().map(|f| f.test.len()).sum::<usize>(), 8);
    }

    proptest! {
        #[test]
        fn class_counts_balanced_per_fold(
            labels in proptest::collection::vec(0u8..2, 10..60),
            seed in any::<u64>(),
        ) {
            let zeros = labels.iter().filter(|&&l| l == 0).count();
            let ones = labels.len() - zeros;
            prop_assume!(zeros >= 5 && ones >= 5);
            let folds = stratified_kfold(&labels, 5, seed).unwrap();
            for class in [0u8, 1] {
                let per_fold: Vec<usize> = folds
                    .iter()
                    .map(|f| f.test.iter().filter(|&&i| labels[i] == class).count())
                    .collect();
                let max = per_fold.iter().max().unwrap();
                let min = per_fold.iter().min().unwrap();
                prop_assert!(max - min <= 1);
            }
        }
    }
}
