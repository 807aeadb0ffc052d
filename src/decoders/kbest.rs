use core::cmp::Ordering;

use hashbrown::HashMap;

use crate::decoders::exact::{shift, transition};
use crate::decoders::{labels_at, SequenceModel};
use crate::errors::{CrfError, Result};

/// A label sequence with its score.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredSequence {
    /// Labels of the real positions.
    pub labels: Vec<u32>,

    /// Sum of the local scores.
    pub score: f64,
}

/// Search for the `k` best sequences.
///
/// Every state keeps its `k` best partial paths, so the result is exact.
#[derive(Clone, Copy, Debug)]
pub struct KBestDecoder {
    k: usize,
}

// best first; equal scores by the lowest path
fn by_score(a: &(f64, Vec<u32>), b: &(f64, Vec<u32>)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

impl KBestDecoder {
    /// Creates a decoder.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(CrfError::invalid_argument("k", "must not be 0"));
        }
        Ok(Self { k })
    }

    /// Number of sequences returned at most.
    #[inline(always)]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns up to `k` sequences, best first.
    pub fn k_best<M>(&self, model: &M) -> Vec<ScoredSequence>
    where
        M: SequenceModel + ?Sized,
    {
        if model.is_empty() {
            return vec![ScoredSequence {
                labels: vec![],
                score: 0.0,
            }];
        }
        let win = model.left_window() + model.right_window();
        let n = model.padded_len();
        let mut scratch = model.pad(&vec![model.background(); model.len()]);

        let mut lists: HashMap<Vec<u32>, Vec<(f64, Vec<u32>)>> = HashMap::new();
        lists.insert(
            vec![model.background(); win],
            vec![(0.0, Vec::with_capacity(n))],
        );
        for q in 0..n {
            let labels = labels_at(model, q as isize);
            let mut next: HashMap<Vec<u32>, Vec<(f64, Vec<u32>)>> = HashMap::new();
            for (state, paths) in &lists {
                for &label in &labels {
                    let local = transition(model, &mut scratch, state, label, q);
                    let entry = next.entry(shift(state, label)).or_default();
                    for (score, path) in paths {
                        let mut path = path.clone();
                        path.push(label);
                        entry.push((score + local, path));
                    }
                }
            }
            for paths in next.values_mut() {
                paths.sort_unstable_by(by_score);
                paths.truncate(self.k);
            }
            lists = next;
        }

        let mut all: Vec<(f64, Vec<u32>)> = lists.into_values().flatten().collect();
        all.sort_unstable_by(by_score);
        all.truncate(self.k);
        let left = model.left_window();
        all.into_iter()
            .map(|(score, path)| ScoredSequence {
                labels: path[left..left + model.len()].to_vec(),
                score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::decoders::ExactDecoder;
    use crate::forward_backward::CliqueTree;
    use crate::test_utils::{all_sequences, toy_problem};

    #[test]
    fn test_kbest_contains_exact() {
        let problem = toy_problem(3, 2, 4, 5);
        let tree = CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
            .unwrap();
        let (exact_labels, exact) = ExactDecoder.best_sequence_with_score(&tree);
        let results = KBestDecoder::new(5).unwrap().k_best(&tree);
        assert_eq!(5, results.len());
        assert_eq!(exact_labels, results[0].labels);
        assert!((exact - results[0].score).abs() < 1e-9);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            assert_ne!(pair[0].labels, pair[1].labels);
        }
    }

    #[test]
    fn test_kbest_matches_enumeration() {
        let problem = toy_problem(2, 3, 3, 8);
        let tree = CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
            .unwrap();
        let mut expected: Vec<f64> = all_sequences(2, 3)
            .iter()
            .map(|y| tree.log_prob_sequence(y))
            .collect();
        expected.sort_unstable_by(|a, b| b.total_cmp(a));

        // more than there are sequences
        let results = KBestDecoder::new(20).unwrap().k_best(&tree);
        assert_eq!(8, results.len());
        for (e, r) in expected.iter().zip(&results) {
            assert!((e - r.score).abs() < 1e-9);
            assert!((tree.log_prob_sequence(&r.labels) - r.score).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_k() {
        assert!(KBestDecoder::new(0).is_err());
    }
}
