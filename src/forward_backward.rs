use crate::clique::LabelSpace;
use crate::dataset::EncodedSequence;
use crate::decoders::SequenceModel;
use crate::errors::{CrfError, Result};
use crate::factor::FactorTable;
use crate::math;
use crate::vector::Weights;

/// Calibrated factor chain of one sentence.
///
/// Factor `i` covers the `window_size` labels ending at position `i`.
/// Positions before the sentence are fixed to the background label.
#[derive(Clone, Debug)]
pub struct CliqueTree {
    num_labels: usize,
    window_size: usize,
    background: u32,
    potentials: Vec<FactorTable>,
    alphas: Vec<FactorTable>,
    betas: Vec<FactorTable>,

    // log P(newest label | older labels of the window), per factor entry
    conditionals: Vec<Vec<f64>>,
    log_z: f64,
}

/// Number of leading (oldest) labels of each entry equal to the background.
fn leading_background(label_space: &LabelSpace) -> Vec<usize> {
    let w = label_space.window_size();
    (0..label_space.num_states())
        .map(|e| {
            label_space
                .decode(e, w)
                .iter()
                .take_while(|&&l| l == label_space.background())
                .count()
        })
        .collect()
}

fn potentials<W>(
    sequence: &EncodedSequence,
    weights: &W,
    label_space: &LabelSpace,
) -> Result<Vec<FactorTable>>
where
    W: Weights + ?Sized,
{
    let w = label_space.window_size();
    let n_labels = label_space.num_labels();
    let leading = leading_background(label_space);
    let mut tables = Vec::with_capacity(sequence.len());
    for (pos, by_order) in sequence.features.iter().enumerate() {
        if by_order.len() != w {
            return Err(CrfError::shape_mismatch(
                0,
                pos,
                format!("{} orders, expected {w}", by_order.len()),
            ));
        }
        // score of every window of every order
        let window_scores: Vec<Vec<f64>> = by_order
            .iter()
            .enumerate()
            .map(|(order, ids)| {
                (0..label_space.num_windows(order) as u32)
                    .map(|win| ids.iter().map(|&f| weights.weight(f, win)).sum())
                    .collect()
            })
            .collect();
        let padded = (w - 1).saturating_sub(pos);
        let mut table = FactorTable::filled(n_labels, w, 0.0);
        for (e, v) in table.values_mut().iter_mut().enumerate() {
            if leading[e] < padded {
                *v = f64::NEG_INFINITY;
                continue;
            }
            for (order, scores) in window_scores.iter().enumerate() {
                if let Some(win) = label_space.suffix_window(order, e) {
                    *v += scores[win as usize];
                }
            }
        }
        tables.push(table);
    }
    Ok(tables)
}

impl CliqueTree {
    /// Builds the factors of a sequence and runs forward-backward.
    pub fn calibrate<W>(
        sequence: &EncodedSequence,
        weights: &W,
        label_space: &LabelSpace,
    ) -> Result<Self>
    where
        W: Weights + ?Sized,
    {
        let potentials = potentials(sequence, weights, label_space)?;
        let num_labels = label_space.num_labels();
        let window_size = label_space.window_size();
        let n = potentials.len();

        let mut alphas: Vec<FactorTable> = Vec::with_capacity(n);
        for (i, phi) in potentials.iter().enumerate() {
            let mut alpha = phi.clone();
            if i > 0 {
                let prev = alphas[i - 1].sum_out_oldest();
                for (e, v) in alpha.values_mut().iter_mut().enumerate() {
                    *v += prev.values()[e / num_labels];
                }
            }
            alphas.push(alpha);
        }

        let mut betas = vec![FactorTable::filled(num_labels, window_size, 0.0); n];
        for i in (0..n.saturating_sub(1)).rev() {
            let mut next = potentials[i + 1].clone();
            for (v, &b) in next.values_mut().iter_mut().zip(betas[i + 1].values()) {
                *v += b;
            }
            let next = next.sum_out_newest();
            let inner = next.len();
            for (e, v) in betas[i].values_mut().iter_mut().enumerate() {
                *v = next.values()[e % inner];
            }
        }

        let log_z = alphas.last().map_or(0.0, FactorTable::total_mass);
        if !log_z.is_finite() {
            return Err(CrfError::numerical_instability(format!(
                "log partition function is {log_z}"
            )));
        }

        let conditionals = alphas
            .iter()
            .zip(&betas)
            .map(|(alpha, beta)| {
                let marginal: Vec<f64> = alpha
                    .values()
                    .iter()
                    .zip(beta.values())
                    .map(|(a, b)| a + b)
                    .collect();
                let mut cond = Vec::with_capacity(marginal.len());
                for block in marginal.chunks(num_labels) {
                    let total = math::logsumexp_slice(block);
                    cond.extend(block.iter().map(|&m| {
                        if m == f64::NEG_INFINITY {
                            f64::NEG_INFINITY
                        } else {
                            m - total
                        }
                    }));
                }
                cond
            })
            .collect();

        Ok(Self {
            num_labels,
            window_size,
            background: label_space.background(),
            potentials,
            alphas,
            betas,
            conditionals,
            log_z,
        })
    }

    /// Number of positions.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.potentials.len()
    }

    /// Returns `true` if the sentence is empty.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.potentials.is_empty()
    }

    /// Number of labels.
    #[inline(always)]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Number of labels covered by one factor.
    #[inline(always)]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Log partition function.
    #[inline(always)]
    pub fn log_z(&self) -> f64 {
        self.log_z
    }

    fn entry_at(&self, labels: &[u32], pos: usize) -> usize {
        (0..self.window_size).fold(0, |acc, k| {
            let p = pos as isize - (self.window_size - 1 - k) as isize;
            let l = if p < 0 {
                self.background
            } else {
                labels[p as usize]
            };
            acc * self.num_labels + l as usize
        })
    }

    /// Unnormalized log-score of a full label sequence.
    pub fn total_score(&self, labels: &[u32]) -> f64 {
        debug_assert_eq!(self.len(), labels.len());
        self.potentials
            .iter()
            .enumerate()
            .map(|(pos, phi)| phi.values()[self.entry_at(labels, pos)])
            .sum()
    }

    /// Log-probability of a full label sequence.
    #[inline(always)]
    pub fn log_prob_sequence(&self, labels: &[u32]) -> f64 {
        self.total_score(labels) - self.log_z
    }

    fn marginal_table(&self, pos: usize) -> FactorTable {
        let mut table = self.alphas[pos].clone();
        for (v, &b) in table.values_mut().iter_mut().zip(self.betas[pos].values()) {
            *v += b - self.log_z;
        }
        table
    }

    /// Log-probability that the labels ending at `pos` are `labels`, oldest
    /// first. Positions outside the sentence hold the background label with
    /// probability 1. Windows longer than a factor are scored with the chain
    /// rule.
    pub fn log_prob_window(&self, pos: isize, labels: &[u32]) -> f64 {
        let mut end = pos;
        let mut labels = labels;
        while let Some((&last, rest)) = labels.split_last() {
            if end < self.len() as isize {
                break;
            }
            if last != self.background {
                return f64::NEG_INFINITY;
            }
            labels = rest;
            end -= 1;
        }
        let start = end - labels.len() as isize + 1;
        if start < 0 {
            let n_out = (-start) as usize;
            let (outside, inside) = labels.split_at(n_out.min(labels.len()));
            if outside.iter().any(|&l| l != self.background) {
                return f64::NEG_INFINITY;
            }
            labels = inside;
        }
        if labels.is_empty() {
            return 0.0;
        }
        if labels.len() <= self.window_size {
            return self.marginal_table(end as usize).suffix_mass(labels);
        }
        let start = end - labels.len() as isize + 1;
        let head_end = start + self.window_size as isize - 1;
        let mut log_prob = self
            .marginal_table(head_end as usize)
            .suffix_mass(&labels[..self.window_size]);
        for k in self.window_size..labels.len() {
            if log_prob == f64::NEG_INFINITY {
                break;
            }
            let pos = (start + k as isize) as usize;
            log_prob += self.cond_log_prob_given_previous(pos, labels[k], &labels[..k]);
        }
        log_prob
    }

    /// Probability that the labels ending at `pos` are `labels`.
    #[inline(always)]
    pub fn prob_window(&self, pos: isize, labels: &[u32]) -> f64 {
        self.log_prob_window(pos, labels).exp()
    }

    /// Probability of one label at one position.
    #[inline(always)]
    pub fn prob(&self, pos: isize, label: u32) -> f64 {
        self.prob_window(pos, &[label])
    }

    /// Label distribution at a position.
    pub fn marginals(&self, pos: usize) -> Vec<f64> {
        let table = self.marginal_table(pos);
        (0..self.num_labels as u32)
            .map(|l| table.suffix_mass(&[l]).exp())
            .collect()
    }

    /// Probability of every indexed window of the given order ending at
    /// `pos`, indexed by window ID.
    pub fn window_marginals(&self, pos: usize, order: usize, label_space: &LabelSpace) -> Vec<f64> {
        let mut probs = vec![0.0; label_space.num_windows(order)];
        let table = self.marginal_table(pos);
        for (e, &m) in table.values().iter().enumerate() {
            if m == f64::NEG_INFINITY {
                continue;
            }
            if let Some(win) = label_space.suffix_window(order, e) {
                probs[win as usize] += m.exp();
            }
        }
        probs
    }

    /// Log-probability of `label` at `pos` given the labels right before it.
    ///
    /// At most `window_size - 1` previous labels are used. Past the end of the
    /// sentence only the background label is possible.
    pub fn cond_log_prob_given_previous(&self, pos: usize, label: u32, previous: &[u32]) -> f64 {
        if pos >= self.len() {
            return if label == self.background {
                0.0
            } else {
                f64::NEG_INFINITY
            };
        }
        let context = self.window_size - 1;
        if previous.len() >= context {
            let tail = &previous[previous.len() - context..];
            let entry = tail
                .iter()
                .chain(core::iter::once(&label))
                .fold(0, |acc, &l| acc * self.num_labels + l as usize);
            return self.conditionals[pos][entry];
        }
        let mut window = previous.to_vec();
        window.push(label);
        let joint = self.log_prob_window(pos as isize, &window);
        let prior = self.log_prob_window(pos as isize - 1, previous);
        if joint == f64::NEG_INFINITY {
            f64::NEG_INFINITY
        } else {
            joint - prior
        }
    }
}

impl SequenceModel for CliqueTree {
    fn len(&self) -> usize {
        self.potentials.len()
    }

    fn left_window(&self) -> usize {
        self.window_size - 1
    }

    fn right_window(&self) -> usize {
        0
    }

    fn background(&self) -> u32 {
        self.background
    }

    fn possible_labels(&self, padded_pos: usize) -> Vec<u32> {
        let left = self.left_window();
        if padded_pos < left || padded_pos >= left + SequenceModel::len(self) {
            vec![self.background]
        } else {
            (0..self.num_labels as u32).collect()
        }
    }

    fn score_of(&self, padded: &[u32], padded_pos: usize) -> f64 {
        let left = self.left_window();
        let pos = padded_pos - left;
        let entry = padded[padded_pos - left..=padded_pos]
            .iter()
            .fold(0, |acc, &l| acc * self.num_labels + l as usize);
        self.conditionals[pos][entry]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::{all_sequences, brute_force_score, toy_problem};

    fn assert_close(expected: f64, actual: f64) {
        let scale = expected.abs().max(1.0);
        assert!(
            (expected - actual).abs() / scale < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_calibration_matches_enumeration() {
        for window_size in 1..=3 {
            for num_labels in 2..=3 {
                for len in 1..=4 {
                    let problem = toy_problem(num_labels, window_size, len, 7 + len as u64);
                    let tree = CliqueTree::calibrate(
                        &problem.sequence,
                        &problem.weights,
                        &problem.label_space,
                    )
                    .unwrap();

                    let sequences = all_sequences(num_labels, len);
                    let scores: Vec<f64> = sequences
                        .iter()
                        .map(|y| brute_force_score(&problem, y))
                        .collect();
                    let log_z = math::logsumexp_slice(&scores);
                    assert_close(log_z, tree.log_z());

                    for (y, &s) in sequences.iter().zip(&scores) {
                        assert_close(s, tree.total_score(y));
                    }

                    for pos in 0..len {
                        for label in 0..num_labels as u32 {
                            let expected: f64 = sequences
                                .iter()
                                .zip(&scores)
                                .filter(|(y, _)| y[pos] == label)
                                .map(|(_, &s)| (s - log_z).exp())
                                .sum();
                            assert_close(expected, tree.prob(pos as isize, label));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_marginals_sum_to_one() {
        let problem = toy_problem(3, 3, 5, 42);
        let tree =
            CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
                .unwrap();
        for pos in 0..5 {
            let total: f64 = tree.marginals(pos).iter().sum();
            assert_close(1.0, total);
            for order in 0..3 {
                let total: f64 = tree
                    .window_marginals(pos, order, &problem.label_space)
                    .iter()
                    .sum();
                assert_close(1.0, total);
            }
        }
    }

    #[test]
    fn test_prob_window_and_boundaries() {
        let problem = toy_problem(3, 2, 3, 3);
        let tree =
            CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
                .unwrap();
        let sequences = all_sequences(3, 3);
        let scores: Vec<f64> = sequences
            .iter()
            .map(|y| brute_force_score(&problem, y))
            .collect();
        let expected: f64 = sequences
            .iter()
            .zip(&scores)
            .filter(|(y, _)| y[1] == 2 && y[2] == 1)
            .map(|(_, &s)| (s - tree.log_z()).exp())
            .sum();
        assert_close(expected, tree.prob_window(2, &[2, 1]));

        assert_close(1.0, tree.prob(-1, 0));
        assert_eq!(0.0, tree.prob(-1, 1));
        assert_close(1.0, tree.prob(3, 0));
        assert_eq!(0.0, tree.prob(3, 2));
        assert_close(tree.prob(0, 1), tree.prob_window(0, &[0, 1]));
        assert_eq!(0.0, tree.prob_window(0, &[1, 1]));
    }

    #[test]
    fn test_windows_longer_than_a_factor() {
        let problem = toy_problem(3, 2, 4, 5);
        let tree =
            CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
                .unwrap();
        let sequences = all_sequences(3, 4);
        let expected: f64 = sequences
            .iter()
            .filter(|y| y[1..] == [2, 0, 1])
            .map(|y| (brute_force_score(&problem, y) - tree.log_z()).exp())
            .sum();
        assert_close(expected, tree.prob_window(3, &[2, 0, 1]));
        assert_close(
            tree.prob_window(2, &[1, 2, 0]),
            tree.prob_window(2, &[0, 1, 2, 0]),
        );
        assert_close(
            tree.prob_window(3, &[1, 2, 0, 1]),
            tree.prob_window(4, &[1, 2, 0, 1, 0]),
        );
        assert_eq!(0.0, tree.prob_window(2, &[1, 1, 2, 0]));

        assert_eq!(0.0, tree.cond_log_prob_given_previous(4, 0, &[1]));
        assert_eq!(
            f64::NEG_INFINITY,
            tree.cond_log_prob_given_previous(7, 2, &[])
        );
    }

    #[test]
    fn test_conditionals() {
        let problem = toy_problem(3, 2, 4, 11);
        let tree =
            CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
                .unwrap();
        let pair = tree.prob_window(2, &[1, 2]);
        let single = tree.prob(1, 1);
        assert_close(
            (pair / single).ln(),
            tree.cond_log_prob_given_previous(2, 2, &[1]),
        );
        assert_close(
            tree.prob(2, 2).ln(),
            tree.cond_log_prob_given_previous(2, 2, &[]),
        );

        // The chain rule over padded positions gives the sequence probability.
        for y in all_sequences(3, 4) {
            let mut padded = vec![0];
            padded.extend_from_slice(&y);
            let chain: f64 = (1..padded.len()).map(|p| tree.score_of(&padded, p)).sum();
            assert_close(tree.log_prob_sequence(&y), chain);
        }
    }

    #[test]
    fn test_empty_sequence() {
        let problem = toy_problem(2, 2, 0, 1);
        let tree =
            CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
                .unwrap();
        assert_eq!(0.0, tree.log_z());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_numerical_instability() {
        let mut problem = toy_problem(2, 2, 3, 5);
        for row in &mut problem.weights {
            for w in row.iter_mut() {
                *w = f64::INFINITY;
            }
        }
        assert!(matches!(
            CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space),
            Err(CrfError::NumericalInstability(_))
        ));
    }
}
