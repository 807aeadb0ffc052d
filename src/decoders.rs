//! Best-sequence search over any [`SequenceModel`].

mod beam;
mod exact;
mod gibbs;
mod kbest;

pub use beam::BeamDecoder;
pub use exact::ExactDecoder;
pub use gibbs::{CoolingSchedule, GibbsSampler};
pub use kbest::{KBestDecoder, ScoredSequence};

use crate::config::{DecoderConfig, InferenceType};
use crate::errors::Result;

/// Local scoring contract used by the decoders.
///
/// Sequences handed to a model are padded: `left_window()` background labels
/// come before the first real position and `right_window()` after the last.
/// `score_of` at padded position `p` may read labels `p - left_window()`
/// through `p + right_window()`.
pub trait SequenceModel {
    /// Number of real positions.
    fn len(&self) -> usize;

    /// Number of previous labels a score depends on.
    fn left_window(&self) -> usize;

    /// Number of following labels a score depends on.
    fn right_window(&self) -> usize;

    /// Label used for padding.
    fn background(&self) -> u32;

    /// Labels allowed at a padded position.
    fn possible_labels(&self, padded_pos: usize) -> Vec<u32>;

    /// Local log-score of the label at a real padded position.
    fn score_of(&self, padded: &[u32], padded_pos: usize) -> f64;

    /// Returns `true` if there are no real positions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of a padded sequence.
    fn padded_len(&self) -> usize {
        self.left_window() + self.len() + self.right_window()
    }

    /// Pads real labels with the background label.
    fn pad(&self, labels: &[u32]) -> Vec<u32> {
        let mut padded = vec![self.background(); self.left_window()];
        padded.extend_from_slice(labels);
        padded.resize(self.padded_len(), self.background());
        padded
    }

    /// Scores of every possible label at `padded_pos`, summing every local
    /// score that reads it. Up to a constant this is the full conditional
    /// used by Gibbs sampling.
    fn scores_of(&self, padded: &[u32], padded_pos: usize) -> Vec<f64> {
        if self.is_empty() {
            return vec![];
        }
        let left = self.left_window();
        let first = padded_pos.saturating_sub(self.right_window()).max(left);
        let last = (padded_pos + left).min(left + self.len() - 1);
        let mut seq = padded.to_vec();
        self.possible_labels(padded_pos)
            .into_iter()
            .map(|label| {
                seq[padded_pos] = label;
                (first..=last).map(|p| self.score_of(&seq, p)).sum()
            })
            .collect()
    }

    /// Sum of the local scores of a padded sequence.
    fn score_sequence(&self, padded: &[u32]) -> f64 {
        let left = self.left_window();
        (left..left + self.len()).map(|p| self.score_of(padded, p)).sum()
    }
}

/// A search strategy returning one label sequence.
pub trait BestSequenceFinder {
    /// Returns the labels of the real positions.
    fn best_sequence<M>(&self, model: &M) -> Vec<u32>
    where
        M: SequenceModel + ?Sized;
}

/// Labels allowed at a padded position, negative ones being background.
pub(crate) fn labels_at<M>(model: &M, pos: isize) -> Vec<u32>
where
    M: SequenceModel + ?Sized,
{
    if pos < 0 {
        return vec![model.background()];
    }
    let mut labels = model.possible_labels(pos as usize);
    labels.sort_unstable();
    labels.dedup();
    labels
}

/// Decoder selected at run time.
#[derive(Clone, Debug)]
pub enum Decoder {
    /// Exact search.
    Viterbi(ExactDecoder),
    /// Beam search.
    Beam(BeamDecoder),
    /// Gibbs sampling with simulated annealing.
    Gibbs(GibbsSampler),
}

impl Decoder {
    /// Builds the decoder described by a configuration.
    pub fn from_config(config: &DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(match config.inference {
            InferenceType::Viterbi => Self::Viterbi(ExactDecoder),
            InferenceType::Beam => Self::Beam(BeamDecoder::new(config.beam_size)?),
            InferenceType::Gibbs => Self::Gibbs(GibbsSampler::from_config(config)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::forward_backward::CliqueTree;
    use crate::test_utils::toy_problem;

    #[test]
    fn test_scores_of_matches_score_sequence() {
        let problem = toy_problem(3, 3, 5, 9);
        let tree =
            CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
                .unwrap();
        let padded = tree.pad(&[1, 0, 2, 2, 1]);
        assert_eq!(7, padded.len());
        let left = tree.left_window();
        for pos in left..left + 5 {
            let scores = tree.scores_of(&padded, pos);
            let labels = tree.possible_labels(pos);
            for (&label, &s) in labels.iter().zip(&scores) {
                let mut seq = padded.clone();
                seq[pos] = label;
                let full = tree.score_sequence(&seq);
                let mut base = padded.clone();
                base[pos] = labels[0];
                // differences between candidates agree with full rescoring
                let diff_full = full - tree.score_sequence(&base);
                let diff_local = s - scores[0];
                assert!((diff_full - diff_local).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_decoder_from_config() {
        let mut config = DecoderConfig::default();
        assert!(matches!(
            Decoder::from_config(&config).unwrap(),
            Decoder::Viterbi(_)
        ));
        config.inference = InferenceType::Beam;
        config.beam_size = 3;
        assert!(matches!(
            Decoder::from_config(&config).unwrap(),
            Decoder::Beam(_)
        ));
        config.beam_size = 0;
        assert!(Decoder::from_config(&config).is_err());
        config.inference = InferenceType::Gibbs;
        config.beam_size = 1;
        assert!(matches!(
            Decoder::from_config(&config).unwrap(),
            Decoder::Gibbs(_)
        ));
    }
}
