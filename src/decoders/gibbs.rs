use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{AnnealingType, DecoderConfig, InitialSequence};
use crate::decoders::{labels_at, BestSequenceFinder, ExactDecoder, SequenceModel};
use crate::prior::{NoPrior, PriorKind, SequencePrior};

/// Temperature of every sweep of the sampler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CoolingSchedule {
    /// Decreases linearly from `start` towards 0.
    Linear {
        /// Initial temperature.
        start: f64,
        /// Number of sweeps.
        iterations: usize,
    },
    /// Multiplies the temperature by `rate` after each sweep.
    Exponential {
        /// Initial temperature.
        start: f64,
        /// Cooling rate in (0, 1).
        rate: f64,
        /// Number of sweeps.
        iterations: usize,
    },
}

impl CoolingSchedule {
    /// Builds the schedule described by a configuration.
    pub fn from_config(config: &DecoderConfig) -> Self {
        match config.annealing {
            AnnealingType::Linear => Self::Linear {
                start: config.start_temperature,
                iterations: config.num_samples,
            },
            AnnealingType::Exponential => Self::Exponential {
                start: config.start_temperature,
                rate: config.annealing_rate,
                iterations: config.num_samples,
            },
        }
    }

    /// Number of sweeps.
    pub fn iterations(&self) -> usize {
        match *self {
            Self::Linear { iterations, .. } | Self::Exponential { iterations, .. } => iterations,
        }
    }

    /// Temperature of sweep `i`.
    pub fn temperature(&self, i: usize) -> f64 {
        match *self {
            Self::Linear { start, iterations } => {
                start - start / iterations as f64 * i as f64
            }
            Self::Exponential { start, rate, .. } => start * rate.powi(i as i32),
        }
    }
}

/// Gibbs sampler with simulated annealing.
///
/// A temperature of 0 picks the best label of every conditional, lowest label
/// first on ties.
#[derive(Clone, Debug)]
pub struct GibbsSampler {
    schedule: CoolingSchedule,
    initial: InitialSequence,
    seed: u64,
    prior: PriorKind,
}

impl GibbsSampler {
    /// Creates a sampler starting from a random sequence.
    pub fn new(schedule: CoolingSchedule) -> Self {
        Self {
            schedule,
            initial: InitialSequence::Random,
            seed: 0,
            prior: PriorKind::None,
        }
    }

    /// Builds the sampler described by a configuration.
    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(CoolingSchedule::from_config(config))
            .initial(config.initial)
            .seed(config.seed)
            .prior(config.prior)
    }

    /// Sets the starting point.
    pub fn initial(mut self, initial: InitialSequence) -> Self {
        self.initial = initial;
        self
    }

    /// Sets the seed of the random number generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the sequence prior built by callers that know the words.
    pub fn prior(mut self, prior: PriorKind) -> Self {
        self.prior = prior;
        self
    }

    /// Sequence prior to combine with the model.
    #[inline(always)]
    pub fn prior_kind(&self) -> PriorKind {
        self.prior
    }

    /// Cooling schedule.
    #[inline(always)]
    pub fn schedule(&self) -> &CoolingSchedule {
        &self.schedule
    }

    fn initial_sequence<M>(&self, model: &M, rng: &mut StdRng) -> Vec<u32>
    where
        M: SequenceModel + ?Sized,
    {
        match self.initial {
            InitialSequence::Viterbi => model.pad(&ExactDecoder.best_sequence(model)),
            InitialSequence::Random => {
                let left = model.left_window();
                let mut padded = model.pad(&vec![model.background(); model.len()]);
                for (pos, label) in padded.iter_mut().enumerate().skip(left).take(model.len()) {
                    let labels = labels_at(model, pos as isize);
                    *label = labels[rng.gen_range(0..labels.len())];
                }
                padded
            }
        }
    }

    /// Runs every sweep of the schedule and returns the final real labels.
    pub fn sample<M>(&self, model: &M, prior: &mut dyn SequencePrior) -> Vec<u32>
    where
        M: SequenceModel + ?Sized,
    {
        if model.is_empty() {
            return vec![];
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let left = model.left_window();
        let len = model.len();
        let mut padded = self.initial_sequence(model, &mut rng);
        prior.set_initial_sequence(&padded[left..left + len]);

        for i in 0..self.schedule.iterations() {
            let temperature = self.schedule.temperature(i);
            for pos in left..left + len {
                let labels = model.possible_labels(pos);
                let mut scores = model.scores_of(&padded, pos);
                let extra = prior.scores_of(&padded[left..left + len], pos - left, &labels);
                for (s, e) in scores.iter_mut().zip(extra) {
                    *s += e;
                }
                let label = labels[choose(&scores, temperature, &mut rng)];
                let old = padded[pos];
                if label != old {
                    padded[pos] = label;
                    prior.update_sequence_element(&padded[left..left + len], pos - left, old);
                }
            }
        }
        padded[left..left + len].to_vec()
    }
}

fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

fn choose(scores: &[f64], temperature: f64, rng: &mut StdRng) -> usize {
    if temperature <= 0.0 {
        return argmax(scores);
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = scores
        .iter()
        .map(|&s| ((s - max) / temperature).exp())
        .collect();
    WeightedIndex::new(&weights).map_or_else(|_| argmax(scores), |dist| dist.sample(rng))
}

impl BestSequenceFinder for GibbsSampler {
    fn best_sequence<M>(&self, model: &M) -> Vec<u32>
    where
        M: SequenceModel + ?Sized,
    {
        self.sample(model, &mut NoPrior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::forward_backward::CliqueTree;
    use crate::prior::EntityConsistencyPrior;
    use crate::test_utils::{toy_problem, TableModel};

    #[test]
    fn test_schedules() {
        let linear = CoolingSchedule::Linear {
            start: 2.0,
            iterations: 4,
        };
        assert_eq!(2.0, linear.temperature(0));
        assert_eq!(1.0, linear.temperature(2));
        assert_eq!(0.5, linear.temperature(3));

        let exp = CoolingSchedule::Exponential {
            start: 1.0,
            rate: 0.5,
            iterations: 10,
        };
        assert_eq!(10, exp.iterations());
        assert_eq!(0.25, exp.temperature(2));
    }

    #[test]
    fn test_annealing_reaches_exact_without_transitions() {
        let sampler = GibbsSampler::new(CoolingSchedule::Exponential {
            start: 1.0,
            rate: 0.8,
            iterations: 100,
        })
        .seed(3);
        for seed in 0..3 {
            let problem = toy_problem(4, 1, 6, seed);
            let tree =
                CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
                    .unwrap();
            assert_eq!(
                ExactDecoder.best_sequence(&tree),
                sampler.best_sequence(&tree)
            );
        }
    }

    #[test]
    fn test_slower_cooling_is_not_worse() {
        let fast = GibbsSampler::new(CoolingSchedule::Exponential {
            start: 1.0,
            rate: 0.9,
            iterations: 200,
        });
        let slow = GibbsSampler::new(CoolingSchedule::Exponential {
            start: 1.0,
            rate: 0.99,
            iterations: 2000,
        });
        let mut fast_total = 0.0;
        let mut slow_total = 0.0;
        let mut slow_exact = 0;
        let mut runs = 0;
        for window_size in [2, 3] {
            for seed in 0..10 {
                let problem = toy_problem(3, window_size, 6, seed);
                let tree = CliqueTree::calibrate(
                    &problem.sequence,
                    &problem.weights,
                    &problem.label_space,
                )
                .unwrap();
                let exact = ExactDecoder.best_sequence(&tree);
                let slow_labels = slow.best_sequence(&tree);
                fast_total += tree.log_prob_sequence(&fast.best_sequence(&tree));
                slow_total += tree.log_prob_sequence(&slow_labels);
                if slow_labels == exact {
                    slow_exact += 1;
                }
                runs += 1;
            }
        }
        assert!(slow_total >= fast_total - 1e-9, "{slow_total} < {fast_total}");
        assert!(slow_exact * 2 > runs, "{slow_exact}/{runs}");
    }

    #[test]
    fn test_zero_temperature_keeps_viterbi() {
        let sampler = GibbsSampler::new(CoolingSchedule::Linear {
            start: 0.0,
            iterations: 5,
        })
        .initial(InitialSequence::Viterbi);
        let problem = toy_problem(3, 2, 6, 17);
        let tree = CliqueTree::calibrate(&problem.sequence, &problem.weights, &problem.label_space)
            .unwrap();
        assert_eq!(
            ExactDecoder.best_sequence(&tree),
            sampler.best_sequence(&tree)
        );
    }

    #[test]
    fn test_same_seed_same_sample() {
        let sampler = GibbsSampler::new(CoolingSchedule::Linear {
            start: 1.0,
            iterations: 10,
        })
        .seed(42);
        let model = TableModel::uniform(3, 8);
        let a = sampler.best_sequence(&model);
        let b = sampler.best_sequence(&model);
        assert_eq!(8, a.len());
        assert_eq!(a, b);
    }

    #[test]
    fn test_prior_is_added() {
        // The model labels the two "york" differently; the prior makes the
        // first one agree with the second.
        let model = TableModel::new(
            3,
            vec![
                vec![0.0, 5.0, 1.0],
                vec![3.0, 0.0, 0.0],
                vec![0.0, 0.0, 2.0],
            ],
        );
        let mut prior = EntityConsistencyPrior::new(&["york", "and", "york"], 0)
            .penalties(-100.0, -1.0)
            .unwrap();
        let sampler = GibbsSampler::new(CoolingSchedule::Linear {
            start: 0.0,
            iterations: 3,
        })
        .initial(InitialSequence::Viterbi);
        assert_eq!(vec![1, 0, 2], sampler.best_sequence(&model));
        assert_eq!(vec![2, 0, 2], sampler.sample(&model, &mut prior));
    }

    #[test]
    fn test_from_config() {
        let config = DecoderConfig {
            annealing: AnnealingType::Exponential,
            annealing_rate: 0.9,
            prior: PriorKind::Entity,
            ..DecoderConfig::default()
        };
        let sampler = GibbsSampler::from_config(&config);
        assert_eq!(PriorKind::Entity, sampler.prior_kind());
        assert_eq!(100, sampler.schedule().iterations());
    }
}
