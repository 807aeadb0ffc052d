use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clique::{decode_labels, LabelSpace};
use crate::dataset::EncodedSequence;
use crate::decoders::SequenceModel;
use crate::token::Token;

macro_rules! logsumexp {
    ( $($x:expr,)* ) => {
        {
            let mut y = f64::NEG_INFINITY;
            $(
                y = $crate::math::logsumexp(y, $x);
            )*
            y
        }
    };
    ( $($x:expr),* ) => {
        logsumexp!($( $x, )*)
    };
}

pub(crate) use logsumexp;

pub fn labeled(pairs: &[(&str, &str)]) -> Vec<Token> {
    pairs
        .iter()
        .map(|&(word, label)| Token::new(word).with_label(label))
        .collect()
}

pub struct ToyProblem {
    pub label_space: LabelSpace,
    pub weights: Vec<Vec<f64>>,
    pub sequence: EncodedSequence,
}

pub const FEATURES_PER_ORDER: usize = 3;

/// Random weights over a complete label space. Feature `order * 3 + k`
/// belongs to clique order `order`, and every position fires at least one
/// feature of every order.
pub fn toy_problem(num_labels: usize, window_size: usize, len: usize, seed: u64) -> ToyProblem {
    let mut rng = StdRng::seed_from_u64(seed);
    let label_space = LabelSpace::complete(num_labels, window_size, 0).unwrap();
    let mut weights = vec![];
    for order in 0..window_size {
        for _ in 0..FEATURES_PER_ORDER {
            weights.push(
                (0..label_space.num_windows(order))
                    .map(|_| rng.gen_range(-1.0..1.0))
                    .collect(),
            );
        }
    }
    let features = (0..len)
        .map(|_| {
            (0..window_size)
                .map(|order| {
                    let base = (order * FEATURES_PER_ORDER) as u32;
                    let mut ids = vec![base + rng.gen_range(0..FEATURES_PER_ORDER as u32)];
                    for k in 0..FEATURES_PER_ORDER as u32 {
                        if rng.gen_bool(0.5) {
                            ids.push(base + k);
                        }
                    }
                    ids.sort_unstable();
                    ids.dedup();
                    ids
                })
                .collect()
        })
        .collect();
    let labels = (0..len)
        .map(|_| rng.gen_range(0..num_labels as u32))
        .collect();
    ToyProblem {
        label_space,
        weights,
        sequence: EncodedSequence { features, labels },
    }
}

/// Unnormalized score of a label sequence computed window by window.
pub fn brute_force_score(problem: &ToyProblem, labels: &[u32]) -> f64 {
    let space = &problem.label_space;
    let mut score = 0.0;
    for (pos, by_order) in problem.sequence.features.iter().enumerate() {
        for (order, ids) in by_order.iter().enumerate() {
            let window = LabelSpace::window_at(labels, pos, order, space.background());
            let w = space.window_index(&window.0).unwrap() as usize;
            for &f in ids {
                score += problem.weights[f as usize][w];
            }
        }
    }
    score
}

/// Every label sequence of a length, in lexicographic order.
pub fn all_sequences(num_labels: usize, len: usize) -> Vec<Vec<u32>> {
    (0..num_labels.pow(len as u32))
        .map(|code| decode_labels(code, len, num_labels))
        .collect()
}

/// A model with per-position label scores and an optional bonus for one
/// pair of consecutive labels.
pub struct TableModel {
    num_labels: usize,
    unary: Vec<Vec<f64>>,
    next_bonus: Option<(u32, u32, f64)>,
}

impl TableModel {
    pub fn new(num_labels: usize, unary: Vec<Vec<f64>>) -> Self {
        Self {
            num_labels,
            unary,
            next_bonus: None,
        }
    }

    pub fn uniform(num_labels: usize, len: usize) -> Self {
        Self::new(num_labels, vec![vec![0.0; num_labels]; len])
    }

    /// Adds `bonus` at `p` when label `a` at `p` is followed by `b`.
    pub fn with_next_bonus(mut self, a: u32, b: u32, bonus: f64) -> Self {
        self.next_bonus = Some((a, b, bonus));
        self
    }
}

impl SequenceModel for TableModel {
    fn len(&self) -> usize {
        self.unary.len()
    }

    fn left_window(&self) -> usize {
        0
    }

    fn right_window(&self) -> usize {
        usize::from(self.next_bonus.is_some())
    }

    fn background(&self) -> u32 {
        0
    }

    fn possible_labels(&self, padded_pos: usize) -> Vec<u32> {
        if padded_pos < self.unary.len() {
            (0..self.num_labels as u32).collect()
        } else {
            vec![0]
        }
    }

    fn score_of(&self, padded: &[u32], padded_pos: usize) -> f64 {
        let label = padded[padded_pos];
        let mut score = self.unary[padded_pos][label as usize];
        if let Some((a, b, bonus)) = self.next_bonus {
            if label == a && padded[padded_pos + 1] == b {
                score += bonus;
            }
        }
        score
    }
}

#[cfg(feature = "train")]
pub use training::{toy_corpus, train_toy_model};

#[cfg(feature = "train")]
mod training {
    use std::sync::OnceLock;

    use super::labeled;
    use crate::config::CrfConfig;
    use crate::model::Model;
    use crate::token::Token;
    use crate::trainer::Trainer;

    pub fn toy_corpus() -> Vec<Vec<Token>> {
        vec![
            labeled(&[("Alice", "PER"), ("visited", "O"), ("Paris", "LOC")]),
            labeled(&[("Bob", "PER"), ("visited", "O"), ("Rome", "LOC")]),
            labeled(&[("Alice", "PER"), ("met", "O"), ("Bob", "PER")]),
            labeled(&[("Paris", "LOC"), ("is", "O"), ("in", "O"), ("France", "LOC")]),
            labeled(&[("Bob", "PER"), ("lives", "O"), ("in", "O"), ("Rome", "LOC")]),
            labeled(&[("Rome", "LOC"), ("welcomed", "O"), ("Alice", "PER")]),
        ]
    }

    /// Trains once and hands out fresh copies.
    pub fn train_toy_model() -> Model {
        static MODEL: OnceLock<Vec<u8>> = OnceLock::new();
        let bytes = MODEL.get_or_init(|| {
            let model = Trainer::new()
                .l2_lambda(0.1)
                .unwrap()
                .max_iter(Some(200))
                .unwrap()
                .train(&toy_corpus(), &CrfConfig::default())
                .unwrap();
            let mut buf = vec![];
            model.write(&mut buf).unwrap();
            buf
        });
        Model::read(bytes.as_slice()).unwrap()
    }
}
