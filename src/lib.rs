//! # seqcrf
//!
//! Clique-based linear-chain Conditional Random Fields for sequence labeling
//! implemented in pure Rust.
//!
//! A factor covers `window_size` consecutive labels. Features are generated
//! from token attributes by configurable templates, weights are trained with
//! L-BFGS, and sentences are labeled by exact, beam, or Gibbs-annealing
//! search.
#![cfg_attr(
    feature = "train",
    doc = "
## Examples

```rust
use seqcrf::{CrfConfig, Token, Trainer};

fn sentence(pairs: &[(&str, &str)]) -> Vec<Token> {
    pairs
        .iter()
        .map(|&(word, label)| Token::new(word).with_label(label))
        .collect()
}

let corpus = vec![
    sentence(&[(\"Alice\", \"PER\"), (\"visited\", \"O\"), (\"Paris\", \"LOC\")]),
    sentence(&[(\"Bob\", \"PER\"), (\"visited\", \"O\"), (\"Rome\", \"LOC\")]),
    sentence(&[(\"Rome\", \"LOC\"), (\"welcomed\", \"O\"), (\"Alice\", \"PER\")]),
];

// Generates a model
let trainer = Trainer::new().l2_lambda(0.1).unwrap();
let model = trainer.train(&corpus, &CrfConfig::default()).unwrap();

let tokens: Vec<Token> = [\"Bob\", \"visited\", \"Paris\"]
    .into_iter()
    .map(Token::new)
    .collect();
let labels = model.classify(&tokens).unwrap();

assert_eq!(3, labels.len());
```
"
)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod clique;
mod config;
mod dataset;
mod factor;
mod features;
mod forward_backward;
mod math;
mod model;
mod prior;
mod shape;
mod token;
mod vector;
mod vocab;

pub mod decoders;
pub mod errors;

#[cfg(feature = "train")]
mod optimizers;
#[cfg(feature = "train")]
mod trainer;

#[cfg(test)]
mod test_utils;

pub use clique::{Clique, LabelSpace, LabelWindow};
pub use config::{
    AnnealingType, CrfConfig, DecoderConfig, FeatureConfig, FeatureFactoryKind, GazetteEntry,
    InferenceType, InitialSequence,
};
pub use dataset::{encode_unlabeled, Dataset, DatasetBuilder, EncodedSequence};
pub use errors::{CrfError, Result};
pub use factor::FactorTable;
pub use features::{collect_known_lc_words, FeatureTemplates};
pub use forward_backward::CliqueTree;
pub use model::Model;
pub use prior::{EntityConsistencyPrior, NoPrior, PriorKind, SequencePrior};
pub use shape::WordShape;
pub use token::{PaddedView, Token};
pub use vector::{FlatWeights, GradientVector, WeightLayout, Weights};
pub use vocab::Vocabulary;

#[cfg(feature = "train")]
#[cfg_attr(docsrs, doc(cfg(feature = "train")))]
pub use optimizers::{
    lbfgs::{optimize, Lbfgs, Optimized},
    SurpriseConvergence,
};
#[cfg(feature = "train")]
#[cfg_attr(docsrs, doc(cfg(feature = "train")))]
pub use trainer::{CrfLoss, Trainer};
