use std::thread;

use crate::clique::{Clique, LabelSpace};
use crate::errors::{CrfError, Result};
use crate::features::FeatureTemplates;
use crate::token::{PaddedView, Token};
use crate::vocab::Vocabulary;

/// A sentence turned into feature IDs and label IDs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedSequence {
    /// `features[pos][order]` holds sorted feature IDs.
    pub features: Vec<Vec<Vec<u32>>>,

    /// Gold label IDs. Empty for unlabeled input.
    pub labels: Vec<u32>,
}

impl EncodedSequence {
    /// Number of positions.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the sequence has no positions.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn encode_features<F>(
    templates: &FeatureTemplates,
    tokens: &[Token],
    mut lookup: F,
) -> Vec<Vec<Vec<u32>>>
where
    F: FnMut(String) -> Option<u32>,
{
    let view = PaddedView::new(tokens);
    (0..tokens.len())
        .map(|pos| {
            templates
                .position_features(&view, pos)
                .into_iter()
                .map(|features| {
                    // ids are assigned in string order, not hash order
                    let mut names: Vec<String> = features.into_iter().collect();
                    names.sort_unstable();
                    let mut ids: Vec<u32> = names.into_iter().filter_map(&mut lookup).collect();
                    ids.sort_unstable();
                    ids
                })
                .collect()
        })
        .collect()
}

fn encode_labels(
    tokens: &[Token],
    labels: &Vocabulary<String>,
    sequence: usize,
) -> Result<Vec<u32>> {
    tokens
        .iter()
        .enumerate()
        .map(|(pos, token)| {
            let label = token.label.as_ref().ok_or_else(|| {
                CrfError::shape_mismatch(sequence, pos, "missing gold label")
            })?;
            labels.index_of(label).ok_or_else(|| {
                CrfError::shape_mismatch(sequence, pos, format!("unknown label {label:?}"))
            })
        })
        .collect()
}

/// Encodes features of unlabeled tokens with a fixed vocabulary, dropping
/// unknown features.
pub fn encode_unlabeled(
    templates: &FeatureTemplates,
    features: &Vocabulary<String>,
    tokens: &[Token],
) -> EncodedSequence {
    EncodedSequence {
        features: encode_features(templates, tokens, |f| features.index_of(&f)),
        labels: vec![],
    }
}

/// Serial encoder that grows the feature vocabulary while it is unlocked.
pub struct DatasetBuilder<'a> {
    templates: &'a FeatureTemplates,
    labels: &'a Vocabulary<String>,
    features: Vocabulary<String>,
    sequences: Vec<EncodedSequence>,
}

impl<'a> DatasetBuilder<'a> {
    /// Creates a builder with an empty feature vocabulary.
    pub fn new(templates: &'a FeatureTemplates, labels: &'a Vocabulary<String>) -> Self {
        Self::with_features(templates, labels, Vocabulary::new())
    }

    /// Creates a builder that continues an existing feature vocabulary.
    pub fn with_features(
        templates: &'a FeatureTemplates,
        labels: &'a Vocabulary<String>,
        features: Vocabulary<String>,
    ) -> Self {
        Self {
            templates,
            labels,
            features,
            sequences: vec![],
        }
    }

    /// Encodes one labeled sentence and keeps it.
    pub fn encode(&mut self, tokens: &[Token]) -> Result<&EncodedSequence> {
        let index = self.sequences.len();
        let labels = encode_labels(tokens, self.labels, index)?;
        let features = &mut self.features;
        let features = encode_features(self.templates, tokens, |f| features.add(f));
        self.sequences.push(EncodedSequence { features, labels });
        Ok(&self.sequences[index])
    }

    /// Encodes every sentence of a corpus.
    pub fn encode_all<'t, I>(&mut self, corpus: I) -> Result<()>
    where
        I: IntoIterator<Item = &'t [Token]>,
    {
        for tokens in corpus {
            self.encode(tokens)?;
        }
        Ok(())
    }

    /// Locks the feature vocabulary and returns it with the dataset.
    pub fn finish(mut self) -> (Vocabulary<String>, Dataset) {
        self.features.lock();
        (
            self.features,
            Dataset {
                sequences: self.sequences,
            },
        )
    }
}

/// Encoded training data.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    sequences: Vec<EncodedSequence>,
}

impl Dataset {
    /// Wraps encoded sequences.
    pub fn new(sequences: Vec<EncodedSequence>) -> Self {
        Self { sequences }
    }

    /// Encodes a labeled corpus with a locked feature vocabulary using
    /// `n_threads` workers.
    pub fn encode_parallel(
        templates: &FeatureTemplates,
        features: &Vocabulary<String>,
        labels: &Vocabulary<String>,
        corpus: &[Vec<Token>],
        n_threads: usize,
    ) -> Result<Self> {
        if !features.is_locked() {
            return Err(CrfError::invalid_argument(
                "features",
                "parallel encoding requires a locked vocabulary",
            ));
        }
        if n_threads == 0 {
            return Err(CrfError::invalid_argument("n_threads", "must not be 0"));
        }
        let (s, r) = crossbeam_channel::unbounded();
        for item in corpus.iter().enumerate() {
            s.send(item).unwrap();
        }
        drop(s);
        let mut results = thread::scope(|scope| {
            let mut threads = vec![];
            for _ in 0..n_threads {
                let r = r.clone();
                let t = scope.spawn(move || {
                    let mut encoded = vec![];
                    while let Ok((i, tokens)) = r.recv() {
                        let sequence = encode_labels(tokens, labels, i).map(|labels| {
                            EncodedSequence {
                                features: encode_features(templates, tokens, |f| {
                                    features.index_of(&f)
                                }),
                                labels,
                            }
                        });
                        encoded.push((i, sequence));
                    }
                    encoded
                });
                threads.push(t);
            }
            let mut results = Vec::with_capacity(corpus.len());
            for t in threads {
                match t.join() {
                    Ok(encoded) => results.extend(encoded),
                    Err(e) => std::panic::resume_unwind(e),
                }
            }
            results
        });
        results.sort_unstable_by_key(|&(i, _)| i);
        let sequences = results
            .into_iter()
            .map(|(_, sequence)| sequence)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sequences })
    }

    /// Number of sequences.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Returns `true` if there are no sequences.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Returns the sequences.
    #[inline(always)]
    pub fn sequences(&self) -> &[EncodedSequence] {
        &self.sequences
    }

    /// Checks that every sequence has one label and `window_size` feature
    /// lists per position, that feature IDs are in range, and that every gold
    /// label window is indexed.
    pub fn validate(&self, label_space: &LabelSpace, num_features: usize) -> Result<()> {
        let window_size = label_space.window_size();
        for (i, seq) in self.sequences.iter().enumerate() {
            if seq.labels.len() != seq.features.len() {
                return Err(CrfError::shape_mismatch(
                    i,
                    seq.labels.len().min(seq.features.len()),
                    format!(
                        "{} labels for {} positions",
                        seq.labels.len(),
                        seq.features.len()
                    ),
                ));
            }
            for (pos, by_order) in seq.features.iter().enumerate() {
                if by_order.len() != window_size {
                    return Err(CrfError::shape_mismatch(
                        i,
                        pos,
                        format!("{} orders, expected {window_size}", by_order.len()),
                    ));
                }
                for (order, ids) in by_order.iter().enumerate() {
                    if let Some(&id) = ids.iter().find(|&&id| id as usize >= num_features) {
                        return Err(CrfError::shape_mismatch(
                            i,
                            pos,
                            format!("order {order}: feature {id} out of range"),
                        ));
                    }
                    let window =
                        LabelSpace::window_at(&seq.labels, pos, order, label_space.background());
                    if label_space.window_index(&window.0).is_none() {
                        let name = Clique::of_order(order).map_or("?", Clique::name);
                        return Err(CrfError::shape_mismatch(
                            i,
                            pos,
                            format!("order {order} ({name}): label window {:?} not indexed", window.0),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
