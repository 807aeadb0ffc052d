use std::io::{Read, Write};
use std::thread;

use bincode::{
    de::Decoder,
    enc::Encoder,
    error::{DecodeError, EncodeError},
    Decode, Encode,
};
use hashbrown::HashSet;

use crate::clique::{LabelSpace, LabelWindow};
use crate::config::{CrfConfig, FeatureFactoryKind};
use crate::dataset::{encode_unlabeled, EncodedSequence};
use crate::decoders::{BestSequenceFinder, Decoder as SequenceDecoder, KBestDecoder};
use crate::errors::{CrfError, Result};
use crate::features::FeatureTemplates;
use crate::forward_backward::CliqueTree;
use crate::token::Token;
use crate::vector::WeightLayout;
use crate::vocab::Vocabulary;

/// Drops features whose weights vary by less than `threshold` across label
/// windows and renumbers the survivors without holes.
///
/// Returns the new vocabulary, the surviving rows and the number of features
/// dropped.
pub(crate) fn prune_rows(
    features: &Vocabulary<String>,
    weights: &[Vec<f64>],
    threshold: f64,
) -> (Vocabulary<String>, Vec<Vec<f64>>, usize) {
    let mut survivors = Vocabulary::new();
    let mut rows = vec![];
    let mut removed = 0;
    for (id, name) in features.iter() {
        let row = &weights[id as usize];
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = row.iter().copied().fold(f64::INFINITY, f64::min);
        let range = if row.is_empty() { 0.0 } else { max - min };
        if range < threshold {
            removed += 1;
        } else {
            survivors.add(name.clone());
            rows.push(row.clone());
        }
    }
    survivors.lock();
    (survivors, rows, removed)
}

/// Trained clique CRF.
///
/// A model is immutable during inference and can be shared between threads.
pub struct Model {
    labels: Vocabulary<String>,
    features: Vocabulary<String>,
    label_space: LabelSpace,
    config: CrfConfig,
    weights: Vec<Vec<f64>>,
    templates: FeatureTemplates,
}

impl Model {
    /// Assembles a model, checking that every part agrees with the others.
    pub(crate) fn new(
        mut labels: Vocabulary<String>,
        mut features: Vocabulary<String>,
        label_space: LabelSpace,
        config: CrfConfig,
        weights: Vec<Vec<f64>>,
        templates: FeatureTemplates,
    ) -> Result<Self> {
        config.validate()?;
        labels.lock();
        features.lock();
        if label_space.num_labels() != labels.len() {
            return Err(CrfError::invalid_model(format!(
                "{} labels, but the label space has {}",
                labels.len(),
                label_space.num_labels()
            )));
        }
        if label_space.window_size() != config.window_size {
            return Err(CrfError::invalid_model(
                "window size disagrees with the configuration",
            ));
        }
        if labels.index_of(&config.background_symbol) != Some(label_space.background()) {
            return Err(CrfError::invalid_model(format!(
                "background symbol {:?} is not label {}",
                config.background_symbol,
                label_space.background()
            )));
        }
        let layout = WeightLayout::new(&features, &label_space);
        if weights.len() != layout.num_rows() {
            return Err(CrfError::invalid_model(format!(
                "{} weight rows for {} features",
                weights.len(),
                layout.num_rows()
            )));
        }
        for (id, row) in weights.iter().enumerate() {
            if row.len() != layout.row(id as u32).len() {
                return Err(CrfError::invalid_model(format!(
                    "feature {id}: {} weights, expected {}",
                    row.len(),
                    layout.row(id as u32).len()
                )));
            }
        }
        Ok(Self {
            labels,
            features,
            label_space,
            config,
            weights,
            templates,
        })
    }

    /// Label vocabulary. The background label is label 0.
    #[inline(always)]
    pub fn labels(&self) -> &Vocabulary<String> {
        &self.labels
    }

    /// Feature vocabulary.
    #[inline(always)]
    pub fn features(&self) -> &Vocabulary<String> {
        &self.features
    }

    /// Indexed label windows.
    #[inline(always)]
    pub fn label_space(&self) -> &LabelSpace {
        &self.label_space
    }

    /// Configuration the model was trained with.
    #[inline(always)]
    pub fn config(&self) -> &CrfConfig {
        &self.config
    }

    /// Weights, one row per feature and one column per label window.
    #[inline(always)]
    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    /// Number of labels covered by one factor.
    #[inline(always)]
    pub fn window_size(&self) -> usize {
        self.label_space.window_size()
    }

    /// Lower-case words seen in training.
    #[inline(always)]
    pub fn known_lc_words(&self) -> &HashSet<String> {
        self.templates.known_lc_words()
    }

    /// Encodes a sentence. Features unknown to the model are dropped.
    pub fn encode(&self, tokens: &[Token]) -> EncodedSequence {
        encode_unlabeled(&self.templates, &self.features, tokens)
    }

    /// Runs forward-backward over a sentence.
    pub fn calibrate(&self, tokens: &[Token]) -> Result<CliqueTree> {
        CliqueTree::calibrate(&self.encode(tokens), &self.weights, &self.label_space)
    }

    fn label_names(&self, ids: &[u32]) -> Result<Vec<String>> {
        ids.iter()
            .map(|&id| {
                self.labels
                    .get(id)
                    .cloned()
                    .ok_or_else(|| CrfError::invalid_model(format!("label {id} has no name")))
            })
            .collect()
    }

    /// Labels a sentence with the decoder chosen by the configuration.
    pub fn classify(&self, tokens: &[Token]) -> Result<Vec<String>> {
        let decoder = SequenceDecoder::from_config(&self.config.decoder)?;
        self.classify_with(tokens, &decoder)
    }

    /// Labels a sentence with the given decoder.
    pub fn classify_with(&self, tokens: &[Token], decoder: &SequenceDecoder) -> Result<Vec<String>> {
        let tree = self.calibrate(tokens)?;
        let ids = match decoder {
            SequenceDecoder::Viterbi(d) => d.best_sequence(&tree),
            SequenceDecoder::Beam(d) => d.best_sequence(&tree),
            SequenceDecoder::Gibbs(d) => {
                let words: Vec<&str> = tokens.iter().map(|t| t.word.as_str()).collect();
                let mut prior = d
                    .prior_kind()
                    .build(&words, self.label_space.background());
                d.sample(&tree, prior.as_mut())
            }
        };
        self.label_names(&ids)
    }

    /// Writes the predicted labels into [`Token::answer`].
    pub fn annotate(&self, tokens: &mut [Token]) -> Result<()> {
        let answers = self.classify(tokens)?;
        for (token, answer) in tokens.iter_mut().zip(answers) {
            token.answer = Some(answer);
        }
        Ok(())
    }

    /// Returns the `k` most probable label sequences with their log
    /// probabilities, best first.
    pub fn classify_kbest(&self, tokens: &[Token], k: usize) -> Result<Vec<(Vec<String>, f64)>> {
        let decoder = KBestDecoder::new(k)?;
        let tree = self.calibrate(tokens)?;
        decoder
            .k_best(&tree)
            .into_iter()
            .map(|s| Ok((self.label_names(&s.labels)?, s.score)))
            .collect()
    }

    /// Returns the label distribution of every position.
    pub fn marginals(&self, tokens: &[Token]) -> Result<Vec<Vec<(String, f64)>>> {
        let tree = self.calibrate(tokens)?;
        (0..tokens.len())
            .map(|pos| {
                tree.marginals(pos)
                    .into_iter()
                    .enumerate()
                    .map(|(id, p)| Ok((self.label_names(&[id as u32])?.remove(0), p)))
                    .collect()
            })
            .collect()
    }

    /// Labels many sentences on `n_threads` threads.
    pub fn classify_batch(&self, docs: &[Vec<Token>], n_threads: usize) -> Result<Vec<Vec<String>>> {
        if n_threads == 0 {
            return Err(CrfError::invalid_argument("n_threads", "must not be 0"));
        }
        let decoder = SequenceDecoder::from_config(&self.config.decoder)?;
        let (s, r) = crossbeam_channel::unbounded();
        for item in docs.iter().enumerate() {
            s.send(item).unwrap();
        }
        drop(s);
        let mut results = thread::scope(|scope| {
            let mut threads = vec![];
            for _ in 0..n_threads {
                let r = r.clone();
                let decoder = &decoder;
                let t = scope.spawn(move || {
                    let mut labeled = vec![];
                    while let Ok((i, tokens)) = r.recv() {
                        labeled.push((i, self.classify_with(tokens, decoder)));
                    }
                    labeled
                });
                threads.push(t);
            }
            let mut results = Vec::with_capacity(docs.len());
            for t in threads {
                match t.join() {
                    Ok(labeled) => results.extend(labeled),
                    Err(e) => std::panic::resume_unwind(e),
                }
            }
            results
        });
        results.sort_unstable_by_key(|&(i, _)| i);
        results.into_iter().map(|(_, labels)| labels).collect()
    }

    /// Removes features whose weight range is below `threshold`.
    ///
    /// Returns the number of features removed.
    pub fn prune_features(&mut self, threshold: f64) -> usize {
        let (features, weights, removed) = prune_rows(&self.features, &self.weights, threshold);
        if removed > 0 || features.len() != self.features.len() {
            self.features = features;
            self.weights = weights;
        }
        removed
    }

    /// Exports the model.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned.
    pub fn write<W>(&self, mut wtr: W) -> Result<usize>
    where
        W: Write,
    {
        Ok(bincode::encode_into_std_write(
            self,
            &mut wtr,
            bincode::config::standard(),
        )?)
    }

    /// Creates a model from a reader.
    ///
    /// # Errors
    ///
    /// When `rdr` generates an error or the data is not a consistent model,
    /// an error will be returned.
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        Ok(bincode::decode_from_std_read(
            &mut rdr,
            bincode::config::standard(),
        )?)
    }
}

impl Encode for Model {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        let mut lc_words: Vec<&String> = self.known_lc_words().iter().collect();
        lc_words.sort_unstable();
        Encode::encode(self.label_space.all_windows(), encoder)?;
        Encode::encode(&self.labels, encoder)?;
        Encode::encode(&self.features, encoder)?;
        Encode::encode(&self.config, encoder)?;
        Encode::encode(self.config.factory.name(), encoder)?;
        Encode::encode(&(self.window_size() as u32), encoder)?;
        Encode::encode(&self.weights, encoder)?;
        Encode::encode(&lc_words, encoder)?;
        Ok(())
    }
}

impl<Context> Decode<Context> for Model {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let windows: Vec<Vocabulary<LabelWindow>> = Decode::decode(decoder)?;
        let labels: Vocabulary<String> = Decode::decode(decoder)?;
        let features: Vocabulary<String> = Decode::decode(decoder)?;
        let config: CrfConfig = Decode::decode(decoder)?;
        let factory: String = Decode::decode(decoder)?;
        let window_size: u32 = Decode::decode(decoder)?;
        let weights: Vec<Vec<f64>> = Decode::decode(decoder)?;
        let lc_words: Vec<String> = Decode::decode(decoder)?;

        let factory: FeatureFactoryKind = factory
            .parse()
            .map_err(|e: CrfError| DecodeError::OtherString(e.to_string()))?;
        if factory != config.factory || window_size as usize != config.window_size {
            return Err(DecodeError::Other(
                "feature factory or window size disagrees with the configuration",
            ));
        }
        let background = labels
            .index_of(&config.background_symbol)
            .ok_or(DecodeError::Other("background label is missing"))?;
        let label_space =
            LabelSpace::from_parts(labels.len(), window_size as usize, background, windows)
                .map_err(|e| DecodeError::OtherString(e.to_string()))?;
        let templates = FeatureTemplates::new(
            factory,
            config.features.clone(),
            window_size as usize,
            lc_words.into_iter().collect(),
        );
        Self::new(labels, features, label_space, config, weights, templates)
            .map_err(|e| DecodeError::OtherString(e.to_string()))
    }
}

#[cfg(all(test, feature = "train"))]
mod tests {
    use super::*;

    use crate::config::InferenceType;
    use crate::decoders::{BeamDecoder, ExactDecoder, GibbsSampler};
    use crate::test_utils::{labeled, toy_corpus, train_toy_model};

    #[test]
    fn test_classify_reproduces_training_labels() {
        let model = train_toy_model();
        for sentence in toy_corpus() {
            let gold: Vec<String> = sentence.iter().filter_map(|t| t.label.clone()).collect();
            assert_eq!(gold, model.classify(&sentence).unwrap());
        }
    }

    #[test]
    fn test_decoders_agree_on_easy_input() {
        let model = train_toy_model();
        let sentence = labeled(&[("Alice", "PER"), ("visited", "O"), ("Paris", "LOC")]);
        let exact = model
            .classify_with(&sentence, &SequenceDecoder::Viterbi(ExactDecoder))
            .unwrap();
        let beam = model
            .classify_with(&sentence, &SequenceDecoder::Beam(BeamDecoder::new(10).unwrap()))
            .unwrap();
        assert_eq!(exact, beam);

        let mut config = model.config().decoder.clone();
        config.inference = InferenceType::Gibbs;
        config.start_temperature = 0.0;
        config.initial = crate::config::InitialSequence::Viterbi;
        let gibbs = model
            .classify_with(
                &sentence,
                &SequenceDecoder::Gibbs(GibbsSampler::from_config(&config)),
            )
            .unwrap();
        assert_eq!(exact, gibbs);
    }

    #[test]
    fn test_annotate() {
        let model = train_toy_model();
        let mut sentence = labeled(&[("Bob", "PER"), ("visited", "O"), ("Rome", "LOC")]);
        model.annotate(&mut sentence).unwrap();
        for token in &sentence {
            assert_eq!(token.label, token.answer);
        }
    }

    #[test]
    fn test_kbest_and_marginals() {
        let model = train_toy_model();
        let sentence = labeled(&[("Alice", "PER"), ("visited", "O"), ("Rome", "LOC")]);
        let kbest = model.classify_kbest(&sentence, 3).unwrap();
        assert_eq!(3, kbest.len());
        assert_eq!(model.classify(&sentence).unwrap(), kbest[0].0);
        assert!(kbest[0].1 <= 0.0);
        assert!(kbest[0].1 >= kbest[1].1);

        let marginals = model.marginals(&sentence).unwrap();
        assert_eq!(3, marginals.len());
        for dist in &marginals {
            assert_eq!(model.labels().len(), dist.len());
            let total: f64 = dist.iter().map(|(_, p)| p).sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        assert!(model.classify_kbest(&sentence, 0).is_err());
    }

    #[test]
    fn test_classify_batch() {
        let model = train_toy_model();
        let corpus = toy_corpus();
        let batch = model.classify_batch(&corpus, 3).unwrap();
        assert_eq!(corpus.len(), batch.len());
        for (sentence, labels) in corpus.iter().zip(&batch) {
            assert_eq!(&model.classify(sentence).unwrap(), labels);
        }
        assert!(model.classify_batch(&corpus, 0).is_err());
    }

    #[test]
    fn test_empty_sentence() {
        let model = train_toy_model();
        assert!(model.classify(&[]).unwrap().is_empty());
        assert!(model.marginals(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_prune_zero_threshold() {
        let mut model = train_toy_model();
        let sentence = labeled(&[("Alice", "PER"), ("visited", "O"), ("Rome", "LOC")]);
        let before = model.classify(&sentence).unwrap();
        let n = model.features().len();
        assert_eq!(0, model.prune_features(0.0));
        assert_eq!(n, model.features().len());
        assert_eq!(before, model.classify(&sentence).unwrap());
    }

    #[test]
    fn test_prune_large_threshold() {
        let mut model = train_toy_model();
        let n = model.features().len();
        assert_eq!(n, model.prune_features(f64::INFINITY));
        assert_eq!(0, model.features().len());
        assert!(model.weights().is_empty());
        // still usable
        let sentence = labeled(&[("Alice", "PER")]);
        assert_eq!(1, model.classify(&sentence).unwrap().len());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let model = train_toy_model();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();
        let other = Model::read(buf.as_slice()).unwrap();

        assert_eq!(model.config(), other.config());
        assert_eq!(model.weights(), other.weights());
        assert_eq!(model.known_lc_words(), other.known_lc_words());
        assert_eq!(model.features().len(), other.features().len());
        for (id, name) in model.labels().iter() {
            assert_eq!(Some(name), other.labels().get(id));
        }
        for sentence in toy_corpus() {
            assert_eq!(
                model.classify(&sentence).unwrap(),
                other.classify(&sentence).unwrap()
            );
        }
    }

    #[test]
    fn test_read_rejects_garbage() {
        assert!(Model::read(&[1u8, 2, 3][..]).is_err());

        let model = train_toy_model();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(Model::read(buf.as_slice()).is_err());
    }
}
