use core::fmt;
use core::str::FromStr;

use bincode::{Decode, Encode};

use crate::clique::MAX_WINDOW_SIZE;
use crate::errors::{CrfError, Result};
use crate::prior::PriorKind;
use crate::shape::WordShape;

/// Registry of feature factories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub enum FeatureFactoryKind {
    /// Word-level named-entity features.
    #[default]
    Ner,
    /// Character-level features for word segmentation.
    CharSegmenter,
}

impl FeatureFactoryKind {
    /// Returns the identifier of the factory.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ner => "ner",
            Self::CharSegmenter => "segmenter",
        }
    }
}

impl fmt::Display for FeatureFactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureFactoryKind {
    type Err = CrfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ner" => Ok(Self::Ner),
            "segmenter" => Ok(Self::CharSegmenter),
            _ => Err(CrfError::invalid_argument(
                "factory",
                format!("unknown feature factory: {s}"),
            )),
        }
    }
}

/// Inference algorithm used by [`crate::Model::classify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub enum InferenceType {
    /// Exact max-product search.
    #[default]
    Viterbi,
    /// Beam search.
    Beam,
    /// Gibbs sampling with simulated annealing.
    Gibbs,
}

impl FromStr for InferenceType {
    type Err = CrfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "viterbi" => Ok(Self::Viterbi),
            "beam" => Ok(Self::Beam),
            "gibbs" => Ok(Self::Gibbs),
            _ => Err(CrfError::invalid_argument(
                "inference",
                format!("unknown inference type: {s}"),
            )),
        }
    }
}

/// Cooling schedule of the Gibbs sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub enum AnnealingType {
    /// Temperature falls linearly to zero.
    #[default]
    Linear,
    /// Temperature is multiplied by a constant rate each sweep.
    Exponential,
}

impl FromStr for AnnealingType {
    type Err = CrfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exp" | "exponential" => Ok(Self::Exponential),
            _ => Err(CrfError::invalid_argument(
                "annealing",
                format!("unknown annealing type: {s}"),
            )),
        }
    }
}

/// Starting point of the Gibbs sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub enum InitialSequence {
    /// Uniformly random labels.
    #[default]
    Random,
    /// The exact best sequence.
    Viterbi,
}

impl FromStr for InitialSequence {
    type Err = CrfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "viterbi" => Ok(Self::Viterbi),
            _ => Err(CrfError::invalid_argument(
                "initial",
                format!("unknown initial sequence: {s}"),
            )),
        }
    }
}

/// A gazette phrase and the class it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct GazetteEntry {
    /// Class name, such as `LOC`.
    pub class: String,

    /// Words of the phrase.
    pub words: Vec<String>,
}

impl GazetteEntry {
    /// Creates an entry from a class and a space-separated phrase.
    pub fn new(class: &str, phrase: &str) -> Self {
        Self {
            class: class.to_string(),
            words: phrase.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Feature template switches.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
#[allow(missing_docs)]
pub struct FeatureConfig {
    pub use_word: bool,
    pub use_prev: bool,
    pub use_next: bool,
    pub use_2w: bool,
    pub use_lc: bool,
    pub use_tags: bool,
    pub use_word_pairs: bool,
    pub use_lemmas: bool,
    pub use_chunks: bool,

    /// Names of token attributes that each yield a `value-KEY` feature.
    pub attribute_features: Vec<String>,

    /// Prefer the shape carried by the token over the computed one.
    pub use_shape_strings: bool,
    pub word_shape: WordShape,
    pub use_type_seqs: bool,
    pub use_type_seqs2: bool,
    pub use_type_seqs3: bool,

    pub use_ngrams: bool,
    pub max_ngram_len: usize,
    pub no_mid_ngrams: bool,
    pub lowercase_ngrams: bool,
    pub dehyphenate_ngrams: bool,
    pub conjoin_shape_ngrams: bool,

    pub use_dist_sim: bool,

    /// `(word, cluster)` pairs.
    pub dist_sim_lexicon: Vec<(String, String)>,

    pub use_gazettes: bool,
    pub sloppy_gazette: bool,
    pub gazettes: Vec<GazetteEntry>,

    pub use_title: bool,
    pub use_disjunctive: bool,
    pub disjunction_width: usize,
    pub use_bag_of_words: bool,
    pub use_class_feature: bool,

    pub use_sequences: bool,
    pub use_prev_sequences: bool,
    pub use_next_sequences: bool,
    pub use_long_sequences: bool,
    pub use_taggy_sequences: bool,
    pub use_typey_sequences: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            use_word: true,
            use_prev: true,
            use_next: true,
            use_2w: false,
            use_lc: false,
            use_tags: false,
            use_word_pairs: false,
            use_lemmas: false,
            use_chunks: false,
            attribute_features: vec![],
            use_shape_strings: false,
            word_shape: WordShape::Chris2UseLc,
            use_type_seqs: true,
            use_type_seqs2: true,
            use_type_seqs3: false,
            use_ngrams: true,
            max_ngram_len: 6,
            no_mid_ngrams: true,
            lowercase_ngrams: false,
            dehyphenate_ngrams: false,
            conjoin_shape_ngrams: false,
            use_dist_sim: false,
            dist_sim_lexicon: vec![],
            use_gazettes: false,
            sloppy_gazette: false,
            gazettes: vec![],
            use_title: false,
            use_disjunctive: false,
            disjunction_width: 4,
            use_bag_of_words: false,
            use_class_feature: true,
            use_sequences: true,
            use_prev_sequences: true,
            use_next_sequences: false,
            use_long_sequences: false,
            use_taggy_sequences: false,
            use_typey_sequences: true,
        }
    }
}

impl FeatureConfig {
    /// Returns `true` if any shape is available to the templates.
    #[inline(always)]
    pub fn shapes_enabled(&self) -> bool {
        self.use_shape_strings || self.word_shape != WordShape::None
    }

    /// Sets a switch from its name and a string value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let flag = match key {
            "useWord" => &mut self.use_word,
            "usePrev" => &mut self.use_prev,
            "useNext" => &mut self.use_next,
            "use2W" => &mut self.use_2w,
            "useLC" => &mut self.use_lc,
            "useTags" => &mut self.use_tags,
            "useWordPairs" => &mut self.use_word_pairs,
            "useLemmas" => &mut self.use_lemmas,
            "useChunks" => &mut self.use_chunks,
            "useShapeStrings" => &mut self.use_shape_strings,
            "useTypeSeqs" => &mut self.use_type_seqs,
            "useTypeSeqs2" => &mut self.use_type_seqs2,
            "useTypeSeqs3" => &mut self.use_type_seqs3,
            "useNGrams" => &mut self.use_ngrams,
            "noMidNGrams" => &mut self.no_mid_ngrams,
            "lowercaseNGrams" => &mut self.lowercase_ngrams,
            "dehyphenateNGrams" => &mut self.dehyphenate_ngrams,
            "conjoinShapeNGrams" => &mut self.conjoin_shape_ngrams,
            "useDistSim" => &mut self.use_dist_sim,
            "useGazettes" => &mut self.use_gazettes,
            "sloppyGazette" => &mut self.sloppy_gazette,
            "useTitle" => &mut self.use_title,
            "useDisjunctive" => &mut self.use_disjunctive,
            "useBagOfWords" => &mut self.use_bag_of_words,
            "useClassFeature" => &mut self.use_class_feature,
            "useSequences" => &mut self.use_sequences,
            "usePrevSequences" => &mut self.use_prev_sequences,
            "useNextSequences" => &mut self.use_next_sequences,
            "useLongSequences" => &mut self.use_long_sequences,
            "useTaggySequences" => &mut self.use_taggy_sequences,
            "useTypeySequences" => &mut self.use_typey_sequences,
            "wordShape" => {
                self.word_shape = value.parse()?;
                return Ok(());
            }
            "maxNGramLeng" => {
                self.max_ngram_len = parse_value("maxNGramLeng", value)?;
                return Ok(());
            }
            "attributeFeatures" => {
                self.attribute_features = value
                    .split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_string)
                    .collect();
                return Ok(());
            }
            "disjunctionWidth" => {
                self.disjunction_width = parse_value("disjunctionWidth", value)?;
                return Ok(());
            }
            _ => {
                return Err(CrfError::invalid_argument(
                    "key",
                    format!("unknown feature switch: {key}"),
                ))
            }
        };
        *flag = parse_value("value", value)?;
        Ok(())
    }
}

/// Decoder selection and parameters.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct DecoderConfig {
    /// Inference algorithm.
    pub inference: InferenceType,

    /// Width of the beam.
    pub beam_size: usize,

    /// Cooling schedule.
    pub annealing: AnnealingType,

    /// Cooling rate of the exponential schedule.
    pub annealing_rate: f64,

    /// Initial temperature.
    pub start_temperature: f64,

    /// Number of sweeps.
    pub num_samples: usize,

    /// Starting point of the sampler.
    pub initial: InitialSequence,

    /// Sequence prior added to the model scores.
    pub prior: PriorKind,

    /// Seed of the sampler.
    pub seed: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            inference: InferenceType::Viterbi,
            beam_size: 30,
            annealing: AnnealingType::Linear,
            annealing_rate: 0.0,
            start_temperature: 1.0,
            num_samples: 100,
            initial: InitialSequence::Random,
            prior: PriorKind::None,
            seed: 0,
        }
    }
}

impl DecoderConfig {
    const KEYS: [&'static str; 9] = [
        "inferenceType",
        "beamSize",
        "annealingType",
        "annealingRate",
        "startTemperature",
        "numSamples",
        "initialSequence",
        "priorType",
        "seed",
    ];

    /// Sets a parameter from its name and a string value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "inferenceType" => self.inference = value.parse()?,
            "beamSize" => self.beam_size = parse_value("beamSize", value)?,
            "annealingType" => self.annealing = value.parse()?,
            "annealingRate" => self.annealing_rate = parse_value("annealingRate", value)?,
            "startTemperature" => {
                self.start_temperature = parse_value("startTemperature", value)?;
            }
            "numSamples" => self.num_samples = parse_value("numSamples", value)?,
            "initialSequence" => self.initial = value.parse()?,
            "priorType" => self.prior = value.parse()?,
            "seed" => self.seed = parse_value("seed", value)?,
            _ => {
                return Err(CrfError::invalid_argument(
                    "key",
                    format!("unknown decoder parameter: {key}"),
                ))
            }
        }
        Ok(())
    }

    /// Checks the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.beam_size == 0 {
            return Err(CrfError::invalid_argument("beam_size", "must not be 0"));
        }
        if !self.start_temperature.is_finite() || self.start_temperature < 0.0 {
            return Err(CrfError::invalid_argument(
                "start_temperature",
                "must be a non-negative finite number",
            ));
        }
        if self.annealing == AnnealingType::Exponential
            && !(self.annealing_rate > 0.0 && self.annealing_rate < 1.0)
        {
            return Err(CrfError::invalid_argument(
                "annealing_rate",
                "must be in (0, 1) for exponential annealing",
            ));
        }
        Ok(())
    }
}

/// Model configuration.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct CrfConfig {
    /// Symbol of the background label.
    pub background_symbol: String,

    /// Number of labels covered by one factor.
    pub window_size: usize,

    /// Feature factory.
    pub factory: FeatureFactoryKind,

    /// Feature template switches.
    pub features: FeatureConfig,

    /// Decoder used by [`crate::Model::classify`].
    pub decoder: DecoderConfig,
}

impl Default for CrfConfig {
    fn default() -> Self {
        Self {
            background_symbol: "O".to_string(),
            window_size: 2,
            factory: FeatureFactoryKind::Ner,
            features: FeatureConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

impl CrfConfig {
    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WINDOW_SIZE).contains(&self.window_size) {
            return Err(CrfError::invalid_argument(
                "window_size",
                format!("must be in 1..={MAX_WINDOW_SIZE}"),
            ));
        }
        if self.background_symbol.is_empty() {
            return Err(CrfError::invalid_argument(
                "background_symbol",
                "must not be empty",
            ));
        }
        if self.features.use_ngrams && self.features.max_ngram_len < 2 {
            return Err(CrfError::invalid_argument(
                "max_ngram_len",
                "must be at least 2",
            ));
        }
        self.decoder.validate()
    }

    /// Sets a parameter from its name and a string value.
    ///
    /// Model-level keys are `backgroundSymbol`, `maxLeft` (window size minus
    /// one) and `featureFactory`; other keys go to the feature or decoder
    /// configuration.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "backgroundSymbol" => self.background_symbol = value.to_string(),
            "maxLeft" => {
                let max_left: usize = parse_value("maxLeft", value)?;
                self.window_size = max_left + 1;
            }
            "featureFactory" => self.factory = value.parse()?,
            _ if DecoderConfig::KEYS.contains(&key) => self.decoder.set(key, value)?,
            _ => self.features.set(key, value)?,
        }
        Ok(())
    }
}

fn parse_value<T>(arg: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
{
    value
        .trim()
        .parse()
        .map_err(|_| CrfError::invalid_argument(arg, format!("cannot parse {value:?}")))
}
