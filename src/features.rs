use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::{HashMap, HashSet};

use crate::clique::Clique;
use crate::config::{FeatureConfig, FeatureFactoryKind};
use crate::shape::WordShape;
use crate::token::{PaddedView, PAD};

const TITLES: [&str; 9] = ["Mr", "Ms", "Mrs", "Dr", "Miss", "Sen", "Judge", "Sir", "Prof"];

/// Feature template engine.
///
/// Turns a position of a sentence and a clique into feature strings. The
/// engine owns its lexicons and a cache of character n-grams; once built it
/// is only read, so one instance can serve many decoding threads.
pub struct FeatureTemplates {
    kind: FeatureFactoryKind,
    config: FeatureConfig,
    window_size: usize,
    known_lc_words: HashSet<String>,
    dist_sim: HashMap<String, String>,

    // word -> indices of gazette entries containing it
    gazette_index: HashMap<String, Vec<usize>>,

    ngram_cache: Mutex<HashMap<String, Arc<[String]>>>,
}

impl FeatureTemplates {
    /// Creates an engine.
    pub fn new(
        kind: FeatureFactoryKind,
        config: FeatureConfig,
        window_size: usize,
        known_lc_words: HashSet<String>,
    ) -> Self {
        let dist_sim = config.dist_sim_lexicon.iter().cloned().collect();
        let mut gazette_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in config.gazettes.iter().enumerate() {
            for word in &entry.words {
                let ids = gazette_index.entry(word.clone()).or_default();
                if ids.last() != Some(&i) {
                    ids.push(i);
                }
            }
        }
        Self {
            kind,
            config,
            window_size,
            known_lc_words,
            dist_sim,
            gazette_index,
            ngram_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the feature factory.
    #[inline(always)]
    pub fn kind(&self) -> FeatureFactoryKind {
        self.kind
    }

    /// Returns the template switches.
    #[inline(always)]
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Number of labels covered by one factor.
    #[inline(always)]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Returns the known lower-case words.
    #[inline(always)]
    pub fn known_lc_words(&self) -> &HashSet<String> {
        &self.known_lc_words
    }

    /// Returns the features of a clique anchored at `pos`, each suffixed with
    /// `|` and the name of the clique that produced it.
    ///
    /// Cliques whose order is not smaller than the window size produce
    /// nothing. `CpC` also carries the `CnC` features of the previous
    /// position.
    pub fn clique_features(
        &self,
        view: &PaddedView,
        pos: usize,
        clique: Clique,
    ) -> HashSet<String> {
        let mut features = HashSet::new();
        if !clique.is_active(self.window_size) {
            return features;
        }
        let i = pos as isize;
        let mut raw = vec![];
        match self.kind {
            FeatureFactoryKind::Ner => match clique {
                Clique::C => self.ner_c(view, i, &mut raw),
                Clique::CpC => {
                    self.ner_cpc(view, i, &mut raw);
                    let mut cnc = vec![];
                    self.ner_cnc(view, i - 1, &mut cnc);
                    extend_suffixed(&mut features, cnc, Clique::CnC);
                }
                Clique::CnC => self.ner_cnc(view, i, &mut raw),
                Clique::Cp2C => self.ner_cp2c(view, i, &mut raw),
                Clique::Cp3C => self.ner_cp3c(view, i, &mut raw),
                Clique::Cp4C => {
                    if self.config.use_long_sequences {
                        raw.push("PPPPSEQ".to_string());
                    }
                }
                Clique::Cp5C => {
                    if self.config.use_long_sequences {
                        raw.push("PPPPPSEQ".to_string());
                    }
                }
            },
            FeatureFactoryKind::CharSegmenter => match clique {
                Clique::C => self.segmenter_c(view, i, &mut raw),
                Clique::CpC => self.segmenter_cpc(view, i, &mut raw),
                Clique::Cp2C => {
                    if self.config.use_long_sequences {
                        raw.push("PPSEQ".to_string());
                    }
                }
                _ => (),
            },
        }
        extend_suffixed(&mut features, raw, clique);
        features
    }

    /// Returns the features of every active order at `pos`, indexed by order.
    pub fn position_features(&self, view: &PaddedView, pos: usize) -> Vec<HashSet<String>> {
        (0..self.window_size)
            .filter_map(Clique::of_order)
            .map(|clique| self.clique_features(view, pos, clique))
            .collect()
    }

    fn shape(&self, view: &PaddedView, i: isize) -> String {
        if view.is_pad(i) {
            return PAD.to_string();
        }
        if self.config.use_shape_strings {
            if let Some(shape) = view.shape(i) {
                return shape.to_string();
            }
        }
        if self.config.word_shape == WordShape::None {
            return String::new();
        }
        self.config
            .word_shape
            .classify(view.word(i), &self.known_lc_words)
    }

    fn dist_sim_class(&self, word: &str) -> &str {
        self.dist_sim.get(word).map_or("null", String::as_str)
    }

    /// Character n-grams of `<word>`, computed once per distinct word.
    pub fn char_ngrams(&self, word: &str) -> Arc<[String]> {
        {
            let cache = self.ngram_cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(ngrams) = cache.get(word) {
                return Arc::clone(ngrams);
            }
        }
        let ngrams: Arc<[String]> = self.compute_ngrams(word).into();
        let mut cache = self.ngram_cache.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(word.to_string()).or_insert(ngrams))
    }

    fn compute_ngrams(&self, word: &str) -> Vec<String> {
        let mut w = if self.config.lowercase_ngrams {
            word.to_lowercase()
        } else {
            word.to_string()
        };
        if self.config.dehyphenate_ngrams {
            w.retain(|c| c != '-');
        }
        let chars: Vec<char> = format!("<{w}>").chars().collect();
        let n = chars.len();
        let mut seen = HashSet::new();
        let mut ngrams = vec![];
        for i in 0..n {
            for j in i + 2..=n.min(i + self.config.max_ngram_len) {
                if self.config.no_mid_ngrams && i != 0 && j != n {
                    continue;
                }
                let sub: String = chars[i..j].iter().collect();
                if seen.insert(sub.clone()) {
                    ngrams.push(format!("#{sub}#"));
                }
            }
        }
        ngrams
    }

    fn gazette_features(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        let word = view.word(i);
        let Some(ids) = self.gazette_index.get(word) else {
            return;
        };
        for &id in ids {
            let entry = &self.config.gazettes[id];
            let clean = entry.words.iter().enumerate().any(|(k, w)| {
                w == word
                    && entry
                        .words
                        .iter()
                        .enumerate()
                        .all(|(m, wm)| view.word(i - k as isize + m as isize) == wm)
            });
            if clean {
                out.push(format!("{}-GAZ", entry.class));
            }
            if self.config.sloppy_gazette {
                out.push(format!("{}-SGAZ", entry.class));
            }
        }
    }

    fn ner_c(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        let cfg = &self.config;
        let c = view.word(i);
        let p = view.word(i - 1);
        let n = view.word(i + 1);

        if cfg.use_word {
            out.push(format!("{c}-WORD"));
        }
        if cfg.use_prev {
            out.push(format!("{p}-PW"));
        }
        if cfg.use_next {
            out.push(format!("{n}-NW"));
        }
        if cfg.use_2w {
            out.push(format!("{}-P2W", view.word(i - 2)));
            out.push(format!("{}-N2W", view.word(i + 2)));
        }
        if cfg.use_lc {
            out.push(format!("{}-CL", c.to_lowercase()));
            out.push(format!("{}-PL", p.to_lowercase()));
            out.push(format!("{}-NL", n.to_lowercase()));
        }
        if cfg.use_tags {
            out.push(format!("{}-TAG", view.tag(i)));
            if cfg.use_prev {
                out.push(format!("{}-PTAG", view.tag(i - 1)));
            }
            if cfg.use_next {
                out.push(format!("{}-NTAG", view.tag(i + 1)));
            }
        }
        if cfg.use_word_pairs {
            out.push(format!("{c}-{p}-W-PW"));
            out.push(format!("{c}-{n}-W-NW"));
        }
        if cfg.use_lemmas {
            out.push(format!("{}-LEM", view.lemma(i)));
        }
        if cfg.use_chunks {
            out.push(format!("{}-CHUNK", view.chunk(i)));
        }
        for key in &cfg.attribute_features {
            out.push(format!("{}-{}", view.attribute(i, key), key.to_uppercase()));
        }

        let cs = self.shape(view, i);
        if cfg.shapes_enabled() {
            out.push(format!("{cs}-TYPE"));
            if cfg.use_type_seqs {
                let ps = self.shape(view, i - 1);
                let ns = self.shape(view, i + 1);
                out.push(format!("{ps}-PTYPE"));
                out.push(format!("{ns}-NTYPE"));
                out.push(format!("{p}...{cs}-PW_CTYPE"));
                out.push(format!("{cs}...{n}-NW_CTYPE"));
                if cfg.use_type_seqs2 {
                    out.push(format!("{ps}-{cs}-{ns}-PTYPE-CTYPE-NTYPE"));
                }
            }
        }
        if cfg.use_ngrams {
            for ngram in self.char_ngrams(c).iter() {
                if cfg.conjoin_shape_ngrams && cfg.shapes_enabled() {
                    out.push(format!("{ngram}-{cs}-CNGram-CS"));
                }
                out.push(ngram.clone());
            }
        }
        if cfg.use_dist_sim {
            out.push(format!("{}-DISTSIM", self.dist_sim_class(c)));
            if cfg.use_prev {
                out.push(format!("{}-PDISTSIM", self.dist_sim_class(p)));
            }
            if cfg.use_next {
                out.push(format!("{}-NDISTSIM", self.dist_sim_class(n)));
            }
        }
        if cfg.use_gazettes {
            self.gazette_features(view, i, out);
        }
        if cfg.use_title && is_title(c) {
            out.push("IS_TITLE".to_string());
        }
        if cfg.use_disjunctive {
            for d in 1..=cfg.disjunction_width as isize {
                out.push(format!("{}-DISJN", view.word(i + d)));
                out.push(format!("{}-DISJP", view.word(i - d)));
            }
        }
        if cfg.use_bag_of_words {
            for token in view.tokens() {
                out.push(format!("{}-BAGOFWORDS", token.word));
            }
        }
        if cfg.use_class_feature {
            out.push("###".to_string());
        }
    }

    fn ner_cpc(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        let cfg = &self.config;
        let c = view.word(i);
        let p = view.word(i - 1);
        let shapes = cfg.shapes_enabled();
        let cs = self.shape(view, i);

        if cfg.use_sequences && cfg.use_prev_sequences {
            out.push("PSEQ".to_string());
            out.push(format!("{c}-PSEQW"));
            out.push(format!("{p}-{c}-PSEQW2"));
            out.push(format!("{p}-PSEQpW"));
            if shapes {
                out.push(format!("{cs}-PSEQcS"));
            }
        }
        if cfg.use_taggy_sequences && cfg.use_tags {
            out.push(format!("{}-{}-TS", view.tag(i - 1), view.tag(i)));
        }
        if shapes && (cfg.use_type_seqs || cfg.use_typey_sequences) {
            let ps = self.shape(view, i - 1);
            let ns = self.shape(view, i + 1);
            if cfg.use_type_seqs && cfg.use_type_seqs2 {
                out.push(format!("{ps}-{cs}-TYPES"));
            }
            if cfg.use_type_seqs && cfg.use_type_seqs3 {
                out.push(format!("{ps}-{cs}-{ns}-PCNSHAPES"));
            }
            if cfg.use_typey_sequences {
                out.push(format!("{cs}-TPS2"));
                out.push(format!("{ns}-TNS1"));
                out.push(format!("{ps}-{cs}-TPS"));
            }
        }
    }

    fn ner_cnc(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        if self.config.use_sequences && self.config.use_next_sequences {
            out.push("NSEQ".to_string());
            out.push(format!("{}-NSEQW", view.word(i)));
        }
    }

    fn ner_cp2c(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        let cfg = &self.config;
        if cfg.use_long_sequences {
            out.push("PPSEQ".to_string());
        }
        if cfg.use_taggy_sequences && cfg.use_tags {
            out.push(format!(
                "{}-{}-{}-TTS",
                view.tag(i - 2),
                view.tag(i - 1),
                view.tag(i)
            ));
        }
        if cfg.use_typey_sequences && cfg.shapes_enabled() {
            out.push(format!(
                "{}-{}-{}-TTPS",
                self.shape(view, i - 2),
                self.shape(view, i - 1),
                self.shape(view, i)
            ));
        }
    }

    fn ner_cp3c(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        let cfg = &self.config;
        if cfg.use_long_sequences {
            out.push("PPPSEQ".to_string());
        }
        if cfg.use_taggy_sequences && cfg.use_tags {
            out.push(format!(
                "{}-{}-{}-{}-TTTS",
                view.tag(i - 3),
                view.tag(i - 2),
                view.tag(i - 1),
                view.tag(i)
            ));
        }
    }

    fn segmenter_c(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        let c = view.word(i);
        let p = view.word(i - 1);
        let n = view.word(i + 1);
        let p2 = view.word(i - 2);
        let n2 = view.word(i + 2);
        out.push(format!("{c}-c"));
        out.push(format!("{p}-p"));
        out.push(format!("{n}-n"));
        out.push(format!("{p2}-p2"));
        out.push(format!("{n2}-n2"));
        out.push(format!("{p}{c}-pc"));
        out.push(format!("{c}{n}-cn"));
        out.push(format!("{p}{n}-pn"));
        out.push(format!("{p2}{p}-p2p"));
        out.push(format!("{n}{n2}-nn2"));
        let ct = char_type(view, i);
        out.push(format!("{ct}-ct"));
        out.push(format!(
            "{}{ct}{}-pcnt",
            char_type(view, i - 1),
            char_type(view, i + 1)
        ));
        if self.config.use_class_feature {
            out.push("###".to_string());
        }
    }

    fn segmenter_cpc(&self, view: &PaddedView, i: isize, out: &mut Vec<String>) {
        if self.config.use_sequences {
            let c = view.word(i);
            let p = view.word(i - 1);
            out.push("PSEQ".to_string());
            out.push(format!("{c}-cSEQ"));
            out.push(format!("{p}{c}-pcSEQ"));
        }
    }
}

fn extend_suffixed(features: &mut HashSet<String>, raw: Vec<String>, clique: Clique) {
    for mut f in raw {
        f.push('|');
        f.push_str(clique.name());
        features.insert(f);
    }
}

fn is_title(word: &str) -> bool {
    let word = word.strip_suffix('.').unwrap_or(word);
    TITLES.contains(&word)
}

fn char_type(view: &PaddedView, i: isize) -> &'static str {
    if view.is_pad(i) {
        return "BND";
    }
    match view.word(i).chars().next() {
        None => "O",
        Some(c) if c.is_numeric() => "D",
        Some(c) if c.is_ascii_alphabetic() => "L",
        Some('\u{3040}'..='\u{30ff}') => "K",
        Some('\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}') => "C",
        Some(c) if c.is_whitespace() => "S",
        Some(c) if c.is_ascii_punctuation() || ('\u{3000}'..='\u{303f}').contains(&c) => "P",
        Some(_) => "O",
    }
}

/// Collects the words of a corpus that are entirely lower-case.
pub fn collect_known_lc_words<'a, I>(sentences: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a [crate::token::Token]>,
{
    let mut words = HashSet::new();
    for sentence in sentences {
        for token in sentence {
            if token.word.chars().any(char::is_lowercase) && token.word == token.word.to_lowercase()
            {
                words.insert(token.word.clone());
            }
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::GazetteEntry;
    use crate::token::Token;

    fn sentence(words: &[&str]) -> Vec<Token> {
        words.iter().map(|&w| Token::new(w)).collect()
    }

    fn ner(config: FeatureConfig, window_size: usize) -> FeatureTemplates {
        FeatureTemplates::new(FeatureFactoryKind::Ner, config, window_size, HashSet::new())
    }

    #[test]
    fn test_ner_c_defaults() {
        let tokens = sentence(&["Obama", "visited", "Paris"]);
        let view = PaddedView::new(&tokens);
        let engine = ner(FeatureConfig::default(), 2);
        let features = engine.clique_features(&view, 1, Clique::C);
        assert!(features.contains("visited-WORD|C"));
        assert!(features.contains("Obama-PW|C"));
        assert!(features.contains("Paris-NW|C"));
        assert!(features.contains("###|C"));
        assert!(features.contains("xxxxx-TYPE|C"));
        assert!(features.iter().all(|f| Clique::from_feature(f) == Some(Clique::C)));

        let first = engine.clique_features(&view, 0, Clique::C);
        assert!(first.contains("<PAD>-PW|C"));
        assert!(first.contains("<PAD>-PTYPE|C"));
    }

    #[test]
    fn test_attribute_features() {
        let tokens = vec![
            Token::new("Acme").with_attribute("ner_hint", "B-ORG"),
            Token::new("rose"),
        ];
        let view = PaddedView::new(&tokens);
        let config = FeatureConfig {
            attribute_features: vec!["ner_hint".to_string()],
            ..FeatureConfig::default()
        };
        let engine = ner(config, 2);
        assert!(engine
            .clique_features(&view, 0, Clique::C)
            .contains("B-ORG-NER_HINT|C"));
        assert!(engine
            .clique_features(&view, 1, Clique::C)
            .contains("-NER_HINT|C"));

        let plain = ner(FeatureConfig::default(), 2);
        assert!(plain
            .clique_features(&view, 0, Clique::C)
            .iter()
            .all(|f| !f.contains("NER_HINT")));
    }

    #[test]
    fn test_ner_ngrams_no_mid() {
        let tokens = sentence(&["Obama"]);
        let view = PaddedView::new(&tokens);
        let engine = ner(FeatureConfig::default(), 1);
        let features = engine.clique_features(&view, 0, Clique::C);
        assert!(features.contains("#<O#|C"));
        assert!(features.contains("#<Obama#|C"));
        assert!(features.contains("#a>#|C"));
        assert!(features.contains("#Obama>#|C"));
        assert!(!features.contains("#Ob#|C"));
    }

    #[test]
    fn test_ner_cpc_includes_cnc() {
        let tokens = sentence(&["Obama", "visited", "Paris"]);
        let view = PaddedView::new(&tokens);
        let config = FeatureConfig {
            use_next_sequences: true,
            ..FeatureConfig::default()
        };
        let engine = ner(config, 2);
        let features = engine.clique_features(&view, 1, Clique::CpC);
        assert!(features.contains("PSEQ|CpC"));
        assert!(features.contains("visited-PSEQW|CpC"));
        assert!(features.contains("Obama-visited-PSEQW2|CpC"));
        assert!(features.contains("NSEQ|CnC"));
        assert!(features.contains("Obama-NSEQW|CnC"));
        assert_eq!(
            Some(Clique::CnC),
            Clique::from_feature("Obama-NSEQW|CnC")
        );
    }

    #[test]
    fn test_inactive_clique_is_empty() {
        let tokens = sentence(&["a", "b", "c"]);
        let view = PaddedView::new(&tokens);
        let config = FeatureConfig {
            use_long_sequences: true,
            ..FeatureConfig::default()
        };
        let engine = ner(config.clone(), 2);
        assert!(engine.clique_features(&view, 2, Clique::Cp2C).is_empty());
        assert_eq!(2, engine.position_features(&view, 2).len());

        let engine = ner(config, 3);
        assert!(engine
            .clique_features(&view, 2, Clique::Cp2C)
            .contains("PPSEQ|Cp2C"));
    }

    #[test]
    fn test_feature_determinism_and_cache() {
        let tokens = sentence(&["Barack", "Obama", "visited", "Obama"]);
        let view = PaddedView::new(&tokens);
        let engine = ner(FeatureConfig::default(), 2);
        let a = engine.position_features(&view, 1);
        assert!(engine.ngram_cache.lock().unwrap().contains_key("Obama"));
        let b = engine.position_features(&view, 1);
        assert_eq!(a, b);

        let fresh = ner(FeatureConfig::default(), 2);
        assert_eq!(a, fresh.position_features(&view, 1));

        let c1 = engine.char_ngrams("Obama");
        let c2 = engine.char_ngrams("Obama");
        assert!(Arc::ptr_eq(&c1, &c2));
    }

    #[test]
    fn test_shape_strings_take_precedence() {
        let tokens = vec![Token::new("Paris").with_shape("CUSTOM")];
        let view = PaddedView::new(&tokens);
        let config = FeatureConfig {
            use_shape_strings: true,
            ..FeatureConfig::default()
        };
        let engine = ner(config, 1);
        let features = engine.clique_features(&view, 0, Clique::C);
        assert!(features.contains("CUSTOM-TYPE|C"));
        assert!(!features.contains("Xxxxx-TYPE|C"));
    }

    #[test]
    fn test_known_lc_words_mark_shapes() {
        let corpus = [sentence(&["paris", "is", "big"]), sentence(&["Paris", "IBM"])];
        let lc = collect_known_lc_words(corpus.iter().map(|s| s.as_slice()));
        assert!(lc.contains("paris"));
        assert!(!lc.contains("Paris"));
        assert!(!lc.contains("IBM"));

        let tokens = sentence(&["Paris"]);
        let view = PaddedView::new(&tokens);
        let engine = FeatureTemplates::new(
            FeatureFactoryKind::Ner,
            FeatureConfig::default(),
            1,
            lc,
        );
        assert!(engine
            .clique_features(&view, 0, Clique::C)
            .contains("Xxxxxk-TYPE|C"));
    }

    #[test]
    fn test_gazettes() {
        let tokens = sentence(&["New", "York", "and", "York"]);
        let view = PaddedView::new(&tokens);
        let config = FeatureConfig {
            use_gazettes: true,
            sloppy_gazette: true,
            gazettes: vec![GazetteEntry::new("LOC", "New York")],
            ..FeatureConfig::default()
        };
        let engine = ner(config, 1);
        let at1 = engine.clique_features(&view, 1, Clique::C);
        assert!(at1.contains("LOC-GAZ|C"));
        assert!(at1.contains("LOC-SGAZ|C"));
        let at3 = engine.clique_features(&view, 3, Clique::C);
        assert!(!at3.contains("LOC-GAZ|C"));
        assert!(at3.contains("LOC-SGAZ|C"));
    }

    #[test]
    fn test_misc_templates() {
        let tokens = vec![
            Token::new("Mr.").with_tag("NNP"),
            Token::new("Smith").with_tag("NNP").with_lemma("smith"),
        ];
        let view = PaddedView::new(&tokens);
        let config = FeatureConfig {
            use_title: true,
            use_tags: true,
            use_lemmas: true,
            use_bag_of_words: true,
            use_dist_sim: true,
            dist_sim_lexicon: vec![("Smith".to_string(), "17".to_string())],
            use_disjunctive: true,
            disjunction_width: 1,
            ..FeatureConfig::default()
        };
        let engine = ner(config, 1);
        let at0 = engine.clique_features(&view, 0, Clique::C);
        assert!(at0.contains("IS_TITLE|C"));
        assert!(at0.contains("NNP-TAG|C"));
        assert!(at0.contains("<PAD>-PTAG|C"));
        assert!(at0.contains("Smith-BAGOFWORDS|C"));
        assert!(at0.contains("null-DISTSIM|C"));
        assert!(at0.contains("17-NDISTSIM|C"));
        assert!(at0.contains("Smith-DISJN|C"));
        let at1 = engine.clique_features(&view, 1, Clique::C);
        assert!(at1.contains("smith-LEM|C"));
        assert!(!at1.contains("IS_TITLE|C"));
    }

    #[test]
    fn test_segmenter() {
        let tokens = sentence(&["北", "京", "1"]);
        let view = PaddedView::new(&tokens);
        let engine = FeatureTemplates::new(
            FeatureFactoryKind::CharSegmenter,
            FeatureConfig::default(),
            2,
            HashSet::new(),
        );
        let c = engine.clique_features(&view, 1, Clique::C);
        assert!(c.contains("京-c|C"));
        assert!(c.contains("北京-pc|C"));
        assert!(c.contains("京1-cn|C"));
        assert!(c.contains("CCD-pcnt|C"));
        let cpc = engine.clique_features(&view, 1, Clique::CpC);
        assert!(cpc.contains("PSEQ|CpC"));
        assert!(cpc.contains("北京-pcSEQ|CpC"));
        assert!(engine.clique_features(&view, 1, Clique::CnC).is_empty());
    }
}
