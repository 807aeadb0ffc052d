//! Sequence-level priors combined with model scores by the Gibbs sampler.

use core::fmt;
use core::str::FromStr;

use bincode::{Decode, Encode};

use crate::errors::{CrfError, Result};

/// Registry of sequence priors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub enum PriorKind {
    /// No prior.
    #[default]
    None,
    /// [`EntityConsistencyPrior`].
    Entity,
}

impl PriorKind {
    /// Returns the identifier of the prior.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Entity => "entity",
        }
    }

    /// Builds the prior for a sentence.
    pub fn build(
        self,
        words: &[&str],
        background: u32,
    ) -> Box<dyn SequencePrior + Send> {
        match self {
            Self::None => Box::new(NoPrior),
            Self::Entity => Box::new(EntityConsistencyPrior::new(words, background)),
        }
    }
}

impl fmt::Display for PriorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PriorKind {
    type Err = CrfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "entity" => Ok(Self::Entity),
            _ => Err(CrfError::invalid_argument(
                "prior",
                format!("unknown sequence prior: {s}"),
            )),
        }
    }
}

/// A log-score over whole label sequences.
///
/// Sequences are unpadded. The sampler announces the starting sequence and
/// every change it makes, so implementations may keep incremental state.
pub trait SequencePrior {
    /// Returns, for every candidate label, the log-score of `sequence` with
    /// `pos` set to that label, up to a constant shared by all candidates.
    fn scores_of(&self, sequence: &[u32], pos: usize, labels: &[u32]) -> Vec<f64>;

    /// Called once with the starting sequence.
    fn set_initial_sequence(&mut self, _sequence: &[u32]) {}

    /// Called after `sequence[pos]` changed from `old`.
    fn update_sequence_element(&mut self, _sequence: &[u32], _pos: usize, _old: u32) {}
}

/// A flat prior.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPrior;

impl SequencePrior for NoPrior {
    fn scores_of(&self, _sequence: &[u32], _pos: usize, labels: &[u32]) -> Vec<f64> {
        vec![0.0; labels.len()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entity {
    start: usize,
    end: usize,
    label: u32,
}

impl Entity {
    #[inline(always)]
    fn touches(&self, lo: usize, hi: usize) -> bool {
        self.start <= hi && lo < self.end
    }
}

/// Penalizes documents that label the same text inconsistently.
///
/// Entities are maximal runs of one non-background label. A pair of
/// entities with different labels costs `exact_penalty` if their words are
/// equal and `sub_penalty` if the words of one are a contiguous part of the
/// other's.
#[derive(Clone, Debug)]
pub struct EntityConsistencyPrior {
    words: Vec<String>,
    background: u32,
    exact_penalty: f64,
    sub_penalty: f64,
    entities: Vec<Entity>,
}

impl EntityConsistencyPrior {
    /// Creates a prior over the given words.
    pub fn new(words: &[&str], background: u32) -> Self {
        Self {
            words: words.iter().map(|w| w.to_string()).collect(),
            background,
            exact_penalty: -4.0,
            sub_penalty: -2.0,
            entities: vec![],
        }
    }

    /// Sets the log-penalties.
    pub fn penalties(mut self, exact_penalty: f64, sub_penalty: f64) -> Result<Self> {
        if !(exact_penalty <= 0.0 && sub_penalty <= 0.0) {
            return Err(CrfError::invalid_argument(
                "penalties",
                "must not be positive",
            ));
        }
        self.exact_penalty = exact_penalty;
        self.sub_penalty = sub_penalty;
        Ok(self)
    }

    fn entities_of(&self, sequence: &[u32]) -> Vec<Entity> {
        let mut entities = vec![];
        let mut start = 0;
        for pos in 1..=sequence.len() {
            if pos == sequence.len() || sequence[pos] != sequence[start] {
                if sequence[start] != self.background {
                    entities.push(Entity {
                        start,
                        end: pos,
                        label: sequence[start],
                    });
                }
                start = pos;
            }
        }
        entities
    }

    /// The run containing `pos` in `sequence`, if it is an entity.
    fn entity_at(&self, sequence: &[u32], pos: usize) -> Option<Entity> {
        let label = *sequence.get(pos)?;
        if label == self.background {
            return None;
        }
        let mut start = pos;
        while start > 0 && sequence[start - 1] == label {
            start -= 1;
        }
        let mut end = pos + 1;
        while end < sequence.len() && sequence[end] == label {
            end += 1;
        }
        Some(Entity { start, end, label })
    }

    fn penalty(&self, a: &Entity, b: &Entity) -> f64 {
        if a.label == b.label {
            return 0.0;
        }
        let wa = &self.words[a.start..a.end];
        let wb = &self.words[b.start..b.end];
        if wa == wb {
            self.exact_penalty
        } else if is_sub_run(wa, wb) || is_sub_run(wb, wa) {
            self.sub_penalty
        } else {
            0.0
        }
    }
}

fn is_sub_run(needle: &[String], haystack: &[String]) -> bool {
    needle.len() < haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

impl SequencePrior for EntityConsistencyPrior {
    fn scores_of(&self, sequence: &[u32], pos: usize, labels: &[u32]) -> Vec<f64> {
        let lo = pos.saturating_sub(1);
        let hi = pos + 1;
        // Entities away from pos are the same for every candidate.
        let fixed: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|e| !e.touches(lo, hi))
            .collect();
        let mut candidate = sequence.to_vec();
        labels
            .iter()
            .map(|&label| {
                candidate[pos] = label;
                let mut local: Vec<Entity> = vec![];
                for p in lo..=hi {
                    if let Some(e) = self.entity_at(&candidate, p) {
                        if !local.contains(&e) {
                            local.push(e);
                        }
                    }
                }
                let mut score = 0.0;
                for (i, a) in local.iter().enumerate() {
                    for b in &local[i + 1..] {
                        score += self.penalty(a, b);
                    }
                    for b in &fixed {
                        score += self.penalty(a, b);
                    }
                }
                score
            })
            .collect()
    }

    fn set_initial_sequence(&mut self, sequence: &[u32]) {
        self.entities = self.entities_of(sequence);
    }

    fn update_sequence_element(&mut self, sequence: &[u32], _pos: usize, _old: u32) {
        self.entities = self.entities_of(sequence);
    }
}
