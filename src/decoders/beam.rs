use hashbrown::hash_map::Entry;
use hashbrown::HashMap;

use crate::decoders::exact::{shift, transition};
use crate::decoders::{labels_at, BestSequenceFinder, SequenceModel};
use crate::errors::{CrfError, Result};

/// Left-to-right search keeping the best `width` states at every step.
///
/// Hypotheses that reach the same state are merged, so a beam at least as
/// wide as the number of states is exact.
#[derive(Clone, Copy, Debug)]
pub struct BeamDecoder {
    width: usize,
}

struct Hypothesis {
    state: Vec<u32>,
    score: f64,
}

impl BeamDecoder {
    /// Creates a decoder.
    pub fn new(width: usize) -> Result<Self> {
        if width == 0 {
            return Err(CrfError::invalid_argument("width", "must not be 0"));
        }
        Ok(Self { width })
    }

    /// Width of the beam.
    #[inline(always)]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the best real labels found with their score.
    pub fn best_sequence_with_score<M>(&self, model: &M) -> (Vec<u32>, f64)
    where
        M: SequenceModel + ?Sized,
    {
        if model.is_empty() {
            return (vec![], 0.0);
        }
        let win = model.left_window() + model.right_window();
        let n = model.padded_len();
        let mut scratch = model.pad(&vec![model.background(); model.len()]);

        let mut beam = vec![Hypothesis {
            state: vec![model.background(); win],
            score: 0.0,
        }];
        // history[q][i] = (index in the previous beam, label at q)
        let mut history: Vec<Vec<(usize, u32)>> = Vec::with_capacity(n);
        for q in 0..n {
            let labels = labels_at(model, q as isize);
            let mut merged: HashMap<Vec<u32>, (f64, usize, u32)> = HashMap::new();
            for (i, hyp) in beam.iter().enumerate() {
                for &label in &labels {
                    let score =
                        hyp.score + transition(model, &mut scratch, &hyp.state, label, q);
                    match merged.entry(shift(&hyp.state, label)) {
                        Entry::Occupied(mut e) => {
                            if score > e.get().0 {
                                e.insert((score, i, label));
                            }
                        }
                        Entry::Vacant(e) => {
                            e.insert((score, i, label));
                        }
                    }
                }
            }
            let mut next: Vec<(Vec<u32>, (f64, usize, u32))> = merged.into_iter().collect();
            next.sort_unstable_by(|a, b| b.1 .0.total_cmp(&a.1 .0).then_with(|| a.0.cmp(&b.0)));
            next.truncate(self.width);
            history.push(next.iter().map(|(_, (_, i, l))| (*i, *l)).collect());
            beam = next
                .into_iter()
                .map(|(state, (score, _, _))| Hypothesis { state, score })
                .collect();
        }

        let Some(best) = beam.first() else {
            return (vec![model.background(); model.len()], f64::NEG_INFINITY);
        };
        let score = best.score;
        let mut padded = vec![0; n];
        // the beam is sorted, so the best hypothesis is at 0
        let mut idx = 0;
        for q in (0..n).rev() {
            let (prev, label) = history[q][idx];
            padded[q] = label;
            idx = prev;
        }
        let left = model.left_window();
        (padded[left..left + model.len()].to_vec(), score)
    }
}

impl BestSequenceFinder for BeamDecoder {
    fn best_sequence<M>(&self, model: &M) -> Vec<u32>
    where
        M: SequenceModel + ?Sized,
    {
        self.best_sequence_with_score(model).0
    }
}
