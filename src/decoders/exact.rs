use hashbrown::HashMap;

use crate::decoders::{labels_at, BestSequenceFinder, SequenceModel};

/// Exact max-product search.
///
/// Among sequences with equal scores the lexicographically smallest one is
/// returned.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExactDecoder;

/// Every assignment of the `win` positions ending at `q`.
pub(crate) fn states_at<M>(model: &M, q: isize, win: usize) -> Vec<Vec<u32>>
where
    M: SequenceModel + ?Sized,
{
    let mut states = vec![Vec::with_capacity(win)];
    for p in q - win as isize + 1..=q {
        let labels = labels_at(model, p);
        states = states
            .into_iter()
            .flat_map(|s| {
                labels.iter().map(move |&l| {
                    let mut next = s.clone();
                    next.push(l);
                    next
                })
            })
            .collect();
    }
    states
}

/// Scores assigning `label` at padded position `q` after `state`, the labels
/// of the `win` positions before it.
///
/// `scratch` is a padded buffer; only the window is written.
pub(crate) fn transition<M>(
    model: &M,
    scratch: &mut [u32],
    state: &[u32],
    label: u32,
    q: usize,
) -> f64
where
    M: SequenceModel + ?Sized,
{
    let left = model.left_window();
    let right = model.right_window();
    let Some(r) = q.checked_sub(right) else {
        return 0.0;
    };
    if r < left || r >= left + model.len() {
        return 0.0;
    }
    let win = state.len();
    scratch[q - win..q].copy_from_slice(state);
    scratch[q] = label;
    model.score_of(scratch, r)
}

/// Drops the oldest label and appends `label`.
#[inline(always)]
pub(crate) fn shift(state: &[u32], label: u32) -> Vec<u32> {
    if state.is_empty() {
        return vec![];
    }
    let mut next = state[1..].to_vec();
    next.push(label);
    next
}

impl ExactDecoder {
    /// Returns the best real labels with their score.
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

        // values[q + 1][state] = (best score of positions after q, best next label)
        let mut values: Vec<HashMap<Vec<u32>, (f64, u32)>> = vec![HashMap::new(); n + 1];
        for state in states_at(model, n as isize - 1, win) {
            values[n].insert(state, (0.0, 0));
        }
        for q in (-1..n as isize - 1).rev() {
            let next_q = (q + 1) as usize;
            let labels = labels_at(model, q + 1);
            let mut table = HashMap::new();
            for state in states_at(model, q, win) {
                let mut best = (f64::NEG_INFINITY, labels[0]);
                for &label in &labels {
                    let next = shift(&state, label);
                    let Some(&(v, _)) = values[next_q + 1].get(&next) else {
                        continue;
                    };
                    let score = transition(model, &mut scratch, &state, label, next_q) + v;
                    if score > best.0 {
                        best = (score, label);
                    }
                }
                table.insert(state, best);
            }
            values[next_q] = table;
        }

        let mut state = vec![model.background(); win];
        let total = values[0].get(&state).map_or(f64::NEG_INFINITY, |&(v, _)| v);
        let mut padded = Vec::with_capacity(n);
        for q in 0..n {
            let label = values[q].get(&state).map_or(model.background(), |&(_, l)| l);
            padded.push(label);
            state = shift(&state, label);
        }
        let left = model.left_window();
        (padded[left..left + model.len()].to_vec(), total)
    }
}

impl BestSequenceFinder for ExactDecoder {
    fn best_sequence<M>(&self, model: &M) -> Vec<u32>
    where
        M: SequenceModel + ?Sized,
    {
        self.best_sequence_with_score(model).0
    }
}
