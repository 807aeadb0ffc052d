use crate::clique::{decode_labels, encode_labels};
use crate::math;

/// Log-space table over every assignment of `window_size` consecutive labels.
///
/// The entry of labels `l_0 .. l_{w-1}`, oldest first, lives at
/// `sum(l_k * L^(w-1-k))`.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorTable {
    num_labels: usize,
    window_size: usize,
    values: Vec<f64>,
}

impl FactorTable {
    /// Creates a table filled with `value`.
    pub fn filled(num_labels: usize, window_size: usize, value: f64) -> Self {
        Self {
            num_labels,
            window_size,
            values: vec![value; num_labels.pow(window_size as u32)],
        }
    }

    /// Number of labels.
    #[inline(always)]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Number of labels per entry.
    #[inline(always)]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of entries.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the table has no entries.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw entries.
    #[inline(always)]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the raw entries.
    #[inline(always)]
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Index of a full assignment.
    #[inline(always)]
    pub fn index_of(&self, labels: &[u32]) -> usize {
        debug_assert_eq!(self.window_size, labels.len());
        encode_labels(labels, self.num_labels)
    }

    /// Assignment of an index.
    #[inline(always)]
    pub fn labels_of(&self, index: usize) -> Vec<u32> {
        decode_labels(index, self.window_size, self.num_labels)
    }

    /// Returns the entry of a full assignment.
    #[inline(always)]
    pub fn get(&self, labels: &[u32]) -> f64 {
        self.values[self.index_of(labels)]
    }

    /// Log of the sum of all entries.
    #[inline(always)]
    pub fn total_mass(&self) -> f64 {
        math::logsumexp_slice(&self.values)
    }

    /// Log of the sum of entries whose newest labels equal `suffix`.
    pub fn suffix_mass(&self, suffix: &[u32]) -> f64 {
        debug_assert!(suffix.len() <= self.window_size);
        let block = self.num_labels.pow(suffix.len() as u32);
        let code = encode_labels(suffix, self.num_labels);
        let mut total = f64::NEG_INFINITY;
        for &v in self.values.iter().skip(code).step_by(block) {
            total = math::logsumexp(total, v);
        }
        total
    }

    /// Sums out the oldest label.
    pub fn sum_out_oldest(&self) -> Self {
        let inner = self.values.len() / self.num_labels;
        let mut values = vec![f64::NEG_INFINITY; inner];
        for (i, &v) in self.values.iter().enumerate() {
            values[i % inner] = math::logsumexp(values[i % inner], v);
        }
        Self {
            num_labels: self.num_labels,
            window_size: self.window_size - 1,
            values,
        }
    }

    /// Sums out the newest label.
    pub fn sum_out_newest(&self) -> Self {
        let values = self
            .values
            .chunks(self.num_labels)
            .map(math::logsumexp_slice)
            .collect();
        Self {
            num_labels: self.num_labels,
            window_size: self.window_size - 1,
            values,
        }
    }
}
