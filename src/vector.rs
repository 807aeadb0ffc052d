use crate::clique::{Clique, LabelSpace};
use crate::vocab::Vocabulary;

/// Read-only access to clique weights.
pub trait Weights {
    /// Returns the weight of a feature for a label window of the feature's
    /// order.
    fn weight(&self, feature: u32, window: u32) -> f64;
}

impl Weights for [Vec<f64>] {
    #[inline(always)]
    fn weight(&self, feature: u32, window: u32) -> f64 {
        self[feature as usize][window as usize]
    }
}

impl Weights for Vec<Vec<f64>> {
    #[inline(always)]
    fn weight(&self, feature: u32, window: u32) -> f64 {
        self.as_slice().weight(feature, window)
    }
}

/// Position of every feature row inside one flat parameter vector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightLayout {
    offsets: Vec<usize>,
}

impl WeightLayout {
    /// Creates a layout from row lengths.
    pub fn from_row_lengths<I>(lengths: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut offsets = vec![0];
        let mut total = 0;
        for len in lengths {
            total += len;
            offsets.push(total);
        }
        Self { offsets }
    }

    /// Creates the layout of a feature vocabulary: each row is as long as the
    /// window index of the feature's clique order. Holes get empty rows.
    pub fn new(features: &Vocabulary<String>, label_space: &LabelSpace) -> Self {
        Self::from_row_lengths((0..features.len()).map(|id| {
            features
                .get(id as u32)
                .and_then(|name| Clique::from_feature(name))
                .filter(|clique| clique.is_active(label_space.window_size()))
                .map_or(0, |clique| label_space.num_windows(clique.order()))
        }))
    }

    /// Number of rows.
    #[inline(always)]
    pub fn num_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Length of the flat vector.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Returns `true` if there are no parameters.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the flat range of a row.
    #[inline(always)]
    pub fn row(&self, feature: u32) -> core::ops::Range<usize> {
        let f = feature as usize;
        self.offsets[f]..self.offsets[f + 1]
    }

    /// Returns the flat index of a weight.
    #[inline(always)]
    pub fn index(&self, feature: u32, window: u32) -> usize {
        self.offsets[feature as usize] + window as usize
    }

    /// Copies a jagged matrix into a flat vector.
    pub fn flatten(&self, weights: &[Vec<f64>]) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.len());
        for row in weights {
            flat.extend_from_slice(row);
        }
        flat
    }

    /// Splits a flat vector into a jagged matrix.
    pub fn unflatten(&self, flat: &[f64]) -> Vec<Vec<f64>> {
        self.offsets
            .windows(2)
            .map(|w| flat[w[0]..w[1]].to_vec())
            .collect()
    }

    /// Borrows a flat vector as [`Weights`].
    #[inline(always)]
    pub fn view<'a>(&'a self, flat: &'a [f64]) -> FlatWeights<'a> {
        FlatWeights { layout: self, flat }
    }
}

/// A flat parameter vector seen through its layout.
#[derive(Clone, Copy, Debug)]
pub struct FlatWeights<'a> {
    layout: &'a WeightLayout,
    flat: &'a [f64],
}

impl Weights for FlatWeights<'_> {
    #[inline(always)]
    fn weight(&self, feature: u32, window: u32) -> f64 {
        self.flat[self.layout.index(feature, window)]
    }
}

/// Accumulator of gradients.
pub trait GradientVector {
    /// Adds `value` at `index`.
    fn add(&mut self, index: usize, value: f64);
}

impl GradientVector for Vec<f64> {
    #[inline(always)]
    fn add(&mut self, index: usize, value: f64) {
        self[index] += value;
    }
}

impl GradientVector for [f64] {
    #[inline(always)]
    fn add(&mut self, index: usize, value: f64) {
        self[index] += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_and_jagged_agree() {
        let jagged = vec![vec![0.5, -1.0], vec![], vec![2.0, 3.0, 4.0]];
        let layout = WeightLayout::from_row_lengths(jagged.iter().map(Vec::len));
        assert_eq!(3, layout.num_rows());
        assert_eq!(5, layout.len());
        let flat = layout.flatten(&jagged);
        assert_eq!(vec![0.5, -1.0, 2.0, 3.0, 4.0], flat);
        let view = layout.view(&flat);
        for (f, row) in jagged.iter().enumerate() {
            for (w, &x) in row.iter().enumerate() {
                assert_eq!(x, view.weight(f as u32, w as u32));
                assert_eq!(x, jagged.weight(f as u32, w as u32));
            }
        }
        assert_eq!(2..5, layout.row(2));
        assert_eq!(jagged, layout.unflatten(&flat));
    }

    #[test]
    fn test_layout_from_vocabulary() {
        let space = LabelSpace::complete(3, 2, 0).unwrap();
        let mut features: Vocabulary<String> = ["a|C", "b|CpC", "c|CnC", "d|Cp2C"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        features.remove(&"c|CnC".to_string());
        let layout = WeightLayout::new(&features, &space);
        assert_eq!(4, layout.num_rows());
        assert_eq!(3, layout.row(0).len());
        assert_eq!(9, layout.row(1).len());
        assert_eq!(0, layout.row(2).len());
        assert_eq!(0, layout.row(3).len());
    }

    #[test]
    fn test_gradient_vector() {
        let mut g = vec![0.0; 3];
        g.add(1, 0.5);
        g.add(1, 0.25);
        assert_eq!(vec![0.0, 0.75, 0.0], g);
    }
}
