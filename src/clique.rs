use core::fmt;

use bincode::{Decode, Encode};

use crate::errors::{CrfError, Result};
use crate::vocab::Vocabulary;

/// Maximum number of labels a clique can span.
pub const MAX_WINDOW_SIZE: usize = 6;

/// A set of consecutive label positions whose joint assignment a feature
/// describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Clique {
    /// The current position.
    C,
    /// The previous and the current position.
    CpC,
    /// Two previous positions and the current one.
    Cp2C,
    /// Three previous positions and the current one.
    Cp3C,
    /// Four previous positions and the current one.
    Cp4C,
    /// Five previous positions and the current one.
    Cp5C,
    /// The current and the next position.
    CnC,
}

impl Clique {
    /// All cliques in catalogue order.
    pub const ALL: [Self; 7] = [
        Self::C,
        Self::CpC,
        Self::Cp2C,
        Self::Cp3C,
        Self::Cp4C,
        Self::Cp5C,
        Self::CnC,
    ];

    /// Left-extending cliques indexed by order.
    const CHAIN: [Self; MAX_WINDOW_SIZE] = [
        Self::C,
        Self::CpC,
        Self::Cp2C,
        Self::Cp3C,
        Self::Cp4C,
        Self::Cp5C,
    ];

    /// Returns the name used as a feature suffix.
    pub const fn name(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::CpC => "CpC",
            Self::Cp2C => "Cp2C",
            Self::Cp3C => "Cp3C",
            Self::Cp4C => "Cp4C",
            Self::Cp5C => "Cp5C",
            Self::CnC => "CnC",
        }
    }

    /// Number of labels minus one.
    ///
    /// `CnC` features are filed with order-1 windows ending at the later
    /// position.
    pub const fn order(self) -> usize {
        match self {
            Self::C => 0,
            Self::CpC | Self::CnC => 1,
            Self::Cp2C => 2,
            Self::Cp3C => 3,
            Self::Cp4C => 4,
            Self::Cp5C => 5,
        }
    }

    /// Offsets of the covered positions relative to the anchor position.
    pub const fn relative_indices(self) -> &'static [isize] {
        match self {
            Self::C => &[0],
            Self::CpC => &[-1, 0],
            Self::Cp2C => &[-2, -1, 0],
            Self::Cp3C => &[-3, -2, -1, 0],
            Self::Cp4C => &[-4, -3, -2, -1, 0],
            Self::Cp5C => &[-5, -4, -3, -2, -1, 0],
            Self::CnC => &[0, 1],
        }
    }

    /// Returns `true` if the clique takes part in a model of the given window
    /// size.
    #[inline(always)]
    pub const fn is_active(self, window_size: usize) -> bool {
        self.order() < window_size
    }

    /// Returns the left-extending clique of the given order.
    pub fn of_order(order: usize) -> Option<Self> {
        Self::CHAIN.get(order).copied()
    }

    /// Parses a clique name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Returns the clique that produced a feature string, read from the text
    /// after the last `|`.
    pub fn from_feature(feature: &str) -> Option<Self> {
        let (_, suffix) = feature.rsplit_once('|')?;
        Self::from_name(suffix)
    }
}

impl fmt::Display for Clique {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Labels of consecutive positions, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub struct LabelWindow(pub Vec<u32>);

impl LabelWindow {
    /// Returns the order of the window.
    #[inline(always)]
    pub fn order(&self) -> usize {
        self.0.len().saturating_sub(1)
    }
}

/// Label-window indices of every order together with lookup tables from
/// right-aligned label codes to window IDs.
#[derive(Clone, Debug)]
pub struct LabelSpace {
    num_labels: usize,
    window_size: usize,
    background: u32,
    windows: Vec<Vocabulary<LabelWindow>>,

    // suffix_lookup[j][code of j+1 labels] -> window ID of order j
    suffix_lookup: Vec<Vec<Option<u32>>>,
}

impl LabelSpace {
    fn check_args(num_labels: usize, window_size: usize, background: u32) -> Result<()> {
        if num_labels == 0 {
            return Err(CrfError::invalid_argument(
                "num_labels",
                "must be at least 1",
            ));
        }
        if !(1..=MAX_WINDOW_SIZE).contains(&window_size) {
            return Err(CrfError::invalid_argument(
                "window_size",
                format!("must be in 1..={MAX_WINDOW_SIZE}"),
            ));
        }
        if background as usize >= num_labels {
            return Err(CrfError::invalid_argument(
                "background",
                "must be smaller than num_labels",
            ));
        }
        if num_labels
            .checked_pow(window_size as u32)
            .and_then(|n| u32::try_from(n).ok())
            .is_none()
        {
            return Err(CrfError::invalid_argument(
                "window_size",
                "too many label windows",
            ));
        }
        Ok(())
    }

    /// Builds a label space from gold label sequences by indexing every window
    /// of every order at every position.
    pub fn from_sequences<'a, I>(
        num_labels: usize,
        window_size: usize,
        background: u32,
        sequences: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [u32]>,
    {
        Self::check_args(num_labels, window_size, background)?;
        let mut windows = vec![Vocabulary::new(); window_size];
        for labels in sequences {
            if let Some(&l) = labels.iter().find(|&&l| l as usize >= num_labels) {
                return Err(CrfError::invalid_argument(
                    "sequences",
                    format!("label {l} is out of range"),
                ));
            }
            for pos in 0..labels.len() {
                for (order, vocab) in windows.iter_mut().enumerate() {
                    vocab.add(Self::window_at(labels, pos, order, background));
                }
            }
        }
        Self::from_parts(num_labels, window_size, background, windows)
    }

    /// Builds a label space that indexes every possible window.
    pub fn complete(num_labels: usize, window_size: usize, background: u32) -> Result<Self> {
        Self::check_args(num_labels, window_size, background)?;
        let mut windows = Vec::with_capacity(window_size);
        for order in 0..window_size {
            let mut vocab = Vocabulary::new();
            for code in 0..num_labels.pow(order as u32 + 1) {
                vocab.add(LabelWindow(decode_labels(code, order + 1, num_labels)));
            }
            windows.push(vocab);
        }
        Self::from_parts(num_labels, window_size, background, windows)
    }

    /// Rebuilds a label space from its persisted window indices.
    pub fn from_parts(
        num_labels: usize,
        window_size: usize,
        background: u32,
        mut windows: Vec<Vocabulary<LabelWindow>>,
    ) -> Result<Self> {
        Self::check_args(num_labels, window_size, background)?;
        if windows.len() != window_size {
            return Err(CrfError::invalid_model(format!(
                "expected {window_size} window indices, got {}",
                windows.len()
            )));
        }
        let mut suffix_lookup = Vec::with_capacity(window_size);
        for (order, vocab) in windows.iter_mut().enumerate() {
            vocab.lock();
            let mut lookup = vec![None; num_labels.pow(order as u32 + 1)];
            for (id, window) in vocab.iter() {
                if window.0.len() != order + 1
                    || window.0.iter().any(|&l| l as usize >= num_labels)
                {
                    return Err(CrfError::invalid_model(format!(
                        "malformed label window {:?} of order {order}",
                        window.0
                    )));
                }
                lookup[encode_labels(&window.0, num_labels)] = Some(id);
            }
            suffix_lookup.push(lookup);
        }
        Ok(Self {
            num_labels,
            window_size,
            background,
            windows,
            suffix_lookup,
        })
    }

    /// Returns the window of the given order ending at `pos`, filling
    /// positions before the sequence with `background`.
    pub fn window_at(labels: &[u32], pos: usize, order: usize, background: u32) -> LabelWindow {
        LabelWindow(
            (0..=order)
                .map(|k| {
                    let p = pos as isize - order as isize + k as isize;
                    if p < 0 {
                        background
                    } else {
                        labels[p as usize]
                    }
                })
                .collect(),
        )
    }

    /// Number of labels.
    #[inline(always)]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Number of labels covered by one factor.
    #[inline(always)]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// ID of the background label.
    #[inline(always)]
    pub fn background(&self) -> u32 {
        self.background
    }

    /// Number of factor-table entries, `num_labels ^ window_size`.
    #[inline(always)]
    pub fn num_states(&self) -> usize {
        self.suffix_lookup[self.window_size - 1].len()
    }

    /// Returns the index of windows of the given order.
    #[inline(always)]
    pub fn windows(&self, order: usize) -> &Vocabulary<LabelWindow> {
        &self.windows[order]
    }

    /// Returns the indices of all orders.
    #[inline(always)]
    pub fn all_windows(&self) -> &[Vocabulary<LabelWindow>] {
        &self.windows
    }

    /// Number of windows of the given order, i.e. the weight row length of
    /// features of that order.
    #[inline(always)]
    pub fn num_windows(&self, order: usize) -> usize {
        self.windows[order].len()
    }

    /// Returns the ID of a window.
    pub fn window_index(&self, labels: &[u32]) -> Option<u32> {
        let order = labels.len().checked_sub(1)?;
        if order >= self.window_size || labels.iter().any(|&l| l as usize >= self.num_labels) {
            return None;
        }
        self.suffix_lookup[order][encode_labels(labels, self.num_labels)]
    }

    /// Returns the ID of the order-`order` window made of the last `order + 1`
    /// labels of a factor entry.
    #[inline(always)]
    pub fn suffix_window(&self, order: usize, entry: usize) -> Option<u32> {
        let table = &self.suffix_lookup[order];
        table[entry % table.len()]
    }

    /// Encodes labels, oldest first, as a factor-table index.
    #[inline(always)]
    pub fn encode(&self, labels: &[u32]) -> usize {
        encode_labels(labels, self.num_labels)
    }

    /// Decodes a factor-table index of `len` labels.
    #[inline(always)]
    pub fn decode(&self, code: usize, len: usize) -> Vec<u32> {
        decode_labels(code, len, self.num_labels)
    }
}

#[inline(always)]
pub(crate) fn encode_labels(labels: &[u32], num_labels: usize) -> usize {
    labels
        .iter()
        .fold(0, |acc, &l| acc * num_labels + l as usize)
}

pub(crate) fn decode_labels(mut code: usize, len: usize, num_labels: usize) -> Vec<u32> {
    let mut labels = vec![0; len];
    for l in labels.iter_mut().rev() {
        *l = (code % num_labels) as u32;
        code /= num_labels;
    }
    labels
}
