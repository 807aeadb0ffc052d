use core::fmt;
use core::str::FromStr;

use bincode::{Decode, Encode};
use hashbrown::HashSet;

use crate::errors::CrfError;

/// Word-shape classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub enum WordShape {
    /// No shape features.
    None,
    /// Coarse classes such as `ALL-UPPER`.
    Dan1,
    /// Character classes with collapsed runs.
    Chris1,
    /// Character classes of the word edges plus the set of middle classes.
    Chris2,
    /// [`WordShape::Chris2`] marking known lower-case words.
    #[default]
    Chris2UseLc,
}

impl WordShape {
    /// Returns the identifier of the classifier.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Dan1 => "dan1",
            Self::Chris1 => "chris1",
            Self::Chris2 => "chris2",
            Self::Chris2UseLc => "chris2useLC",
        }
    }

    /// Computes the shape of a word.
    pub fn classify(self, word: &str, known_lc_words: &HashSet<String>) -> String {
        match self {
            Self::None => String::new(),
            Self::Dan1 => dan1(word).to_string(),
            Self::Chris1 => chris1(word),
            Self::Chris2 => chris2(word),
            Self::Chris2UseLc => {
                let mut shape = chris2(word);
                if known_lc_words.contains(&word.to_lowercase()) {
                    shape.push('k');
                }
                shape
            }
        }
    }
}

impl fmt::Display for WordShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WordShape {
    type Err = CrfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "dan1" => Ok(Self::Dan1),
            "chris1" => Ok(Self::Chris1),
            "chris2" => Ok(Self::Chris2),
            "chris2useLC" => Ok(Self::Chris2UseLc),
            _ => Err(CrfError::invalid_argument(
                "word_shape",
                format!("unknown word shape: {s}"),
            )),
        }
    }
}

#[inline(always)]
fn char_class(c: char) -> char {
    if c.is_uppercase() {
        'X'
    } else if c.is_lowercase() {
        'x'
    } else if c.is_numeric() {
        'd'
    } else {
        c
    }
}

fn dan1(word: &str) -> &'static str {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return "OTHER";
    };
    if word.chars().all(|c| c.is_ascii_digit()) {
        "ALL-DIGITS"
    } else if word.chars().all(char::is_uppercase) {
        "ALL-UPPER"
    } else if word.chars().all(char::is_lowercase) {
        "ALL-LOWER"
    } else if first.is_uppercase() && chars.all(char::is_lowercase) {
        "MIXED-CASE"
    } else {
        "OTHER"
    }
}

fn chris1(word: &str) -> String {
    let mut shape = String::with_capacity(word.len());
    let mut last = None;
    for c in word.chars().map(char_class) {
        if matches!(c, 'X' | 'x' | 'd') && last == Some(c) {
            continue;
        }
        shape.push(c);
        last = Some(c);
    }
    shape
}

fn chris2(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= 4 {
        return chars.into_iter().map(char_class).collect();
    }
    let n = chars.len();
    let mut middle: Vec<char> = chars[2..n - 2].iter().copied().map(char_class).collect();
    middle.sort_unstable();
    middle.dedup();

    let mut shape = String::with_capacity(4 + middle.len());
    shape.extend(chars[..2].iter().copied().map(char_class));
    shape.extend(middle);
    shape.extend(chars[n - 2..].iter().copied().map(char_class));
    shape
}
