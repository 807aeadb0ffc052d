use hashbrown::HashMap;

/// Boundary value returned for every string attribute outside the sequence.
pub const PAD: &str = "<PAD>";

/// A token with its annotations.
///
/// Only [`Token::answer`] is written by the labeler; every other attribute is
/// read-only input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Token {
    /// Surface form.
    pub word: String,

    /// Part-of-speech tag.
    pub tag: Option<String>,

    /// Externally supplied word shape.
    pub shape: Option<String>,

    /// Chunk tag.
    pub chunk: Option<String>,

    /// Lemma.
    pub lemma: Option<String>,

    /// Gold label.
    pub label: Option<String>,

    /// Predicted label.
    pub answer: Option<String>,

    /// Other attributes.
    pub attributes: HashMap<String, String>,
}

impl Token {
    /// Creates a token with only a surface form.
    pub fn new<S>(word: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            word: word.into(),
            ..Self::default()
        }
    }

    /// Sets the gold label.
    #[must_use]
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the part-of-speech tag.
    #[must_use]
    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the word shape.
    #[must_use]
    pub fn with_shape<S: Into<String>>(mut self, shape: S) -> Self {
        self.shape = Some(shape.into());
        self
    }

    /// Sets the chunk tag.
    #[must_use]
    pub fn with_chunk<S: Into<String>>(mut self, chunk: S) -> Self {
        self.chunk = Some(chunk.into());
        self
    }

    /// Sets the lemma.
    #[must_use]
    pub fn with_lemma<S: Into<String>>(mut self, lemma: S) -> Self {
        self.lemma = Some(lemma.into());
        self
    }

    /// Sets an extra attribute.
    #[must_use]
    pub fn with_attribute<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Read-only view over a sentence that answers [`PAD`] outside its bounds.
#[derive(Clone, Copy, Debug)]
pub struct PaddedView<'a> {
    tokens: &'a [Token],
}

impl<'a> PaddedView<'a> {
    /// Wraps a sentence.
    #[inline(always)]
    pub const fn new(tokens: &'a [Token]) -> Self {
        Self { tokens }
    }

    /// Number of real tokens.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if the sentence is empty.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the underlying tokens.
    #[inline(always)]
    pub const fn tokens(&self) -> &'a [Token] {
        self.tokens
    }

    /// Returns the token at `pos`, if any.
    #[inline(always)]
    pub fn token(&self, pos: isize) -> Option<&'a Token> {
        usize::try_from(pos).ok().and_then(|p| self.tokens.get(p))
    }

    /// Returns `true` if `pos` is outside the sentence.
    #[inline(always)]
    pub fn is_pad(&self, pos: isize) -> bool {
        self.token(pos).is_none()
    }

    #[inline(always)]
    fn field(&self, pos: isize, f: impl FnOnce(&'a Token) -> Option<&'a str>) -> &'a str {
        match self.token(pos) {
            Some(token) => f(token).unwrap_or(""),
            None => PAD,
        }
    }

    /// Surface form.
    #[inline(always)]
    pub fn word(&self, pos: isize) -> &'a str {
        self.field(pos, |t| Some(t.word.as_str()))
    }

    /// Part-of-speech tag.
    #[inline(always)]
    pub fn tag(&self, pos: isize) -> &'a str {
        self.field(pos, |t| t.tag.as_deref())
    }

    /// Externally supplied shape, or `None` for real tokens without one.
    #[inline(always)]
    pub fn shape(&self, pos: isize) -> Option<&'a str> {
        match self.token(pos) {
            Some(token) => token.shape.as_deref(),
            None => Some(PAD),
        }
    }

    /// Chunk tag.
    #[inline(always)]
    pub fn chunk(&self, pos: isize) -> &'a str {
        self.field(pos, |t| t.chunk.as_deref())
    }

    /// Lemma.
    #[inline(always)]
    pub fn lemma(&self, pos: isize) -> &'a str {
        self.field(pos, |t| t.lemma.as_deref())
    }

    /// Extra attribute.
    #[inline(always)]
    pub fn attribute(&self, pos: isize, key: &str) -> &'a str {
        self.field(pos, |t| t.attributes.get(key).map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_view() {
        let tokens = vec![
            Token::new("Obama").with_tag("NNP").with_label("PERS"),
            Token::new("visited").with_attribute("gloss", "go"),
        ];
        let view = PaddedView::new(&tokens);
        assert_eq!(2, view.len());
        assert_eq!(PAD, view.word(-1));
        assert_eq!(PAD, view.word(2));
        assert_eq!(PAD, view.tag(-3));
        assert_eq!("Obama", view.word(0));
        assert_eq!("NNP", view.tag(0));
        assert_eq!("", view.tag(1));
        assert_eq!("go", view.attribute(1, "gloss"));
        assert_eq!("", view.attribute(0, "gloss"));
        assert_eq!(None, view.shape(0));
        assert_eq!(Some(PAD), view.shape(5));
        assert!(view.is_pad(-1));
        assert!(!view.is_pad(1));
    }
}
