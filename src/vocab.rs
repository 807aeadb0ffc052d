use core::hash::Hash;

use bincode::{
    de::Decoder,
    enc::Encoder,
    error::{DecodeError, EncodeError},
    Decode, Encode,
};
use hashbrown::HashMap;

/// Bidirectional mapping between items and dense integer IDs.
///
/// IDs are assigned in insertion order starting from 0. Once the vocabulary is
/// locked, [`Vocabulary::add`] no longer assigns new IDs, so inference never
/// grows it. Removing an item leaves a hole: its ID is not reused.
#[derive(Clone, Debug)]
pub struct Vocabulary<T> {
    items: Vec<Option<T>>,
    ids: HashMap<T, u32>,
    locked: bool,
}

impl<T> Default for Vocabulary<T> {
    fn default() -> Self {
        Self {
            items: vec![],
            ids: HashMap::new(),
            locked: false,
        }
    }
}

impl<T> Vocabulary<T>
where
    T: Clone + Eq + Hash,
{
    /// Creates a new, unlocked vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item and returns its ID.
    ///
    /// Returns the existing ID if the item is already present, and `None` if
    /// the item is absent and the vocabulary is locked.
    pub fn add(&mut self, item: T) -> Option<u32> {
        if let Some(&id) = self.ids.get(&item) {
            return Some(id);
        }
        if self.locked {
            return None;
        }
        let id = u32::try_from(self.items.len()).ok()?;
        self.items.push(Some(item.clone()));
        self.ids.insert(item, id);
        Some(id)
    }

    /// Returns the item of the given ID.
    #[inline(always)]
    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.get(usize::try_from(id).ok()?)?.as_ref()
    }

    /// Returns the ID of the given item.
    #[inline(always)]
    pub fn index_of(&self, item: &T) -> Option<u32> {
        self.ids.get(item).copied()
    }

    /// Returns `true` if the item has an ID.
    #[inline(always)]
    pub fn contains(&self, item: &T) -> bool {
        self.ids.contains_key(item)
    }

    /// Removes an item. Its ID becomes a hole and is never reassigned.
    pub fn remove(&mut self, item: &T) -> Option<u32> {
        let id = self.ids.remove(item)?;
        self.items[id as usize] = None;
        Some(id)
    }

    /// Number of IDs handed out so far, holes included.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no ID has been assigned.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Freezes the mapping.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Allows new items again.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Returns `true` if the vocabulary is frozen.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Iterates over `(id, item)` pairs in ID order, skipping holes.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_ref().map(|item| (i as u32, item)))
    }
}

impl<T> FromIterator<T> for Vocabulary<T>
where
    T: Clone + Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut vocab = Self::new();
        for item in iter {
            vocab.add(item);
        }
        vocab
    }
}

impl<T> Encode for Vocabulary<T>
where
    T: Encode,
{
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        Encode::encode(&self.items, encoder)?;
        Encode::encode(&self.locked, encoder)?;
        Ok(())
    }
}

impl<Context, T> Decode<Context> for Vocabulary<T>
where
    T: Decode<Context> + Clone + Eq + Hash,
{
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let items: Vec<Option<T>> = Decode::decode(decoder)?;
        let locked = Decode::decode(decoder)?;
        let mut ids = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if let Some(item) = item {
                let id = u32::try_from(i)
                    .map_err(|_| DecodeError::Other("vocabulary too large"))?;
                if ids.insert(item.clone(), id).is_some() {
                    return Err(DecodeError::Other("duplicated vocabulary item"));
                }
            }
        }
        Ok(Self { items, ids, locked })
    }
}
