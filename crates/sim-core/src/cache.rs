//! Direct-mapped cache of raw instruction words to their decoded forms.

/// Number of cache slots. Prime, to spread aliasing across the index space.
pub const INST_CACHE_SIZE: usize = 8191;

/// Direct-mapped decode cache indexed by `raw_word % INST_CACHE_SIZE`.
///
/// There is no chaining: a miss always evicts the resident entry. Slots are
/// overwritten in place and live for the lifetime of the runloop. An empty
/// slot is represented explicitly, so a fetched word of zero can never alias
/// an untouched slot.
#[derive(Debug, Clone)]
pub struct InstructionCache<D> {
    slots: Box<[Option<(u32, D)>]>,
}

impl<D: Copy> InstructionCache<D> {
    /// Creates a cache with all slots empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; INST_CACHE_SIZE].into_boxed_slice(),
        }
    }

    /// Returns the decoded form for `word`, if the resident entry at its
    /// index was produced from exactly this word.
    #[must_use]
    pub fn lookup(&self, word: u32) -> Option<D> {
        match self.slots[Self::index(word)] {
            Some((resident, decoded)) if resident == word => Some(decoded),
            _ => None,
        }
    }

    /// Installs a decoded form, evicting whatever occupied the slot.
    pub fn insert(&mut self, word: u32, decoded: D) {
        self.slots[Self::index(word)] = Some((word, decoded));
    }

    /// Empties every slot.
    pub fn flush(&mut self) {
        self.slots.fill(None);
    }

    /// Returns the number of occupied slots.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn index(word: u32) -> usize {
        (word as usize) % INST_CACHE_SIZE
    }
}

impl<D: Copy> Default for InstructionCache<D> {
    fn default() -> Self {
        Self::new()
    }
}
