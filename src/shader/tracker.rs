/// Single-slot memo of the last UID seen by one execution context for one stage.
#[derive(Debug, Clone, Copy)]
pub struct UidChangeTracker<U> {
    last: Option<U>,
}

impl<U> Default for UidChangeTracker<U> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<U: PartialEq + Copy> UidChangeTracker<U> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `uid` differs from the memoized one. The first query always differs.
    #[inline]
    #[must_use]
    pub fn has_changed(&self, uid: &U) -> bool {
        self.last.as_ref() != Some(uid)
    }

    /// Stores `uid`, returning whether it differed from the previous value.
    #[inline]
    pub fn update(&mut self, uid: U) -> bool {
        let changed = self.has_changed(&uid);
        self.last = Some(uid);
        changed
    }

    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&U> {
        self.last.as_ref()
    }

    /// Forgets the memo so the next query reports a change.
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}
