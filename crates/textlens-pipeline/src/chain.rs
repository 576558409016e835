//! Ordered filter chain with stable entry handles.
//!
//! Entries are addressed by [`FilterId`], not by position, so a UI that
//! remembers "the filter being configured" keeps pointing at the same
//! entry while others are added, removed or reordered. Ids come from a
//! per-chain counter and are never reused.

use serde::{Deserialize, Serialize};

use crate::cancel::Cancellation;
use crate::filter::{AppliedFilter, FilterId, FilterKind, FilterParams};
use crate::tile::TileExecutor;
use crate::types::{PipelineError, PixelBuffer};

/// Insertion-ordered list of filters; order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChain {
    entries: Vec<AppliedFilter>,
    next_id: u64,
}

impl FilterChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `kind` with its default strength and parameters.
    pub fn push(&mut self, kind: FilterKind) -> FilterId {
        let id = self.allocate_id();
        self.entries.push(AppliedFilter::from_defaults(id, kind));
        id
    }

    /// Append `kind` with an explicit strength and parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidStrength`] or
    /// [`PipelineError::InvalidConfig`] if the entry does not validate;
    /// the chain is unchanged and no id is consumed.
    pub fn push_with(
        &mut self,
        kind: FilterKind,
        strength: i32,
        params: FilterParams,
    ) -> Result<FilterId, PipelineError> {
        let id = FilterId::new(self.next_id);
        let entry = AppliedFilter::new(id, kind, strength, params)?;
        self.next_id += 1;
        self.entries.push(entry);
        Ok(id)
    }

    /// Remove an entry, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownFilter`] if `id` is not in the chain.
    pub fn remove(&mut self, id: FilterId) -> Result<AppliedFilter, PipelineError> {
        let index = self.index_of(id)?;
        Ok(self.entries.remove(index))
    }

    /// Change an entry's strength.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownFilter`] for an unknown id and
    /// [`PipelineError::InvalidStrength`] for an out-of-domain value.
    pub fn set_strength(&mut self, id: FilterId, strength: i32) -> Result<(), PipelineError> {
        self.entry_mut(id)?.set_strength(strength)
    }

    /// Change an entry's parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownFilter`] for an unknown id and
    /// [`PipelineError::InvalidConfig`] if `params` belong to another kind.
    pub fn set_params(&mut self, id: FilterId, params: FilterParams) -> Result<(), PipelineError> {
        self.entry_mut(id)?.set_params(params)
    }

    /// Move an entry to `index`, shifting the others.
    ///
    /// An index past the end moves the entry to the end.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownFilter`] if `id` is not in the chain.
    pub fn move_to(&mut self, id: FilterId, index: usize) -> Result<(), PipelineError> {
        let from = self.index_of(id)?;
        let entry = self.entries.remove(from);
        let to = index.min(self.entries.len());
        self.entries.insert(to, entry);
        Ok(())
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, id: FilterId) -> Option<&AppliedFilter> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Current position of an entry.
    #[must_use]
    pub fn position(&self, id: FilterId) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    /// Entries in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, AppliedFilter> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every entry in order, starting from `image`.
    ///
    /// `cancel` is checked before each step (and inside tiled filters).
    /// An empty chain returns a copy of the input.
    ///
    /// # Errors
    ///
    /// Returns the first error any step produces, including
    /// [`PipelineError::Cancelled`].
    pub fn apply<C>(
        &self,
        image: &PixelBuffer,
        executor: &TileExecutor,
        cancel: &C,
    ) -> Result<PixelBuffer, PipelineError>
    where
        C: Cancellation + ?Sized,
    {
        self.apply_observed(image, executor, cancel, |_, run| run())
    }

    /// Like [`apply`](Self::apply), but every step runs through
    /// `observe`, which receives the entry and a closure performing the
    /// step and returns that closure's result.
    pub(crate) fn apply_observed<C, F>(
        &self,
        image: &PixelBuffer,
        executor: &TileExecutor,
        cancel: &C,
        mut observe: F,
    ) -> Result<PixelBuffer, PipelineError>
    where
        C: Cancellation + ?Sized,
        F: FnMut(
            &AppliedFilter,
            &mut dyn FnMut() -> Result<PixelBuffer, PipelineError>,
        ) -> Result<PixelBuffer, PipelineError>,
    {
        let mut current = image.clone();
        for (step, entry) in self.entries.iter().enumerate() {
            cancel.checkpoint()?;
            tracing::debug!(
                step,
                id = %entry.id(),
                kind = %entry.kind(),
                strength = entry.strength(),
                "applying filter"
            );
            let mut run = || entry.apply(&current, executor, cancel);
            let next = observe(entry, &mut run)?;
            current = next;
        }
        Ok(current)
    }

    fn allocate_id(&mut self) -> FilterId {
        let id = FilterId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: FilterId) -> Result<usize, PipelineError> {
        self.position(id).ok_or(PipelineError::UnknownFilter(id))
    }

    fn entry_mut(&mut self, id: FilterId) -> Result<&mut AppliedFilter, PipelineError> {
        self.entries
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or(PipelineError::UnknownFilter(id))
    }
}

impl<'a> IntoIterator for &'a FilterChain {
    type Item = &'a AppliedFilter;
    type IntoIter = std::slice::Iter<'a, AppliedFilter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
