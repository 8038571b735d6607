//! Typed unique identifiers.
//!
//! Every id space in the graph (procs, pipes, published parameters, voices)
//! is a distinct zero-sized-tagged wrapper around a `usize` so that, for
//! example, a `ProcId` can never be confused with a `PipeId` at the type
//! level even though both are plain integers underneath.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use rand::{thread_rng, Rng};

pub struct UniqueId<T> {
    value: usize,
    phantom_data: PhantomData<T>,
}

// Implemented explicitly rather than derived: a derive would require `T: Trait`
// even though `T` only ever appears in `PhantomData`.

impl<T> Copy for UniqueId<T> {}

impl<T> Clone for UniqueId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Eq for UniqueId<T> {}

impl<T> PartialEq for UniqueId<T> {
    fn eq(&self, other: &UniqueId<T>) -> bool {
        self.value == other.value
    }
}

impl<T> Hash for UniqueId<T> {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        self.value.hash(hasher);
    }
}

impl<T> Debug for UniqueId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UniqueId").field(&self.value).finish()
    }
}

impl<T> UniqueId<T> {
    /// Generates a fresh id unlikely to collide with any other id ever
    /// generated in the process. Used for every id handed out during graph
    /// construction.
    pub fn new_unique() -> Self {
        Self {
            value: thread_rng().gen(),
            phantom_data: PhantomData,
        }
    }

    pub const fn from_raw(value: usize) -> Self {
        Self {
            value,
            phantom_data: PhantomData,
        }
    }

    pub fn raw(&self) -> usize {
        self.value
    }
}

pub struct ProcTag;
pub type ProcId = UniqueId<ProcTag>;

pub struct PipeTag;
pub type PipeId = UniqueId<PipeTag>;

pub struct PublishedParamTag;
pub type PublishedParamId = UniqueId<PublishedParamTag>;

pub struct VoiceTag;
pub type VoiceId = UniqueId<VoiceTag>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_ids_are_not_equal() {
        let a = ProcId::new_unique();
        let b = ProcId::new_unique();
        assert_ne!(a, b);
    }

    #[test]
    fn from_raw_round_trips() {
        let id = ProcId::from_raw(42);
        assert_eq!(id.raw(), 42);
    }
}
