//! Partial-update field marker

/// A field in a partial update: either left alone or replaced.
///
/// `Patch<Option<T>>` separates "don't touch" from "clear": `Unchanged`
/// keeps the stored value, `Set(None)` empties it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Unchanged => Patch::Unchanged,
            Patch::Set(value) => Patch::Set(value),
        }
    }

    /// The new value, or `current` when unchanged
    pub fn apply(self, current: T) -> T {
        match self {
            Patch::Unchanged => current,
            Patch::Set(value) => value,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Unchanged => None,
            Patch::Set(value) => Some(value),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `None` means "not provided", never "clear"
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Unchanged,
        }
    }
}
