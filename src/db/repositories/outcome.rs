//! Result shape for record-level operations
//!
//! Record operations never propagate errors. They log the failure and hand
//! back an [`Outcome`], which still tells success, absence and failure apart
//! for callers that look closely, and collapses to `Option`/`bool` for those
//! that do not.

use crate::error::DbError;

#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    Success(T),
    /// The record the operation required does not exist.
    NotFound,
    /// The call failed; the error has already been logged.
    Failed(DbError),
}

impl<T> Outcome<T> {
    /// Collapse to the value, treating absence and failure alike.
    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::NotFound | Outcome::Failed(_) => None,
        }
    }

    /// Collapse to a success flag.
    pub fn succeeded(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Outcome::NotFound)
    }

    pub fn error(&self) -> Option<&DbError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_to_sentinels() {
        assert_eq!(Outcome::Success(3).into_option(), Some(3));
        assert_eq!(Outcome::<i32>::NotFound.into_option(), None);
        assert_eq!(Outcome::<i32>::Failed(DbError::NoTable).into_option(), None);

        assert!(Outcome::Success(()).succeeded());
        assert!(!Outcome::<()>::NotFound.succeeded());
        assert!(!Outcome::<()>::Failed(DbError::NoTable).succeeded());
    }

    #[test]
    fn test_error_accessor() {
        let failed = Outcome::<()>::Failed(DbError::NoTable);
        assert_eq!(failed.error(), Some(&DbError::NoTable));
        assert!(Outcome::<()>::NotFound.error().is_none());
        assert!(Outcome::<()>::NotFound.is_not_found());
    }

    #[test]
    fn test_map_preserves_variant() {
        assert_eq!(Outcome::Success(2).map(|n| n * 2), Outcome::Success(4));
        assert_eq!(Outcome::<i32>::NotFound.map(|n| n * 2), Outcome::NotFound);
    }
}
