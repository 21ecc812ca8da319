//! Tri-state outcome of a script call.
//!
//! A call into the script can end three ways: it returned a value, it
//! returned nothing, or it failed. [`Outcome`] keeps those apart so that
//! "the hook returned nothing" never looks like "the hook raised".

use std::fmt;

use crate::error::Error;

/// Outcome of a task: a value, no value, or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E = Error> {
    /// Completed and produced a value.
    Success(T),
    /// Completed without a value (or never ran).
    Empty,
    /// Failed.
    Error(E),
}

impl<T, E> Outcome<T, E> {
    /// True unless this is an error.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    /// True only for [`Outcome::Success`].
    pub fn has_value(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// True only for [`Outcome::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// True only for [`Outcome::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Borrow the value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the error, if any.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Convert `&Outcome<T, E>` to `Outcome<&T, &E>`.
    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Self::Success(v) => Outcome::Success(v),
            Self::Empty => Outcome::Empty,
            Self::Error(e) => Outcome::Error(e),
        }
    }

    /// Transform the value. Empty and Error pass through without calling `f`.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U, E> {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::Empty => Outcome::Empty,
            Self::Error(e) => Outcome::Error(e),
        }
    }

    /// Transform the error.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Outcome<T, F> {
        match self {
            Self::Success(v) => Outcome::Success(v),
            Self::Empty => Outcome::Empty,
            Self::Error(e) => Outcome::Error(f(e)),
        }
    }

    /// Chain another outcome-producing step. Empty and Error pass through.
    pub fn flat_map<U>(self, f: impl FnOnce(T) -> Outcome<U, E>) -> Outcome<U, E> {
        match self {
            Self::Success(v) => f(v),
            Self::Empty => Outcome::Empty,
            Self::Error(e) => Outcome::Error(e),
        }
    }

    /// Keep `self` unless it is an error, in which case use `other`.
    pub fn or(self, other: Self) -> Self {
        if self.is_success() { self } else { other }
    }

    /// The value, or `default` for both Empty and Error.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Self::Success(v) => v,
            _ => default,
        }
    }

    /// The value, or `f()` for both Empty and Error.
    pub fn unwrap_or_else(self, f: impl FnOnce() -> T) -> T {
        match self {
            Self::Success(v) => v,
            _ => f(),
        }
    }

    /// Run `f` on the value if there is one.
    pub fn if_success(&self, f: impl FnOnce(&T)) {
        if let Self::Success(v) = self {
            f(v);
        }
    }

    /// Run `f` on the error if there is one.
    pub fn if_error(&self, f: impl FnOnce(&E)) {
        if let Self::Error(e) = self {
            f(e);
        }
    }

    /// Run `f` if there is neither value nor error.
    pub fn if_empty(&self, f: impl FnOnce()) {
        if self.is_empty() {
            f();
        }
    }

    /// Collapse into a standard `Result`, with Empty as `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>, E> {
        match self {
            Self::Success(v) => Ok(Some(v)),
            Self::Empty => Ok(None),
            Self::Error(e) => Err(e),
        }
    }
}

impl<T, E> Default for Outcome<T, E> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<T, E> From<Result<Option<T>, E>> for Outcome<T, E> {
    fn from(result: Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(v)) => Self::Success(v),
            Ok(None) => Self::Empty,
            Err(e) => Self::Error(e),
        }
    }
}

impl<T: fmt::Display, E: fmt::Display> fmt::Display for Outcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(v) => write!(f, "{}", v),
            Self::Empty => f.write_str("<empty>"),
            Self::Error(e) => write!(f, "error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Out = Outcome<i64, String>;

    #[test]
    fn test_exactly_one_state() {
        let s: Out = Outcome::Success(1);
        let e: Out = Outcome::Empty;
        let r: Out = Outcome::Error("x".into());

        assert!(s.has_value() && s.is_success() && !s.is_empty() && !s.is_error());
        assert!(!e.has_value() && e.is_success() && e.is_empty() && !e.is_error());
        assert!(!r.has_value() && !r.is_success() && !r.is_empty() && r.is_error());
    }

    #[test]
    fn test_map_skips_empty_and_error() {
        let mut called = 0;
        let e: Out = Outcome::Empty;
        assert_eq!(
            e.map(|v| {
                called += 1;
                v + 1
            }),
            Outcome::Empty
        );
        let r: Out = Outcome::Error("bad".into());
        assert_eq!(
            r.map(|v| {
                called += 1;
                v + 1
            }),
            Outcome::Error("bad".into())
        );
        assert_eq!(called, 0);

        let s: Out = Outcome::Success(2);
        assert_eq!(s.map(|v| v * 10), Outcome::Success(20));
    }

    #[test]
    fn test_flat_map() {
        let s: Out = Outcome::Success(2);
        assert_eq!(s.flat_map(|_| Outcome::<i64, String>::Empty), Outcome::Empty);

        let r: Out = Outcome::Error("bad".into());
        assert_eq!(
            r.flat_map(|v| Outcome::Success(v + 1)),
            Outcome::Error("bad".into())
        );
    }

    #[test]
    fn test_unwrap_or_variants() {
        assert_eq!(Out::Success(3).unwrap_or(0), 3);
        assert_eq!(Out::Empty.unwrap_or(7), 7);
        assert_eq!(Out::Error("x".into()).unwrap_or_else(|| 9), 9);
    }

    #[test]
    fn test_observers_fire_once_for_matching_state() {
        let mut hits = Vec::new();
        let s: Out = Outcome::Success(1);
        s.if_success(|v| hits.push(format!("ok {}", v)));
        s.if_error(|_| hits.push("err".into()));
        s.if_empty(|| hits.push("empty".into()));

        let e: Out = Outcome::Empty;
        e.if_empty(|| hits.push("empty".into()));
        e.if_success(|_| hits.push("ok".into()));

        assert_eq!(hits, vec!["ok 1".to_string(), "empty".to_string()]);
    }

    #[test]
    fn test_or_replaces_only_errors() {
        assert_eq!(Out::Empty.or(Out::Success(1)), Out::Empty);
        assert_eq!(Out::Error("x".into()).or(Out::Success(1)), Out::Success(1));
    }

    #[test]
    fn test_result_conversions() {
        assert_eq!(Out::from(Ok(Some(1))), Out::Success(1));
        assert_eq!(Out::from(Ok(None)), Out::Empty);
        assert_eq!(Out::Error("x".into()).into_result(), Err("x".to_string()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Out::Success(5).to_string(), "5");
        assert_eq!(Out::Empty.to_string(), "<empty>");
        assert_eq!(Out::Error("bad".into()).to_string(), "error: bad");
    }
}
