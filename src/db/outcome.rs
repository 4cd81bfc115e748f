//! `Try`: a success/failure container with monadic composition.
//!
//! Every combinator takes `self` and yields a new value, so a `Try` is never
//! mutated after construction. Failures always carry a [`DatabaseError`].

use super::error::{DatabaseError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a Try may hold a failure that should be handled"]
pub enum Try<T> {
    Success(T),
    Failure(DatabaseError),
}

impl<T> Try<T> {
    pub fn success(value: T) -> Self {
        Try::Success(value)
    }

    pub fn failure(error: DatabaseError) -> Self {
        Try::Failure(error)
    }

    /// Run `operation`, turning a returned error into `Failure`.
    ///
    /// Panics are programming errors and are not caught.
    pub fn capture<E, F>(operation: F) -> Self
    where
        E: Into<DatabaseError>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        match operation() {
            Ok(value) => Try::Success(value),
            Err(err) => Try::Failure(err.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Try::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn failure_ref(&self) -> Option<&DatabaseError> {
        match self {
            Try::Success(_) => None,
            Try::Failure(err) => Some(err),
        }
    }

    pub fn failure_or_else(self, default: DatabaseError) -> DatabaseError {
        match self {
            Try::Success(_) => default,
            Try::Failure(err) => err,
        }
    }

    pub fn map<U, F>(self, mapper: F) -> Try<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Try::Success(value) => Try::Success(mapper(value)),
            Try::Failure(err) => Try::Failure(err),
        }
    }

    /// Like [`Try::map`] for a fallible mapper; its error becomes the failure.
    pub fn try_map<U, E, F>(self, mapper: F) -> Try<U>
    where
        E: Into<DatabaseError>,
        F: FnOnce(T) -> std::result::Result<U, E>,
    {
        match self {
            Try::Success(value) => Try::capture(|| mapper(value)),
            Try::Failure(err) => Try::Failure(err),
        }
    }

    pub fn flat_map<U, F>(self, mapper: F) -> Try<U>
    where
        F: FnOnce(T) -> Try<U>,
    {
        match self {
            Try::Success(value) => mapper(value),
            Try::Failure(err) => Try::Failure(err),
        }
    }

    pub fn recover<F>(self, recovery: F) -> Try<T>
    where
        F: FnOnce(DatabaseError) -> T,
    {
        match self {
            Try::Success(value) => Try::Success(value),
            Try::Failure(err) => Try::Success(recovery(err)),
        }
    }

    pub fn recover_with<F>(self, recovery: F) -> Try<T>
    where
        F: FnOnce(DatabaseError) -> Try<T>,
    {
        match self {
            Try::Success(value) => Try::Success(value),
            Try::Failure(err) => recovery(err),
        }
    }

    /// Invoke exactly one of the two handlers with the held value or error.
    pub fn fold<R, S, F>(self, on_success: S, on_failure: F) -> R
    where
        S: FnOnce(T) -> R,
        F: FnOnce(DatabaseError) -> R,
    {
        match self {
            Try::Success(value) => on_success(value),
            Try::Failure(err) => on_failure(err),
        }
    }

    /// Run a follow-up step after success, keeping the original value.
    pub fn and_then_run<E, F>(self, step: F) -> Try<T>
    where
        E: Into<DatabaseError>,
        F: FnOnce() -> std::result::Result<(), E>,
    {
        self.flat_map(|value| Try::run(step).map(|()| value))
    }

    pub fn if_failure<F>(self, action: F) -> Try<T>
    where
        F: FnOnce(&DatabaseError),
    {
        if let Try::Failure(err) = &self {
            action(err);
        }
        self
    }

    pub fn or_else(self, default: T) -> T {
        match self {
            Try::Success(value) => value,
            Try::Failure(_) => default,
        }
    }

    /// Hand the held error back to the caller, ready for `?`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Try::Success(value) => Ok(value),
            Try::Failure(err) => Err(err),
        }
    }

    pub fn get_or_else_throw<F>(self, mapper: F) -> Result<T>
    where
        F: FnOnce(DatabaseError) -> DatabaseError,
    {
        self.into_result().map_err(mapper)
    }

    /// Discard the payload, keeping only the outcome.
    pub fn void(self) -> Try<()> {
        self.map(|_| ())
    }
}

impl Try<()> {
    pub fn run<E, F>(operation: F) -> Self
    where
        E: Into<DatabaseError>,
        F: FnOnce() -> std::result::Result<(), E>,
    {
        Try::capture(operation)
    }
}

impl<T> From<Result<T>> for Try<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Try::Success(value),
            Err(err) => Try::Failure(err),
        }
    }
}

impl<T> From<Try<T>> for Result<T> {
    fn from(outcome: Try<T>) -> Self {
        outcome.into_result()
    }
}

impl<T> FromIterator<Try<T>> for Try<Vec<T>> {
    fn from_iter<I: IntoIterator<Item = Try<T>>>(iter: I) -> Self {
        let mut values = Vec::new();
        for outcome in iter {
            match outcome {
                Try::Success(value) => values.push(value),
                Try::Failure(err) => return Try::Failure(err),
            }
        }
        Try::Success(values)
    }
}

/// Short-circuit AND: the first failure in iteration order, else `Success(())`.
pub fn all_of<I>(tries: I) -> Try<()>
where
    I: IntoIterator<Item = Try<()>>,
{
    tries
        .into_iter()
        .find(Try::is_failure)
        .unwrap_or(Try::Success(()))
}

/// Like [`all_of`], but collects every value in order on full success.
pub fn all_of_same_type<T, I>(tries: I) -> Try<Vec<T>>
where
    I: IntoIterator<Item = Try<T>>,
{
    tries.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn boom(msg: &str) -> DatabaseError {
        DatabaseError::Failed(msg.to_string())
    }

    #[test]
    fn test_variants_are_exclusive() {
        let outcomes = [
            Try::success(1),
            Try::failure(boom("x")),
            Try::capture(|| Ok::<_, DatabaseError>(2)),
            Try::capture(|| Err::<i32, _>(boom("y"))),
        ];
        for outcome in &outcomes {
            assert_ne!(outcome.is_success(), outcome.is_failure());
        }
    }

    #[test]
    fn test_capture_converts_errors() {
        let parsed: Try<u32> = Try::capture(|| serde_json::from_str::<u32>("oops"));
        assert!(matches!(parsed, Try::Failure(DatabaseError::Serialization(_))));
    }

    #[test]
    fn test_failure_map_never_invokes_mapper() {
        let called = Cell::new(false);
        let failed: Try<i32> = Try::failure(boom("e"));
        let mapped = failed.clone().map(|v| {
            called.set(true);
            v + 1
        });
        assert!(!called.get());
        assert_eq!(mapped, failed);
    }

    #[test]
    fn test_try_map_captures_mapper_error() {
        let mapped =
            Try::success("12x").try_map(|s| s.parse::<i32>().map_err(|e| boom(&e.to_string())));
        assert!(mapped.is_failure());
        assert_eq!(
            Try::success("12").try_map(|s| s.parse::<i32>().map_err(|_| boom("p"))),
            Try::success(12)
        );
    }

    #[test]
    fn test_flat_map_returns_mapper_result() {
        assert_eq!(Try::success(2).flat_map(|v| Try::success(v * 10)), Try::success(20));
        let failed: Try<i32> = Try::success(2).flat_map(|_| Try::failure(boom("inner")));
        assert_eq!(failed, Try::failure(boom("inner")));
        let untouched: Try<i32> = Try::<i32>::failure(boom("outer")).flat_map(|v| Try::success(v));
        assert_eq!(untouched, Try::failure(boom("outer")));
    }

    #[test]
    fn test_recover() {
        assert_eq!(Try::failure(boom("e")).recover(|_| 7), Try::success(7));
        assert_eq!(Try::success(1).recover(|_| 7), Try::success(1));
        assert_eq!(
            Try::<i32>::failure(boom("e"))
                .recover_with(|e| Try::failure(DatabaseError::completion(e))),
            Try::failure(DatabaseError::completion(boom("e")))
        );
    }

    #[test]
    fn test_fold_invokes_one_handler() {
        let out = Try::success(3).fold(|v| format!("ok {v}"), |e| format!("err {e}"));
        assert_eq!(out, "ok 3");
        let out =
            Try::<i32>::failure(boom("bad")).fold(|v| format!("ok {v}"), |e| format!("err {e}"));
        assert_eq!(out, "err Operation failed: bad");
    }

    #[test]
    fn test_or_else_and_into_result() {
        assert_eq!(Try::failure(boom("e")).or_else(5), 5);
        assert_eq!(Try::success(1).or_else(5), 1);
        assert_eq!(Try::<i32>::failure(boom("e")).into_result(), Err(boom("e")));
        assert_eq!(
            Try::<i32>::failure(boom("e")).get_or_else_throw(|_| DatabaseError::Shutdown),
            Err(DatabaseError::Shutdown)
        );
    }

    #[test]
    fn test_failure_accessors() {
        let ok = Try::success(1);
        let failed = Try::<i32>::failure(boom("e"));

        assert_eq!(ok.failure_ref(), None);
        assert_eq!(failed.failure_ref(), Some(&boom("e")));

        assert_eq!(ok.failure_or_else(DatabaseError::Shutdown), DatabaseError::Shutdown);
        assert_eq!(failed.failure_or_else(DatabaseError::Shutdown), boom("e"));
    }

    #[test]
    fn test_if_failure_runs_only_on_failure() {
        let seen = Cell::new(None);
        let ok = Try::success(9).if_failure(|e| seen.set(Some(e.clone())));
        assert_eq!(ok, Try::success(9));
        assert_eq!(seen.take(), None);

        let failed = Try::<i32>::failure(boom("e")).if_failure(|e| seen.set(Some(e.clone())));
        assert_eq!(failed, Try::failure(boom("e")));
        assert_eq!(seen.take(), Some(boom("e")));
    }

    #[test]
    fn test_and_then_run_keeps_value_or_fails() {
        assert_eq!(Try::success(4).and_then_run(|| Ok::<_, DatabaseError>(())), Try::success(4));
        assert_eq!(
            Try::success(4).and_then_run(|| Err(boom("close"))),
            Try::failure(boom("close"))
        );
    }

    #[test]
    fn test_all_of_first_failure_wins() {
        let result = all_of([
            Try::success(()),
            Try::success(()),
            Try::failure(boom("e1")),
            Try::failure(boom("e2")),
        ]);
        assert_eq!(result, Try::failure(boom("e1")));
        assert_eq!(all_of(Vec::new()), Try::success(()));
    }

    #[test]
    fn test_all_of_same_type() {
        assert_eq!(
            all_of_same_type([Try::success(1), Try::success(2), Try::success(3)]),
            Try::success(vec![1, 2, 3])
        );
        assert_eq!(
            all_of_same_type([Try::success(1), Try::failure(boom("a")), Try::failure(boom("b"))]),
            Try::failure(boom("a"))
        );
    }
}
