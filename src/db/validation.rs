//! Validation combinators that turn a value plus a predicate into a [`Try`].
//!
//! Checks compose through [`combine`]: the first failure in argument order
//! wins and nothing is aggregated.

use serde_json::Value;

use super::error::DatabaseError;
use super::outcome::{self, Try};

/// Generic predicate check; `error` only runs when the check fails.
pub fn validate<T, P, E>(value: T, predicate: P, error: E) -> Try<T>
where
    P: FnOnce(&T) -> bool,
    E: FnOnce() -> DatabaseError,
{
    if predicate(&value) {
        Try::success(value)
    } else {
        Try::failure(error())
    }
}

pub fn require_non_null<T>(value: Option<T>, message: &str) -> Try<T> {
    match value {
        Some(value) => Try::success(value),
        None => Try::failure(DatabaseError::invalid_argument(message)),
    }
}

pub fn require_non_blank<S>(text: S, message: &str) -> Try<S>
where
    S: AsRef<str>,
{
    validate(
        text,
        |t| !t.as_ref().trim().is_empty(),
        || DatabaseError::invalid_argument(message),
    )
}

/// Rejects a document that serialized to JSON `null`.
pub fn require_document<'a>(document: &'a Value, message: &str) -> Try<&'a Value> {
    validate(document, |doc| !doc.is_null(), || {
        DatabaseError::invalid_argument(message)
    })
}

/// Build a reusable check from a predicate and an error factory.
pub fn validator<T, P, E>(predicate: P, error: E) -> impl Fn(T) -> Try<T>
where
    P: Fn(&T) -> bool,
    E: Fn() -> DatabaseError,
{
    move |value| validate(value, &predicate, &error)
}

pub fn combine<I>(validations: I) -> Try<()>
where
    I: IntoIterator<Item = Try<()>>,
{
    outcome::all_of(validations)
}

/// Same policy as [`combine`], but the values of a homogeneous set of
/// checks are kept.
pub fn combine_each<T, I>(validations: I) -> Try<Vec<T>>
where
    I: IntoIterator<Item = Try<T>>,
{
    outcome::all_of_same_type(validations)
}
