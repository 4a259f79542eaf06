//! Closed two-state container for fallible results.
//!
//! [`Expected`] holds exactly one of a success value or an error value. Unlike
//! an optional there is no "absent" state: every failure carries an explicit
//! error payload. Reaching for the payload of the arm that is not held is a
//! programming error and panics, the same way dereferencing a dangling handle
//! would be fatal; callers that cannot rule it out check [`Expected::has_value`]
//! or [`Expected::has_error`] first.

/// Tagged wrapper marking a value as the error arm of an [`Expected`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Unexpected<E>(E);

impl<E> Unexpected<E> {
    /// Wraps `error`.
    pub const fn new(error: E) -> Self {
        Self(error)
    }

    /// Borrows the wrapped error.
    pub fn get(&self) -> &E {
        &self.0
    }

    /// Mutably borrows the wrapped error.
    pub fn get_mut(&mut self) -> &mut E {
        &mut self.0
    }

    /// Unwraps the error.
    pub fn into_inner(self) -> E {
        self.0
    }
}

/// Shorthand for [`Unexpected::new`].
pub fn unexpected<E>(error: E) -> Unexpected<E> {
    Unexpected::new(error)
}

/// Either a success value of type `T` or an error value of type `E`.
///
/// `Expected<(), E>` is the valueless form: only the error arm carries data and
/// [`Default`] builds the success state.
#[must_use]
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Expected<T, E> {
    /// Success payload.
    Value(T),
    /// Error payload.
    Error(E),
}

impl<T, E> Expected<T, E> {
    /// Builds a success container.
    pub const fn new(value: T) -> Self {
        Expected::Value(value)
    }

    /// Same as [`Expected::new`].
    pub const fn from_value(value: T) -> Self {
        Expected::Value(value)
    }

    /// Builds an error container.
    pub const fn from_error(error: E) -> Self {
        Expected::Error(error)
    }

    /// Returns `true` when the container holds a value.
    pub const fn has_value(&self) -> bool {
        matches!(self, Expected::Value(_))
    }

    /// Returns `true` when the container holds an error.
    pub const fn has_error(&self) -> bool {
        matches!(self, Expected::Error(_))
    }

    /// Borrows the success payload.
    ///
    /// # Panics
    /// Panics if the container holds an error.
    #[track_caller]
    pub fn value(&self) -> &T {
        match self {
            Expected::Value(value) => value,
            Expected::Error(_) => misuse("value", "an error"),
        }
    }

    /// Mutably borrows the success payload.
    ///
    /// # Panics
    /// Panics if the container holds an error.
    #[track_caller]
    pub fn value_mut(&mut self) -> &mut T {
        match self {
            Expected::Value(value) => value,
            Expected::Error(_) => misuse("value_mut", "an error"),
        }
    }

    /// Borrows the error payload.
    ///
    /// # Panics
    /// Panics if the container holds a value.
    #[track_caller]
    pub fn error(&self) -> &E {
        match self {
            Expected::Error(error) => error,
            Expected::Value(_) => misuse("error", "a value"),
        }
    }

    /// Mutably borrows the error payload.
    ///
    /// # Panics
    /// Panics if the container holds a value.
    #[track_caller]
    pub fn error_mut(&mut self) -> &mut E {
        match self {
            Expected::Error(error) => error,
            Expected::Value(_) => misuse("error_mut", "a value"),
        }
    }

    /// Moves the success payload out.
    ///
    /// # Panics
    /// Panics if the container holds an error.
    #[track_caller]
    pub fn into_value(self) -> T {
        match self {
            Expected::Value(value) => value,
            Expected::Error(_) => misuse("into_value", "an error"),
        }
    }

    /// Moves the error payload out.
    ///
    /// # Panics
    /// Panics if the container holds a value.
    #[track_caller]
    pub fn into_error(self) -> E {
        match self {
            Expected::Error(error) => error,
            Expected::Value(_) => misuse("into_error", "a value"),
        }
    }

    /// Returns the value, or `default` when holding an error.
    pub fn value_or(self, default: T) -> T {
        match self {
            Expected::Value(value) => value,
            Expected::Error(_) => default,
        }
    }

    /// Borrows both arms.
    pub fn as_ref(&self) -> Expected<&T, &E> {
        match self {
            Expected::Value(value) => Expected::Value(value),
            Expected::Error(error) => Expected::Error(error),
        }
    }

    /// Maps the success payload, leaving an error untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Expected<U, E> {
        match self {
            Expected::Value(value) => Expected::Value(f(value)),
            Expected::Error(error) => Expected::Error(error),
        }
    }

    /// Maps the error payload, leaving a value untouched.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Expected<T, F> {
        match self {
            Expected::Value(value) => Expected::Value(value),
            Expected::Error(error) => Expected::Error(f(error)),
        }
    }

    /// Converts into a [`Result`] so `?` can be used on it.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Expected::Value(value) => Ok(value),
            Expected::Error(error) => Err(error),
        }
    }
}

impl<E> Default for Expected<(), E> {
    fn default() -> Self {
        Expected::Value(())
    }
}

impl<T: Clone, E: Clone> Clone for Expected<T, E> {
    fn clone(&self) -> Self {
        match self {
            Expected::Value(value) => Expected::Value(value.clone()),
            Expected::Error(error) => Expected::Error(error.clone()),
        }
    }

    /// Assigns in place when both sides hold the same arm; otherwise the held
    /// payload is dropped and replaced by a clone of the other arm.
    fn clone_from(&mut self, source: &Self) {
        match (self, source) {
            (Expected::Value(dst), Expected::Value(src)) => dst.clone_from(src),
            (Expected::Error(dst), Expected::Error(src)) => dst.clone_from(src),
            (this, source) => *this = source.clone(),
        }
    }
}

impl<T: Copy, E: Copy> Copy for Expected<T, E> {}

impl<T, E> From<Unexpected<E>> for Expected<T, E> {
    fn from(error: Unexpected<E>) -> Self {
        Expected::Error(error.into_inner())
    }
}

impl<T, E> From<Result<T, E>> for Expected<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Expected::Value(value),
            Err(error) => Expected::Error(error),
        }
    }
}

impl<T, E> From<Expected<T, E>> for Result<T, E> {
    fn from(expected: Expected<T, E>) -> Self {
        expected.into_result()
    }
}

#[cold]
#[track_caller]
fn misuse(accessor: &str, held: &str) -> ! {
    panic!("called `Expected::{accessor}()` on a container holding {held}")
}
