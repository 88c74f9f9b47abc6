//! Error wrapping, source-chain inspection, and aggregation.
//!
//! [`wrap`] annotates an error with context while keeping the original
//! reachable through [`Error::source`], [`chain`] walks that chain, and
//! [`List`] folds several independent failures into one reportable error.

use std::error::Error;
use std::fmt;
use std::io;

/// Boxed error that can cross threads.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// An error annotated with a contextual message.
///
/// Displays as `message: source`; the original error stays reachable via
/// [`Error::source`], so chain queries like [`is_eof`] see through any
/// number of wrapping layers.
#[derive(Debug, thiserror::Error)]
#[error("{msg}: {source}")]
pub struct Wrap {
    msg: String,
    source: BoxError,
}

impl Wrap {
    /// The annotation message, without the wrapped error.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.msg
    }
}

/// Wraps `err` with a contextual message.
pub fn wrap(err: impl Into<BoxError>, msg: impl Into<String>) -> Wrap {
    Wrap {
        msg: msg.into(),
        source: err.into(),
    }
}

/// Adds contextual wrapping to any `Result` with a boxable error.
pub trait ResultExt<T> {
    /// Wraps the error side with `msg`.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped in a [`Wrap`].
    fn wrap_err(self, msg: impl Into<String>) -> Result<T, Wrap>;
}

impl<T, E: Into<BoxError>> ResultExt<T> for Result<T, E> {
    fn wrap_err(self, msg: impl Into<String>) -> Result<T, Wrap> {
        self.map_err(|err| wrap(err, msg))
    }
}

/// Iterates `err` and its transitive sources, outermost first.
pub fn chain<'a>(err: &'a (dyn Error + 'static)) -> Chain<'a> {
    Chain { next: Some(err) }
}

/// Iterator over an error's source chain. See [`chain`].
pub struct Chain<'a> {
    next: Option<&'a (dyn Error + 'static)>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a (dyn Error + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source();
        Some(current)
    }
}

/// True if any link in `err`'s source chain is a `T`.
#[must_use]
pub fn is_in_chain<T: Error + 'static>(err: &(dyn Error + 'static)) -> bool {
    chain(err).any(|link| link.is::<T>())
}

/// True if `err` is ultimately an end-of-stream condition: some link in its
/// chain is an I/O error of kind [`io::ErrorKind::UnexpectedEof`].
#[must_use]
pub fn is_eof(err: &(dyn Error + 'static)) -> bool {
    chain(err).any(|link| {
        link.downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::UnexpectedEof)
    })
}

/// Aggregates multiple independent errors into one reportable error.
///
/// Displays as `` [ `first`, `second` ] ``.
#[derive(Debug, Default)]
pub struct List {
    errors: Vec<BoxError>,
}

impl List {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records another error.
    pub fn push(&mut self, err: impl Into<BoxError>) {
        self.errors.push(err.into());
    }

    /// True when no error has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of recorded errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok(())` when empty, otherwise the list itself.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one error was recorded.
    pub fn into_result(self) -> Result<(), List> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ ")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "`{err}`")?;
        }
        write!(f, " ]")
    }
}

impl Error for List {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("root cause")]
    struct RootCause;

    #[test]
    fn wrap_formats_message_then_source() {
        let err = wrap(RootCause, "reading header");
        assert_eq!(err.to_string(), "reading header: root cause");
        assert_eq!(err.message(), "reading header");
    }

    #[test]
    fn chain_walks_every_layer() {
        let err = wrap(wrap(RootCause, "inner"), "outer");
        let layers: Vec<String> = chain(&err).map(|e| e.to_string()).collect();
        assert_eq!(
            layers,
            ["outer: inner: root cause", "inner: root cause", "root cause"]
        );
    }

    #[test]
    fn is_in_chain_sees_through_wrapping() {
        let err = wrap(wrap(RootCause, "inner"), "outer");
        assert!(is_in_chain::<RootCause>(&err));
        assert!(is_in_chain::<Wrap>(&err));
        assert!(!is_in_chain::<io::Error>(&err));
    }

    #[test]
    fn result_ext_wraps_the_error_side() {
        let result: Result<(), RootCause> = Err(RootCause);
        let err = result.wrap_err("during setup").unwrap_err();
        assert_eq!(err.to_string(), "during setup: root cause");

        let ok: Result<u32, RootCause> = Ok(7);
        assert_eq!(ok.wrap_err("unused").unwrap(), 7);
    }

    #[test]
    fn eof_is_detected_through_layers() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
        let err = wrap(wrap(eof, "decoding frame"), "loading snapshot");
        assert!(is_eof(&err));
    }

    #[test]
    fn other_io_errors_are_not_eof() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(!is_eof(&wrap(denied, "opening state dir")));
        assert!(!is_eof(&RootCause));
    }

    #[test]
    fn list_aggregates_and_formats() {
        let mut list = List::new();
        assert!(list.is_empty());

        list.push(RootCause);
        list.push(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert_eq!(list.len(), 2);
        assert_eq!(list.to_string(), "[ `root cause`, `missing` ]");
    }

    #[test]
    fn into_result_distinguishes_empty() {
        assert!(List::new().into_result().is_ok());

        let mut list = List::new();
        list.push(RootCause);
        assert!(list.into_result().is_err());
    }
}
