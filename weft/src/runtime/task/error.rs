use super::Id;

use std::any::Any;
use std::fmt;
use std::io;

/// The error returned by a [`JoinHandle`](crate::task::JoinHandle) when its
/// task did not produce a value.
#[derive(thiserror::Error)]
pub enum JoinError {
    /// The task was aborted before it completed.
    #[error("task {0} was cancelled")]
    Cancelled(Id),

    /// The task panicked while being polled.
    #[error("task {id} panicked: {}", panic_message(.payload))]
    Panic {
        id: Id,
        payload: Box<dyn Any + Send + 'static>,
    },
}

impl JoinError {
    pub(crate) fn cancelled(id: Id) -> Self {
        JoinError::Cancelled(id)
    }

    pub(crate) fn panic(id: Id, payload: Box<dyn Any + Send + 'static>) -> Self {
        JoinError::Panic { id, payload }
    }

    /// Returns `true` if the task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JoinError::Cancelled(_))
    }

    /// Returns `true` if the task panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, JoinError::Panic { .. })
    }

    /// Returns the id of the task this error belongs to.
    pub fn id(&self) -> Id {
        match self {
            JoinError::Cancelled(id) => *id,
            JoinError::Panic { id, .. } => *id,
        }
    }

    /// Consumes the error, returning the panic payload.
    ///
    /// # Panics
    ///
    /// Panics if the error is not a panic. See [`try_into_panic`](Self::try_into_panic).
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        self.try_into_panic()
            .expect("`JoinError` reason is not a panic.")
    }

    /// Consumes the error, returning the panic payload if the task panicked.
    pub fn try_into_panic(self) -> Result<Box<dyn Any + Send + 'static>, JoinError> {
        match self {
            JoinError::Panic { payload, .. } => Ok(payload),
            other => Err(other),
        }
    }
}

impl fmt::Debug for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Cancelled(id) => write!(f, "JoinError::Cancelled({id:?})"),
            JoinError::Panic { id, payload } => {
                write!(f, "JoinError::Panic({id:?}, {:?}, ...)", panic_message(payload))
            }
        }
    }
}

impl From<JoinError> for io::Error {
    fn from(src: JoinError) -> io::Error {
        io::Error::other(src.to_string())
    }
}

/// Best-effort extraction of the message carried by a panic payload.
pub(crate) fn panic_message<'a>(payload: &'a Box<dyn Any + Send + 'static>) -> &'a str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error() {
        let id = Id::next();
        let err = JoinError::cancelled(id);

        assert!(err.is_cancelled());
        assert!(!err.is_panic());
        assert_eq!(err.id(), id);
        assert_eq!(err.to_string(), format!("task {id} was cancelled"));
        assert!(err.try_into_panic().is_err());
    }

    #[test]
    fn test_panic_error_keeps_payload() {
        let id = Id::next();
        let err = JoinError::panic(id, Box::new("boom"));

        assert!(err.is_panic());
        assert_eq!(err.to_string(), format!("task {id} panicked: boom"));

        let payload = err.into_panic();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    }

    #[test]
    fn test_panic_message_formats() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7u32);

        assert_eq!(panic_message(&owned), "owned");
        assert_eq!(panic_message(&other), "<non-string panic payload>");
    }
}
