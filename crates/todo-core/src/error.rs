//! Error taxonomy shared by the session store, the gateway and the
//! dashboard.

use thiserror::Error;

/// Failures surfaced by the todo client.
///
/// `Clone` so a failure can be parked inside a
/// [`RequestState`](crate::dashboard::RequestState) while the caller
/// still gets its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoError {
  /// The bearer token could not be split or decoded into a claim set.
  #[error("malformed token: {0}")]
  MalformedToken(String),

  /// The server answered with a non-2xx status.
  #[error("{message} (HTTP {status})")]
  RequestFailed {
    status:  u16,
    message: String
  },

  /// Input rejected before any network call.
  #[error("validation failed: {0}")]
  ValidationFailed(String),

  /// A command that needs a session ran without one.
  #[error("not logged in")]
  NotAuthenticated,

  /// The request never produced a response.
  #[error("transport error: {0}")]
  Transport(String),

  /// A 2xx body that is not the JSON we expected.
  #[error("unexpected response body: {0}")]
  Decode(String),

  /// The client key/value store failed.
  #[error("storage error: {0}")]
  Storage(String)
}

pub type TodoResult<T> = Result<T, TodoError>;

impl TodoError {
  /// Text suitable for a one-line user notice.
  pub fn user_message(&self) -> String {
    match self {
      | Self::RequestFailed {
        message,
        ..
      } => message.clone(),
      | other => other.to_string()
    }
  }
}

impl From<reqwest::Error> for TodoError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::Decode(err.to_string())
    } else {
      Self::Transport(err.to_string())
    }
  }
}
