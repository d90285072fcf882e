//! Operation status: severity, error taxonomy, server error codes.

use thiserror::Error;

/// How bad it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// The operation succeeded.
    #[default]
    Ok,
    /// The operation failed but may be retried.
    Error,
    /// The operation failed and retrying is pointless.
    Fatal,
}

/// The kind of outcome, including the success sub-codes used when an
/// operation succeeds with a qualification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
pub enum ErrorKind {
    /// Plain success.
    #[default]
    #[error("success")]
    None,
    /// Success: a redirect returned as the answer.
    #[error("redirect returned as answer")]
    XrdRedirect,
    /// Success: an aggregated operation with per-child failures.
    #[error("partial result")]
    Partial,
    /// Invalid arguments.
    #[error("invalid arguments")]
    InvalidArgs,
    /// Host could not be resolved.
    #[error("invalid address")]
    InvalidAddr,
    /// The component has not been initialized.
    #[error("not initialized")]
    Uninitialized,
    /// A malformed message was produced or encountered.
    #[error("invalid message")]
    InvalidMessage,
    /// The server response does not match the request.
    #[error("invalid response")]
    InvalidResponse,
    /// A redirect pointed at an unparsable URL.
    #[error("invalid redirect URL")]
    InvalidRedirectUrl,
    /// The message is bound to a session that no longer exists.
    #[error("invalid session")]
    InvalidSession,
    /// The operation is not recognized.
    #[error("unknown command")]
    UnknownCommand,
    /// The operation is invalid in the current state.
    #[error("invalid operation")]
    InvalidOp,
    /// Another operation of this kind is already in progress.
    #[error("operation in progress")]
    InProgress,
    /// Too many consecutive redirects.
    #[error("redirect limit reached")]
    RedirectLimit,
    /// The server answered with an error; the server code is carried
    /// separately.
    #[error("server error response")]
    ErrorResponse,
    /// The connection could not be established.
    #[error("connection error")]
    ConnectionError,
    /// A socket-level failure.
    #[error("socket error")]
    SocketError,
    /// A socket operation timed out.
    #[error("socket timeout")]
    SocketTimeout,
    /// The peer closed the connection.
    #[error("socket disconnected")]
    SocketDisconnected,
    /// The operation outlived its expiration time.
    #[error("operation expired")]
    OperationExpired,
    /// Transient condition, try again.
    #[error("retry")]
    Retry,
    /// Handshake with the server failed.
    #[error("handshake failed")]
    HandshakeFailed,
    /// Login was rejected.
    #[error("login failed")]
    LoginFailed,
    /// Lost a race or an internal invariant; not the caller's fault.
    #[error("internal error")]
    Internal,
}

/// The typed outcome of an operation.
#[derive(Debug, Clone, Default)]
pub struct XRootDStatus {
    /// Severity of the outcome.
    pub severity: Severity,
    /// Kind of the outcome.
    pub kind: ErrorKind,
    /// Server error code for [`ErrorKind::ErrorResponse`], zero otherwise.
    pub errno: u32,
    /// Human-readable context.
    pub message: String,
}

impl XRootDStatus {
    /// Plain success.
    pub fn ok() -> Self {
        XRootDStatus::default()
    }

    /// Success with a qualification (`XrdRedirect`, `Partial`).
    pub fn ok_with(kind: ErrorKind) -> Self {
        XRootDStatus {
            severity: Severity::Ok,
            kind,
            errno: 0,
            message: String::new(),
        }
    }

    /// A recoverable error.
    pub fn error(kind: ErrorKind) -> Self {
        XRootDStatus {
            severity: Severity::Error,
            kind,
            errno: 0,
            message: String::new(),
        }
    }

    /// A fatal error.
    pub fn fatal(kind: ErrorKind) -> Self {
        XRootDStatus {
            severity: Severity::Fatal,
            kind,
            errno: 0,
            message: String::new(),
        }
    }

    /// A server error response with its code and text.
    pub fn server_error(errno: u32, message: impl Into<String>) -> Self {
        XRootDStatus {
            severity: Severity::Error,
            kind: ErrorKind::ErrorResponse,
            errno,
            message: message.into(),
        }
    }

    /// Attach context to the status.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Whether the operation succeeded.
    pub fn is_ok(&self) -> bool {
        self.severity == Severity::Ok
    }

    /// Whether the failure is fatal.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Escalate an error to fatal; success stays success.
    pub fn make_fatal(mut self) -> Self {
        if self.severity == Severity::Error {
            self.severity = Severity::Fatal;
        }
        self
    }
}

impl std::fmt::Display for XRootDStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Ok => match self.kind {
                ErrorKind::None => write!(f, "ok"),
                kind => write!(f, "ok ({kind})"),
            },
            Severity::Error | Severity::Fatal => {
                let tag = if self.is_fatal() { "fatal" } else { "error" };
                write!(f, "{tag}: {}", self.kind)?;
                if self.kind == ErrorKind::ErrorResponse {
                    write!(f, " [{}]", self.errno)?;
                }
                if !self.message.is_empty() {
                    write!(f, ": {}", self.message)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for XRootDStatus {}

/// Result alias used by the facades.
pub type XrdResult<T> = Result<T, XRootDStatus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities() {
        assert!(XRootDStatus::ok().is_ok());
        assert!(XRootDStatus::ok_with(ErrorKind::Partial).is_ok());
        assert!(!XRootDStatus::error(ErrorKind::SocketTimeout).is_ok());
        assert!(XRootDStatus::fatal(ErrorKind::RedirectLimit).is_fatal());
        assert!(!XRootDStatus::error(ErrorKind::SocketTimeout).is_fatal());
    }

    #[test]
    fn make_fatal_does_not_touch_success() {
        assert!(XRootDStatus::ok().make_fatal().is_ok());
        assert!(XRootDStatus::error(ErrorKind::SocketError)
            .make_fatal()
            .is_fatal());
    }

    #[test]
    fn display_carries_the_server_code() {
        let status = XRootDStatus::server_error(3011, "not found");
        let text = status.to_string();
        assert!(text.contains("3011"));
        assert!(text.contains("not found"));
    }
}
