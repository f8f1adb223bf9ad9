use std::io;

use thiserror::Error;

/// Reasons a proxy server gives for refusing a request.
///
/// SOCKS5 reply codes are defined in RFC 1928 section 6, SOCKS4 reply codes
/// in the SOCKS4 protocol description. Command-not-supported (SOCKS5 code
/// `0x07`) and identd mismatch (SOCKS4 code `0x5D`) are reported through
/// their own [`SocksError`] variants instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Rejection {
    /// General SOCKS server failure, or a SOCKS4 "request rejected or failed".
    GeneralFailure,
    /// Connection not allowed by ruleset.
    ConnectionNotAllowed,
    /// Network unreachable.
    NetworkUnreachable,
    /// Host unreachable.
    HostUnreachable,
    /// Connection refused by the target.
    ConnectionRefused,
    /// TTL expired.
    TtlExpired,
    /// Address type not supported.
    AddressTypeNotSupported,
    /// The server could not reach the client's identd (SOCKS4).
    IdentdUnreachable,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GeneralFailure => write!(f, "general server failure"),
            Self::ConnectionNotAllowed => write!(f, "connection not allowed by ruleset"),
            Self::NetworkUnreachable => write!(f, "network unreachable"),
            Self::HostUnreachable => write!(f, "host unreachable"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::TtlExpired => write!(f, "TTL expired"),
            Self::AddressTypeNotSupported => write!(f, "address type not supported"),
            Self::IdentdUnreachable => write!(f, "identd not reachable"),
        }
    }
}

/// Errors produced by a SOCKS handshake.
///
/// Protocol errors come from malformed or refusing server replies, transport
/// errors from the underlying stream. Use [`SocksError::kind`] to classify.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SocksError {
    /// The server answered with a different SOCKS version.
    #[error("invalid SOCKS version: {0:#04x}")]
    InvalidVersion(u8),

    /// The server accepted none of the offered authentication methods.
    #[error("no acceptable authentication method")]
    NoAcceptableAuthMethod,

    /// The server answered with a different authentication sub-negotiation version.
    #[error("invalid authentication version: {0:#04x}")]
    InvalidAuthVersion(u8),

    /// The server rejected our credentials.
    #[error("login failed")]
    LoginFailed,

    /// The server does not support the requested command or authentication scheme.
    #[error("command not supported")]
    CommandNotSupported,

    /// The server refused the request.
    #[error("request rejected: {0}")]
    Rejected(Rejection),

    /// The server sent bytes that do not form a valid reply.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The wire buffer would have to grow beyond its maximum size.
    #[error("buffer of {requested} bytes exceeds maximum size of {max_size}")]
    AllocationFailure {
        /// Capacity the operation needed.
        requested: usize,
        /// Configured upper bound.
        max_size: usize,
    },

    /// The caller supplied arguments that cannot be encoded.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// The handshake was cancelled.
    #[error("handshake cancelled")]
    Cancelled,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of a [`SocksError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ErrorKind {
    InvalidVersion,
    NoAcceptableAuthMethod,
    InvalidAuthVersion,
    LoginFailed,
    CommandNotSupported,
    Rejected,
    ProtocolViolation,
    AllocationFailure,
    InvalidInput,
    Cancelled,
    IoFailure,
}

impl SocksError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidVersion(_) => ErrorKind::InvalidVersion,
            Self::NoAcceptableAuthMethod => ErrorKind::NoAcceptableAuthMethod,
            Self::InvalidAuthVersion(_) => ErrorKind::InvalidAuthVersion,
            Self::LoginFailed => ErrorKind::LoginFailed,
            Self::CommandNotSupported => ErrorKind::CommandNotSupported,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Self::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::IoFailure,
        }
    }

    /// Whether the error originates from the proxy server's replies.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidVersion
                | ErrorKind::NoAcceptableAuthMethod
                | ErrorKind::InvalidAuthVersion
                | ErrorKind::LoginFailed
                | ErrorKind::CommandNotSupported
                | ErrorKind::Rejected
                | ErrorKind::ProtocolViolation
        )
    }

    /// Whether the error originates from the stream or from cancellation.
    pub fn is_transport_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::IoFailure | ErrorKind::Cancelled)
    }
}

impl SocksError {
    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Io(e) => e.kind(),
            Self::NoAcceptableAuthMethod | Self::LoginFailed => io::ErrorKind::PermissionDenied,
            Self::Rejected(Rejection::ConnectionNotAllowed) => io::ErrorKind::PermissionDenied,
            Self::Rejected(Rejection::NetworkUnreachable) => io::ErrorKind::NetworkUnreachable,
            Self::Rejected(Rejection::HostUnreachable) => io::ErrorKind::HostUnreachable,
            Self::Rejected(Rejection::TtlExpired) => io::ErrorKind::TimedOut,
            Self::Rejected(_) => io::ErrorKind::ConnectionRefused,
            Self::CommandNotSupported => io::ErrorKind::Unsupported,
            Self::AllocationFailure { .. } => io::ErrorKind::OutOfMemory,
            Self::InvalidInput(_) => io::ErrorKind::InvalidInput,
            Self::Cancelled => io::ErrorKind::Interrupted,
            Self::InvalidVersion(_) | Self::InvalidAuthVersion(_) | Self::ProtocolViolation(_) => {
                io::ErrorKind::InvalidData
            }
        }
    }
}

impl From<SocksError> for io::Error {
    fn from(e: SocksError) -> Self {
        match e {
            SocksError::Io(inner) => inner,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}
