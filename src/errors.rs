//! All possible errors.

use std::io;
use std::string;
use std::sync::{MutexGuard, PoisonError};

use cfb8::cipher::errors::InvalidLength;
use nbt::Error as nbt_error;
use openssl::error::ErrorStack;
use serde_json::Error as serde_error;

#[derive(Debug)]
pub struct InvalidValue {
    pub expected: String,
}

impl std::error::Error for InvalidValue {}

impl std::fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid value received. Expected: {}", self.expected)
    }
}

/// One of the auth-credential failure kinds enumerated by the Microsoft/
/// Xbox/Minecraft login chain. These are user-facing, not bugs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    WrongPassword,
    InteractiveChallengeRequired,
    ChildAccount,
    NoXboxProfile,
    NotPremium,
    RefreshExpired,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::WrongPassword => "incorrect username or password",
            Self::InteractiveChallengeRequired => {
                "account requires an interactive sign-in (2FA/CAPTCHA)"
            }
            Self::ChildAccount => "account is a child account without an org",
            Self::NoXboxProfile => "Microsoft account has no Xbox profile",
            Self::NotPremium => "account does not own Minecraft",
            Self::RefreshExpired => "cached session expired and refresh failed",
        };
        write!(f, "{}", msg)
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    FromUtf8Error(string::FromUtf8Error),
    Serde(serde_error),
    Nbt(nbt_error),
    SSLErrorStack(ErrorStack),
    InvalidKeyLen(InvalidLength),
    InvalidValue(InvalidValue),
    /// A peer violated the wire protocol (VarInt overrun, bad length, bad
    /// action code). Fatal for the stream it came from.
    WireMalformed(String),
    /// An HTTP request to Mojang/Microsoft failed at the transport level.
    Http(String),
    /// An HTTP request to Mojang/Microsoft returned a well-formed error.
    Auth(AuthErrorKind),
    /// The requested peer/session/cache entry does not exist.
    NotFound(String),
    /// The remote end sent `Disconnect`/`PlayDisconnect` instead of
    /// completing the handshake we were driving.
    Disconnected(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {}", e),
            Self::FromUtf8Error(e) => write!(f, "invalid utf8: {}", e),
            Self::Serde(e) => write!(f, "serialization error: {}", e),
            Self::Nbt(e) => write!(f, "nbt error: {}", e),
            Self::SSLErrorStack(e) => write!(f, "openssl error: {}", e),
            Self::InvalidKeyLen(e) => write!(f, "invalid key length: {}", e),
            Self::InvalidValue(e) => write!(f, "{}", e),
            Self::WireMalformed(s) => write!(f, "malformed packet: {}", s),
            Self::Http(s) => write!(f, "http transport error: {}", s),
            Self::Auth(k) => write!(f, "authentication error: {}", k),
            Self::NotFound(s) => write!(f, "not found: {}", s),
            Self::Disconnected(s) => write!(f, "disconnected: {}", s),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(item: io::Error) -> Self {
        Self::Io(item)
    }
}

impl From<string::FromUtf8Error> for Error {
    fn from(item: string::FromUtf8Error) -> Self {
        Self::FromUtf8Error(item)
    }
}

impl From<serde_error> for Error {
    fn from(item: serde_error) -> Self {
        Self::Serde(item)
    }
}

impl From<nbt_error> for Error {
    fn from(item: nbt_error) -> Self {
        Self::Nbt(item)
    }
}

impl From<ErrorStack> for Error {
    fn from(item: ErrorStack) -> Self {
        Self::SSLErrorStack(item)
    }
}

impl From<InvalidLength> for Error {
    fn from(item: InvalidLength) -> Self {
        Self::InvalidKeyLen(item)
    }
}

impl From<InvalidValue> for Error {
    fn from(item: InvalidValue) -> Self {
        Self::InvalidValue(item)
    }
}

impl From<ureq::Error> for Error {
    fn from(item: ureq::Error) -> Self {
        match item {
            ureq::Error::Status(code, resp) => Self::Http(format!(
                "[{}] {}",
                code,
                resp.into_string().unwrap_or_default()
            )),
            ureq::Error::Transport(t) => Self::Http(t.to_string()),
        }
    }
}

/// Error while reading/writing from a connection.
#[derive(Debug)]
pub enum ConnectionError<'a, T> {
    LockError(PoisonError<MutexGuard<'a, T>>),
    Error(Error),
}

impl<'a, T> From<PoisonError<MutexGuard<'a, T>>> for ConnectionError<'a, T> {
    fn from(item: PoisonError<MutexGuard<'a, T>>) -> Self {
        Self::LockError(item)
    }
}

impl<'a, T> From<Error> for ConnectionError<'a, T> {
    fn from(item: Error) -> Self {
        Self::Error(item)
    }
}

pub type TetsuResult<T> = Result<T, Error>;
