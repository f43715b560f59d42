use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Corrupt(&'static str),
    Unsupported(&'static str),
    UnsupportedVersion(u32),
    InvalidConfig(String),
    /// The caller has no valid session; nothing was emitted.
    Unauthenticated,
    /// The downstream transport went away; output was abandoned.
    SinkClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Error::UnsupportedVersion(version) => write!(f, "unsupported version: {version}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::Unauthenticated => write!(f, "not logged in"),
            Error::SinkClosed => write!(f, "output stream closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::InvalidConfig(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
