use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    MissingFile,
    Corruption,
    Decode,
    OutOfRange,
    InvalidArgument,
    Cancelled,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn missing_file(path: &Path) -> Self {
        Error::new(
            ErrorKind::MissingFile,
            format!("file not found: {}", path.display()),
        )
    }

    pub fn corruption(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Corruption, context.into())
    }

    /// Exit code for CLIs wrapping this crate: 1 for usage/IO errors,
    /// 2 when index corruption was detected.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::Corruption | ErrorKind::Decode => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Corruption,
            context: format!("properties: {}", err),
        }
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error {
            kind: ErrorKind::Corruption,
            context: format!("FST error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
