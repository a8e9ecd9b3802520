use std::fmt;
use std::io;

use serde::{Serialize, Serializer};

/// Error codes understood by the hosted web application.
///
/// The numeric values are part of the wire protocol: the JS side compares
/// them against its own constant table, so they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    NoError = 0,
    Unknown = 1,
    InvalidParams = 2,
    NotFound = 3,
    CantRead = 4,
    UnsupportedEncoding = 5,
    CantWrite = 6,
    OutOfSpace = 7,
    NotFile = 8,
    NotDirectory = 9,
    FileExists = 10,
    BrowserNotInstalled = 11,
    PidNotFound = -9999,
}

/// `ENOSPC` on Linux and macOS.
#[cfg(unix)]
const ENOSPC: i32 = 28;

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::NoError
    }

    /// Map an io error raised while reading.
    pub fn from_read_error(err: &io::Error) -> Self {
        Self::from_io(err, ErrorCode::CantRead)
    }

    /// Map an io error raised while writing or mutating the file system.
    pub fn from_write_error(err: &io::Error) -> Self {
        Self::from_io(err, ErrorCode::CantWrite)
    }

    fn from_io(err: &io::Error, access_denied: ErrorCode) -> Self {
        #[cfg(unix)]
        if err.raw_os_error() == Some(ENOSPC) {
            return ErrorCode::OutOfSpace;
        }
        match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NotFound,
            io::ErrorKind::PermissionDenied => access_denied,
            io::ErrorKind::AlreadyExists => ErrorCode::FileExists,
            io::ErrorKind::InvalidData => ErrorCode::UnsupportedEncoding,
            io::ErrorKind::InvalidInput => ErrorCode::InvalidParams,
            _ => ErrorCode::Unknown,
        }
    }
}

impl From<io::Error> for ErrorCode {
    fn from(err: io::Error) -> Self {
        ErrorCode::from_io(&err, ErrorCode::Unknown)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::NoError => "no error",
            ErrorCode::Unknown => "unknown error",
            ErrorCode::InvalidParams => "invalid parameters",
            ErrorCode::NotFound => "not found",
            ErrorCode::CantRead => "cannot read",
            ErrorCode::UnsupportedEncoding => "unsupported encoding",
            ErrorCode::CantWrite => "cannot write",
            ErrorCode::OutOfSpace => "out of space",
            ErrorCode::NotFile => "not a file",
            ErrorCode::NotDirectory => "not a directory",
            ErrorCode::FileExists => "file exists",
            ErrorCode::BrowserNotInstalled => "browser not installed",
            ErrorCode::PidNotFound => "process not found",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

impl std::error::Error for ErrorCode {}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}
