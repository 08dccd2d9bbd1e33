//! File I/O error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FileResult<T> = Result<T, FileError>;

impl From<hound::Error> for FileError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => FileError::Io(e),
            hound::Error::FormatError(msg) => FileError::InvalidData(msg.to_string()),
            hound::Error::Unsupported => {
                FileError::UnsupportedFormat("unsupported WAV encoding".to_string())
            }
            other => FileError::InvalidData(other.to_string()),
        }
    }
}
