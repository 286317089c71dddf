use std::fmt::Display;

use thiserror::Error;

use crate::asset::PathId;
use crate::compression::Compression;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid bundle signature {0:?}, expected `UnityFS`")]
    InvalidSignature(String),
    #[error("Unknown compression kind {0}")]
    UnknownCompression(u32),
    #[error("Unsupported compression {0:?}")]
    UnsupportedCompression(Compression),
    #[error("Failed to decompress {kind:?} data: {message}")]
    Decompress { kind: Compression, message: String },
    #[error("Decompressed {actual} bytes, expected {expected}")]
    DecompressionShortfall { expected: u64, actual: u64 },
    #[error("Read {actual} bytes for '{type_name}', but its schema declares {expected}")]
    UndersizedRead {
        type_name: String,
        expected: u64,
        actual: u64,
    },
    #[error("Malformed data: {0}")]
    Format(String),
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Duplicate object {path_id} in '{asset}'")]
    DuplicateObject { asset: String, path_id: PathId },
    #[error("Asset '{0}' is still being loaded")]
    NotLoaded(String),
    #[error("Asset '{0}' failed to load previously")]
    LoadFailed(String),
    #[error("No schema for class {class_id} (type {type_id}) in '{asset}'")]
    MissingSchema {
        asset: String,
        type_id: i32,
        class_id: i32,
    },

    #[error("Could not resolve asset '{0}'")]
    UnresolvedAsset(String),
    #[error("Object {path_id} does not exist in '{asset}'")]
    UnresolvedObject { asset: String, path_id: PathId },
    #[error("Invalid archive path: `{0}`")]
    InvalidArchivePath(String),

    #[error("Resource has been closed")]
    Closed,
    #[error(transparent)]
    Io(std::io::Error),
    #[error("{0}")]
    Deserialize(String),
}

impl Error {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    /// Errors caused by malformed bytes. These are fatal for the bundle or asset being parsed.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Error::InvalidSignature(_)
                | Error::UnknownCompression(_)
                | Error::UnsupportedCompression(_)
                | Error::Decompress { .. }
                | Error::DecompressionShortfall { .. }
                | Error::UndersizedRead { .. }
                | Error::Format(_)
                | Error::UnexpectedEof
                | Error::DuplicateObject { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::UnexpectedEof && error.get_ref().is_none() {
            return Error::UnexpectedEof;
        }
        // errors raised inside `Read` impls travel wrapped in io::Error
        match error.downcast::<Error>() {
            Ok(inner) => inner,
            Err(error) => Error::Io(error),
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Deserialize(msg.to_string())
    }
}
