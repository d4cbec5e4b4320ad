use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing {}: {message}", path.display())]
    Xml { path: PathBuf, message: String },

    #[error("unexpected structure in {}: {message}", path.display())]
    Deserialize { path: PathBuf, message: String },

    #[error("malformed XML at byte {offset}: {message}")]
    MalformedDocument { offset: usize, message: String },

    #[error("unsupported selection query '{query}': {message}")]
    Query { query: String, message: String },

    #[error("Missing required setting: {0}. Please update your editor settings.")]
    MissingSetting(&'static str),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn xml(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::Xml {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(offset: usize, err: impl std::fmt::Display) -> Self {
        Error::MalformedDocument {
            offset,
            message: err.to_string(),
        }
    }

    pub(crate) fn deserialize(path: impl Into<PathBuf>, err: quick_xml::DeError) -> Self {
        Error::Deserialize {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
