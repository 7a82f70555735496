use thiserror::Error;

/// Conditions that abort a whole import before anything is written.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no package document (.opf) found in the archive")]
    MissingManifest,

    #[error("output folder already exists: {0}")]
    OutputExists(String),

    #[error("invalid package document {path}: {message}")]
    InvalidPackage { path: String, message: String },

    #[error("failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An output path was registered twice within one book.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("output file already registered: {0}")]
pub struct NameCollision(pub String);
