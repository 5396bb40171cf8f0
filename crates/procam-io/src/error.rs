/// An error type for reading and writing calibration files.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    /// Error when the file does not exist.
    #[error("File does not exist: {0}")]
    FileDoesNotExist(std::path::PathBuf),

    /// Error to open, read or write the file.
    #[error("Failed to manipulate the file. {0}")]
    FileError(#[from] std::io::Error),

    /// The file content does not follow the expected layout.
    #[error("Parse error {0}")]
    ParseError(String),

    /// Error to encode or decode a JSON document.
    #[error("Failed to process the JSON document. {0}")]
    JsonError(#[from] serde_json::Error),
}
