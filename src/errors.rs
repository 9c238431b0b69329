use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Input is not compressed using {0}.")]
    InvalidInput(String),

    #[error("Compressed stream ended early: expected {0} bytes but produced {1}.")]
    Truncated(usize, usize),
}

#[derive(Error, Debug)]
pub enum EndianAwareIOError {
    #[error("Unable to convert slice to a fixed size array.")]
    ConversionError,
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Corrupt container: {0}.")]
    CorruptContainer(String),

    #[error("Entry name '{0}' is not valid UTF-8.")]
    BadName(String),

    #[error("Container holds {0} entries but the node table is limited to 65535.")]
    TooManyEntries(usize),

    #[error(transparent)]
    CompressionError(#[from] CompressionError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BankError {
    #[error("Malformed bank: {0}.")]
    MalformedBank(String),

    #[error("Replacement targets track '{0}' which is not in the bank.")]
    UnknownTrack(String),

    #[error(transparent)]
    EndianAwareIOError(#[from] EndianAwareIOError),
}

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference file '{0}' was not found in the stock corpus.")]
    NotFound(String),

    #[error("Track '{track}' from '{bank}' was not found in the stock corpus.")]
    ReferenceNotFound { track: String, bank: String },

    #[error("The stock corpus has no layers.")]
    NoLayers,

    #[error("Failed to read reference file '{0}': {1}")]
    ReadError(String, String),

    #[error(transparent)]
    ContainerError(#[from] ContainerError),

    #[error(transparent)]
    BankError(#[from] BankError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("External converter '{program}' failed on '{input}': {reason}")]
    ExternalConverterFailure {
        program: String,
        input: PathBuf,
        reason: String,
    },

    #[error("No converter is configured for {0}.")]
    NotConfigured(&'static str),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Mod is already built for {0}; converting in that direction is not supported.")]
    UnsupportedDirection(String),

    #[error("Missing sibling dependency '{0}'.")]
    MissingSiblingDependency(PathBuf),

    #[error("Mod metadata is missing or unreadable: {0}")]
    BadMetadata(String),

    #[error("Path '{0}' has no file name.")]
    NoFileName(PathBuf),

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    ContainerError(#[from] ContainerError),

    #[error(transparent)]
    BankError(#[from] BankError),

    #[error(transparent)]
    ReferenceError(#[from] ReferenceError),

    #[error(transparent)]
    TranscodeError(#[from] TranscodeError),

    #[error(transparent)]
    CompressionError(#[from] CompressionError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    WalkError(#[from] walkdir::Error),
}
