mod collaborators;
mod compression_format;
mod config;
mod converter;
mod dispatcher;
mod endian_aware_io;
mod error_log;
mod errors;
mod layout;
mod platform;
mod stock_filesystem;
mod stock_resolver;
mod transcoder;
mod yaz0;

pub mod bars;
pub mod formats;
pub mod sarc;

#[cfg(test)]
mod utils;

pub use collaborators::{
    default_output, filter_warnings, CompatibilityPass, DirectoryMod, ModLifecycle, ModMeta,
    NoCompatibilityPass, OpenedMod, Repackager, SevenZipRepackager,
};
pub use compression_format::CompressionFormat;
pub use config::{CorpusConfig, CorpusLayers, ConverterConfig, ExternalConverterConfig};
pub use converter::{Converter, ModReport, RunSummary, ADVISORY};
pub use dispatcher::{ConversionOutcome, ConversionReport, ResourceDispatcher};
pub use endian_aware_io::Endian;
pub use error_log::ErrorLog;
pub use layout::LayoutInjector;
pub use platform::Platform;
pub use sarc::Container;
pub use stock_filesystem::{ReferenceCorpus, StockFilesystem};
pub use stock_resolver::{StockLookupKey, StockResolver};
pub use transcoder::{ExternalTranscoder, PlatformTranscoder};
pub use yaz0::Yaz0CompressionFormat;

pub use errors::{
    BankError, CompressionError, ConfigError, ContainerError, ConversionError,
    EndianAwareIOError, ReferenceError, TranscodeError,
};
