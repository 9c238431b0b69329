use std::path::{Path, PathBuf};

use normpath::PathExt;

use crate::{ConverterConfig, Platform, ReferenceError};

type Result<T> = std::result::Result<T, ReferenceError>;

pub trait ReferenceCorpus: Send + Sync {
    fn get_reference_file(&self, path: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct StockFilesystem {
    layers: Vec<PathBuf>,
    platform: Platform,
}

impl StockFilesystem {
    pub fn new(layers: Vec<PathBuf>, platform: Platform) -> Result<Self> {
        if layers.is_empty() {
            return Err(ReferenceError::NoLayers);
        }
        let mut canonical_layers: Vec<PathBuf> = Vec::new();
        for layer in &layers {
            canonical_layers.push(layer.normalize()?.into_path_buf());
        }
        Ok(StockFilesystem {
            layers: canonical_layers,
            platform,
        })
    }

    pub fn for_platform(config: &ConverterConfig) -> Result<Self> {
        let layers = config.corpus.for_platform(config.target).layers();
        Self::new(layers, config.target)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    fn locate(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        self.layers
            .iter()
            .rev()
            .map(|layer| layer.join(relative))
            .find(|candidate| candidate.is_file())
    }
}

impl ReferenceCorpus for StockFilesystem {
    fn get_reference_file(&self, path: &str) -> Result<Vec<u8>> {
        let path_buf = self
            .locate(path)
            .ok_or_else(|| ReferenceError::NotFound(path.to_string()))?;
        std::fs::read(&path_buf)
            .map_err(|err| ReferenceError::ReadError(path.to_string(), err.to_string()))
    }
}
