use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Platform};

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub target: Platform,
    pub jobs: usize,
    pub single: bool,
    pub max_depth: Option<usize>,
    pub error_log: PathBuf,
    pub converter: ExternalConverterConfig,
    pub corpus: CorpusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConverterConfig {
    pub model_converter: Option<Vec<String>>,
    pub audio_converter: Option<Vec<String>>,
    pub havok_converter: Option<Vec<String>>,
    pub tile_injector: Option<Vec<String>>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub wiiu: CorpusLayers,
    pub switch: CorpusLayers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusLayers {
    pub base: Option<PathBuf>,
    pub update: Option<PathBuf>,
    pub dlc: Option<PathBuf>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            target: Platform::Switch,
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            single: false,
            max_depth: None,
            error_log: PathBuf::from("error.log"),
            converter: ExternalConverterConfig::default(),
            corpus: CorpusConfig::default(),
        }
    }
}

impl Default for ExternalConverterConfig {
    fn default() -> Self {
        ExternalConverterConfig {
            model_converter: None,
            audio_converter: None,
            havok_converter: None,
            tile_injector: None,
            output_dir: PathBuf::from("SwitchConverted"),
        }
    }
}

impl ConverterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn effective_jobs(&self) -> usize {
        if self.single {
            1
        } else {
            self.jobs.max(1)
        }
    }
}

impl CorpusConfig {
    pub fn for_platform(&self, platform: Platform) -> &CorpusLayers {
        match platform {
            Platform::WiiU => &self.wiiu,
            Platform::Switch => &self.switch,
        }
    }
}

impl CorpusLayers {
    pub fn layers(&self) -> Vec<PathBuf> {
        [&self.base, &self.update, &self.dlc]
            .iter()
            .filter_map(|layer| (*layer).clone())
            .collect()
    }
}
