use std::collections::HashMap;
use std::path::{Path, PathBuf};

use maplit::hashmap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::formats::TILE_EXTENSION;
use crate::{
    Container, ConversionError, ConversionOutcome, Endian, ErrorLog, PlatformTranscoder,
    ReferenceCorpus, ReferenceError,
};

type Result<T> = std::result::Result<T, ConversionError>;

const ATLAS_NAME: &str = "timg/__Combined.bntx";

fn stock_layouts() -> HashMap<&'static str, &'static str> {
    hashmap! {
        "Bootup.pack" => "Layout/Common.sblarc",
        "Title.pack" => "Layout/Title.sblarc",
    }
}

pub struct LayoutInjector<'a> {
    corpus: &'a dyn ReferenceCorpus,
    transcoder: &'a dyn PlatformTranscoder,
    log: &'a ErrorLog,
    endian: Endian,
}

impl<'a> LayoutInjector<'a> {
    pub fn new(
        corpus: &'a dyn ReferenceCorpus,
        transcoder: &'a dyn PlatformTranscoder,
        log: &'a ErrorLog,
        endian: Endian,
    ) -> Self {
        LayoutInjector {
            corpus,
            transcoder,
            log,
            endian,
        }
    }

    pub fn inject(&self, layout: &Path, origin: Option<&str>) -> Result<ConversionOutcome> {
        let container = Container::decode(&std::fs::read(layout)?)?;
        if !container.names().any(|name| name.ends_with(TILE_EXTENSION)) {
            return Ok(ConversionOutcome::SkippedUnsupported);
        }
        let origin = match origin {
            Some(origin) => origin,
            None => return Ok(ConversionOutcome::SkippedUnsupported),
        };
        let stock_layout = match stock_layouts().get(origin) {
            Some(stock_layout) => *stock_layout,
            None => {
                debug!("No stock layout is known for {}", origin);
                return Ok(ConversionOutcome::SkippedUnsupported);
            }
        };
        let atlas = self.stock_atlas(origin, stock_layout)?;

        let name = layout
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ConversionError::NoFileName(layout.to_path_buf()))?;
        let scratch = tempfile::tempdir()?;
        let dir = scratch.path().join(&name);
        container.extract_to(&dir)?;
        let atlas_path = dir.join(ATLAS_NAME);
        if let Some(parent) = atlas_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&atlas_path, atlas)?;

        let mut tiles: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry?;
            let is_tile = entry.file_name().to_string_lossy().ends_with(TILE_EXTENSION);
            if entry.file_type().is_file() && is_tile {
                tiles.push(entry.into_path());
            }
        }
        for tile in tiles {
            match self.transcoder.inject_tile(&atlas_path, &tile) {
                Ok(()) => std::fs::remove_file(&tile)?,
                Err(err) => {
                    let artifact = tile.with_extension("dds");
                    if artifact.exists() {
                        std::fs::remove_file(&artifact)?;
                    }
                    let relative = tile.strip_prefix(&dir).unwrap_or(&tile);
                    warn!("{} could not be converted", relative.display());
                    debug!("{:?}", err);
                    self.log.record_failure(relative, &err);
                }
            }
        }

        let rebuilt = Container::from_dir(&dir, &container)?;
        std::fs::write(layout, rebuilt.encode(&name, self.endian)?)?;
        scratch.close()?;
        info!("Successfully converted {}!", name);
        Ok(ConversionOutcome::Converted)
    }

    fn stock_atlas(&self, origin: &str, stock_layout: &str) -> Result<Vec<u8>> {
        let pack_path = format!("Pack/{}", origin);
        let pack = Container::decode(&self.corpus.get_reference_file(&pack_path)?)?;
        let layout = pack
            .get(stock_layout)
            .ok_or_else(|| ReferenceError::NotFound(format!("{}/{}", pack_path, stock_layout)))?;
        let layout = Container::decode(layout)?;
        let atlas = layout.get(ATLAS_NAME).ok_or_else(|| {
            ReferenceError::NotFound(format!("{}/{}/{}", pack_path, stock_layout, ATLAS_NAME))
        })?;
        Ok(atlas.clone())
    }
}
