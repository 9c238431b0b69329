use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::bars::{self, TrackKind};
use crate::formats::{self, ResourceKind, BOOT_LAYOUT_NAME, STREAM_EXTENSION};
use crate::{
    Container, ConversionError, ConverterConfig, Endian, ErrorLog, LayoutInjector,
    PlatformTranscoder, ReferenceCorpus, StockLookupKey, StockResolver, Yaz0CompressionFormat,
};

type Result<T> = std::result::Result<T, ConversionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted,
    SkippedUnsupported,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionReport {
    entries: Vec<(PathBuf, ConversionOutcome)>,
}

impl ConversionReport {
    pub fn push(&mut self, path: PathBuf, outcome: ConversionOutcome) {
        self.entries.push((path, outcome));
    }

    pub fn extend(&mut self, other: ConversionReport) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[(PathBuf, ConversionOutcome)] {
        &self.entries
    }

    pub fn outcome(&self, path: &Path) -> Option<&ConversionOutcome> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &String)> {
        self.entries.iter().filter_map(|(path, outcome)| match outcome {
            ConversionOutcome::Failed(reason) => Some((path, reason)),
            _ => None,
        })
    }

    pub fn converted(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| *outcome == ConversionOutcome::Converted)
            .count()
    }
}

struct Visit {
    path: PathBuf,
    root: PathBuf,
    logical: PathBuf,
    chain: Vec<String>,
    depth: usize,
}

struct Repack {
    entry: Visit,
    container: Container,
    dir: PathBuf,
    scratch: TempDir,
}

enum Frame {
    Visit(Visit),
    Repack(Repack),
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ConversionError::NoFileName(path.to_path_buf()))
}

fn find_stream(root: &Path, track: &str) -> Option<PathBuf> {
    let pattern = format!(
        "{}/**/{}{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        glob::Pattern::escape(track),
        STREAM_EXTENSION
    );
    glob::glob(&pattern).ok()?.filter_map(|p| p.ok()).next()
}

// A container's repack frame sits below its children on the stack.
pub struct ResourceDispatcher<'a> {
    corpus: &'a dyn ReferenceCorpus,
    transcoder: &'a dyn PlatformTranscoder,
    log: &'a ErrorLog,
    endian: Endian,
    max_depth: Option<usize>,
}

impl<'a> ResourceDispatcher<'a> {
    pub fn new(
        corpus: &'a dyn ReferenceCorpus,
        transcoder: &'a dyn PlatformTranscoder,
        log: &'a ErrorLog,
        config: &ConverterConfig,
    ) -> Self {
        ResourceDispatcher {
            corpus,
            transcoder,
            log,
            endian: config.target.endian(),
            max_depth: config.max_depth,
        }
    }

    pub fn convert(
        &self,
        entry: &Path,
        working_root: &Path,
        original_root: &Path,
    ) -> ConversionReport {
        let mut report = ConversionReport::default();
        let logical = entry
            .strip_prefix(working_root)
            .unwrap_or(entry)
            .to_path_buf();
        let mut stack = vec![Frame::Visit(Visit {
            path: entry.to_path_buf(),
            root: working_root.to_path_buf(),
            logical,
            chain: Vec::new(),
            depth: 0,
        })];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit(visit) => match self.visit(&visit, original_root, &mut stack) {
                    Ok(Some(outcome)) => report.push(visit.logical, outcome),
                    // Children were queued; the repack frame reports the container.
                    Ok(None) => {}
                    Err(err) => self.fail(&visit, err, &mut report),
                },
                Frame::Repack(repack) => {
                    let Repack {
                        entry,
                        container,
                        dir,
                        scratch,
                    } = repack;
                    match self.repack(&entry, &container, &dir, scratch) {
                        Ok(outcome) => report.push(entry.logical, outcome),
                        Err(err) => self.fail(&entry, err, &mut report),
                    }
                }
            }
        }
        report
    }

    fn fail(&self, visit: &Visit, err: ConversionError, report: &mut ConversionReport) {
        let relative = visit.path.strip_prefix(&visit.root).unwrap_or(&visit.path);
        warn!("{} could not be converted", relative.display());
        debug!("{:?}", err);
        self.log.record_failure(relative, &err);
        report.push(
            visit.logical.clone(),
            ConversionOutcome::Failed(err.to_string()),
        );
    }

    fn visit(
        &self,
        visit: &Visit,
        original_root: &Path,
        stack: &mut Vec<Frame>,
    ) -> Result<Option<ConversionOutcome>> {
        let path = &visit.path;
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_file() && metadata.len() > 0 => {}
            _ => return Ok(Some(ConversionOutcome::SkippedUnsupported)),
        }
        match ResourceKind::classify(path) {
            ResourceKind::Model => self.convert_model(path).map(Some),
            ResourceKind::Havok => self.convert_havok(path).map(Some),
            ResourceKind::Bank => self.convert_bank(visit, original_root).map(Some),
            ResourceKind::Stream => self.convert_stream(path).map(Some),
            ResourceKind::Container => self.open_container(visit, stack),
            ResourceKind::Layout => {
                let name = file_name(path)?;
                if name == BOOT_LAYOUT_NAME {
                    let message = format!(
                        "A {} was found! These files are not used on Switch, so it was removed",
                        BOOT_LAYOUT_NAME
                    );
                    warn!("{}", message);
                    self.log.record_warning(&message);
                    std::fs::remove_file(path)?;
                    Ok(Some(ConversionOutcome::Converted))
                } else {
                    let injector =
                        LayoutInjector::new(self.corpus, self.transcoder, self.log, self.endian);
                    let origin = visit.chain.last().map(|name| name.as_str());
                    injector.inject(path, origin).map(Some)
                }
            }
            ResourceKind::Unsupported => Ok(Some(ConversionOutcome::SkippedUnsupported)),
        }
    }

    fn convert_model(&self, path: &Path) -> Result<ConversionOutcome> {
        let yaz0 = Yaz0CompressionFormat;
        let name = file_name(path)?;
        let suffixes = formats::suffixes(&name);

        let texture = if suffixes.contains(&".Tex1") {
            let tex2 = path.with_file_name(name.replace(".Tex1.", ".Tex2."));
            if !tex2.is_file() {
                return Err(ConversionError::MissingSiblingDependency(tex2));
            }
            let mipmaps = yaz0.decompress_if_needed(std::fs::read(&tex2)?)?;
            std::fs::write(&tex2, mipmaps)?;
            Some(tex2)
        } else {
            None
        };
        let model = yaz0.decompress_if_needed(std::fs::read(path)?)?;
        std::fs::write(path, model)?;

        let converted = self.transcoder.transcode_model(path)?;
        match texture {
            Some(tex2) => {
                let target = path.with_file_name(name.replace(".Tex1.", ".Tex."));
                std::fs::write(&target, yaz0.compress(&converted)?)?;
                std::fs::remove_file(path)?;
                std::fs::remove_file(tex2)?;
            }
            None if formats::extension(&name).map_or(false, |ext| ext.starts_with(".s")) => {
                std::fs::write(path, yaz0.compress(&converted)?)?;
            }
            None => std::fs::write(path, converted)?,
        }
        info!("Successfully converted {}!", name);
        Ok(ConversionOutcome::Converted)
    }

    fn convert_havok(&self, path: &Path) -> Result<ConversionOutcome> {
        let yaz0 = Yaz0CompressionFormat;
        let name = file_name(path)?;
        let bytes = std::fs::read(path)?;
        let compressed = yaz0.is_compressed(&bytes);
        let physics = yaz0.decompress_if_needed(bytes)?;
        let extension = formats::extension(&name).unwrap_or_default();
        let converted = self.transcoder.transcode_havok(extension, &physics)?;
        if compressed {
            std::fs::write(path, yaz0.compress(&converted)?)?;
        } else {
            std::fs::write(path, converted)?;
        }
        info!("Successfully converted {}!", name);
        Ok(ConversionOutcome::Converted)
    }

    fn convert_bank(&self, visit: &Visit, original_root: &Path) -> Result<ConversionOutcome> {
        let path = &visit.path;
        let name = file_name(path)?;
        let bytes = std::fs::read(path)?;
        let (tracks, _) = bars::split_tracks(&bytes)?;

        let mut replacements = IndexMap::new();
        for (track, data) in &tracks {
            let converted = match TrackKind::of(data) {
                TrackKind::Wave => self.transcoder.transcode_track(TrackKind::Wave, data)?,
                TrackKind::Prefetch => {
                    let stream = find_stream(&visit.root, track)
                        .or_else(|| find_stream(original_root, track));
                    match stream {
                        Some(_) => self.transcoder.transcode_track(TrackKind::Prefetch, data)?,
                        None => {
                            debug!(
                                "No {}{} next to {}, using the stock track",
                                track, STREAM_EXTENSION, name
                            );
                            let key = StockLookupKey::new(track, &name, visit.chain.clone());
                            StockResolver::new(self.corpus).resolve(&key)?
                        }
                    }
                }
                _ => continue,
            };
            replacements.insert(track.clone(), converted);
        }

        let rebuilt = bars::rebuild_bank(&bytes, &replacements, self.endian)?;
        std::fs::write(path, rebuilt)?;
        info!("Successfully converted {}!", name);
        Ok(ConversionOutcome::Converted)
    }

    fn convert_stream(&self, path: &Path) -> Result<ConversionOutcome> {
        let bytes = std::fs::read(path)?;
        let converted = self.transcoder.transcode_track(TrackKind::Stream, &bytes)?;
        std::fs::write(path, converted)?;
        info!("Successfully converted {}!", file_name(path)?);
        Ok(ConversionOutcome::Converted)
    }

    fn open_container(
        &self,
        visit: &Visit,
        stack: &mut Vec<Frame>,
    ) -> Result<Option<ConversionOutcome>> {
        let name = file_name(&visit.path)?;
        if let Some(max_depth) = self.max_depth {
            if visit.depth > max_depth {
                warn!("{} is nested too deeply and was left untouched", visit.logical.display());
                return Ok(Some(ConversionOutcome::SkippedUnsupported));
            }
        }

        let container = Container::decode(&std::fs::read(&visit.path)?)?;
        if !container.names().any(|entry| formats::is_supported(entry)) {
            return Ok(Some(ConversionOutcome::SkippedUnsupported));
        }

        let scratch = tempfile::tempdir()?;
        let dir = scratch.path().join(&name);
        container.extract_to(&dir)?;
        let mut children = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                children.push(entry.into_path());
            }
        }

        let mut chain = visit.chain.clone();
        chain.push(name);
        let depth = visit.depth + 1;
        stack.push(Frame::Repack(Repack {
            entry: Visit {
                path: visit.path.clone(),
                root: visit.root.clone(),
                logical: visit.logical.clone(),
                chain: visit.chain.clone(),
                depth: visit.depth,
            },
            container,
            dir: dir.clone(),
            scratch,
        }));
        for child in children.into_iter().rev() {
            let relative = child.strip_prefix(&dir).unwrap_or(&child).to_path_buf();
            stack.push(Frame::Visit(Visit {
                logical: visit.logical.join(&relative),
                path: child,
                root: dir.clone(),
                chain: chain.clone(),
                depth,
            }));
        }
        Ok(None)
    }

    fn repack(
        &self,
        entry: &Visit,
        template: &Container,
        dir: &Path,
        scratch: TempDir,
    ) -> Result<ConversionOutcome> {
        let name = file_name(&entry.path)?;
        let rebuilt = Container::from_dir(dir, template)?;
        std::fs::write(&entry.path, rebuilt.encode(&name, self.endian)?)?;
        scratch.close()?;
        info!("Successfully converted {}!", name);
        Ok(ConversionOutcome::Converted)
    }
}
