use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::collaborators::{default_output, filter_warnings, NoCompatibilityPass};
use crate::{
    CompatibilityPass, ConversionError, ConversionReport, ConverterConfig, DirectoryMod, ErrorLog,
    ExternalTranscoder, ModLifecycle, OpenedMod, PlatformTranscoder, ReferenceCorpus, Repackager,
    ResourceDispatcher, SevenZipRepackager, StockFilesystem,
};

type Result<T> = std::result::Result<T, ConversionError>;

pub const ADVISORY: &str =
    "It seems some files could not be converted. Please check the error log for more info.";

#[derive(Debug, Clone)]
pub struct ModReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub reports: Vec<ConversionReport>,
    pub warnings: Vec<String>,
}

impl ModReport {
    pub fn failures(&self) -> usize {
        self.reports.iter().map(|r| r.failures().count()).sum()
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub converted: Vec<ModReport>,
    pub failed: Vec<(PathBuf, String)>,
    pub advisory: Option<String>,
}

pub struct Converter {
    config: ConverterConfig,
    corpus: Box<dyn ReferenceCorpus>,
    transcoder: Box<dyn PlatformTranscoder>,
    lifecycle: Box<dyn ModLifecycle>,
    compatibility: Box<dyn CompatibilityPass>,
    repackager: Box<dyn Repackager>,
}

impl Converter {
    pub fn new(
        config: ConverterConfig,
        corpus: Box<dyn ReferenceCorpus>,
        transcoder: Box<dyn PlatformTranscoder>,
        lifecycle: Box<dyn ModLifecycle>,
        compatibility: Box<dyn CompatibilityPass>,
        repackager: Box<dyn Repackager>,
    ) -> Self {
        Converter {
            config,
            corpus,
            transcoder,
            lifecycle,
            compatibility,
            repackager,
        }
    }

    pub fn from_config(config: ConverterConfig) -> Result<Self> {
        let corpus = StockFilesystem::for_platform(&config)?;
        let transcoder = ExternalTranscoder::new(config.converter.clone());
        Ok(Converter::new(
            config,
            Box::new(corpus),
            Box::new(transcoder),
            Box::new(DirectoryMod::default()),
            Box::new(NoCompatibilityPass),
            Box::new(SevenZipRepackager::default()),
        ))
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn convert_mods(&self, mods: &[PathBuf], output: Option<&Path>) -> Result<RunSummary> {
        let log = ErrorLog::create(&self.config.error_log)?;
        let mut summary = RunSummary::default();
        for source in mods {
            match self.convert_mod(source, output, &log) {
                Ok(report) => summary.converted.push(report),
                Err(err) => {
                    warn!("{} could not be converted: {}", source.display(), err);
                    summary.failed.push((source.clone(), err.to_string()));
                }
            }
        }
        if !log.is_empty() {
            info!("{}", ADVISORY);
            summary.advisory = Some(ADVISORY.to_string());
        }
        Ok(summary)
    }

    // The working copy is removed whether or not conversion succeeds.
    pub fn convert_mod(
        &self,
        source: &Path,
        output: Option<&Path>,
        log: &ErrorLog,
    ) -> Result<ModReport> {
        let opened = self.lifecycle.open_mod(source)?;
        let result = self.convert_opened(source, &opened, output, log);
        let closed = self.lifecycle.close_mod(&opened.root);
        let report = result?;
        closed?;
        Ok(report)
    }

    fn convert_opened(
        &self,
        source: &Path,
        opened: &OpenedMod,
        output: Option<&Path>,
        log: &ErrorLog,
    ) -> Result<ModReport> {
        if opened.meta.platform == self.config.target {
            return Err(ConversionError::UnsupportedDirection(
                self.config.target.to_string(),
            ));
        }
        let reports = self.convert_tree(&opened.root, log)?;

        let warnings = filter_warnings(self.compatibility.run(&opened.root)?);
        for warning in &warnings {
            log.record_warning(warning);
        }

        let output = default_output(source, output);
        self.repackager.repackage(&opened.root, &output)?;
        info!("Converted {} to {}", source.display(), output.display());
        Ok(ModReport {
            source: source.to_path_buf(),
            output,
            reports,
            warnings,
        })
    }

    pub fn convert_tree(&self, root: &Path, log: &ErrorLog) -> Result<Vec<ConversionReport>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        let dispatcher = ResourceDispatcher::new(
            self.corpus.as_ref(),
            self.transcoder.as_ref(),
            log,
            &self.config,
        );
        let jobs = self.config.effective_jobs();
        if jobs == 1 {
            return Ok(files
                .iter()
                .map(|file| dispatcher.convert(file, root, root))
                .collect());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|err| ConversionError::ThreadPool(err.to_string()))?;
        Ok(pool.install(|| {
            files
                .par_iter()
                .map(|file| dispatcher.convert(file, root, root))
                .collect()
        }))
    }
}
