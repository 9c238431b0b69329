use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use regex::Regex;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::formats::SUPPORTED_EXTENSIONS;
use crate::{ConversionError, Platform};

type Result<T> = std::result::Result<T, ConversionError>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModMeta {
    #[serde(default)]
    pub name: String,
    pub platform: Platform,
}

impl ModMeta {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|err| ConversionError::BadMetadata(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct OpenedMod {
    pub root: PathBuf,
    pub meta: ModMeta,
}

pub trait ModLifecycle: Send + Sync {
    fn open_mod(&self, path: &Path) -> Result<OpenedMod>;
    fn close_mod(&self, root: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryMod {
    scratch: Option<PathBuf>,
}

impl DirectoryMod {
    pub fn in_dir(scratch: PathBuf) -> Self {
        DirectoryMod {
            scratch: Some(scratch),
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry?;
        let relative = match entry.path().strip_prefix(from) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl ModLifecycle for DirectoryMod {
    fn open_mod(&self, path: &Path) -> Result<OpenedMod> {
        let info = path.join("info.json");
        let content = std::fs::read_to_string(&info).map_err(|err| {
            ConversionError::BadMetadata(format!("{}: {}", info.display(), err))
        })?;
        let meta = ModMeta::from_json(&content)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("botw-nx-");
        let working = match &self.scratch {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };
        copy_tree(path, working.path())?;
        // From here on close_mod owns the cleanup.
        let root = working.keep();
        Ok(OpenedMod { root, meta })
    }

    fn close_mod(&self, root: &Path) -> Result<()> {
        if root.exists() {
            std::fs::remove_dir_all(root)?;
        }
        Ok(())
    }
}

pub trait CompatibilityPass: Send + Sync {
    fn run(&self, root: &Path) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct NoCompatibilityPass;

impl CompatibilityPass for NoCompatibilityPass {
    fn run(&self, _root: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub fn filter_warnings(warnings: Vec<String>) -> Vec<String> {
    let pattern = SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| regex::escape(ext))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&pattern) {
        Ok(regex) => warnings
            .into_iter()
            .filter(|warning| !regex.is_match(warning))
            .collect(),
        Err(_) => warnings,
    }
}

pub trait Repackager: Send + Sync {
    fn repackage(&self, root: &Path, output: &Path) -> Result<()>;
}

pub fn default_output(source: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(output) => output.with_extension("bnp"),
        None => {
            let stem = source
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
            source.with_file_name(format!("{}_switch.bnp", stem))
        }
    }
}

#[derive(Debug, Clone)]
pub struct SevenZipRepackager {
    program: PathBuf,
}

impl SevenZipRepackager {
    pub fn new(program: PathBuf) -> Self {
        SevenZipRepackager { program }
    }
}

impl Default for SevenZipRepackager {
    fn default() -> Self {
        SevenZipRepackager::new(PathBuf::from("7z"))
    }
}

impl Repackager for SevenZipRepackager {
    fn repackage(&self, root: &Path, output: &Path) -> Result<()> {
        if output.exists() {
            std::fs::remove_file(output)?;
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        let status = Command::new(&self.program)
            .arg("a")
            .arg(output)
            .args(&entries)
            .stdout(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} exited with {}", self.program.display(), status),
            )
            .into())
        }
    }
}
