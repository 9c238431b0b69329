use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

pub struct ErrorLog {
    path: PathBuf,
    file: Mutex<File>,
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

impl ErrorLog {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(ErrorLog {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_failure(&self, relative: &Path, err: &dyn std::error::Error) {
        self.append(&format!(
            "WARNING {} could not be converted\nDEBUG {}\n",
            relative.display(),
            error_chain(err)
        ));
    }

    pub fn record_warning(&self, message: &str) {
        self.append(&format!("WARNING {}\n", message));
    }

    fn append(&self, text: &str) {
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = file.write_all(text.as_bytes()).and_then(|_| file.flush()) {
            warn!("Failed to write to {}: {}", self.path.display(), err);
        }
    }

    pub fn is_empty(&self) -> bool {
        std::fs::metadata(&self.path).map_or(true, |m| m.len() == 0)
    }
}
