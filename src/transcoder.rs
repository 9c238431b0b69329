use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use tracing::debug;

use crate::bars::TrackKind;
use crate::{ExternalConverterConfig, TranscodeError};

type Result<T> = std::result::Result<T, TranscodeError>;

pub trait PlatformTranscoder: Send + Sync {
    fn transcode_track(&self, kind: TrackKind, data: &[u8]) -> Result<Vec<u8>>;

    fn transcode_model(&self, path: &Path) -> Result<Vec<u8>>;

    fn transcode_havok(&self, extension: &str, data: &[u8]) -> Result<Vec<u8>>;

    fn inject_tile(&self, atlas: &Path, tile: &Path) -> Result<()>;
}

pub struct ExternalTranscoder {
    config: ExternalConverterConfig,
    // The model converter always writes to the same output directory.
    model_lock: Mutex<()>,
}

fn track_extension(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Wave => "bfwav",
        TrackKind::Prefetch => "bfstp",
        TrackKind::Stream => "bfstm",
        TrackKind::Other(_) => "bin",
    }
}

impl ExternalTranscoder {
    pub fn new(config: ExternalConverterConfig) -> Self {
        ExternalTranscoder {
            config,
            model_lock: Mutex::new(()),
        }
    }

    fn run(&self, command: &[String], inputs: &[&Path], working_dir: Option<&Path>) -> Result<()> {
        let (program, leading) = match command.split_first() {
            Some(split) => split,
            None => {
                return Err(TranscodeError::ExternalConverterFailure {
                    program: String::new(),
                    input: inputs.first().map(|p| p.to_path_buf()).unwrap_or_default(),
                    reason: "empty command".to_string(),
                })
            }
        };
        debug!("Running {} on {:?}", program, inputs);
        let mut process = Command::new(program);
        process
            .args(leading)
            .args(inputs)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            process.current_dir(dir);
        }
        let output = process.output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(TranscodeError::ExternalConverterFailure {
                program: program.clone(),
                input: inputs.first().map(|p| p.to_path_buf()).unwrap_or_default(),
                reason: format!(
                    "{} ({})",
                    String::from_utf8_lossy(&output.stderr).trim(),
                    output.status
                ),
            })
        }
    }

    // The model converter names its output after the input, dropping the Tex1 marker.
    fn model_output(&self, path: &Path) -> Result<PathBuf> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let candidates = [name.replace(".Tex1.", ".Tex."), name];
        candidates
            .iter()
            .map(|candidate| self.config.output_dir.join(candidate))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| TranscodeError::ExternalConverterFailure {
                program: "model converter".to_string(),
                input: path.to_path_buf(),
                reason: format!("no output in {}", self.config.output_dir.display()),
            })
    }
}

impl PlatformTranscoder for ExternalTranscoder {
    fn transcode_track(&self, kind: TrackKind, data: &[u8]) -> Result<Vec<u8>> {
        let command = self
            .config
            .audio_converter
            .as_ref()
            .ok_or(TranscodeError::NotConfigured("audio"))?;
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join(format!("track.{}", track_extension(kind)));
        std::fs::write(&path, data)?;
        self.run(command, &[&path], None)?;
        Ok(std::fs::read(&path)?)
    }

    fn transcode_model(&self, path: &Path) -> Result<Vec<u8>> {
        let command = self
            .config
            .model_converter
            .as_ref()
            .ok_or(TranscodeError::NotConfigured("models"))?;
        let absolute = path.canonicalize()?;
        let _guard = self
            .model_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.run(command, &[&absolute], None)?;
        let output = self.model_output(path)?;
        let bytes = std::fs::read(&output)?;
        std::fs::remove_file(&output)?;
        Ok(bytes)
    }

    fn transcode_havok(&self, extension: &str, data: &[u8]) -> Result<Vec<u8>> {
        let command = self
            .config
            .havok_converter
            .as_ref()
            .ok_or(TranscodeError::NotConfigured("havok"))?;
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join(format!("physics{}", extension));
        std::fs::write(&path, data)?;
        self.run(command, &[&path], None)?;
        Ok(std::fs::read(&path)?)
    }

    // The injector leaves its intermediate .dds in its working directory, so
    // it runs next to the tile.
    fn inject_tile(&self, atlas: &Path, tile: &Path) -> Result<()> {
        let command = self
            .config
            .tile_injector
            .as_ref()
            .ok_or(TranscodeError::NotConfigured("layout tiles"))?;
        let atlas = atlas.canonicalize()?;
        let tile = tile.canonicalize()?;
        self.run(command, &[&atlas, &tile], tile.parent())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unconfigured_converters() {
        let transcoder = ExternalTranscoder::new(ExternalConverterConfig::default());
        assert!(matches!(
            transcoder.transcode_track(TrackKind::Wave, b"FWAV"),
            Err(TranscodeError::NotConfigured(_))
        ));
        assert!(matches!(
            transcoder.inject_tile(Path::new("a.bntx"), Path::new("b.bflim")),
            Err(TranscodeError::NotConfigured(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failing_converter_reports_program() {
        let mut config = ExternalConverterConfig::default();
        config.audio_converter = Some(vec!["false".to_string()]);
        let transcoder = ExternalTranscoder::new(config);
        match transcoder.transcode_track(TrackKind::Wave, b"FWAV") {
            Err(TranscodeError::ExternalConverterFailure { program, .. }) => {
                assert_eq!("false", program)
            }
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
    }

    #[cfg(unix)]
    #[test]
    fn tile_injector_runs_next_to_the_tile() {
        let dir = tempfile::tempdir().unwrap();
        let atlas = dir.path().join("atlas/__Combined.bntx");
        let tile = dir.path().join("timg/Logo.bflim");
        std::fs::create_dir_all(atlas.parent().unwrap()).unwrap();
        std::fs::create_dir_all(tile.parent().unwrap()).unwrap();
        std::fs::write(&atlas, b"BNTX").unwrap();
        std::fs::write(&tile, b"FLIM").unwrap();

        let config = ExternalConverterConfig {
            tile_injector: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "touch \"$(basename \"$1\" .bflim).dds\"".to_string(),
            ]),
            ..Default::default()
        };
        ExternalTranscoder::new(config)
            .inject_tile(&atlas, &tile)
            .unwrap();
        assert!(tile.with_extension("dds").exists());
    }

    #[cfg(unix)]
    #[test]
    fn havok_resources_round_trip_through_the_converter() {
        let config = ExternalConverterConfig {
            havok_converter: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "case \"$0\" in *.shksc) printf NX >> \"$0\";; *) exit 1;; esac".to_string(),
            ]),
            ..Default::default()
        };
        let transcoder = ExternalTranscoder::new(config);
        assert_eq!(
            b"hkscNX".to_vec(),
            transcoder.transcode_havok(".shksc", b"hksc").unwrap()
        );
        assert!(transcoder.transcode_havok(".hkcl", b"hkcl").is_err());
        assert!(matches!(
            ExternalTranscoder::new(ExternalConverterConfig::default())
                .transcode_havok(".hkrb", b"hkrb"),
            Err(TranscodeError::NotConfigured(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_models_with_the_same_name_keep_their_output() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("SwitchConverted");
        std::fs::create_dir_all(&output_dir).unwrap();
        let script = format!(
            "sleep 0.1; cp \"$0\" \"{}/$(basename \"$0\")\"",
            output_dir.display()
        );
        let config = ExternalConverterConfig {
            model_converter: Some(vec!["sh".to_string(), "-c".to_string(), script]),
            output_dir,
            ..Default::default()
        };
        let transcoder = &ExternalTranscoder::new(config);

        let models: Vec<PathBuf> = ["A", "B", "C"]
            .iter()
            .map(|owner| {
                let model = dir.path().join(owner).join("Npc.sbfres");
                std::fs::create_dir_all(model.parent().unwrap()).unwrap();
                std::fs::write(&model, owner.as_bytes()).unwrap();
                model
            })
            .collect();
        let results: Vec<Vec<u8>> = std::thread::scope(|scope| {
            let handles: Vec<_> = models
                .iter()
                .map(|model| scope.spawn(move || transcoder.transcode_model(model).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(
            vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()],
            results
        );
    }

    #[cfg(unix)]
    #[test]
    fn model_output_is_relocated() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("SwitchConverted");
        std::fs::create_dir_all(&output_dir).unwrap();
        std::fs::write(output_dir.join("Npc.Tex.sbfres"), b"converted").unwrap();
        let model = dir.path().join("Npc.Tex1.sbfres");
        std::fs::write(&model, b"original").unwrap();

        let config = ExternalConverterConfig {
            model_converter: Some(vec!["true".to_string()]),
            output_dir: output_dir.clone(),
            ..Default::default()
        };
        let transcoder = ExternalTranscoder::new(config);
        assert_eq!(b"converted".to_vec(), transcoder.transcode_model(&model).unwrap());
        assert!(!output_dir.join("Npc.Tex.sbfres").exists());
    }
}
