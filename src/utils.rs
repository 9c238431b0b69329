use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::bars::TrackKind;
use crate::{
    CompatibilityPass, CompressionFormat, Container, ConversionError, Endian, PlatformTranscoder,
    ReferenceCorpus, ReferenceError, Repackager, TranscodeError, Yaz0CompressionFormat,
};

// A track payload: 0x10 byte header followed by `payload_len` filler bytes.
pub fn track_bytes(magic: &[u8; 4], endian: Endian, payload_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(0x10 + payload_len);
    data.extend_from_slice(magic);
    data.extend_from_slice(&endian.encode_u16(0xFEFF));
    data.extend_from_slice(&endian.encode_u16(0x40));
    data.extend_from_slice(&endian.encode_u32(0x0001_0000));
    data.extend_from_slice(&endian.encode_u32((0x10 + payload_len) as u32));
    data.extend((0..payload_len).map(|i| (i % 251) as u8));
    data
}

// AMTA v4 block: header with four section offsets, then DATA, MARK, EXT_ and STRG.
fn amta_bytes(endian: Endian, name: &str) -> Vec<u8> {
    let mut strg = name.as_bytes().to_vec();
    strg.push(0);
    while strg.len() % 4 != 0 {
        strg.push(0);
    }

    let mut data = Vec::new();
    for word in [0u32, 0] {
        data.extend_from_slice(&endian.encode_u32(word));
    }
    data.extend_from_slice(&[0, 2, 1, 0]);
    for word in [
        1.0f32.to_bits(),
        48_000,
        0,
        0x0001_0000,
        (-16.5f32).to_bits(),
        2,
        0.8f32.to_bits(),
    ] {
        data.extend_from_slice(&endian.encode_u32(word));
    }

    let mut mark = Vec::new();
    for word in [1u32, 0, 0, 0x100, 0x40] {
        mark.extend_from_slice(&endian.encode_u32(word));
    }
    let ext = endian.encode_u32(0).to_vec();

    let mut out = vec![0u8; 0x1C];
    let mut offsets = Vec::new();
    for (magic, payload) in [
        (b"DATA", data),
        (b"MARK", mark),
        (b"EXT_", ext),
        (b"STRG", strg),
    ] {
        offsets.push(out.len() as u32);
        out.extend_from_slice(magic);
        out.extend_from_slice(&endian.encode_u32(payload.len() as u32));
        out.extend_from_slice(&payload);
    }
    out[0..4].copy_from_slice(b"AMTA");
    let size = out.len() as u32;
    endian.write_u16_at(&mut out, 0x04, 0xFEFF).unwrap();
    endian.write_u16_at(&mut out, 0x06, 0x0400).unwrap();
    endian.write_u32_at(&mut out, 0x08, size).unwrap();
    for (i, offset) in offsets.into_iter().enumerate() {
        endian.write_u32_at(&mut out, 0x0C + i * 4, offset).unwrap();
    }
    out
}

// Header, hash table, offset pairs, AMTA blocks, then 0x20 aligned tracks.
pub fn bank_bytes(endian: Endian, tracks: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let count = tracks.len();
    let mut out = vec![0u8; 0x10 + count * 12];

    let mut amta_offsets = Vec::new();
    for (name, _) in tracks {
        amta_offsets.push(out.len());
        out.extend_from_slice(&amta_bytes(endian, name));
    }

    let mut track_offsets = Vec::new();
    for (_, data) in tracks {
        while out.len() % 0x20 != 0 {
            out.push(0);
        }
        track_offsets.push(out.len());
        out.extend_from_slice(data);
    }

    out[0..4].copy_from_slice(b"BARS");
    let size = out.len() as u32;
    endian.write_u32_at(&mut out, 0x04, size).unwrap();
    endian.write_u16_at(&mut out, 0x08, 0xFEFF).unwrap();
    endian.write_u16_at(&mut out, 0x0A, 0x0101).unwrap();
    endian.write_u32_at(&mut out, 0x0C, count as u32).unwrap();
    for i in 0..count {
        endian
            .write_u32_at(&mut out, 0x10 + i * 4, 0x1000_0000 + i as u32)
            .unwrap();
        let pair = 0x10 + count * 4 + i * 8;
        endian
            .write_u32_at(&mut out, pair, amta_offsets[i] as u32)
            .unwrap();
        endian
            .write_u32_at(&mut out, pair + 4, track_offsets[i] as u32)
            .unwrap();
    }
    out
}

// A big endian container, Yaz0 compressed when `compressed` is set.
pub fn container_bytes(entries: &[(&str, Vec<u8>)], compressed: bool) -> Vec<u8> {
    let compression = if compressed {
        CompressionFormat::Yaz0(Yaz0CompressionFormat)
    } else {
        CompressionFormat::None
    };
    let mut container = Container::new(compression, Endian::Big);
    for (name, data) in entries {
        container.insert(name, data.clone());
    }
    container.encode("fixture.sarc", Endian::Big).unwrap()
}

#[derive(Default)]
pub struct MemoryCorpus {
    files: HashMap<String, Vec<u8>>,
    accessed: Mutex<Vec<String>>,
}

impl MemoryCorpus {
    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(path.to_string(), data);
    }

    // Every path requested so far, in order.
    pub fn accessed(&self) -> Vec<String> {
        self.accessed.lock().unwrap().clone()
    }
}

impl ReferenceCorpus for MemoryCorpus {
    fn get_reference_file(&self, path: &str) -> Result<Vec<u8>, ReferenceError> {
        self.accessed.lock().unwrap().push(path.to_string());
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ReferenceError::NotFound(path.to_string()))
    }
}

// Rewrites tracks as little endian, optionally growing them. Models and
// physics gain an `NX:` prefix. Tiles are appended to the atlas unless their name contains
// `Broken`, in which case a `.dds` artifact is left behind and an error returned.
#[derive(Default)]
pub struct FakeTranscoder {
    grow: usize,
    calls: Mutex<Vec<String>>,
}

impl FakeTranscoder {
    pub fn growing(grow: usize) -> Self {
        FakeTranscoder {
            grow,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlatformTranscoder for FakeTranscoder {
    fn transcode_track(&self, kind: TrackKind, data: &[u8]) -> Result<Vec<u8>, TranscodeError> {
        self.calls.lock().unwrap().push(format!(
            "track:{}",
            String::from_utf8_lossy(&kind.magic())
        ));
        let payload = data.len().saturating_sub(0x10) + self.grow;
        Ok(track_bytes(&kind.magic(), Endian::Little, payload))
    }

    fn transcode_model(&self, path: &Path) -> Result<Vec<u8>, TranscodeError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("model:{}", path.display()));
        let mut converted = b"NX:".to_vec();
        converted.extend(std::fs::read(path)?);
        Ok(converted)
    }

    fn transcode_havok(&self, extension: &str, data: &[u8]) -> Result<Vec<u8>, TranscodeError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("havok:{}", extension));
        let mut converted = b"NX:".to_vec();
        converted.extend_from_slice(data);
        Ok(converted)
    }

    fn inject_tile(&self, atlas: &Path, tile: &Path) -> Result<(), TranscodeError> {
        let name = tile.file_name().unwrap().to_string_lossy().to_string();
        if name.contains("Broken") {
            std::fs::write(tile.with_extension("dds"), b"DDS ").unwrap();
            return Err(TranscodeError::ExternalConverterFailure {
                program: "fake".to_string(),
                input: tile.to_path_buf(),
                reason: "unsupported tile format".to_string(),
            });
        }
        let mut bytes = std::fs::read(atlas)?;
        bytes.extend(std::fs::read(tile)?);
        std::fs::write(atlas, bytes)?;
        Ok(())
    }
}

pub struct ScriptedCompatibilityPass {
    warnings: Vec<String>,
}

impl ScriptedCompatibilityPass {
    pub fn new(warnings: Vec<&str>) -> Self {
        ScriptedCompatibilityPass {
            warnings: warnings.into_iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl CompatibilityPass for ScriptedCompatibilityPass {
    fn run(&self, _root: &Path) -> Result<Vec<String>, ConversionError> {
        Ok(self.warnings.clone())
    }
}

// Copies the working root into a directory instead of building an archive.
pub struct CopyRepackager {
    destination: PathBuf,
}

impl CopyRepackager {
    pub fn new(destination: PathBuf) -> Self {
        CopyRepackager { destination }
    }
}

impl Repackager for CopyRepackager {
    fn repackage(&self, root: &Path, _output: &Path) -> Result<(), ConversionError> {
        for entry in WalkDir::new(root) {
            let entry = entry?;
            let target = self.destination.join(entry.path().strip_prefix(root).unwrap());
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                std::fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }
}
