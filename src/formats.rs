use std::path::Path;

pub const SUPPORTED_EXTENSIONS: [&str; 13] = [
    ".sbfres",
    ".sbitemico",
    ".bars",
    ".bfstm",
    ".bflim",
    ".bcamanim",
    ".sblarc",
    ".blarc",
    ".shknm2",
    ".shksc",
    ".shktmrb",
    ".hkrb",
    ".hkcl",
];

pub const MODEL_EXTENSIONS: [&str; 3] = [".sbfres", ".sbitemico", ".bcamanim"];

pub const HAVOK_EXTENSIONS: [&str; 5] = [".shknm2", ".shksc", ".shktmrb", ".hkrb", ".hkcl"];

pub const LAYOUT_EXTENSIONS: [&str; 2] = [".sblarc", ".blarc"];

// SARC archives whose extension does not mention "pack".
const ARCHIVE_EXTENSIONS: [&str; 6] = [".sarc", ".ssarc", ".bmodelsh", ".sbmodelsh", ".stats", ".sstats"];

pub const QUEST_PACK_EXTENSION: &str = ".sbquestpack";

pub const BOOT_LAYOUT_NAME: &str = "BootUp.sblarc";

pub const TILE_EXTENSION: &str = ".bflim";
pub const STREAM_EXTENSION: &str = ".bfstm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Model,
    Havok,
    Bank,
    Stream,
    Container,
    Layout,
    Unsupported,
}

pub fn extension(name: &str) -> Option<&str> {
    let file_name = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(index) => Some(&file_name[index..]),
    }
}

pub fn suffixes(name: &str) -> Vec<&str> {
    let file_name = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    let mut result = Vec::new();
    let mut start = None;
    for (index, c) in file_name.char_indices() {
        if c == '.' && index > 0 {
            if let Some(s) = start {
                result.push(&file_name[s..index]);
            }
            start = Some(index);
        }
    }
    if let Some(s) = start {
        result.push(&file_name[s..]);
    }
    result
}

pub fn is_supported(name: &str) -> bool {
    extension(name).map_or(false, |ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

pub fn is_container_extension(ext: &str) -> bool {
    (ext.contains("pack") && ext != QUEST_PACK_EXTENSION) || ARCHIVE_EXTENSIONS.contains(&ext)
}

impl ResourceKind {
    pub fn classify(path: &Path) -> Self {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return ResourceKind::Unsupported,
        };
        let ext = match extension(&name) {
            Some(ext) => ext,
            None => return ResourceKind::Unsupported,
        };
        if MODEL_EXTENSIONS.contains(&ext) {
            if suffixes(&name).contains(&".Tex2") {
                // Consumed together with its .Tex1 sibling.
                ResourceKind::Unsupported
            } else {
                ResourceKind::Model
            }
        } else if HAVOK_EXTENSIONS.contains(&ext) {
            ResourceKind::Havok
        } else if ext == ".bars" {
            ResourceKind::Bank
        } else if ext == STREAM_EXTENSION {
            ResourceKind::Stream
        } else if is_container_extension(ext) {
            ResourceKind::Container
        } else if LAYOUT_EXTENSIONS.contains(&ext) {
            ResourceKind::Layout
        } else {
            ResourceKind::Unsupported
        }
    }
}
