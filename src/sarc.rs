use std::io::Cursor;
use std::path::{Component, Path};

use binread::{BinRead, BinReaderExt};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use indexmap::IndexMap;
use walkdir::WalkDir;

use crate::formats::extension;
use crate::{CompressionFormat, ContainerError, Endian};

type Result<T> = std::result::Result<T, ContainerError>;

const HEADER_SIZE: usize = 0x14;
const FAT_HEADER_SIZE: usize = 0x0C;
const FAT_NODE_SIZE: usize = 0x10;
const FNT_HEADER_SIZE: usize = 0x08;
const HASH_MULTIPLIER: u32 = 0x65;
const VERSION: u16 = 0x0100;
const NAME_FLAG: u32 = 0x0100_0000;
const DEFAULT_ALIGNMENT: usize = 4;

#[derive(BinRead, Debug)]
#[br(magic = b"SARC")]
struct ResHeader {
    header_size: u16,
    _bom: u16,
    file_size: u32,
    data_offset: u32,
    _version: u16,
    _reserved: u16,
}

#[derive(BinRead, Debug)]
#[br(magic = b"SFAT")]
struct ResFatHeader {
    header_size: u16,
    node_count: u16,
    _hash_multiplier: u32,
    #[br(count = node_count)]
    nodes: Vec<ResFatNode>,
}

#[derive(BinRead, Debug, Clone, Copy)]
struct ResFatNode {
    _name_hash: u32,
    name_attributes: u32,
    data_begin: u32,
    data_end: u32,
}

#[derive(BinRead, Debug)]
#[br(magic = b"SFNT")]
struct ResFntHeader {
    header_size: u16,
    _reserved: u16,
}

fn corrupt(reason: impl Into<String>) -> ContainerError {
    ContainerError::CorruptContainer(reason.into())
}

fn parse_error(err: binread::Error) -> ContainerError {
    corrupt(format!("{:?}", err))
}

// Bytes are folded in as signed chars.
fn hash_name(multiplier: u32, name: &str) -> u32 {
    name.bytes().fold(0, |hash: u32, b| {
        hash.wrapping_mul(multiplier)
            .wrapping_add(b as i8 as i32 as u32)
    })
}

fn check_name(name: &str) -> Result<()> {
    let escapes = Path::new(name).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if name.is_empty() || escapes {
        return Err(corrupt(format!("entry name '{}' escapes its container", name)));
    }
    Ok(())
}

fn align(value: usize, increment: usize) -> usize {
    let tmp = value % increment;
    if tmp > 0 {
        value + (increment - tmp)
    } else {
        value
    }
}

fn alignment_for(name: &str) -> usize {
    match extension(name) {
        Some(".bars") | Some(".bfwav") | Some(".bfstp") | Some(".bfstm") => 0x20,
        Some(".bfres") | Some(".sbfres") | Some(".sbitemico") | Some(".bntx") => 0x1000,
        _ => DEFAULT_ALIGNMENT,
    }
}

fn read_name(raw: &[u8], start: usize, limit: usize) -> Result<String> {
    let region = raw
        .get(start..limit)
        .ok_or_else(|| corrupt(format!("name offset 0x{:x} is out of bounds", start)))?;
    let end = region
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| corrupt("unterminated entry name"))?;
    String::from_utf8(region[..end].to_vec())
        .map_err(|e| ContainerError::BadName(String::from_utf8_lossy(e.as_bytes()).to_string()))
}

#[derive(Debug, Clone)]
pub struct Container {
    entries: IndexMap<String, Vec<u8>>,
    compression: CompressionFormat,
    endian: Endian,
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a == b)
    }
}

impl Container {
    pub fn new(compression: CompressionFormat, endian: Endian) -> Self {
        Container {
            entries: IndexMap::new(),
            compression,
            endian,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let compression = CompressionFormat::detect(bytes);
        let raw = compression
            .decompress(bytes)
            .map_err(|err| corrupt(format!("bad compression wrapper: {}", err)))?;
        if raw.len() < HEADER_SIZE {
            return Err(corrupt("buffer is smaller than the SARC header"));
        }
        let endian = Endian::from_bom(&raw[6..8]).ok_or_else(|| corrupt("invalid byte order mark"))?;

        let mut cursor = Cursor::new(raw.as_slice());
        let header: ResHeader = cursor.read_type(endian.into()).map_err(parse_error)?;
        if header.header_size as usize != HEADER_SIZE {
            return Err(corrupt(format!("unexpected header size 0x{:x}", header.header_size)));
        }
        if header.file_size as usize != raw.len() {
            return Err(corrupt(format!(
                "header declares 0x{:x} bytes but the buffer holds 0x{:x}",
                header.file_size,
                raw.len()
            )));
        }
        let data_offset = header.data_offset as usize;
        if data_offset > raw.len() {
            return Err(corrupt("data offset is past the end of the buffer"));
        }

        let fat: ResFatHeader = cursor.read_type(endian.into()).map_err(parse_error)?;
        if fat.header_size as usize != FAT_HEADER_SIZE {
            return Err(corrupt("unexpected SFAT header size"));
        }
        let fnt: ResFntHeader = cursor.read_type(endian.into()).map_err(parse_error)?;
        if fnt.header_size as usize != FNT_HEADER_SIZE {
            return Err(corrupt("unexpected SFNT header size"));
        }
        let names_start = cursor.position() as usize;
        if names_start > data_offset {
            return Err(corrupt("node table overlaps the data section"));
        }

        let mut located: Vec<(usize, String, usize)> = Vec::with_capacity(fat.nodes.len());
        for node in &fat.nodes {
            if node.name_attributes & NAME_FLAG == 0 {
                return Err(corrupt("unnamed entries are not supported"));
            }
            let name_offset = (node.name_attributes & 0x00FF_FFFF) as usize * 4;
            let name = read_name(&raw, names_start + name_offset, data_offset)?;
            check_name(&name)?;
            let begin = data_offset + node.data_begin as usize;
            let end = data_offset + node.data_end as usize;
            if begin > end || end > raw.len() {
                return Err(corrupt(format!("entry '{}' has an out of bounds data range", name)));
            }
            located.push((begin, name, end));
        }
        located.sort_by_key(|(begin, _, end)| (*begin, *end));

        let mut container = Container::new(compression, endian);
        for (begin, name, end) in located {
            if container.entries.contains_key(&name) {
                return Err(corrupt(format!("duplicate entry '{}'", name)));
            }
            container.entries.insert(name, raw[begin..end].to_vec());
        }
        Ok(container)
    }

    // .pack files are always stored raw.
    pub fn encode(&self, file_name: &str, endian: Endian) -> Result<Vec<u8>> {
        let raw = self.serialize(endian)?;
        if extension(file_name) == Some(".pack") {
            Ok(raw)
        } else {
            Ok(self.compression.compress(&raw)?)
        }
    }

    fn serialize(&self, endian: Endian) -> Result<Vec<u8>> {
        if self.entries.len() > u16::MAX as usize {
            return Err(ContainerError::TooManyEntries(self.entries.len()));
        }

        // Names section and per-entry name offsets.
        let mut raw_names: Vec<u8> = Vec::new();
        let mut name_offsets: Vec<usize> = Vec::with_capacity(self.entries.len());
        for name in self.entries.keys() {
            name_offsets.push(raw_names.len());
            raw_names.extend_from_slice(name.as_bytes());
            raw_names.push(0);
            while raw_names.len() % 4 != 0 {
                raw_names.push(0);
            }
        }

        let names_start =
            HEADER_SIZE + FAT_HEADER_SIZE + self.entries.len() * FAT_NODE_SIZE + FNT_HEADER_SIZE;
        let max_alignment = self
            .entries
            .keys()
            .map(|name| alignment_for(name))
            .max()
            .unwrap_or(DEFAULT_ALIGNMENT);
        let data_offset = align(names_start + raw_names.len(), max_alignment);

        // Data laid out in iteration order.
        let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(self.entries.len());
        let mut end_of_data = data_offset;
        for (name, data) in &self.entries {
            let begin = align(end_of_data, alignment_for(name));
            ranges.push((begin - data_offset, begin - data_offset + data.len()));
            end_of_data = begin + data.len();
        }

        // Node table sorted by hash.
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        let hashes: Vec<u32> = self
            .entries
            .keys()
            .map(|name| hash_name(HASH_MULTIPLIER, name))
            .collect();
        order.sort_by_key(|i| hashes[*i]);

        let mut out = vec![0u8; end_of_data];
        let put_u16 = |buf: &mut [u8], value: u16| match endian {
            Endian::Little => LittleEndian::write_u16(buf, value),
            Endian::Big => BigEndian::write_u16(buf, value),
        };
        let put_u32 = |buf: &mut [u8], value: u32| match endian {
            Endian::Little => LittleEndian::write_u32(buf, value),
            Endian::Big => BigEndian::write_u32(buf, value),
        };

        out[0..4].copy_from_slice(b"SARC");
        put_u16(&mut out[4..6], HEADER_SIZE as u16);
        put_u16(&mut out[6..8], 0xFEFF);
        put_u32(&mut out[8..12], end_of_data as u32);
        put_u32(&mut out[12..16], data_offset as u32);
        put_u16(&mut out[16..18], VERSION);

        let fat = HEADER_SIZE;
        out[fat..fat + 4].copy_from_slice(b"SFAT");
        put_u16(&mut out[fat + 4..fat + 6], FAT_HEADER_SIZE as u16);
        put_u16(&mut out[fat + 6..fat + 8], self.entries.len() as u16);
        put_u32(&mut out[fat + 8..fat + 12], HASH_MULTIPLIER);
        for (slot, index) in order.iter().enumerate() {
            let node = fat + FAT_HEADER_SIZE + slot * FAT_NODE_SIZE;
            let (begin, end) = ranges[*index];
            put_u32(&mut out[node..node + 4], hashes[*index]);
            put_u32(
                &mut out[node + 4..node + 8],
                NAME_FLAG | (name_offsets[*index] / 4) as u32,
            );
            put_u32(&mut out[node + 8..node + 12], begin as u32);
            put_u32(&mut out[node + 12..node + 16], end as u32);
        }

        let fnt = names_start - FNT_HEADER_SIZE;
        out[fnt..fnt + 4].copy_from_slice(b"SFNT");
        put_u16(&mut out[fnt + 4..fnt + 6], FNT_HEADER_SIZE as u16);
        out[names_start..names_start + raw_names.len()].copy_from_slice(&raw_names);

        for ((_, data), (begin, _)) in self.entries.iter().zip(ranges.iter()) {
            let start = data_offset + begin;
            out[start..start + data.len()].copy_from_slice(data);
        }
        Ok(out)
    }

    pub fn from_dir(dir: &Path, template: &Container) -> Result<Self> {
        let mut found: Vec<String> = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ContainerError::IOError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|_| corrupt("scratch entry escaped its directory"))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            found.push(name);
        }

        let mut ordered: Vec<&String> = template
            .entries
            .keys()
            .filter(|name| found.contains(*name))
            .collect();
        let mut added: Vec<&String> = found
            .iter()
            .filter(|name| !template.entries.contains_key(*name))
            .collect();
        added.sort();
        ordered.extend(added);

        let mut container = Container::new(template.compression, template.endian);
        for name in ordered {
            let bytes = std::fs::read(dir.join(name))?;
            container.entries.insert(name.clone(), bytes);
        }
        Ok(container)
    }

    pub fn extract_to(&self, dir: &Path) -> Result<()> {
        for (name, data) in &self.entries {
            check_name(name)?;
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, data)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Vec<u8>> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: &str, data: Vec<u8>) {
        self.entries.insert(name.to_string(), data);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.entries.shift_remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn entries(&self) -> &IndexMap<String, Vec<u8>> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn compression(&self) -> CompressionFormat {
        self.compression
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Yaz0CompressionFormat;

    fn sample(compression: CompressionFormat) -> Container {
        let mut container = Container::new(compression, Endian::Big);
        container.insert("Actor/ActorLink/Npc.bxml", b"actor link".to_vec());
        container.insert("Sound/Resource/Npc.bars", vec![0x42; 0x31]);
        container.insert("Model/Npc.sbfres", vec![0x7; 9]);
        container.insert("A.txt", Vec::new());
        container
    }

    #[test]
    fn round_trip_preserves_names_data_and_order() {
        let container = sample(CompressionFormat::None);
        let bytes = container.encode("Npc.bactorpack", Endian::Little).unwrap();
        let decoded = Container::decode(&bytes).unwrap();
        assert_eq!(container, decoded);
        let names: Vec<&String> = decoded.names().collect();
        assert_eq!(
            vec![
                "Actor/ActorLink/Npc.bxml",
                "Sound/Resource/Npc.bars",
                "Model/Npc.sbfres",
                "A.txt"
            ],
            names
        );
        assert_eq!(Endian::Little, decoded.endian());
    }

    #[test]
    fn round_trip_big_endian() {
        let container = sample(CompressionFormat::None);
        let bytes = container.encode("Npc.bactorpack", Endian::Big).unwrap();
        assert_eq!(&[0xFE, 0xFF], &bytes[6..8]);
        assert_eq!(container, Container::decode(&bytes).unwrap());
    }

    #[test]
    fn compressed_container_stays_compressed() {
        let container = sample(CompressionFormat::Yaz0(Yaz0CompressionFormat {}));
        let bytes = container.encode("Npc.sbactorpack", Endian::Little).unwrap();
        assert_eq!(b"Yaz0", &bytes[0..4]);
        let decoded = Container::decode(&bytes).unwrap();
        assert!(decoded.compression().is_compressed());
        assert_eq!(container, decoded);
    }

    #[test]
    fn pack_extension_is_never_compressed() {
        let container = sample(CompressionFormat::Yaz0(Yaz0CompressionFormat {}));
        let bytes = container.encode("Bootup.pack", Endian::Little).unwrap();
        assert_eq!(b"SARC", &bytes[0..4]);
    }

    #[test]
    fn data_is_aligned() {
        let container = sample(CompressionFormat::None);
        let bytes = container.encode("Npc.bactorpack", Endian::Little).unwrap();
        let data_offset = LittleEndian::read_u32(&bytes[12..16]) as usize;
        assert_eq!(0, data_offset % 0x1000);
        let node_table = HEADER_SIZE + FAT_HEADER_SIZE;
        for i in 0..container.len() {
            let node = node_table + i * FAT_NODE_SIZE;
            let begin = LittleEndian::read_u32(&bytes[node + 8..node + 12]) as usize;
            assert_eq!(0, (data_offset + begin) % DEFAULT_ALIGNMENT);
        }
    }

    #[test]
    fn node_table_is_sorted_by_hash() {
        let container = sample(CompressionFormat::None);
        let bytes = container.encode("Npc.bactorpack", Endian::Little).unwrap();
        let node_table = HEADER_SIZE + FAT_HEADER_SIZE;
        let hashes: Vec<u32> = (0..container.len())
            .map(|i| {
                let node = node_table + i * FAT_NODE_SIZE;
                LittleEndian::read_u32(&bytes[node..node + 4])
            })
            .collect();
        let mut sorted = hashes.clone();
        sorted.sort();
        assert_eq!(sorted, hashes);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut bytes = sample(CompressionFormat::None)
            .encode("Npc.bactorpack", Endian::Little)
            .unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Container::decode(&bytes),
            Err(ContainerError::CorruptContainer(_))
        ));
    }

    #[test]
    fn decode_rejects_size_mismatch() {
        let mut bytes = sample(CompressionFormat::None)
            .encode("Npc.bactorpack", Endian::Little)
            .unwrap();
        bytes.push(0);
        assert!(matches!(
            Container::decode(&bytes),
            Err(ContainerError::CorruptContainer(_))
        ));
    }

    #[test]
    fn decode_rejects_out_of_bounds_entry() {
        let mut bytes = sample(CompressionFormat::None)
            .encode("Npc.bactorpack", Endian::Little)
            .unwrap();
        let node = HEADER_SIZE + FAT_HEADER_SIZE;
        LittleEndian::write_u32(&mut bytes[node + 12..node + 16], 0x00FF_FFFF);
        assert!(matches!(
            Container::decode(&bytes),
            Err(ContainerError::CorruptContainer(_))
        ));
    }

    #[test]
    fn decode_rejects_tiny_buffer() {
        assert!(Container::decode(b"SARC").is_err());
    }

    #[test]
    fn decode_rejects_names_leaving_the_container() {
        for name in ["../../escaped.bars", "/etc/escaped.bars", "Sound/../../escaped.bars"] {
            let mut container = Container::new(CompressionFormat::None, Endian::Little);
            container.insert(name, b"BARS".to_vec());
            let bytes = container.serialize(Endian::Little).unwrap();
            assert!(matches!(
                Container::decode(&bytes),
                Err(ContainerError::CorruptContainer(_))
            ));

            let dir = tempfile::tempdir().unwrap();
            let scratch = dir.path().join("scratch/Title.pack");
            assert!(container.extract_to(&scratch).is_err());
            assert!(!dir.path().join("escaped.bars").exists());
        }
    }

    #[test]
    fn broken_yaz0_wrapper_is_a_corrupt_container() {
        assert!(matches!(
            Container::decode(b"Yaz0\x00\x00\x10\x00\x00\x00\x00\x00\x00\x00\x00\x00\xFF"),
            Err(ContainerError::CorruptContainer(_))
        ));
    }

    #[test]
    fn name_hash_uses_signed_bytes() {
        assert_eq!(0x0000_0041, hash_name(HASH_MULTIPLIER, "A"));
        assert_eq!(0xFFFF_E798, hash_name(HASH_MULTIPLIER, "\u{e9}"));
    }

    #[test]
    fn extract_and_collect_directory() {
        let container = sample(CompressionFormat::None);
        let dir = tempfile::tempdir().unwrap();
        container.extract_to(dir.path()).unwrap();
        assert!(dir.path().join("Sound/Resource/Npc.bars").exists());

        std::fs::remove_file(dir.path().join("Model/Npc.sbfres")).unwrap();
        std::fs::write(dir.path().join("Model/Npc.Tex.sbfres"), b"tex").unwrap();
        std::fs::write(dir.path().join("B.txt"), b"b").unwrap();

        let collected = Container::from_dir(dir.path(), &container).unwrap();
        let names: Vec<&String> = collected.names().collect();
        assert_eq!(
            vec![
                "Actor/ActorLink/Npc.bxml",
                "Sound/Resource/Npc.bars",
                "A.txt",
                "B.txt",
                "Model/Npc.Tex.sbfres"
            ],
            names
        );
        assert_eq!(Some(&b"tex".to_vec()), collected.get("Model/Npc.Tex.sbfres"));
    }
}
