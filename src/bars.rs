use indexmap::IndexMap;

use crate::{BankError, Endian};

type Result<T> = std::result::Result<T, BankError>;

const MAGIC: &[u8; 4] = b"BARS";
const AMTA_MAGIC: &[u8; 4] = b"AMTA";
const HEADER_SIZE: usize = 0x10;
const AMTA_HEADER_SIZE: usize = 0x1C;
const AMTA_SECTION_TABLE: usize = 0x0C;
const SECTION_HEADER_SIZE: usize = 0x08;
// Type, channel count, stream track count and flags are single bytes.
const DATA_BYTE_FIELDS: usize = 0x08;
const TRACK_HEADER_SIZE: usize = 0x10;
const TRACK_ALIGNMENT: usize = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Wave,
    Prefetch,
    Stream,
    Other([u8; 4]),
}

impl TrackKind {
    pub fn of(data: &[u8]) -> Self {
        match data.get(0..4) {
            Some(b"FWAV") => TrackKind::Wave,
            Some(b"FSTP") => TrackKind::Prefetch,
            Some(b"FSTM") => TrackKind::Stream,
            Some(magic) => TrackKind::Other([magic[0], magic[1], magic[2], magic[3]]),
            None => TrackKind::Other([0; 4]),
        }
    }

    pub fn magic(&self) -> [u8; 4] {
        match self {
            TrackKind::Wave => *b"FWAV",
            TrackKind::Prefetch => *b"FSTP",
            TrackKind::Stream => *b"FSTM",
            TrackKind::Other(magic) => *magic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSlot {
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackOffsetTable {
    slots: IndexMap<String, TrackSlot>,
}

impl TrackOffsetTable {
    pub fn get(&self, name: &str) -> Option<TrackSlot> {
        self.slots.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrackSlot)> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

struct TrackRecord {
    name: String,
    amta: Vec<u8>,
    slot: TrackSlot,
}

struct Bank {
    endian: Endian,
    version: u16,
    hashes: Vec<u32>,
    records: Vec<TrackRecord>,
}

fn malformed(reason: impl Into<String>) -> BankError {
    BankError::MalformedBank(reason.into())
}

fn align(value: usize, increment: usize) -> usize {
    let tmp = value % increment;
    if tmp > 0 {
        value + (increment - tmp)
    } else {
        value
    }
}

fn endian_at(bytes: &[u8], address: usize, fallback: Endian) -> Endian {
    bytes
        .get(address..address + 2)
        .and_then(Endian::from_bom)
        .unwrap_or(fallback)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Data,
    Mark,
    Ext,
    Strg,
}

impl Section {
    const ALL: [Section; 4] = [Section::Data, Section::Mark, Section::Ext, Section::Strg];

    fn magic(self) -> &'static [u8; 4] {
        match self {
            Section::Data => b"DATA",
            Section::Mark => b"MARK",
            Section::Ext => b"EXT_",
            Section::Strg => b"STRG",
        }
    }

    fn offset_field(self) -> usize {
        let index = match self {
            Section::Data => 0,
            Section::Mark => 1,
            Section::Ext => 2,
            Section::Strg => 3,
        };
        AMTA_SECTION_TABLE + index * 4
    }
}

// Payload range of a section, relative to the start of its AMTA block.
// A zero offset means the block does not carry the section.
fn section_range(block: &[u8], endian: Endian, section: Section) -> Result<Option<(usize, usize)>> {
    let offset = endian.read_u32_at(block, section.offset_field())? as usize;
    if offset == 0 {
        return Ok(None);
    }
    let magic = String::from_utf8_lossy(section.magic()).to_string();
    if offset < AMTA_HEADER_SIZE || block.get(offset..offset + 4) != Some(&section.magic()[..]) {
        return Err(malformed(format!("no {} section at AMTA offset 0x{:x}", magic, offset)));
    }
    let size = endian.read_u32_at(block, offset + 4)? as usize;
    let start = offset + SECTION_HEADER_SIZE;
    if start + size > block.len() {
        return Err(malformed(format!("{} section overruns its AMTA block", magic)));
    }
    Ok(Some((start, start + size)))
}

fn read_amta(bytes: &[u8], offset: usize, bank_endian: Endian) -> Result<(String, Vec<u8>)> {
    if bytes.get(offset..offset + 4) != Some(&AMTA_MAGIC[..]) {
        return Err(malformed(format!("no AMTA block at 0x{:x}", offset)));
    }
    let endian = endian_at(bytes, offset + 4, bank_endian);
    let size = endian.read_u32_at(bytes, offset + 8)? as usize;
    if size < AMTA_HEADER_SIZE || offset + size > bytes.len() {
        return Err(malformed(format!("AMTA block at 0x{:x} has a bad size", offset)));
    }
    let block = &bytes[offset..offset + size];
    let (start, end) = section_range(block, endian, Section::Strg)?
        .ok_or_else(|| malformed(format!("AMTA block at 0x{:x} has no STRG section", offset)))?;
    let strg = &block[start..end];
    let name_end = strg
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| malformed("unterminated track name"))?;
    let name = String::from_utf8(strg[..name_end].to_vec())
        .map_err(|_| malformed("track name is not valid UTF-8"))?;
    Ok((name, block.to_vec()))
}

fn swap_u32(bytes: &mut [u8], address: usize, source: Endian, target: Endian) -> Result<()> {
    let value = source.read_u32_at(bytes, address)?;
    target.write_u32_at(bytes, address, value)?;
    Ok(())
}

// Every AMTA field is a u32 apart from the BOM, the version and the byte
// fields of DATA. STRG only holds text.
fn convert_amta(bytes: &mut [u8], offset: usize, bank_endian: Endian, target: Endian) -> Result<()> {
    let source = endian_at(bytes, offset + 4, bank_endian);
    let size = source.read_u32_at(bytes, offset + 8)? as usize;
    let block = bytes
        .get_mut(offset..offset + size)
        .ok_or_else(|| malformed(format!("AMTA block at 0x{:x} has a bad size", offset)))?;

    let mut sections = Vec::with_capacity(Section::ALL.len());
    for section in Section::ALL.iter() {
        if let Some(range) = section_range(block, source, *section)? {
            sections.push((*section, range));
        }
    }

    let version = source.read_u16_at(block, 6)?;
    target.write_u16_at(block, 4, 0xFEFF)?;
    target.write_u16_at(block, 6, version)?;
    swap_u32(block, 8, source, target)?;
    for field in (AMTA_SECTION_TABLE..AMTA_HEADER_SIZE).step_by(4) {
        swap_u32(block, field, source, target)?;
    }
    for (section, (start, end)) in sections {
        swap_u32(block, start - 4, source, target)?;
        if section == Section::Strg {
            continue;
        }
        let mut field = start;
        while field + 4 <= end {
            if !(section == Section::Data && field - start == DATA_BYTE_FIELDS) {
                swap_u32(block, field, source, target)?;
            }
            field += 4;
        }
    }
    Ok(())
}

fn track_length(bytes: &[u8], offset: usize, bank_endian: Endian) -> Result<usize> {
    if offset + TRACK_HEADER_SIZE > bytes.len() {
        return Err(malformed(format!("track header at 0x{:x} is out of bounds", offset)));
    }
    let endian = endian_at(bytes, offset + 4, bank_endian);
    let length = endian.read_u32_at(bytes, offset + 0x0C)? as usize;
    if length < TRACK_HEADER_SIZE || offset + length > bytes.len() {
        return Err(malformed(format!("track at 0x{:x} overruns the bank", offset)));
    }
    Ok(length)
}

impl Bank {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
            return Err(malformed("missing BARS header"));
        }
        let endian =
            Endian::from_bom(&bytes[8..10]).ok_or_else(|| malformed("invalid byte order mark"))?;
        let file_size = endian.read_u32_at(bytes, 0x04)? as usize;
        if file_size != bytes.len() {
            return Err(malformed(format!(
                "header declares 0x{:x} bytes but the buffer holds 0x{:x}",
                file_size,
                bytes.len()
            )));
        }
        let version = endian.read_u16_at(bytes, 0x0A)?;
        let count = endian.read_u32_at(bytes, 0x0C)? as usize;
        let table_end = count
            .checked_mul(12)
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .ok_or_else(|| malformed("track count overflows"))?;
        if table_end > bytes.len() {
            return Err(malformed(format!("offset table for {} tracks is truncated", count)));
        }

        let mut hashes = Vec::with_capacity(count);
        for i in 0..count {
            hashes.push(endian.read_u32_at(bytes, HEADER_SIZE + i * 4)?);
        }
        let pairs = HEADER_SIZE + count * 4;
        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let amta_offset = endian.read_u32_at(bytes, pairs + i * 8)? as usize;
            let track_offset = endian.read_u32_at(bytes, pairs + i * 8 + 4)? as usize;
            let (name, amta) = read_amta(bytes, amta_offset, endian)?;
            let length = track_length(bytes, track_offset, endian)?;
            records.push(TrackRecord {
                name,
                amta,
                slot: TrackSlot {
                    offset: track_offset,
                    length,
                },
            });
        }
        Ok(Bank {
            endian,
            version,
            hashes,
            records,
        })
    }

    fn contains(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name)
    }

    // Lays the bank out from scratch: header, table, AMTA blocks, then 0x20 aligned tracks.
    fn serialize(&self, raw: &[u8], replacements: &IndexMap<String, Vec<u8>>) -> Result<Vec<u8>> {
        let endian = self.endian;
        let count = self.records.len();
        let mut out = vec![0u8; HEADER_SIZE + count * 12];

        let mut amta_offsets = Vec::with_capacity(count);
        for record in &self.records {
            amta_offsets.push(out.len());
            out.extend_from_slice(&record.amta);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }

        let mut track_offsets = Vec::with_capacity(count);
        for record in &self.records {
            let data = match replacements.get(&record.name) {
                Some(data) => &data[..],
                None => &raw[record.slot.offset..record.slot.offset + record.slot.length],
            };
            out.resize(align(out.len(), TRACK_ALIGNMENT), 0);
            track_offsets.push(out.len());
            out.extend_from_slice(data);
        }

        out[0..4].copy_from_slice(MAGIC);
        let size = out.len() as u32;
        endian.write_u32_at(&mut out, 0x04, size)?;
        endian.write_u16_at(&mut out, 0x08, 0xFEFF)?;
        endian.write_u16_at(&mut out, 0x0A, self.version)?;
        endian.write_u32_at(&mut out, 0x0C, count as u32)?;
        for (i, hash) in self.hashes.iter().enumerate() {
            endian.write_u32_at(&mut out, HEADER_SIZE + i * 4, *hash)?;
        }
        let pairs = HEADER_SIZE + count * 4;
        for i in 0..count {
            endian.write_u32_at(&mut out, pairs + i * 8, amta_offsets[i] as u32)?;
            endian.write_u32_at(&mut out, pairs + i * 8 + 4, track_offsets[i] as u32)?;
        }
        Ok(out)
    }
}

pub fn split_tracks(bytes: &[u8]) -> Result<(IndexMap<String, Vec<u8>>, TrackOffsetTable)> {
    let bank = Bank::parse(bytes)?;
    let mut tracks = IndexMap::new();
    let mut table = TrackOffsetTable::default();
    for record in bank.records {
        let TrackSlot { offset, length } = record.slot;
        tracks.insert(record.name.clone(), bytes[offset..offset + length].to_vec());
        table.slots.insert(record.name, record.slot);
    }
    Ok((tracks, table))
}

// Equal-length replacements are spliced in place. Any other length lays the
// whole bank out again.
pub fn rebuild_bank(
    bytes: &[u8],
    replacements: &IndexMap<String, Vec<u8>>,
    endian: Endian,
) -> Result<Vec<u8>> {
    let bank = Bank::parse(bytes)?;
    if let Some(name) = replacements.keys().find(|name| !bank.contains(name)) {
        return Err(BankError::UnknownTrack(name.clone()));
    }

    let fits = bank.records.iter().all(|record| {
        replacements
            .get(&record.name)
            .map_or(true, |data| data.len() == record.slot.length)
    });
    let mut out = if fits {
        let mut out = bytes.to_vec();
        for record in &bank.records {
            if let Some(data) = replacements.get(&record.name) {
                let TrackSlot { offset, length } = record.slot;
                out[offset..offset + length].copy_from_slice(data);
            }
        }
        out
    } else {
        bank.serialize(bytes, replacements)?
    };
    convert_byte_order(&mut out, endian)?;
    Ok(out)
}

pub fn convert_byte_order(bytes: &mut [u8], target: Endian) -> Result<()> {
    let bank = Bank::parse(bytes)?;
    let source = bank.endian;
    let count = bank.records.len();

    let file_size = source.read_u32_at(bytes, 0x04)?;
    target.write_u32_at(bytes, 0x04, file_size)?;
    target.write_u16_at(bytes, 0x08, 0xFEFF)?;
    target.write_u16_at(bytes, 0x0A, bank.version)?;
    target.write_u32_at(bytes, 0x0C, count as u32)?;
    for i in 0..count * 3 {
        let address = HEADER_SIZE + i * 4;
        let value = source.read_u32_at(bytes, address)?;
        target.write_u32_at(bytes, address, value)?;
    }

    let pairs = HEADER_SIZE + count * 4;
    for i in 0..count {
        let offset = target.read_u32_at(bytes, pairs + i * 8)? as usize;
        convert_amta(bytes, offset, source, target)?;
    }
    Ok(())
}
