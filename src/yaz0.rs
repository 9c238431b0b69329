use std::cmp::min;

use crate::CompressionError;

type Result<T> = std::result::Result<T, CompressionError>;

const MAGIC: &[u8; 4] = b"Yaz0";
const HEADER_SIZE: usize = 0x10;
const WINDOW_SIZE: usize = 0x1000;
const MAX_MATCH_LENGTH: usize = 0xFF + 0x12;

const MIN_MATCH_LENGTH: usize = 3;
const HASH_BITS: u32 = 15;
const MAX_CHAIN: usize = 256;
const NIL: u32 = u32::MAX;

// Hash chains over every three byte prefix seen so far, most recent first.
struct MatchFinder<'a> {
    bytes: &'a [u8],
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl<'a> MatchFinder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        MatchFinder {
            bytes,
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; bytes.len()],
        }
    }

    fn hash(&self, position: usize) -> Option<usize> {
        let prefix = self.bytes.get(position..position + MIN_MATCH_LENGTH)?;
        let key = u32::from(prefix[0]) << 16 | u32::from(prefix[1]) << 8 | u32::from(prefix[2]);
        Some((key.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize)
    }

    fn insert(&mut self, position: usize) {
        if let Some(hash) = self.hash(position) {
            self.prev[position] = self.head[hash];
            self.head[hash] = position as u32;
        }
    }

    // Longest match for bytes[position..] starting inside the window, as
    // (length, distance). Matches may run into the bytes being encoded, which
    // the decoder handles by copying one byte at a time.
    fn longest_match(&self, position: usize) -> (usize, usize) {
        let hash = match self.hash(position) {
            Some(hash) => hash,
            None => return (0, 0),
        };
        let max_length = min(self.bytes.len() - position, MAX_MATCH_LENGTH);
        let wanted = &self.bytes[position..position + max_length];
        let mut best = (0, 0);
        let mut candidate = self.head[hash];
        let mut steps = 0;
        while candidate != NIL && steps < MAX_CHAIN {
            let start = candidate as usize;
            let distance = position - start;
            if distance > WINDOW_SIZE {
                break;
            }
            let length = self.bytes[start..]
                .iter()
                .zip(wanted)
                .take_while(|(a, b)| a == b)
                .count();
            if length > best.0 {
                best = (length, distance);
                if length == max_length {
                    break;
                }
            }
            candidate = self.prev[start];
            steps += 1;
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Yaz0CompressionFormat;

impl Yaz0CompressionFormat {
    pub fn is_compressed(&self, bytes: &[u8]) -> bool {
        bytes.len() >= HEADER_SIZE && &bytes[0..4] == MAGIC
    }

    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::with_capacity(HEADER_SIZE + bytes.len() + bytes.len() / 8 + 1);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&[0; 8]);

        let mut finder = MatchFinder::new(bytes);
        let mut out_buffer = [0; 8 * 3 + 1];
        let mut buffer_length = 1;
        let mut buffered_blocks = 0;
        let mut read_bytes = 0;
        while read_bytes < bytes.len() {
            if buffered_blocks == 8 {
                buf.extend_from_slice(&out_buffer[0..buffer_length]);
                out_buffer[0] = 0;
                buffer_length = 1;
                buffered_blocks = 0;
            }

            let (length, disp) = finder.longest_match(read_bytes);

            if length < MIN_MATCH_LENGTH {
                finder.insert(read_bytes);
                out_buffer[0] |= 1 << (7 - buffered_blocks);
                out_buffer[buffer_length] = bytes[read_bytes];
                buffer_length += 1;
                read_bytes += 1;
            } else {
                for position in read_bytes..read_bytes + length {
                    finder.insert(position);
                }
                read_bytes += length;
                let disp = disp - 1;
                if length >= 0x12 {
                    out_buffer[buffer_length] = ((disp >> 8) & 0x0F) as u8;
                    out_buffer[buffer_length + 1] = (disp & 0xFF) as u8;
                    out_buffer[buffer_length + 2] = (length - 0x12) as u8;
                    buffer_length += 3;
                } else {
                    out_buffer[buffer_length] = (((length - 2) << 4) | ((disp >> 8) & 0x0F)) as u8;
                    out_buffer[buffer_length + 1] = (disp & 0xFF) as u8;
                    buffer_length += 2;
                }
            }
            buffered_blocks += 1;
        }
        if buffered_blocks > 0 {
            buf.extend_from_slice(&out_buffer[0..buffer_length]);
        }
        Ok(buf)
    }

    pub fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if !self.is_compressed(bytes) {
            return Err(CompressionError::InvalidInput("Yaz0".to_string()));
        }
        let size = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let mut output: Vec<u8> = Vec::with_capacity(size);
        let mut position = HEADER_SIZE;
        let next = |position: &mut usize, produced: usize| -> Result<u8> {
            let value = *bytes
                .get(*position)
                .ok_or(CompressionError::Truncated(size, produced))?;
            *position += 1;
            Ok(value)
        };

        while output.len() < size {
            let header = next(&mut position, output.len())?;
            for bit in (0..8).rev() {
                if output.len() >= size {
                    break;
                }
                if header & (1 << bit) != 0 {
                    output.push(next(&mut position, output.len())?);
                    continue;
                }
                let b1 = next(&mut position, output.len())? as usize;
                let b2 = next(&mut position, output.len())? as usize;
                let disp = (((b1 & 0x0F) << 8) | b2) + 1;
                let length = match b1 >> 4 {
                    0 => next(&mut position, output.len())? as usize + 0x12,
                    n => n + 2,
                };
                if disp > output.len() {
                    return Err(CompressionError::InvalidInput("Yaz0".to_string()));
                }
                let start = output.len() - disp;
                for i in 0..length {
                    if output.len() >= size {
                        break;
                    }
                    let value = output[start + i];
                    output.push(value);
                }
            }
        }
        Ok(output)
    }

    pub fn decompress_if_needed(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        if self.is_compressed(&bytes) {
            self.decompress(&bytes)
        } else {
            Ok(bytes)
        }
    }
}
