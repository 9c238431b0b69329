use std::convert::TryFrom;

use crate::EndianAwareIOError;

type Result<T> = std::result::Result<T, EndianAwareIOError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    // 0xFEFF is always stored in the file's own byte order.
    pub fn from_bom(bytes: &[u8]) -> Option<Endian> {
        match bytes {
            [0xFE, 0xFF] => Some(Endian::Big),
            [0xFF, 0xFE] => Some(Endian::Little),
            _ => None,
        }
    }

    pub fn decode_u16(&self, bytes: &[u8]) -> Result<u16> {
        let arr = <[u8; 2]>::try_from(bytes).map_err(|_| EndianAwareIOError::ConversionError)?;
        Ok(match self {
            Endian::Little => u16::from_le_bytes(arr),
            Endian::Big => u16::from_be_bytes(arr),
        })
    }

    pub fn decode_u32(&self, bytes: &[u8]) -> Result<u32> {
        let arr = <[u8; 4]>::try_from(bytes).map_err(|_| EndianAwareIOError::ConversionError)?;
        Ok(match self {
            Endian::Little => u32::from_le_bytes(arr),
            Endian::Big => u32::from_be_bytes(arr),
        })
    }

    pub fn encode_u16(&self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn encode_u32(&self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn read_u16_at(&self, bytes: &[u8], address: usize) -> Result<u16> {
        let slice = bytes
            .get(address..address + 2)
            .ok_or(EndianAwareIOError::ConversionError)?;
        self.decode_u16(slice)
    }

    pub fn read_u32_at(&self, bytes: &[u8], address: usize) -> Result<u32> {
        let slice = bytes
            .get(address..address + 4)
            .ok_or(EndianAwareIOError::ConversionError)?;
        self.decode_u32(slice)
    }

    pub fn write_u16_at(&self, bytes: &mut [u8], address: usize, value: u16) -> Result<()> {
        let slice = bytes
            .get_mut(address..address + 2)
            .ok_or(EndianAwareIOError::ConversionError)?;
        slice.copy_from_slice(&self.encode_u16(value));
        Ok(())
    }

    pub fn write_u32_at(&self, bytes: &mut [u8], address: usize, value: u32) -> Result<()> {
        let slice = bytes
            .get_mut(address..address + 4)
            .ok_or(EndianAwareIOError::ConversionError)?;
        slice.copy_from_slice(&self.encode_u32(value));
        Ok(())
    }
}

impl From<Endian> for binread::Endian {
    fn from(endian: Endian) -> Self {
        match endian {
            Endian::Little => binread::Endian::Little,
            Endian::Big => binread::Endian::Big,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_bom() {
        assert_eq!(Some(Endian::Big), Endian::from_bom(&[0xFE, 0xFF]));
        assert_eq!(Some(Endian::Little), Endian::from_bom(&[0xFF, 0xFE]));
        assert_eq!(None, Endian::from_bom(&[0x00, 0xFF]));
        assert_eq!(None, Endian::from_bom(&[0xFE]));
    }

    #[test]
    fn decode_u32() {
        assert_eq!(
            0xFE131415,
            Endian::Little
                .decode_u32(&[0x15, 0x14, 0x13, 0xFE])
                .unwrap()
        );
        assert_eq!(
            0xFE131415,
            Endian::Big.decode_u32(&[0xFE, 0x13, 0x14, 0x15]).unwrap()
        );
    }

    #[test]
    fn read_at_rejects_out_of_bounds() {
        let bytes = [0x01, 0x02, 0x03];
        assert!(Endian::Big.read_u32_at(&bytes, 0).is_err());
        assert_eq!(0x0203, Endian::Big.read_u16_at(&bytes, 1).unwrap());
    }

    #[test]
    fn write_at_swaps_order() {
        let mut bytes = vec![0; 6];
        Endian::Big.write_u32_at(&mut bytes, 2, 0x11223344).unwrap();
        assert_eq!(vec![0, 0, 0x11, 0x22, 0x33, 0x44], bytes);
        Endian::Little.write_u16_at(&mut bytes, 0, 0xFEFF).unwrap();
        assert_eq!(&[0xFF, 0xFE], &bytes[0..2]);
    }
}
