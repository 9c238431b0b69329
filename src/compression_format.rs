use crate::errors::CompressionError;
use crate::Yaz0CompressionFormat;

type Result<T> = std::result::Result<T, CompressionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    None,
    Yaz0(Yaz0CompressionFormat),
}

impl CompressionFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        let yaz0 = Yaz0CompressionFormat {};
        if yaz0.is_compressed(bytes) {
            CompressionFormat::Yaz0(yaz0)
        } else {
            CompressionFormat::None
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionFormat::None)
    }

    pub fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionFormat::None => Ok(bytes.to_vec()),
            CompressionFormat::Yaz0(c) => c.compress(bytes),
        }
    }

    pub fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionFormat::None => Ok(bytes.to_vec()),
            CompressionFormat::Yaz0(c) => c.decompress(bytes),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detect() {
        let yaz0 = Yaz0CompressionFormat {};
        let compressed = yaz0.compress(b"SARC").unwrap();
        assert!(CompressionFormat::detect(&compressed).is_compressed());
        assert_eq!(CompressionFormat::None, CompressionFormat::detect(b"SARC"));
    }
}
