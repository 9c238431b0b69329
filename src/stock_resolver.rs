use tracing::debug;

use crate::{bars, Container, ReferenceCorpus, ReferenceError};

type Result<T> = std::result::Result<T, ReferenceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLookupKey {
    pub track: String,
    pub bank: String,
    pub chain: Vec<String>,
}

impl StockLookupKey {
    pub fn new(track: &str, bank: &str, chain: Vec<String>) -> Self {
        StockLookupKey {
            track: track.to_string(),
            bank: bank.to_string(),
            chain,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.chain.last().map(|name| name.as_str())
    }

    fn bank_path(&self) -> String {
        format!("Sound/Resource/{}", self.bank)
    }
}

// Tiers: loose bank, then Pack/<origin>, then Event/<origin>.
pub struct StockResolver<'a> {
    corpus: &'a dyn ReferenceCorpus,
}

impl<'a> StockResolver<'a> {
    pub fn new(corpus: &'a dyn ReferenceCorpus) -> Self {
        StockResolver { corpus }
    }

    pub fn resolve(&self, key: &StockLookupKey) -> Result<Vec<u8>> {
        match self.loose_bank(key) {
            Ok(track) => return Ok(track),
            Err(err) => debug!("No loose stock bank for '{}': {}", key.bank, err),
        }
        if let Some(origin) = key.origin() {
            match self.packed_bank(key, &format!("Pack/{}", origin)) {
                Ok(track) => return Ok(track),
                Err(err) => debug!("No stock bank for '{}' in Pack/{}: {}", key.bank, origin, err),
            }
            match self.packed_bank(key, &format!("Event/{}", origin)) {
                Ok(track) => return Ok(track),
                Err(err) => debug!("No stock bank for '{}' in Event/{}: {}", key.bank, origin, err),
            }
        }
        Err(ReferenceError::ReferenceNotFound {
            track: key.track.clone(),
            bank: key.bank.clone(),
        })
    }

    fn loose_bank(&self, key: &StockLookupKey) -> Result<Vec<u8>> {
        let bytes = self.corpus.get_reference_file(&key.bank_path())?;
        track_from_bank(&bytes, key)
    }

    fn packed_bank(&self, key: &StockLookupKey, container_path: &str) -> Result<Vec<u8>> {
        let bytes = self.corpus.get_reference_file(container_path)?;
        let container = Container::decode(&bytes)?;
        let bank = container
            .get(&key.bank_path())
            .ok_or_else(|| ReferenceError::NotFound(format!("{}/{}", container_path, key.bank_path())))?;
        track_from_bank(bank, key)
    }
}

fn track_from_bank(bytes: &[u8], key: &StockLookupKey) -> Result<Vec<u8>> {
    let (mut tracks, _) = bars::split_tracks(bytes)?;
    tracks
        .swap_remove(&key.track)
        .ok_or_else(|| ReferenceError::ReferenceNotFound {
            track: key.track.clone(),
            bank: key.bank.clone(),
        })
}
