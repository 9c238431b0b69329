use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use crate::Endian;

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[strum(serialize = "wiiu", serialize = "WiiU")]
    WiiU,
    #[strum(serialize = "switch", serialize = "Switch")]
    Switch,
}

impl Platform {
    pub fn endian(&self) -> Endian {
        match self {
            Platform::WiiU => Endian::Big,
            Platform::Switch => Endian::Little,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::WiiU => "wiiu",
            Platform::Switch => "switch",
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Switch
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
