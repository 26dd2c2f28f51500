//! EEPROM regions that can be dumped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::protocol::constants::{CALIB_BASE, CHUNK_SIZE, EEPROM_SIZE};

/// Named address range of the 0x2000-byte EEPROM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Channel and settings area, `[0x0000, 0x1E00)`.
    #[default]
    Config,
    /// Factory calibration, `[0x1E00, 0x2000)`.
    Calib,
    /// Everything, `[0x0000, 0x2000)`.
    All,
}

/// Contiguous EEPROM span, a whole number of chunks long and inside the
/// EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    base: u32,
    size: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Range size 0x{0:X} is not a multiple of the chunk size")]
    Unaligned(u32),
    #[error("Range 0x{base:04X}+0x{size:X} exceeds the EEPROM")]
    OutOfBounds { base: u32, size: u32 },
}

impl AddressRange {
    pub fn new(base: u32, size: u32) -> Result<Self, RangeError> {
        if size % CHUNK_SIZE as u32 != 0 {
            return Err(RangeError::Unaligned(size));
        }
        match base.checked_add(size) {
            Some(end) if end <= EEPROM_SIZE => Ok(Self { base, size }),
            _ => Err(RangeError::OutOfBounds { base, size }),
        }
    }

    const fn from_parts(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    pub const fn base(&self) -> u32 {
        self.base
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    pub const fn end(&self) -> u32 {
        self.base + self.size
    }
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Config, Region::Calib, Region::All];

    pub const fn range(self) -> AddressRange {
        match self {
            Region::Config => AddressRange::from_parts(0, CALIB_BASE),
            Region::Calib => AddressRange::from_parts(CALIB_BASE, EEPROM_SIZE - CALIB_BASE),
            Region::All => AddressRange::from_parts(0, EEPROM_SIZE),
        }
    }

    pub const fn size(self) -> u32 {
        self.range().size()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Region::Config => "config",
            Region::Calib => "calib",
            Region::All => "all",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown region '{0}' (expected config, calib or all)")]
pub struct RegionParseError(String);

impl FromStr for Region {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegionParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_ranges() {
        assert_eq!(Region::Config.range(), AddressRange::new(0x0000, 0x1E00).unwrap());
        assert_eq!(Region::Calib.range(), AddressRange::new(0x1E00, 0x200).unwrap());
        assert_eq!(Region::All.range(), AddressRange::new(0x0000, 0x2000).unwrap());
        assert_eq!(Region::Calib.range().end(), 0x2000);
    }

    #[test]
    fn test_region_sizes_are_chunk_aligned() {
        for region in Region::ALL {
            assert_eq!(region.size() % 16, 0, "{region}");
        }
    }

    #[test]
    fn test_custom_range_validation() {
        assert_eq!(AddressRange::new(0, 8), Err(RangeError::Unaligned(8)));
        assert_eq!(
            AddressRange::new(0x1FF0, 0x20),
            Err(RangeError::OutOfBounds {
                base: 0x1FF0,
                size: 0x20
            })
        );
        assert!(AddressRange::new(u32::MAX - 15, 16).is_err());
        assert_eq!(AddressRange::new(0x40, 0).unwrap().end(), 0x40);
        assert_eq!(AddressRange::new(0x1FF0, 0x10).unwrap().end(), EEPROM_SIZE);
    }

    #[test]
    fn test_region_from_str() {
        assert_eq!("calib".parse::<Region>(), Ok(Region::Calib));
        assert_eq!("ALL".parse::<Region>(), Ok(Region::All));
        assert!("boot".parse::<Region>().is_err());
    }
}
