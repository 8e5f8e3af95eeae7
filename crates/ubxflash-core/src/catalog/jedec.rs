//! JEDEC identification triplet

use core::fmt;
use core::str::FromStr;

use crate::error::Error;

/// JEDEC ID of a flash chip: manufacturer, memory type and capacity
///
/// Lookups match all three bytes exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JedecId {
    /// Manufacturer ID (e.g. 0xEF for Winbond)
    pub manufacturer: u8,
    /// Memory type
    pub memory_type: u8,
    /// Capacity code
    pub capacity: u8,
}

impl JedecId {
    /// Create a JEDEC ID from its three bytes
    pub const fn new(manufacturer: u8, memory_type: u8, capacity: u8) -> Self {
        Self {
            manufacturer,
            memory_type,
            capacity,
        }
    }

    /// Create a JEDEC ID from the low 24 bits of `value` (0xMMTTCC)
    pub const fn from_u32(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    /// Pack into 0xMMTTCC
    pub const fn to_u32(self) -> u32 {
        ((self.manufacturer as u32) << 16) | ((self.memory_type as u32) << 8) | self.capacity as u32
    }

    /// The three bytes in the order they appear on the wire
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.manufacturer, self.memory_type, self.capacity]
    }
}

impl fmt::Display for JedecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:02X}{:02X}{:02X}",
            self.manufacturer, self.memory_type, self.capacity
        )
    }
}

impl FromStr for JedecId {
    type Err = Error;

    /// Parse `EF4015`, `xEF4015` or `0xEF4015`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .or_else(|| s.strip_prefix('x'))
            .unwrap_or(s);

        if digits.is_empty() || digits.len() > 6 {
            return Err(Error::xml(format!("invalid JEDEC ID '{}'", s)));
        }

        u32::from_str_radix(digits, 16)
            .map(Self::from_u32)
            .map_err(|_| Error::xml(format!("invalid JEDEC ID '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixes() {
        let expected = JedecId::new(0xEF, 0x40, 0x15);
        assert_eq!("EF4015".parse::<JedecId>().unwrap(), expected);
        assert_eq!("xEF4015".parse::<JedecId>().unwrap(), expected);
        assert_eq!("0xef4015".parse::<JedecId>().unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<JedecId>().is_err());
        assert!("x".parse::<JedecId>().is_err());
        assert!("EF40151".parse::<JedecId>().is_err());
        assert!("GG4015".parse::<JedecId>().is_err());
    }

    #[test]
    fn test_u32_conversion() {
        let id = JedecId::from_u32(0xC22536);
        assert_eq!(id.to_bytes(), [0xC2, 0x25, 0x36]);
        assert_eq!(id.to_u32(), 0xC22536);
        assert_eq!(id.to_string(), "0xC22536");
    }
}
