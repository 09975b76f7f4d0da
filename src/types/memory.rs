// ABOUTME: Memory limit parsing with K/M/G size suffixes.
// ABOUTME: Produces a positive byte count or fails closed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// A container memory limit in bytes.
///
/// Parsed from strings like `"2G"`, `"512m"`, `"1024K"`, `"2GB"` or a bare
/// byte count. Suffixes are binary multiples and case-insensitive. Zero and
/// values above `i64::MAX` bytes are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryLimit(u64);

/// Error returned when a memory string does not match the size grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid memory format: {value:?} (expected a positive integer with optional K, M or G suffix)")]
pub struct ParseMemoryError {
    pub value: String,
}

impl MemoryLimit {
    /// Largest accepted limit; the engine APIs carry memory as a signed 64-bit field.
    pub const MAX_BYTES: u64 = i64::MAX as u64;

    pub fn from_bytes(bytes: u64) -> Option<Self> {
        (bytes > 0 && bytes <= Self::MAX_BYTES).then_some(Self(bytes))
    }

    pub fn parse(input: &str) -> Result<Self, ParseMemoryError> {
        let err = || ParseMemoryError {
            value: input.to_string(),
        };

        let trimmed = input.trim();
        let without_b = trimmed
            .strip_suffix(['b', 'B'])
            .filter(|rest| rest.ends_with(|c: char| c.is_ascii_alphabetic()))
            .unwrap_or(trimmed);

        let (digits, multiplier) = match without_b.chars().last() {
            Some('k' | 'K') => (&without_b[..without_b.len() - 1], KIB),
            Some('m' | 'M') => (&without_b[..without_b.len() - 1], MIB),
            Some('g' | 'G') => (&without_b[..without_b.len() - 1], GIB),
            Some(c) if c.is_ascii_digit() => (without_b, 1),
            _ => return Err(err()),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let value: u64 = digits.parse().map_err(|_| err())?;
        let bytes = value.checked_mul(multiplier).ok_or_else(err)?;
        Self::from_bytes(bytes).ok_or_else(err)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl FromStr for MemoryLimit {
    type Err = ParseMemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            b if b % GIB == 0 => write!(f, "{}G", b / GIB),
            b if b % MIB == 0 => write!(f, "{}M", b / MIB),
            b if b % KIB == 0 => write!(f, "{}K", b / KIB),
            b => write!(f, "{b}"),
        }
    }
}

impl Serialize for MemoryLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MemoryLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
