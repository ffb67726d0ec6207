//! EIP-55 address normalization.
//!
//! `normalize` is total over its input: it returns a [`ChecksummedAddress`] or an
//! [`InvalidAddress`], never an empty value standing in for "invalid".

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an account address in bytes.
pub const ADDRESS_LEN: usize = 20;
const HEX_DIGITS: usize = ADDRESS_LEN * 2;

/// EIP-155 chain id for checksumming; explorer addresses use plain EIP-55.
const NO_CHAIN_ID: Option<u64> = None;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidAddressReason {
    #[error("empty string")]
    Empty,
    #[error("prefix without hex digits")]
    MissingDigits,
    #[error("expected 40 hex digits, found {digits}")]
    InvalidLength { digits: usize },
    #[error("invalid hex character {character:?} at index {index}")]
    InvalidHexCharacter { character: char, index: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid address {raw:?}: {reason}")]
pub struct InvalidAddress {
    pub raw: String,
    pub reason: InvalidAddressReason,
}

impl InvalidAddress {
    fn new(raw: &str, reason: InvalidAddressReason) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }
}

/// A 20-byte address. Displays, serializes and compares in its canonical checksummed form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChecksummedAddress(Address);

impl ChecksummedAddress {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(Address::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0 .0 .0
    }

    pub fn to_checksum(&self) -> String {
        self.0.to_checksum(NO_CHAIN_ID)
    }
}

impl From<Address> for ChecksummedAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<ChecksummedAddress> for Address {
    fn from(address: ChecksummedAddress) -> Self {
        address.0
    }
}

impl fmt::Display for ChecksummedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for ChecksummedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChecksummedAddress")
            .field(&self.to_checksum())
            .finish()
    }
}

impl FromStr for ChecksummedAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

impl Serialize for ChecksummedAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChecksummedAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        normalize(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse a raw address in any casing, with or without a `0x`/`0X` prefix.
///
/// Surrounding ASCII whitespace is ignored. Error indices point into `raw` as given.
pub fn normalize(raw: &str) -> Result<ChecksummedAddress, InvalidAddress> {
    let leading = raw.len() - raw.trim_start_matches(|c: char| c.is_ascii_whitespace()).len();
    let trimmed = raw.trim_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.is_empty() {
        return Err(InvalidAddress::new(raw, InvalidAddressReason::Empty));
    }
    let (digits, prefix_len) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(rest) => (rest, 2),
        None => (trimmed, 0),
    };
    if digits.is_empty() {
        return Err(InvalidAddress::new(raw, InvalidAddressReason::MissingDigits));
    }
    if let Some((i, character)) = digits.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(InvalidAddress::new(
            raw,
            InvalidAddressReason::InvalidHexCharacter {
                character,
                index: leading + prefix_len + i,
            },
        ));
    }
    // Every character is hex here, so only the length can be wrong.
    digits
        .parse::<Address>()
        .map(ChecksummedAddress)
        .map_err(|_| {
            debug_assert_ne!(digits.len(), HEX_DIGITS);
            InvalidAddress::new(
                raw,
                InvalidAddressReason::InvalidLength {
                    digits: digits.len(),
                },
            )
        })
}

/// Render 20 bytes as an EIP-55 checksummed string with a lowercase `0x` prefix.
pub fn to_checksum(bytes: &[u8; ADDRESS_LEN]) -> String {
    Address::new(*bytes).to_checksum(NO_CHAIN_ID)
}

/// True only if `raw` is already exactly the canonical checksummed form.
pub fn is_checksummed(raw: &str) -> bool {
    match normalize(raw) {
        Ok(addr) => addr.to_checksum() == raw,
        Err(_) => false,
    }
}
