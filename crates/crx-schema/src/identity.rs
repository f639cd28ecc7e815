//! Package identity derived from the signing key.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::format::FormatError;

/// Number of characters in a package identity.
pub const APP_ID_LEN: usize = 32;

/// Stable package identity derived from a signing key.
///
/// The host only accepts identifiers drawn from a 16-letter alphabet, so the
/// first 32 hex digits of `SHA-256(public_key)` are re-spelled with each digit
/// `d` becoming the base-26 digit `d + 10`, i.e. `0 -> 'a'` through `f -> 'p'`.
/// Rebuilding with the same key always yields the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    /// Derive the identity for a DER-encoded public key.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MissingSegment`] if `public_key` is empty.
    pub fn from_public_key(public_key: &[u8]) -> Result<Self, FormatError> {
        if public_key.is_empty() {
            return Err(FormatError::MissingSegment("public key"));
        }

        let digest = hex::encode(Sha256::digest(public_key));
        let id = digest[..APP_ID_LEN].chars().filter_map(shift_hex_digit).collect();
        Ok(Self(id))
    }

    /// Validate an externally supplied identity.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidAppId`] unless `s` is exactly 32 letters in `a..=p`.
    pub fn parse(s: &str) -> Result<Self, FormatError> {
        if s.len() == APP_ID_LEN && s.bytes().all(|b| (b'a'..=b'p').contains(&b)) {
            Ok(Self(s.to_string()))
        } else {
            Err(FormatError::InvalidAppId(s.to_string()))
        }
    }

    /// Return the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// (value + 10) in base 26 is always a single letter because value < 16.
fn shift_hex_digit(c: char) -> Option<char> {
    let value = c.to_digit(16)?;
    char::from_digit((value + 10) % 26, 26)
}

impl<'de> Deserialize<'de> for AppId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AppId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for AppId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // sha256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e...
        let id = AppId::from_public_key(b"hello").unwrap();
        assert_eq!(id.as_str(), "cmpcenlkfplakdaocgoidlckmfljocjo");
    }

    #[test]
    fn der_prefix_vector() {
        let id = AppId::from_public_key(&[0x30, 0x82, 0x01, 0x22]).unwrap();
        assert_eq!(id.as_str(), "ljndjchebpfhjmcfeedacmokdpebknbi");
    }

    #[test]
    fn deterministic_and_letter_only() {
        let a = AppId::from_public_key(b"public key bytes").unwrap();
        let b = AppId::from_public_key(b"public key bytes").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), APP_ID_LEN);
        assert!(a.as_str().bytes().all(|c| (b'a'..=b'p').contains(&c)));
    }

    #[test]
    fn different_keys_different_ids() {
        let a = AppId::from_public_key(b"key one").unwrap();
        let b = AppId::from_public_key(b"key two").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_key_is_a_precondition_violation() {
        assert_eq!(
            AppId::from_public_key(&[]),
            Err(FormatError::MissingSegment("public key"))
        );
    }

    #[test]
    fn parse_validates_alphabet_and_length() {
        assert!(AppId::parse("cmpcenlkfplakdaocgoidlckmfljocjo").is_ok());
        assert!(AppId::parse("cmpcenlkfplakdaocgoidlckmfljocj").is_err());
        assert!(AppId::parse("zmpcenlkfplakdaocgoidlckmfljocjo").is_err());
        assert!(AppId::parse("CMPCENLKFPLAKDAOCGOIDLCKMFLJOCJO").is_err());
    }

    #[test]
    fn derived_ids_survive_parse() {
        let id = AppId::from_public_key(b"round").unwrap();
        assert_eq!(AppId::parse(id.as_str()).unwrap(), id);
    }
}
