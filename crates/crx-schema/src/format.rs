//! CRX version 2 container layout.
//!
//! A container is a fixed 16-byte header followed by three variable-length
//! segments. The header carries the lengths of the first two segments, so a
//! reader can locate everything without scanning:
//!
//! ```text
//! offset            size      field
//! 0                 4         magic "Cr24"
//! 4                 4         format version (u32 LE, always 2)
//! 8                 4         public key length (u32 LE)
//! 12                4         signature length (u32 LE)
//! 16                key_len   public key (DER SubjectPublicKeyInfo)
//! 16+key_len        sig_len   signature (SHA-1 with RSA)
//! 16+key_len+sig_len ..       zip contents
//! ```

use std::io::{self, Write};
use thiserror::Error;

/// Magic tag at offset 0 of every container.
pub const MAGIC: [u8; 4] = *b"Cr24";

/// The only container version this crate reads or writes.
pub const FORMAT_VERSION: u32 = 2;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 16;

const VERSION_OFFSET: usize = 4;
const KEY_LEN_OFFSET: usize = 8;
const SIG_LEN_OFFSET: usize = 12;

/// Errors raised while building or reading a container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A required segment was empty.
    #[error("missing {0}")]
    MissingSegment(&'static str),

    /// A segment does not fit in a 32-bit length field.
    #[error("{segment} is {len} bytes, too large for a u32 length field")]
    SegmentTooLarge {
        /// Which segment overflowed.
        segment: &'static str,
        /// Its actual length.
        len: usize,
    },

    /// The first four bytes are not `Cr24`.
    #[error("not a CRX container (magic {0:02x?})")]
    BadMagic([u8; 4]),

    /// The header declares a version other than [`FORMAT_VERSION`].
    #[error("unsupported CRX format version {0}")]
    UnsupportedVersion(u32),

    /// The buffer ends before the declared segments do.
    #[error("truncated container: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes required by the header.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// A textual package identity failed validation.
    #[error("invalid app id '{0}': expected 32 letters in a-p")]
    InvalidAppId(String),
}

/// The decoded 16-byte container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrxHeader {
    /// Format version, always [`FORMAT_VERSION`] for headers this crate produces.
    pub version: u32,
    /// Length of the public key segment.
    pub key_len: u32,
    /// Length of the signature segment.
    pub sig_len: u32,
}

impl CrxHeader {
    /// Build the header describing the given key and signature segments.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MissingSegment`] for an empty segment and
    /// [`FormatError::SegmentTooLarge`] if a length overflows `u32`.
    pub fn for_segments(public_key: &[u8], signature: &[u8]) -> Result<Self, FormatError> {
        Ok(Self {
            version: FORMAT_VERSION,
            key_len: segment_len("public key", public_key)?,
            sig_len: segment_len("signature", signature)?,
        })
    }

    /// Serialize to the on-disk representation.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..VERSION_OFFSET].copy_from_slice(&MAGIC);
        out[VERSION_OFFSET..KEY_LEN_OFFSET].copy_from_slice(&self.version.to_le_bytes());
        out[KEY_LEN_OFFSET..SIG_LEN_OFFSET].copy_from_slice(&self.key_len.to_le_bytes());
        out[SIG_LEN_OFFSET..HEADER_LEN].copy_from_slice(&self.sig_len.to_le_bytes());
        out
    }

    /// Parse the header from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Fails if fewer than [`HEADER_LEN`] bytes are present, the magic does not
    /// match, or the version is not [`FORMAT_VERSION`].
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_LEN {
            return Err(FormatError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..VERSION_OFFSET]);
        if magic != MAGIC {
            return Err(FormatError::BadMagic(magic));
        }

        let version = read_u32_le(bytes, VERSION_OFFSET);
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            key_len: read_u32_le(bytes, KEY_LEN_OFFSET),
            sig_len: read_u32_le(bytes, SIG_LEN_OFFSET),
        })
    }

    /// Offset at which the zip contents begin.
    pub fn contents_offset(&self) -> usize {
        HEADER_LEN + self.key_len as usize + self.sig_len as usize
    }
}

/// A container viewed as its three borrowed segments.
///
/// Constructing one through [`Container::new`] or [`Container::parse`]
/// guarantees the header lengths match the segments, so [`Container::to_vec`]
/// and [`Container::write_to`] always emit a readable artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container<'a> {
    header: CrxHeader,
    public_key: &'a [u8],
    signature: &'a [u8],
    contents: &'a [u8],
}

impl<'a> Container<'a> {
    /// Describe a container built from the given segments.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MissingSegment`] if any segment is empty and
    /// [`FormatError::SegmentTooLarge`] if a length field would overflow.
    pub fn new(
        public_key: &'a [u8],
        signature: &'a [u8],
        contents: &'a [u8],
    ) -> Result<Self, FormatError> {
        let header = CrxHeader::for_segments(public_key, signature)?;
        if contents.is_empty() {
            return Err(FormatError::MissingSegment("contents"));
        }
        Ok(Self {
            header,
            public_key,
            signature,
            contents,
        })
    }

    /// Split a serialized container into its segments without copying.
    ///
    /// # Errors
    ///
    /// Fails on a malformed header, on a buffer shorter than the header
    /// declares, or when a segment is empty.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FormatError> {
        let header = CrxHeader::decode(bytes)?;
        let key_end = HEADER_LEN + header.key_len as usize;
        let sig_end = header.contents_offset();
        if bytes.len() < sig_end {
            return Err(FormatError::Truncated {
                expected: sig_end,
                actual: bytes.len(),
            });
        }

        let container = Self {
            header,
            public_key: &bytes[HEADER_LEN..key_end],
            signature: &bytes[key_end..sig_end],
            contents: &bytes[sig_end..],
        };

        if container.public_key.is_empty() {
            return Err(FormatError::MissingSegment("public key"));
        }
        if container.signature.is_empty() {
            return Err(FormatError::MissingSegment("signature"));
        }
        if container.contents.is_empty() {
            return Err(FormatError::MissingSegment("contents"));
        }
        Ok(container)
    }

    /// The header describing this container.
    pub fn header(&self) -> CrxHeader {
        self.header
    }

    /// DER-encoded public key segment.
    pub fn public_key(&self) -> &'a [u8] {
        self.public_key
    }

    /// Signature segment.
    pub fn signature(&self) -> &'a [u8] {
        self.signature
    }

    /// Zip contents segment.
    pub fn contents(&self) -> &'a [u8] {
        self.contents
    }

    /// Total serialized length.
    pub fn len(&self) -> usize {
        self.header.contents_offset() + self.contents.len()
    }

    /// Always `false`: a valid container has a header and three non-empty segments.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Serialize into a single buffer allocated at its exact final size.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut crx = Vec::with_capacity(self.len());
        crx.extend_from_slice(&self.header.encode());
        crx.extend_from_slice(self.public_key);
        crx.extend_from_slice(self.signature);
        crx.extend_from_slice(self.contents);
        crx
    }

    /// Stream the serialized container into `writer`.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.header.encode())?;
        writer.write_all(self.public_key)?;
        writer.write_all(self.signature)?;
        writer.write_all(self.contents)?;
        writer.flush()
    }
}

/// Assemble a container from its three segments.
///
/// # Errors
///
/// See [`Container::new`].
pub fn assemble(
    public_key: &[u8],
    signature: &[u8],
    contents: &[u8],
) -> Result<Vec<u8>, FormatError> {
    Ok(Container::new(public_key, signature, contents)?.to_vec())
}

fn segment_len(segment: &'static str, bytes: &[u8]) -> Result<u32, FormatError> {
    if bytes.is_empty() {
        return Err(FormatError::MissingSegment(segment));
    }
    u32::try_from(bytes.len()).map_err(|_| FormatError::SegmentTooLarge {
        segment,
        len: bytes.len(),
    })
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        (vec![0xAA; 294], vec![0xBB; 256], b"PK\x03\x04zipdata".to_vec())
    }

    #[test]
    fn header_lengths_match_segments() {
        let (key, sig, zip) = sample();
        let crx = assemble(&key, &sig, &zip).unwrap();

        assert_eq!(&crx[..4], b"Cr24");
        assert_eq!(crx[4], 2);
        assert_eq!(&crx[5..8], &[0, 0, 0]);
        assert_eq!(u32::from_le_bytes(crx[8..12].try_into().unwrap()), 294);
        assert_eq!(u32::from_le_bytes(crx[12..16].try_into().unwrap()), 256);
        assert_eq!(crx.len(), HEADER_LEN + key.len() + sig.len() + zip.len());
    }

    #[test]
    fn segments_are_copied_verbatim() {
        let (key, sig, zip) = sample();
        let crx = assemble(&key, &sig, &zip).unwrap();

        assert_eq!(&crx[16..16 + 294], key.as_slice());
        assert_eq!(&crx[16 + 294..16 + 294 + 256], sig.as_slice());
        assert_eq!(&crx[16 + 294 + 256..], zip.as_slice());
    }

    #[test]
    fn parse_recovers_segments() {
        let (key, sig, zip) = sample();
        let crx = assemble(&key, &sig, &zip).unwrap();

        let parsed = Container::parse(&crx).unwrap();
        assert_eq!(parsed.public_key(), key.as_slice());
        assert_eq!(parsed.signature(), sig.as_slice());
        assert_eq!(parsed.contents(), zip.as_slice());
        assert_eq!(parsed.len(), crx.len());
        assert_eq!(parsed.to_vec(), crx);
    }

    #[test]
    fn write_to_matches_to_vec() {
        let (key, sig, zip) = sample();
        let container = Container::new(&key, &sig, &zip).unwrap();

        let mut streamed = Vec::new();
        container.write_to(&mut streamed).unwrap();
        assert_eq!(streamed, container.to_vec());
    }

    #[test]
    fn empty_segments_are_rejected() {
        let (key, sig, zip) = sample();
        assert_eq!(
            assemble(&[], &sig, &zip),
            Err(FormatError::MissingSegment("public key"))
        );
        assert_eq!(
            assemble(&key, &[], &zip),
            Err(FormatError::MissingSegment("signature"))
        );
        assert_eq!(
            assemble(&key, &sig, &[]),
            Err(FormatError::MissingSegment("contents"))
        );
    }

    #[test]
    fn bad_magic_is_rejected() {
        let (key, sig, zip) = sample();
        let mut crx = assemble(&key, &sig, &zip).unwrap();
        crx[0] = b'X';
        assert!(matches!(
            Container::parse(&crx),
            Err(FormatError::BadMagic(_))
        ));
    }

    #[test]
    fn other_versions_are_rejected() {
        let (key, sig, zip) = sample();
        let mut crx = assemble(&key, &sig, &zip).unwrap();
        crx[4] = 3;
        assert_eq!(
            Container::parse(&crx),
            Err(FormatError::UnsupportedVersion(3))
        );
    }

    #[test]
    fn truncation_is_detected() {
        let (key, sig, zip) = sample();
        let crx = assemble(&key, &sig, &zip).unwrap();

        assert_eq!(
            Container::parse(&crx[..10]),
            Err(FormatError::Truncated {
                expected: 16,
                actual: 10
            })
        );
        assert_eq!(
            Container::parse(&crx[..300]),
            Err(FormatError::Truncated {
                expected: 16 + 294 + 256,
                actual: 300
            })
        );
    }

    #[test]
    fn header_round_trips() {
        let header = CrxHeader {
            version: FORMAT_VERSION,
            key_len: 162,
            sig_len: 128,
        };
        assert_eq!(CrxHeader::decode(&header.encode()), Ok(header));
        assert_eq!(header.contents_offset(), 16 + 162 + 128);
    }
}
