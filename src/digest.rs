//! Content fingerprints for the `[hash]` family of name-template tokens.
//!
//! A fingerprint is a hash of the raw asset bytes rendered through a digest
//! encoding and optionally truncated:
//!
//! ```text
//! [hash]                     → sha256, hex, full length
//! [hash:8]                   → sha256, hex, first 8 chars
//! [sha512:hash:base62:12]    → sha512, base62, first 12 chars
//! ```
//!
//! ## Digest encodings
//!
//! `hex` and `base64` are the usual byte encodings. The `baseNN` encodings
//! treat the hash as one little-endian integer and write it out in the
//! given radix using a fixed alphabet, so the same content always yields the
//! same short, filesystem-safe identifier.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

/// Hash function used for a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashType {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    /// Parse a hash name as written in a template (`sha256`, `SHA512`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha224" => Some(Self::Sha224),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn digest(self, content: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha224 => Sha224::digest(content).to_vec(),
            Self::Sha256 => Sha256::digest(content).to_vec(),
            Self::Sha384 => Sha384::digest(content).to_vec(),
            Self::Sha512 => Sha512::digest(content).to_vec(),
        }
    }
}

/// Text encoding applied to the raw hash bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestType {
    #[default]
    Hex,
    Base64,
    /// Radix encoding with one of the fixed alphabets in [`base_alphabet`].
    Base(u32),
}

impl DigestType {
    /// Parse a digest name as written in a template (`hex`, `base64`, `base36`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hex" => Some(Self::Hex),
            "base64" => Some(Self::Base64),
            other => {
                let radix: u32 = other.strip_prefix("base")?.parse().ok()?;
                base_alphabet(radix).map(|_| Self::Base(radix))
            }
        }
    }
}

/// Alphabets for the radix digests. Ambiguous glyphs are left out of the
/// smaller tables so the identifiers survive being read aloud.
fn base_alphabet(radix: u32) -> Option<&'static [u8]> {
    let table: &'static [u8] = match radix {
        26 => b"abcdefghijklmnopqrstuvwxyz",
        32 => b"123456789abcdefghjkmnpqrstuvwxyz",
        36 => b"0123456789abcdefghijklmnopqrstuvwxyz",
        49 => b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ",
        52 => b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
        58 => b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ",
        62 => b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
        _ => return None,
    };
    Some(table)
}

/// Fingerprint `content` and render it as text.
///
/// `max_len` truncates the rendered digest; `None` keeps all of it.
pub fn hash_digest(
    content: &[u8],
    hash: HashType,
    digest: DigestType,
    max_len: Option<usize>,
) -> String {
    let bytes = hash.digest(content);
    let rendered = match digest {
        DigestType::Hex => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        DigestType::Base64 => STANDARD.encode(&bytes),
        DigestType::Base(radix) => match base_alphabet(radix) {
            Some(alphabet) => encode_radix(&bytes, alphabet),
            None => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        },
    };
    match max_len {
        Some(n) => rendered.chars().take(n).collect(),
        None => rendered,
    }
}

/// Write `bytes` (little-endian integer) in the radix of `alphabet`.
fn encode_radix(bytes: &[u8], alphabet: &[u8]) -> String {
    let radix = alphabet.len() as u32;
    // Most significant byte first, leading zeros dropped.
    let mut number: Vec<u8> = bytes.iter().rev().copied().skip_while(|&b| b == 0).collect();
    let mut digits = Vec::new();

    while !number.is_empty() {
        let mut remainder = 0u32;
        let mut quotient = Vec::with_capacity(number.len());
        for &byte in &number {
            let acc = remainder * 256 + byte as u32;
            let q = acc / radix;
            remainder = acc % radix;
            if !(quotient.is_empty() && q == 0) {
                quotient.push(q as u8);
            }
        }
        digits.push(alphabet[remainder as usize]);
        number = quotient;
    }

    digits.iter().rev().map(|&b| b as char).collect()
}
