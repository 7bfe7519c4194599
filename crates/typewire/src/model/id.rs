//! Hash-derived type identifiers.
//!
//! Every registered concrete type is identified on the wire by bytes taken
//! from the SHA-256 digest of its registered name:
//!
//! ```text
//! digest         = SHA-256(name)
//! rest           = digest without leading 0x00 bytes
//! disambiguation = rest[0..3]
//! rest           = rest[3..] without leading 0x00 bytes
//! prefix         = rest[0..4]
//! ```
//!
//! Neither identifier starts with 0x00, which is reserved as the escape byte
//! announcing that disambiguation bytes follow.

use sha2::{Digest, Sha256};

use crate::error::RegistryError;
use crate::limits::{DISAMBIGUATION_LEN, PREFIX_LEN};

/// Three bytes that tell apart types sharing a prefix.
pub type Disambiguation = [u8; DISAMBIGUATION_LEN];

/// Four bytes that normally identify a concrete type on the wire.
pub type Prefix = [u8; PREFIX_LEN];

/// Derives the disambiguation and prefix bytes for a registered name.
///
/// Fails rather than padding when the digest runs out of non-zero bytes.
pub fn compute_identifiers(name: &str) -> Result<(Disambiguation, Prefix), RegistryError> {
    identifiers_from_digest(name, &Sha256::digest(name.as_bytes()))
}

fn identifiers_from_digest(name: &str, digest: &[u8]) -> Result<(Disambiguation, Prefix), RegistryError> {
    let exhausted = || RegistryError::IdentifierDerivation {
        name: name.to_string(),
    };

    let rest = strip_zeros(digest);
    if rest.len() < DISAMBIGUATION_LEN {
        return Err(exhausted());
    }
    let mut disambiguation = [0u8; DISAMBIGUATION_LEN];
    disambiguation.copy_from_slice(&rest[..DISAMBIGUATION_LEN]);

    let rest = strip_zeros(&rest[DISAMBIGUATION_LEN..]);
    if rest.len() < PREFIX_LEN {
        return Err(exhausted());
    }
    let mut prefix = [0u8; PREFIX_LEN];
    prefix.copy_from_slice(&rest[..PREFIX_LEN]);

    Ok((disambiguation, prefix))
}

fn strip_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Formats identifier bytes as lowercase hex, e.g. `"a1b2c3d4"`.
pub fn format_identifier(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        s.push_str(&format!("{:02x}", byte));
    }
    s
}
