//! Content fingerprinting for drift detection.
//!
//! A fingerprint answers one question: has the declared input of a data
//! file changed since it was last uploaded? It is stored in the resource's
//! signals instead of the full payload.
//!
//! The digest is SHA-256 over a canonical encoding:
//! - every variable-length field is length-prefixed, so bytes cannot move
//!   between `content` and `filename` without changing the digest
//! - an absent filename is encoded differently from an empty one
//! - metadata is a [`Metadata`] (`BTreeMap`), so entries are always hashed
//!   in sorted key order regardless of how the caller built the map
//!
//! Only the first 16 bytes of the digest are kept. A collision would read
//! as "no change" and skip a re-upload; at this width that is accepted.

use sha2::{Digest, Sha256};

use crate::remote::Metadata;

const FINGERPRINT_BYTES: usize = 16;

/// Compute the fingerprint of a data file's declared inputs.
pub fn fingerprint(content: &str, filename: Option<&str>, metadata: &Metadata) -> String {
    let mut hasher = Sha256::new();

    write_field(&mut hasher, content.as_bytes());

    match filename {
        Some(name) => {
            hasher.update([1u8]);
            write_field(&mut hasher, name.as_bytes());
        }
        None => hasher.update([0u8]),
    }

    hasher.update((metadata.len() as u64).to_be_bytes());
    for (key, value) in metadata {
        write_field(&mut hasher, key.as_bytes());
        write_field(&mut hasher, value.as_bytes());
    }

    let digest = hasher.finalize();
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
