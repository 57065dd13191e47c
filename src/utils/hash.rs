//! Deterministic hashing utilities.
//!
//! Cross-process deterministic hashing using blake3; used for stack
//! checksums and artifact directory fingerprints. `DefaultHasher` is
//! seeded randomly per process and cannot be compared across runs.

use std::io::{self, Read};

/// Hash a byte slice to u64 (first 8 bytes of blake3, little-endian).
#[inline]
pub fn hash_bytes(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
}

/// Generate a short fingerprint string (8 hex chars) from content.
#[inline]
pub fn fingerprint(s: &str) -> String {
    format!("{:08x}", hash_bytes(s.as_bytes()) as u32)
}

/// Full hex digest of a reader (streaming, for template files).
pub fn hex_digest_reader(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(hash_bytes(b"hello world"), hash_bytes(b"hello world"));
    }

    #[test]
    fn test_different_inputs() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = fingerprint("src|api.handler");
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hex_digest_reader() {
        let a = hex_digest_reader(&b"stack template"[..]).unwrap();
        let b = hex_digest_reader(&b"stack template"[..]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
