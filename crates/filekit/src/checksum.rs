//! Content checksums.
//!
//! Checksums are lowercase BLAKE3 hex digests. They decide whether file
//! content must be rewritten, so the same function is used for the desired
//! content and for what is on disk.

use blake3::Hasher;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Checksum in-memory content.
pub fn checksum_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Checksum a file's content, streaming it in chunks.
pub fn checksum_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(256 * 1024, file);
    let mut hasher = Hasher::new();

    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// First six characters of a checksum, for human-readable messages.
pub fn short_checksum(checksum: &str) -> &str {
    checksum.get(..6).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_and_bytes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd");
        std::fs::write(&path, b"hello\n").unwrap();

        assert_eq!(checksum_file(&path).unwrap(), checksum_bytes(b"hello\n"));
        assert_ne!(checksum_bytes(b"hello\n"), checksum_bytes(b"hello"));
    }

    #[test]
    fn test_short_checksum() {
        let sum = checksum_bytes(b"");
        assert_eq!(short_checksum(&sum).len(), 6);
        assert_eq!(short_checksum("abc"), "abc");
    }
}
