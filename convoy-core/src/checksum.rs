//! Artifact checksums

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Calculates the hex-encoded SHA-256 of a file, streaming it in 8 KiB chunks
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Calculates the hex-encoded SHA-256 of a byte slice
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_and_bytes_agree() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello convoy").unwrap();

        let from_file = sha256_file(file.path()).unwrap();
        assert_eq!(from_file, sha256_bytes(b"hello convoy"));
        assert_eq!(from_file.len(), 64);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
