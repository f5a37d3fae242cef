//! Content hashing. A document's identity is the SHA-256 of its bytes.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::{DocragError, DocragResult};

/// Lowercase hex SHA-256 of a file, streamed.
pub fn hash_file(path: &Path) -> DocragResult<String> {
    let file = File::open(path).map_err(|e| DocragError::load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| DocragError::load(path, e.to_string()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"Title line").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"Title line"));
    }
}
