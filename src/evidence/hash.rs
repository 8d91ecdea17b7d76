use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const HASH_ALGORITHM: &str = "SHA-256";

/// Read size for streaming digests; files are never loaded whole
const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashInfo {
    pub algorithm: String,
    /// Lowercase hex, 64 characters
    pub value: String,
}

impl HashInfo {
    /// Stream a file through SHA-256
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::open(path)?;
        Self::from_reader(&mut file)
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; CHUNK_SIZE];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self::from_digest(hasher.finalize().as_slice()))
    }

    /// SHA-256 of data already in memory
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_digest(Sha256::digest(data).as_slice())
    }

    fn from_digest(digest: &[u8]) -> Self {
        Self {
            algorithm: HASH_ALGORITHM.to_string(),
            value: hex::encode(digest),
        }
    }

    /// Re-hash `path` and compare with this value
    pub fn verify<P: AsRef<Path>>(&self, path: P) -> io::Result<bool> {
        let computed = Self::from_file(path)?;
        Ok(computed.value == self.value)
    }
}

/// Hex digest of a file, the form stored on jobs and manifests
pub fn sha256_hex<P: AsRef<Path>>(path: P) -> io::Result<String> {
    Ok(HashInfo::from_file(path)?.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_consistency() {
        let hash1 = HashInfo::from_bytes(b"proof bytes");
        let hash2 = HashInfo::from_bytes(b"proof bytes");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.algorithm, "SHA-256");
    }

    #[test]
    fn test_hash_empty_file() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();

        let hash = HashInfo::from_file(temp_file.path()).unwrap();
        assert_eq!(
            hash.value,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_and_bytes_agree_across_chunk_boundary() {
        // Not a multiple of the chunk size, so the last read is partial
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(&data).unwrap();
        temp_file.flush().unwrap();

        let from_file = HashInfo::from_file(temp_file.path()).unwrap();
        assert_eq!(from_file, HashInfo::from_bytes(&data));
    }

    #[test]
    fn test_hash_value_format() {
        let hash = HashInfo::from_bytes(b"test");
        assert_eq!(hash.value.len(), 64);
        assert!(hash
            .value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_hash_verify_fails_on_modified_file() {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(b"original content").unwrap();
        temp_file.flush().unwrap();

        let hash = HashInfo::from_file(temp_file.path()).unwrap();
        assert!(hash.verify(temp_file.path()).unwrap());

        temp_file.write_all(b" modified").unwrap();
        temp_file.flush().unwrap();

        assert!(!hash.verify(temp_file.path()).unwrap());
    }

    #[test]
    fn test_hash_from_file_nonexistent() {
        assert!(HashInfo::from_file("/nonexistent/file.jpg").is_err());
        assert!(sha256_hex("/nonexistent/file.jpg").is_err());
    }
}
