use sha2::{Digest, Sha256};

/// Content fingerprint used to recognise moved files. Equal bytes give equal
/// fingerprints regardless of where the file lives.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fixed-length digest of a relative catalog path. Preview files are named
/// after it so arbitrary user paths never reach the cache filesystem.
pub fn path_digest(relative_path: &str) -> String {
    hex::encode(Sha256::digest(relative_path.as_bytes()))
}
