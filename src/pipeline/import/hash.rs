use base64::Engine;
use sha2::{Digest, Sha256};

/// SHA-256 of the uploaded bytes, base64 encoded
pub fn compute_content_hash(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        let h1 = compute_content_hash(b"Lab. no.,IM Lab. no.\n24IG001731,IM662\n");
        let h2 = compute_content_hash(b"Lab. no.,IM Lab. no.\n24IG001731,IM662\n");
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(compute_content_hash(b"IM001"), compute_content_hash(b"IM002"));
    }

    #[test]
    fn hash_is_base64_sha256() {
        // 32 bytes encode to 44 base64 characters with one pad
        let hash = compute_content_hash(b"");
        assert_eq!(hash.len(), 44);
        assert_eq!(hash, "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
    }
}
