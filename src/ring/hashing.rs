//! Hash functions placing keys and server points in the 32-bit ring space.
//!
//! Keys use CRC32 and server points use the leading 32 bits of SHA1 over
//! `host:port:index`, matching the continuum built by Dalli so clusters shared
//! with Ruby clients agree on point positions.

use sha1::{Digest, Sha1};

/// Position of a key on the ring
#[inline]
pub fn key_hash(key: &[u8]) -> u32 {
    crc32fast::hash(key)
}

/// Position of the `index`-th synthetic point of a server
pub fn point_hash(server_name: &str, index: u32) -> u32 {
    let mut hasher = Sha1::new();
    hasher.update(server_name.as_bytes());
    hasher.update(b":");
    hasher.update(index.to_string().as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_hash_is_crc32() {
        // CRC32 check value for "123456789"
        assert_eq!(key_hash(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_point_hash_uses_sha1_prefix() {
        let digest = Sha1::digest(b"localhost:11211:0");
        let expected = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        assert_eq!(point_hash("localhost:11211", 0), expected);
        assert_eq!(point_hash("localhost:11211", 0), point_hash("localhost:11211", 0));
        assert_ne!(point_hash("localhost:11211", 0), point_hash("localhost:11211", 1));
    }
}
