//! Hash slot calculation.
//!
//! The cluster partitions its keyspace into 16384 slots using CRC16
//! (XMODEM polynomial). This module maps keys to slot numbers, honoring
//! the `{...}` hash tag convention.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in the cluster.
pub const SLOT_COUNT: u16 = 16384;

/// CRC-16/XMODEM, the checksum the cluster protocol mandates for slots.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the hash slot for a given key.
///
/// The slot is CRC16 of the key modulo 16384. If the key contains `{...}`
/// with a non-empty tag, only the bytes inside the first such pair of
/// braces are hashed, so related keys can be pinned to one slot.
///
/// # Examples
///
/// ```
/// use slotmux::cluster::key_slot;
///
/// assert_eq!(key_slot(b"foo"), 12182);
/// assert_eq!(key_slot(b"{user1000}.following"), key_slot(b"{user1000}.followers"));
/// ```
pub fn key_slot(key: &[u8]) -> u16 {
    let hash_key = extract_hash_tag(key);
    let crc = CRC16.checksum(hash_key);
    crc % SLOT_COUNT
}

/// Extracts the hash tag from a key.
///
/// - `{user1000}.following` → `user1000`
/// - `foo{bar}baz` → `bar`
/// - `foo{}bar` → whole key (empty tag)
/// - `foo` → whole key (no tag)
fn extract_hash_tag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{') {
        if let Some(end) = key[start + 1..].iter().position(|&b| b == b'}') {
            // Only a non-empty tag participates in hashing.
            if end > 0 {
                return &key[start + 1..start + 1 + end];
            }
        }
    }
    key
}
