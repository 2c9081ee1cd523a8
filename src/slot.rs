//! Hash slot calculation.
//!
//! The keyspace is partitioned into 16384 fixed slots. A key maps to a slot
//! via CRC16 modulo 16384, with hash-tag support so related keys can be
//! forced onto the same slot.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in the cluster keyspace.
pub const SLOT_COUNT: u16 = 16384;

/// CRC-16/XMODEM, the variant the store itself uses for slot assignment.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the hash slot for a given key.
///
/// If the key contains a hash tag — a `{` followed later by a `}` enclosing
/// at least one byte — only the bytes strictly between the braces are hashed.
/// Otherwise the whole key is hashed.
///
/// # Examples
///
/// ```
/// use slotwise::key_slot;
///
/// assert_eq!(key_slot("foo{bar}baz"), key_slot("bar"));
/// assert_eq!(key_slot("{user1000}.following"), key_slot("{user1000}.followers"));
/// assert!(key_slot("anything") < 16384);
/// ```
pub fn key_slot(key: impl AsRef<[u8]>) -> u16 {
    let content = hash_tag_content(key.as_ref());
    CRC16.checksum(content) % SLOT_COUNT
}

/// Returns the bytes to hash for a key.
///
/// The tag is the content between the first `{` and the first `}` that
/// follows it. Empty braces (`{}`) are not a tag; neither are unmatched
/// braces. In both cases the whole key is hashed.
fn hash_tag_content(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(len) = key[open + 1..].iter().position(|&b| b == b'}') {
            if len > 0 {
                return &key[open + 1..open + 1 + len];
            }
        }
    }
    key
}
