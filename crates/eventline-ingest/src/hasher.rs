//! Deterministic event identity.
//!
//! The byte layout is part of the contract: `event_name`, `:`, `user_id`,
//! `:`, then the timestamp as plain decimal ASCII (leading `-` when
//! negative), hashed with FNV-1a 64 using the standard offset basis. Any
//! implementation that feeds the same bytes produces the same key.

use std::hash::Hasher;

use fnv::FnvHasher;

const SEPARATOR: &[u8] = b":";

/// Width of `i64::MIN` rendered in decimal, sign included.
const MAX_DECIMAL_LEN: usize = 20;

/// Computes the 64-bit identity of an event.
///
/// Pure and total. Only the three identity fields take part, so events that
/// differ in channel, tags or metadata share a key.
pub fn event_hash(event_name: &str, user_id: &str, timestamp: i64) -> u64 {
    let mut scratch = [0u8; MAX_DECIMAL_LEN];
    let mut hasher = FnvHasher::default();
    hasher.write(event_name.as_bytes());
    hasher.write(SEPARATOR);
    hasher.write(user_id.as_bytes());
    hasher.write(SEPARATOR);
    hasher.write(decimal_ascii(timestamp, &mut scratch));
    hasher.finish()
}

/// Renders `value` into the tail of `buf` and returns the written slice.
fn decimal_ascii(value: i64, buf: &mut [u8; MAX_DECIMAL_LEN]) -> &[u8] {
    let mut pos = buf.len();
    let mut magnitude = value.unsigned_abs();
    loop {
        pos -= 1;
        buf[pos] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        if magnitude == 0 {
            break;
        }
    }
    if value < 0 {
        pos -= 1;
        buf[pos] = b'-';
    }
    &buf[pos..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_rendering_matches_display() {
        for value in [0, 7, -7, 10, 1_700_000_000, -1_700_000_000, i64::MAX, i64::MIN] {
            let mut buf = [0u8; MAX_DECIMAL_LEN];
            let rendered = decimal_ascii(value, &mut buf);
            assert_eq!(rendered, value.to_string().as_bytes(), "value {value}");
        }
    }

    #[test]
    fn pinned_vector_for_signup() {
        assert_eq!(event_hash("signup", "u1", 1_700_000_000), 6_905_618_824_879_433_831);
        assert_eq!(event_hash("signup", "u1", 1_700_000_000), 0x5fd5_afbb_d330_6867);
    }

    #[test]
    fn hash_equals_fnv1a_of_joined_text() {
        let joined = format!("{}:{}:{}", "purchase", "u1", -5);
        let mut hasher = FnvHasher::default();
        hasher.write(joined.as_bytes());
        assert_eq!(event_hash("purchase", "u1", -5), hasher.finish());
        assert_eq!(event_hash("purchase", "u1", -5), 6_023_570_638_865_250_878);
    }

    #[test]
    fn each_identity_field_changes_the_hash() {
        let base = event_hash("signup", "u1", 1_700_000_000);
        assert_ne!(base, event_hash("signin", "u1", 1_700_000_000));
        assert_ne!(base, event_hash("signup", "u2", 1_700_000_000));
        assert_ne!(base, event_hash("signup", "u1", 1_700_000_001));
        assert_eq!(event_hash("signup", "u2", 1_700_000_000), 4_537_832_932_466_287_604);
    }
}
