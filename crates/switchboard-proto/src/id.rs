//! Channel identifier minting

use rand::Rng;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a channel identifier.
pub const CHANNEL_ID_LEN: usize = 10;

/// Mint a fresh channel identifier: 10 characters of lowercase base36.
/// Uniqueness is probabilistic; the side that initiates a tunnel mints the
/// id, so collisions would need two mints of the same string on one link.
pub fn new_channel_id() -> String {
    let mut rng = rand::thread_rng();
    (0..CHANNEL_ID_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_shape() {
        for _ in 0..100 {
            let id = new_channel_id();
            assert_eq!(id.len(), CHANNEL_ID_LEN);
            assert!(id
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_ids_do_not_collide_in_practice() {
        let ids: HashSet<String> = (0..1000).map(|_| new_channel_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
