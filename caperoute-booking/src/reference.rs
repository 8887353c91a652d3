use caperoute_core::repository::BookingStore;
use caperoute_core::BookingError;
use rand::Rng;

/// Alphabet excludes visually ambiguous characters (0/O, 1/I).
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const PREFIX: &str = "CRT-";
const CODE_LEN: usize = 8;
const MAX_ATTEMPTS: u32 = 10;

/// Generate a single candidate reference, e.g. `CRT-K7XP2MQH`.
pub fn generate_candidate() -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(PREFIX.len() + CODE_LEN);
    out.push_str(PREFIX);
    for _ in 0..CODE_LEN {
        let idx = rng.gen_range(0..ALPHABET.len());
        out.push(ALPHABET[idx] as char);
    }
    out
}

/// Generate a reference guaranteed unique in the store, retrying on
/// collision. Exhausting the attempt budget is a fatal integrity error:
/// with 32^8 combinations that means something is badly wrong.
pub async fn generate_unique(store: &dyn BookingStore) -> Result<String, BookingError> {
    for _ in 0..MAX_ATTEMPTS {
        let candidate = generate_candidate();
        let exists = store
            .booking_ref_exists(&candidate)
            .await
            .map_err(BookingError::storage)?;
        if !exists {
            return Ok(candidate);
        }
    }
    Err(BookingError::Integrity(
        "failed to generate a unique booking reference".to_string(),
    ))
}

/// Uppercase an inbound reference. References are case-insensitive on input
/// and stored uppercase.
pub fn normalize(reference: &str) -> String {
    reference.trim().to_ascii_uppercase()
}

/// Strict format check, applied before any storage lookup so malformed input
/// is rejected cheaply.
pub fn is_valid_ref(reference: &str) -> bool {
    let Some(code) = reference.strip_prefix(PREFIX) else {
        return false;
    };
    code.len() == CODE_LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    #[test]
    fn candidate_matches_format() {
        for _ in 0..100 {
            let candidate = generate_candidate();
            assert!(is_valid_ref(&candidate), "bad candidate: {}", candidate);
        }
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(!is_valid_ref("CRT-ABCDEFG")); // too short
        assert!(!is_valid_ref("CRT-ABCDEFGHI")); // too long
        assert!(!is_valid_ref("XYZ-ABCDEFGH")); // wrong prefix
        assert!(!is_valid_ref("CRT-ABCDEFG0")); // ambiguous 0
        assert!(!is_valid_ref("CRT-ABCDEFG1")); // ambiguous 1
        assert!(!is_valid_ref("CRT-abcdefgh")); // lowercase, normalize first
        assert!(!is_valid_ref("CRT-ABCD EFG"));
        assert!(!is_valid_ref(""));
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize(" crt-k7xp2mqh "), "CRT-K7XP2MQH");
        assert!(is_valid_ref(&normalize("crt-k7xp2mqh")));
    }

    #[tokio::test]
    async fn generates_unique_against_store() {
        let store = MemoryStore::new();
        let reference = generate_unique(&store).await.unwrap();
        assert!(is_valid_ref(&reference));
    }

    #[tokio::test]
    async fn exhausted_retries_are_an_integrity_error() {
        let store = MemoryStore::new();
        store.force_ref_collisions();
        let err = generate_unique(&store).await.unwrap_err();
        assert!(matches!(
            err,
            caperoute_core::BookingError::Integrity(_)
        ));
    }
}
