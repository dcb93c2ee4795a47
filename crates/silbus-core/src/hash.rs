//! Portable 64-bit string hash.
//!
//! Participant ids are derived from participant names and travel over the
//! wire, so the hash must produce identical values on every platform. The
//! standard library hasher is randomized per process and therefore unusable
//! here; FNV-1a is fixed, fast and collision-free enough for name-sized
//! inputs.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash a string to a stable 64-bit value (FNV-1a over the UTF-8 bytes).
pub fn stable_hash(value: &str) -> u64 {
    value
        .as_bytes()
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn known_vectors() {
        // Reference values computed from the FNV-1a definition; these must
        // never change, participant ids depend on them.
        assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(stable_hash("a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn distinct_for_random_names() {
        let mut outputs = HashSet::new();
        for _ in 0..1000 {
            let name = uuid::Uuid::new_v4().to_string();
            outputs.insert(stable_hash(&name));
        }
        assert_eq!(outputs.len(), 1000);
    }
}
