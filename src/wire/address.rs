use sha2::{Digest, Sha256};

use crate::domain::{Identity, SeedList};

/// Fixed namespace prefix for storage address derivation.
pub const ADDRESS_PREFIX: &[u8] = b"rule_set";

/// Derive a deterministic address from a seed list.
///
/// Each seed is length-prefixed before hashing so seed boundaries are
/// unambiguous; the result is reproducible bit-for-bit by any client.
pub fn derive(seeds: &[&[u8]]) -> Identity {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update((seed.len() as u32).to_le_bytes());
        hasher.update(seed);
    }
    Identity::new(hasher.finalize().into())
}

/// Storage address of a (creator, name) rule set.
pub fn rule_set_address(creator: &Identity, name: &str) -> Identity {
    derive(&[ADDRESS_PREFIX, creator.as_bytes(), name.as_bytes()])
}

/// Storage address of a creator's staging buffer.
pub fn buffer_address(creator: &Identity) -> Identity {
    derive(&[ADDRESS_PREFIX, creator.as_bytes()])
}

/// Address derived from a base identity and payload-supplied seeds, for
/// derived-address match rules.
pub fn derived_address(base: &Identity, seeds: &SeedList) -> Identity {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
    parts.push(base.as_bytes());
    for seed in seeds {
        parts.push(seed.as_slice());
    }
    derive(&parts)
}
