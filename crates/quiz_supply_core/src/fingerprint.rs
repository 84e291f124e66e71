//! Stable content fingerprints used for exact-duplicate and quota bookkeeping.

use sha2::{Digest, Sha256};

use crate::dedup::normalize;
use crate::domain::Tier;

const SEPARATOR: [u8; 1] = [0x1f];

/// SHA-256 over normalized text, correct answer and topic, plus the tier name.
pub fn fingerprint(text: &str, correct_answer: &str, topic: &str, tier: Tier) -> String {
    let mut hasher = Sha256::new();
    for part in [normalize(text), normalize(correct_answer), normalize(topic)] {
        hasher.update(part.as_bytes());
        hasher.update(SEPARATOR);
    }
    hasher.update(tier.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}
