//! Hash-based ID generation for memories and tasks.
//!
//! IDs are opaque, collision-free strings of the form `{prefix}-{hash}`
//! (e.g. `mem-a3f8`, `task-9k2p`): SHA-256 over the entity content plus
//! a creation timestamp and retry nonce, base36-encoded to an adaptive
//! length that grows with store size.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const MAX_NONCE: u32 = 100;

/// Hash-based ID generator with collision detection.
///
/// One generator instance exists per entity kind, seeded with every id
/// already present in the store so fresh ids never collide.
pub struct IdGenerator {
    prefix: &'static str,
    existing: HashSet<String>,
    store_size: usize,
}

impl IdGenerator {
    /// Create a generator for the given prefix (`"mem"` or `"task"`).
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            existing: HashSet::new(),
            store_size: 0,
        }
    }

    /// Register an existing ID to prevent collisions.
    pub fn register(&mut self, id: impl Into<String>) {
        self.existing.insert(id.into());
        self.store_size = self.store_size.max(self.existing.len());
    }

    /// Generate a new unique ID from the entity's salient content.
    ///
    /// # Errors
    ///
    /// Returns an error message if no unique ID could be produced after
    /// exhausting all nonces at the maximum length.
    pub fn generate(&mut self, content: &str) -> Result<String, String> {
        let length = self.adaptive_length();

        for nonce in 0..MAX_NONCE {
            let id = self.hash_id(content, nonce, length);
            if !self.existing.contains(&id) {
                self.existing.insert(id.clone());
                self.store_size += 1;
                return Ok(id);
            }
        }

        if length < 6 {
            let id = self.hash_id(content, 0, length + 1);
            if !self.existing.contains(&id) {
                self.existing.insert(id.clone());
                self.store_size += 1;
                return Ok(id);
            }
        }

        Err(format!("Unable to generate unique ID after {MAX_NONCE} attempts"))
    }

    fn hash_id(&self, content: &str, nonce: u32, length: usize) -> String {
        let timestamp = Utc::now().timestamp_micros();
        let input = format!("{content}|{timestamp}|{nonce}");

        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let hash = hasher.finalize();

        format!("{}-{}", self.prefix, encode_base36(&hash[..8], length))
    }

    /// ID length grows with store size: 4 chars up to 500 entities,
    /// 5 up to 1500, 6 beyond.
    fn adaptive_length(&self) -> usize {
        match self.store_size {
            0..=500 => 4,
            501..=1500 => 5,
            _ => 6,
        }
    }
}

fn encode_base36(bytes: &[u8], length: usize) -> String {
    let mut num: u64 = 0;
    for &byte in bytes {
        num = num.wrapping_shl(8).wrapping_add(u64::from(byte));
    }

    let mut result = Vec::with_capacity(length);
    let mut n = num;
    while result.len() < length {
        result.push(BASE36_CHARS[(n % 36) as usize]);
        n /= 36;
    }
    result.reverse();

    String::from_utf8(result).expect("base36 alphabet is ASCII")
}

/// Validate an ID's shape: `{prefix}-{base36, 4-6 chars}`.
#[must_use]
pub fn validate_id(id: &str, prefix: &str) -> bool {
    let Some(hash) = id.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('-')) else {
        return false;
    };
    (4..=6).contains(&hash.len()) && hash.chars().all(|c| c.is_ascii_alphanumeric())
}
