//! Deterministic A/B variant assignment
//!
//! Bucketing hash: SHA-256 over the UTF-8 bytes of `experiment` followed
//! directly by the client id. The first 8 digest bytes, read big-endian as a
//! `u64`, are shifted right by 11 and divided by 2^53, giving a value in
//! `[0, 1)` with 53 bits of precision. The variant index is
//! `floor(value * variants.len())`.
//!
//! Assignments are persisted in local (durable) storage keyed by experiment
//! name and cached in memory, so repeated calls agree even when the storage
//! write fails.

use crate::identity::ClientId;
use crate::storage::{self, keys, Storage};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Returned for an empty variant list
pub const PLACEHOLDER_VARIANT: &str = "control";

/// Map `experiment + client_id` into `[0, 1)`
pub fn bucket(experiment: &str, client_id: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(experiment.as_bytes());
    hasher.update(client_id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(prefix) >> 11;
    value as f64 / (1u64 << 53) as f64
}

/// Index into a list of `len` variants for a bucket value
pub fn variant_index(bucket: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let index = (bucket * len as f64).floor() as usize;
    index.min(len - 1)
}

#[derive(Debug, Clone, Default)]
pub struct VariantAssigner {
    assignments: BTreeMap<String, String>,
    loaded: bool,
}

impl VariantAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&mut self, storage: &mut dyn Storage) {
        if self.loaded {
            return;
        }
        let stored: BTreeMap<String, String> =
            storage::load_json(storage, keys::EXPERIMENTS).unwrap_or_default();
        for (experiment, variant) in stored {
            self.assignments.entry(experiment).or_insert(variant);
        }
        self.loaded = true;
    }

    /// Previously chosen variant for `experiment`, if any
    pub fn assignment(&self, experiment: &str) -> Option<&str> {
        self.assignments.get(experiment).map(String::as_str)
    }

    /// Choose (or recall) the variant for this client
    ///
    /// Without a client id the choice is random; it is still remembered so
    /// the visitor sees one variant for the rest of the session.
    pub fn assign<S: AsRef<str>>(
        &mut self,
        storage: &mut dyn Storage,
        client_id: Option<&ClientId>,
        experiment: &str,
        variants: &[S],
    ) -> String {
        if variants.is_empty() {
            debug!(experiment, "No variants supplied, using placeholder");
            return PLACEHOLDER_VARIANT.to_string();
        }

        self.load(storage);

        if let Some(existing) = self.assignments.get(experiment) {
            if variants.iter().any(|v| v.as_ref() == existing.as_str()) {
                return existing.clone();
            }
            debug!(experiment, previous = %existing, "Stored variant no longer offered, reassigning");
        }

        let index = match client_id {
            Some(client) => variant_index(bucket(experiment, client.as_str()), variants.len()),
            None => {
                warn!(experiment, "No client identity, assigning variant at random");
                rand::thread_rng().gen_range(0..variants.len())
            }
        };
        let chosen = variants[index].as_ref().to_string();

        self.assignments
            .insert(experiment.to_string(), chosen.clone());
        if let Err(e) = storage::save_json(storage, keys::EXPERIMENTS, &self.assignments) {
            warn!("Failed to persist experiment assignments: {}", e);
        }

        debug!(experiment, variant = %chosen, "Variant assigned");
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, UnavailableStorage};

    fn client(id: &str) -> ClientId {
        ClientId::new(id).unwrap()
    }

    #[test]
    fn test_bucket_is_stable_and_in_range() {
        let a = bucket("banner-test", "client-1");
        assert_eq!(a, bucket("banner-test", "client-1"));
        assert!((0.0..1.0).contains(&a));
        assert_ne!(a, bucket("other-test", "client-1"));
    }

    #[test]
    fn test_variant_index_bounds() {
        assert_eq!(variant_index(0.0, 3), 0);
        assert_eq!(variant_index(0.34, 3), 1);
        assert_eq!(variant_index(0.999_999, 3), 2);
        assert_eq!(variant_index(0.5, 0), 0);
    }

    #[test]
    fn test_empty_variant_list_returns_placeholder() {
        let mut assigner = VariantAssigner::new();
        let mut storage = MemoryStorage::new();
        let variants: [&str; 0] = [];
        assert_eq!(
            assigner.assign(&mut storage, Some(&client("c")), "exp", &variants),
            PLACEHOLDER_VARIANT
        );
        assert!(storage.is_empty());
    }

    #[test]
    fn test_assignment_persists_across_assigners() {
        let mut storage = MemoryStorage::new();
        let variants = ["a", "b", "c"];
        let first = VariantAssigner::new().assign(&mut storage, Some(&client("c1")), "exp", &variants);

        // A different client id would hash elsewhere; the stored choice wins
        let mut later = VariantAssigner::new();
        let second = later.assign(&mut storage, Some(&client("someone-else")), "exp", &variants);
        assert_eq!(first, second);
    }

    #[test]
    fn test_removed_variant_is_reassigned() {
        let mut storage = MemoryStorage::new();
        let mut assigner = VariantAssigner::new();
        let picked = assigner.assign(&mut storage, Some(&client("c1")), "exp", &["a", "b"]);

        let remaining: Vec<&str> = ["a", "b", "z"]
            .into_iter()
            .filter(|v| *v != picked)
            .collect();
        let next = assigner.assign(&mut storage, Some(&client("c1")), "exp", &remaining);
        assert!(remaining.contains(&next.as_str()));
    }

    #[test]
    fn test_random_fallback_is_still_sticky() {
        let mut storage = UnavailableStorage;
        let mut assigner = VariantAssigner::new();
        let variants = vec!["a".to_string(), "b".to_string()];

        let first = assigner.assign(&mut storage, None, "exp", &variants);
        for _ in 0..20 {
            assert_eq!(assigner.assign(&mut storage, None, "exp", &variants), first);
        }
    }
}
