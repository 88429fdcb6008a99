//! Integration tests for variant assignment
//!
//! Covers:
//! - Same client + experiment always yields the same variant
//! - Assignments survive a new assigner over the same durable storage
//! - Distribution over many synthetic clients is close to uniform

use dialtrack_common::experiments::{bucket, VariantAssigner, PLACEHOLDER_VARIANT};
use dialtrack_common::identity::ClientId;
use dialtrack_common::storage::{JsonFileStorage, MemoryStorage};
use std::collections::HashMap;
use tempfile::TempDir;

const VARIANTS: [&str; 3] = ["control", "red-banner", "blue-banner"];

#[test]
fn test_assign_twice_returns_same_variant() {
    let client = ClientId::new("6f1c1a1e-6a57-4d6b-9a53-7e3f0a0c2b11").unwrap();
    let mut storage = MemoryStorage::new();
    let mut assigner = VariantAssigner::new();

    let first = assigner.assign(&mut storage, Some(&client), "banner-test", &VARIANTS);
    let second = assigner.assign(&mut storage, Some(&client), "banner-test", &VARIANTS);
    assert_eq!(first, second);

    // A fresh assigner without stored state recomputes the same bucket
    let recomputed =
        VariantAssigner::new().assign(&mut MemoryStorage::new(), Some(&client), "banner-test", &VARIANTS);
    assert_eq!(first, recomputed);
}

#[test]
fn test_assignment_survives_restart_on_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("local.json");
    let client = ClientId::new("client-on-disk").unwrap();

    let chosen = {
        let mut storage = JsonFileStorage::open(&path).unwrap();
        VariantAssigner::new().assign(&mut storage, Some(&client), "hero-copy", &VARIANTS)
    };

    let mut reopened = JsonFileStorage::open(&path).unwrap();
    let mut assigner = VariantAssigner::new();
    assert_eq!(
        assigner.assign(&mut reopened, Some(&client), "hero-copy", &VARIANTS),
        chosen
    );
    assert_eq!(assigner.assignment("hero-copy"), Some(chosen.as_str()));
}

#[test]
fn test_distribution_is_roughly_uniform() {
    let samples = 30_000;
    let mut counts: HashMap<String, usize> = HashMap::new();

    for i in 0..samples {
        let client = ClientId::new(format!("synthetic-client-{}", i)).unwrap();
        let variant = VariantAssigner::new().assign(
            &mut MemoryStorage::new(),
            Some(&client),
            "banner-test",
            &VARIANTS,
        );
        *counts.entry(variant).or_default() += 1;
    }

    let expected = samples as f64 / VARIANTS.len() as f64;
    for variant in VARIANTS {
        let observed = counts.get(variant).copied().unwrap_or(0) as f64;
        let deviation = (observed - expected).abs() / expected;
        assert!(
            deviation < 0.05,
            "variant {} observed {} times, expected about {}",
            variant,
            observed,
            expected
        );
    }
}

#[test]
fn test_experiments_bucket_independently() {
    let differing = (0..200)
        .map(|i| format!("client-{}", i))
        .filter(|c| {
            let a = (bucket("exp-a", c) * 2.0) as usize;
            let b = (bucket("exp-b", c) * 2.0) as usize;
            a != b
        })
        .count();
    assert!(differing > 50, "buckets should not be correlated across experiments");
}

#[test]
fn test_empty_list_placeholder() {
    let empty: Vec<String> = Vec::new();
    let mut storage = MemoryStorage::new();
    let variant = VariantAssigner::new().assign(&mut storage, None, "nothing", &empty);
    assert_eq!(variant, PLACEHOLDER_VARIANT);
}
