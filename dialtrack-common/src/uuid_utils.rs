//! UUID utilities

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;
use uuid::Uuid;

/// Generate a UUIDv4 from the operating system's secure random source
///
/// Returns `None` when the source fails. Callers treat that as "identity
/// unavailable"; there is no non-random fallback.
pub fn try_generate() -> Option<Uuid> {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => Some(uuid::Builder::from_random_bytes(bytes).into_uuid()),
        Err(e) => {
            warn!("Secure random source unavailable: {}", e);
            None
        }
    }
}

/// Source of random identifiers
pub trait IdSource {
    fn random_id(&self) -> Option<Uuid>;
}

/// Secure OS-backed identifier source
#[derive(Debug, Clone, Copy, Default)]
pub struct OsIdSource;

impl IdSource for OsIdSource {
    fn random_id(&self) -> Option<Uuid> {
        try_generate()
    }
}

/// Identifier source that always fails (no secure random capability)
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableIdSource;

impl IdSource for UnavailableIdSource {
    fn random_id(&self) -> Option<Uuid> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_v4_and_distinct() {
        let a = try_generate().unwrap();
        let b = try_generate().unwrap();
        assert_eq!(a.get_version_num(), 4);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unavailable_source_yields_none() {
        assert!(UnavailableIdSource.random_id().is_none());
        assert!(OsIdSource.random_id().is_some());
    }
}
