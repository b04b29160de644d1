use sha2::{Digest, Sha256};

/// Deterministic digest identifying one (recording, configuration)
/// pair: hex sha256 over the recording id and the configuration
/// fingerprint. Identical inputs always map to the same key; changing
/// any extraction parameter changes the fingerprint and therefore the
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(recording_id: &str, config_fingerprint: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(recording_id.as_bytes());
        // Separator prevents (id, fingerprint) boundary ambiguity.
        hasher.update([0u8]);
        hasher.update(config_fingerprint.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
