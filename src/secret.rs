//! Secret store collaborator
//!
//! Automation actions reference credentials by key; lookups go to an
//! environment-backed store by default (`HOSTFORGE_SECRET_<KEY>`), with an
//! optional TOML file fallback for air-gapped hosts.

use declarative::SecretSource;
use std::collections::BTreeMap;
use std::path::Path;

const ENV_PREFIX: &str = "HOSTFORGE_SECRET_";

/// Environment variables first, then the optional secrets file
#[derive(Debug, Default)]
pub struct EnvSecretStore {
    file_secrets: BTreeMap<String, String>,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a `key = "value"` TOML file underneath the environment
    pub fn with_file(path: &Path) -> Self {
        let file_secrets = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| toml::from_str::<BTreeMap<String, String>>(&content).ok())
            .unwrap_or_default();
        Self { file_secrets }
    }
}

impl SecretSource for EnvSecretStore {
    fn lookup(&self, key: &str) -> Option<String> {
        let env_key = format!("{ENV_PREFIX}{}", key.to_uppercase());
        std::env::var(env_key)
            .ok()
            .or_else(|| self.file_secrets.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, "backup_token = \"hunter2\"\n").unwrap();

        let store = EnvSecretStore::with_file(&path);
        assert_eq!(store.lookup("backup_token").as_deref(), Some("hunter2"));
        assert!(store.lookup("missing").is_none());
    }

    #[test]
    fn test_environment_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, "from_env = \"file-value\"\n").unwrap();

        // SAFETY: test-local variable, no concurrent reader depends on it
        unsafe { std::env::set_var("HOSTFORGE_SECRET_FROM_ENV", "env-value") };
        let store = EnvSecretStore::with_file(&path);
        assert_eq!(store.lookup("from_env").as_deref(), Some("env-value"));
        unsafe { std::env::remove_var("HOSTFORGE_SECRET_FROM_ENV") };
    }
}
