//! C8: credential vault (spec §4.8). Secrets are encrypted at rest with a
//! process-level AES-256-GCM master key; plaintext only ever exists in a
//! short-lived buffer handed to a tool's [`crate::tools::ToolContext`].
//! `Store` owns the ciphertext rows (`put_secret`/`get_secret_*`); this
//! module owns the encrypt/decrypt boundary and the scope-precedence
//! lookup used by the Orchestrator and Workflow Runtime to gate dispatch.

use crate::error::{GasableError, Result};
use crate::model::Secret;
use crate::store::Store;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

const NONCE_LEN: usize = 12;

/// `global | agent:<id> | tool:<name> | user:<id>` (spec §3 Secret scope).
pub fn agent_scope(agent_id: &str) -> String {
    format!("agent:{agent_id}")
}

pub fn user_scope(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub const GLOBAL_SCOPE: &str = "global";

pub struct Vault {
    store: Arc<dyn Store>,
    cipher: Aes256Gcm,
}

impl Vault {
    pub fn new(store: Arc<dyn Store>, master_key: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&master_key));
        Self { store, cipher }
    }

    /// Decodes a base64-encoded 32-byte key, e.g. from a `VAULT_MASTER_KEY`
    /// environment variable.
    pub fn from_base64_key(store: Arc<dyn Store>, encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| GasableError::BadRequest(format!("invalid master key encoding: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| GasableError::BadRequest("master key must decode to 32 bytes".to_string()))?;
        Ok(Self::new(store, key))
    }

    fn encrypt(&self, plaintext: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| GasableError::Internal(format!("encryption failed: {e}")))?;
        Ok((ciphertext, nonce_bytes.to_vec()))
    }

    fn decrypt(&self, secret: &Secret) -> Result<String> {
        let nonce = Nonce::from_slice(&secret.nonce);
        let plaintext = self
            .cipher
            .decrypt(nonce, secret.ciphertext.as_slice())
            .map_err(|e| GasableError::Internal(format!("decryption failed: {e}")))?;
        String::from_utf8(plaintext).map_err(|e| GasableError::Internal(format!("non-utf8 secret: {e}")))
    }

    /// Stores `plaintext` as the next version for `(scope, key_name)`.
    pub async fn put(&self, scope: &str, key_name: &str, plaintext: &str) -> Result<i32> {
        let next_version = match self.store.get_secret_latest(scope, key_name).await {
            Ok(existing) => existing.version + 1,
            Err(e) if e.kind() == crate::error::ErrorKind::NotFound => 1,
            Err(e) => return Err(e),
        };
        let (ciphertext, nonce) = self.encrypt(plaintext)?;
        let secret = Secret {
            key_name: key_name.to_string(),
            scope: scope.to_string(),
            ciphertext,
            nonce,
            version: next_version,
            created_at: chrono::Utc::now(),
        };
        self.store.put_secret(&secret).await?;
        Ok(next_version)
    }

    pub async fn get(&self, scope: &str, key_name: &str) -> Result<String> {
        let secret = self.store.get_secret_latest(scope, key_name).await?;
        self.decrypt(&secret)
    }

    /// Reads a specific pinned version, used when a run must keep using the
    /// version it started with regardless of a rotation that lands mid-run.
    pub async fn get_version(&self, scope: &str, key_name: &str, version: i32) -> Result<String> {
        let secret = self.store.get_secret_version(scope, key_name, version).await?;
        self.decrypt(&secret)
    }

    pub async fn list(&self, scope: &str) -> Result<Vec<String>> {
        Ok(self.store.list_secrets(scope).await?.into_iter().map(|s| s.key_name).collect())
    }

    /// Writes a new version holding `new_plaintext`, then prunes every
    /// version strictly older than the one just replaced — the spec leaves
    /// `rotate`'s new value implicit; a rotation with nothing to rotate to
    /// would be a no-op, so this takes the replacement explicitly (see
    /// DESIGN.md). The just-superseded version is retained so in-flight
    /// runs that pinned it can still finish.
    pub async fn rotate(&self, scope: &str, key_name: &str, new_plaintext: &str) -> Result<i32> {
        let previous = self.store.get_secret_latest(scope, key_name).await.ok();
        let new_version = self.put(scope, key_name, new_plaintext).await?;
        if let Some(previous) = previous {
            if previous.version > 0 {
                self.store.prune_secret_versions(scope, key_name, previous.version).await?;
            }
        }
        Ok(new_version)
    }

    /// Resolves every key in `required_keys` by scope precedence
    /// `user:<id> → agent:<agent_id> → global`, first hit wins. Keys with
    /// no match anywhere are simply absent from the result — callers (the
    /// Tool Registry, the Workflow Runtime's credential gate) detect that
    /// by diffing against `required_keys`, which is how `MissingCredential`
    /// is raised before any dispatch.
    pub async fn resolve_credentials(
        &self,
        required_keys: &[String],
        agent_id: &str,
        user_id: Option<&str>,
    ) -> HashMap<String, String> {
        let mut resolved = HashMap::new();
        for key_name in required_keys {
            let scopes: Vec<String> = user_id
                .map(user_scope)
                .into_iter()
                .chain(std::iter::once(agent_scope(agent_id)))
                .chain(std::iter::once(GLOBAL_SCOPE.to_string()))
                .collect();
            for scope in scopes {
                if let Ok(value) = self.get(&scope, key_name).await {
                    resolved.insert(key_name.clone(), value);
                    break;
                }
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn test_vault() -> Vault {
        Vault::new(Arc::new(MemStore::default()), [7u8; 32])
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_plaintext() {
        let vault = test_vault();
        vault.put(GLOBAL_SCOPE, "API_KEY", "sk-test-123").await.unwrap();
        assert_eq!(vault.get(GLOBAL_SCOPE, "API_KEY").await.unwrap(), "sk-test-123");
    }

    #[tokio::test]
    async fn rotate_bumps_version_and_keeps_old_readable() {
        let vault = test_vault();
        let v1 = vault.put(GLOBAL_SCOPE, "API_KEY", "old").await.unwrap();
        let v2 = vault.rotate(GLOBAL_SCOPE, "API_KEY", "new").await.unwrap();
        assert_eq!(v2, v1 + 1);
        assert_eq!(vault.get(GLOBAL_SCOPE, "API_KEY").await.unwrap(), "new");
        assert_eq!(vault.get_version(GLOBAL_SCOPE, "API_KEY", v1).await.unwrap(), "old");
    }

    #[tokio::test]
    async fn list_returns_key_names_not_plaintext() {
        let vault = test_vault();
        vault.put(GLOBAL_SCOPE, "ONE", "a").await.unwrap();
        vault.put(GLOBAL_SCOPE, "TWO", "b").await.unwrap();
        let mut names = vault.list(GLOBAL_SCOPE).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["ONE".to_string(), "TWO".to_string()]);
    }

    #[tokio::test]
    async fn resolve_prefers_user_scope_then_agent_then_global() {
        let vault = test_vault();
        vault.put(GLOBAL_SCOPE, "KEY", "global-value").await.unwrap();
        vault.put(&agent_scope("agent1"), "KEY", "agent-value").await.unwrap();
        vault.put(&user_scope("user1"), "KEY", "user-value").await.unwrap();

        let keys = vec!["KEY".to_string()];
        let resolved = vault.resolve_credentials(&keys, "agent1", Some("user1")).await;
        assert_eq!(resolved.get("KEY"), Some(&"user-value".to_string()));

        let resolved = vault.resolve_credentials(&keys, "agent1", None).await;
        assert_eq!(resolved.get("KEY"), Some(&"agent-value".to_string()));

        let resolved = vault.resolve_credentials(&keys, "agent2", None).await;
        assert_eq!(resolved.get("KEY"), Some(&"global-value".to_string()));
    }

    #[tokio::test]
    async fn missing_key_is_absent_not_erroring() {
        let vault = test_vault();
        let keys = vec!["NOPE".to_string()];
        let resolved = vault.resolve_credentials(&keys, "agent1", None).await;
        assert!(!resolved.contains_key("NOPE"));
    }
}
