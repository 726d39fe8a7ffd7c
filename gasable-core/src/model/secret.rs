//! Secret entity (spec §3, §4.8). Plaintext never leaves the Vault boundary;
//! this type only ever carries ciphertext.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub key_name: String,
    pub scope: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub version: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
