//! Credential tokens resolved against the key-value seam.
//!
//! Token issuance endpoints live outside this service; what the gateway
//! needs is the verification half, which resolves an opaque token string to
//! a stored identity. Tokens are single-use and expire.

use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::StoreError;

/// Token TTL in seconds (1 hour).
pub const TOKEN_TTL_SECS: u64 = 3600;

const TOKEN_KEY_PREFIX: &str = "drift:tok:";

/// Identity stored alongside a credential token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub username: String,
}

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Mint and store a connection token for a verified user.
pub async fn issue_token(
    kv: &dyn KeyValueStore,
    user_id: &str,
    username: &str,
) -> Result<String, StoreError> {
    let token = generate_opaque_token("tok", 32);
    let data = TokenData {
        user_id: user_id.to_string(),
        username: username.to_string(),
    };
    let value = serde_json::to_string(&data).map_err(|_| StoreError::Corrupt("token data"))?;
    kv.set_ex(&format!("{TOKEN_KEY_PREFIX}{token}"), &value, TOKEN_TTL_SECS)
        .await?;
    Ok(token)
}

/// Resolve a token to its identity, consuming it. A second verification of
/// the same token fails.
pub async fn verify_token(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<TokenData>, StoreError> {
    let key = format!("{TOKEN_KEY_PREFIX}{token}");
    let val = kv.get(&key).await?;
    if val.is_some() {
        let _ = kv.del(&key).await;
    }
    match val {
        Some(v) => {
            let data: TokenData =
                serde_json::from_str(&v).map_err(|_| StoreError::Corrupt("token data"))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}
