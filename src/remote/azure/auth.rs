//! SharedKeyLite request signing for the Table service.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::remote::{RemoteError, RemoteResult};

type HmacSha256 = Hmac<Sha256>;

/// Storage account name plus its decoded access key.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SharedKeyCredential {
    /// Create a credential from the base64 access key shown in the portal.
    pub fn new(account: impl Into<String>, key: &str) -> RemoteResult<Self> {
        let account = account.into();
        if account.is_empty() {
            return Err(RemoteError::InvalidCredential(
                "account name is empty".to_string(),
            ));
        }
        let key = BASE64.decode(key.trim()).map_err(|e| {
            RemoteError::InvalidCredential(format!("account key is not valid base64: {e}"))
        })?;
        if key.is_empty() {
            return Err(RemoteError::InvalidCredential(
                "account key is empty".to_string(),
            ));
        }
        Ok(Self { account, key })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// `x-ms-date` + newline + canonicalized resource.
    pub fn string_to_sign(&self, date: &str, url: &Url) -> String {
        format!("{}\n/{}{}", date, self.account, url.path())
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self, date: &str, url: &Url) -> RemoteResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| RemoteError::InvalidCredential(e.to_string()))?;
        mac.update(self.string_to_sign(date, url).as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKeyLite {}:{}", self.account, signature))
    }
}
