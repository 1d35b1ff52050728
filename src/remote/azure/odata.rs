//! OData query and key encoding for the Table service.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::{ContinuationToken, RemoteError, RemoteResult};

/// Properties requested from the store; everything else is left on the server.
pub const SELECTED_PROPERTIES: &str = "PartitionKey,RowKey,Timestamp";

/// Filter matching rows last modified strictly before `cutoff`.
pub fn older_than_filter(cutoff: DateTime<Utc>) -> String {
    format!(
        "Timestamp lt datetime'{}'",
        cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Address one entity inside a table: `table(PartitionKey='..',RowKey='..')`.
pub fn entity_path(table: &str, partition_key: &str, row_key: &str) -> String {
    format!(
        "{}(PartitionKey='{}',RowKey='{}')",
        table,
        encode_component(&quote_key(partition_key)),
        encode_component(&quote_key(row_key)),
    )
}

/// Escape a key for use inside an OData string literal.
fn quote_key(key: &str) -> String {
    key.replace('\'', "''")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
///
/// Spaces become `%20`, never `+`.
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Position in a scan, as reported by the continuation response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPosition {
    pub next_partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_row_key: Option<String>,
}

impl ScanPosition {
    pub fn into_token(self) -> RemoteResult<ContinuationToken> {
        let raw = serde_json::to_string(&self)
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(ContinuationToken::new(raw))
    }

    pub fn from_token(token: &ContinuationToken) -> RemoteResult<Self> {
        serde_json::from_str(token.as_str()).map_err(|e| {
            RemoteError::InvalidResponse(format!("malformed continuation token: {e}"))
        })
    }
}
