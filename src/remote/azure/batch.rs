//! `$batch` request encoding and response classification.

use uuid::Uuid;

use super::odata;
use crate::{
    models::StagingRow,
    remote::{BatchOutcome, RemoteError},
};

const CRLF: &str = "\r\n";

/// A multipart request holding one changeset of entity deletes.
#[derive(Debug)]
pub struct DeleteBatch {
    batch_boundary: String,
    body: String,
}

impl DeleteBatch {
    /// Encode deletes for `rows` of `table` hosted at `endpoint`.
    pub fn new(endpoint: &str, table: &str, rows: &[StagingRow]) -> Self {
        let batch_boundary = format!("batch_{}", Uuid::new_v4());
        let changeset_boundary = format!("changeset_{}", Uuid::new_v4());
        let endpoint = endpoint.trim_end_matches('/');

        let mut body = String::with_capacity(rows.len() * 256);
        body.push_str(&format!("--{batch_boundary}{CRLF}"));
        body.push_str(&format!(
            "Content-Type: multipart/mixed; boundary={changeset_boundary}{CRLF}{CRLF}"
        ));

        for row in rows {
            let entity = odata::entity_path(table, &row.partition_key, &row.row_key);
            body.push_str(&format!("--{changeset_boundary}{CRLF}"));
            body.push_str(&format!("Content-Type: application/http{CRLF}"));
            body.push_str(&format!("Content-Transfer-Encoding: binary{CRLF}{CRLF}"));
            body.push_str(&format!("DELETE {endpoint}/{entity} HTTP/1.1{CRLF}"));
            body.push_str(&format!(
                "Accept: application/json;odata=minimalmetadata{CRLF}"
            ));
            body.push_str(&format!("DataServiceVersion: 3.0;{CRLF}"));
            body.push_str(&format!("If-Match: *{CRLF}{CRLF}"));
        }

        body.push_str(&format!("--{changeset_boundary}--{CRLF}"));
        body.push_str(&format!("--{batch_boundary}--{CRLF}"));

        Self {
            batch_boundary,
            body,
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.batch_boundary)
    }

    pub fn into_body(self) -> String {
        self.body
    }
}

/// Classify a `$batch` response.
///
/// The outer status covers the request itself; each operation reports its
/// own `HTTP/1.1 <code>` line inside the multipart body. A failing changeset
/// carries a single status line for the operation that failed.
pub fn classify_response(status: u16, body: &str) -> BatchOutcome {
    if status == 404 {
        return BatchOutcome::AlreadyGone;
    }
    if !(200..300).contains(&status) {
        return BatchOutcome::Failed(RemoteError::status(status, error_message(body)));
    }

    for line in body.lines() {
        let Some(rest) = line.trim().strip_prefix("HTTP/1.1 ") else {
            continue;
        };
        let Some(code) = rest.get(..3).and_then(|c| c.parse::<u16>().ok()) else {
            return BatchOutcome::Failed(RemoteError::InvalidResponse(format!(
                "unparseable status line in batch response: {line}"
            )));
        };
        match code {
            200..=299 => {}
            404 => return BatchOutcome::AlreadyGone,
            _ => {
                return BatchOutcome::Failed(RemoteError::status(code, error_message(body)));
            }
        }
    }

    BatchOutcome::Deleted
}

/// Pull a readable message out of an OData error payload.
pub fn error_message(body: &str) -> String {
    let start = body.find('{');
    let end = body.rfind('}');
    if let (Some(start), Some(end)) = (start, end)
        && start < end
        && let Ok(json) = serde_json::from_str::<serde_json::Value>(&body[start..=end])
        && let Some(error) = json.get("odata.error")
    {
        let code = error.get("code").and_then(|c| c.as_str()).unwrap_or("");
        let message = error
            .pointer("/message/value")
            .and_then(|m| m.as_str())
            .unwrap_or("");
        return format!("{code}: {}", message.lines().next().unwrap_or(""))
            .trim_matches([':', ' '])
            .to_string();
    }

    body.chars().take(200).collect::<String>().trim().to_string()
}
