//! Azure Table Storage adapter.
//!
//! Talks to the Table service REST API directly: filtered queries with
//! continuation headers for reads, `$batch` changesets for deletes, and
//! SharedKeyLite authentication.

mod auth;
mod batch;
mod odata;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveTime, Utc};
use reqwest::{
    RequestBuilder, Response,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde::Deserialize;
use url::Url;

pub use auth::SharedKeyCredential;

use self::{batch::DeleteBatch, odata::ScanPosition};
use super::{
    BatchOutcome, ContinuationToken, RemoteError, RemoteResult, RemoteTableRepository, RowPage,
};
use crate::models::{RemoteRow, StagingRow};

/// Largest page the Table service returns for one query.
pub const MAX_PAGE_SIZE: u32 = 1000;

const API_VERSION: &str = "2019-02-02";
const NO_METADATA: &str = "application/json;odata=nometadata";
const NEXT_PARTITION_KEY_HEADER: &str = "x-ms-continuation-nextpartitionkey";
const NEXT_ROW_KEY_HEADER: &str = "x-ms-continuation-nextrowkey";

/// Rows become eligible once they are older than this many days, counted
/// from the start of the current UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    days: u32,
}

impl RetentionWindow {
    pub fn days(days: u32) -> Self {
        Self { days }
    }

    /// Cutoff for a scan started at `now`.
    pub fn cutoff_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let day = now
            .date_naive()
            .checked_sub_days(Days::new(u64::from(self.days)))
            .unwrap_or(chrono::NaiveDate::MIN);
        day.and_time(NaiveTime::MIN).and_utc()
    }
}

/// Everything needed to address one table.
#[derive(Debug, Clone)]
pub struct AzureTableSettings {
    pub account: String,
    pub key: String,
    pub table: String,
    /// Overrides `https://{account}.table.core.windows.net`.
    pub endpoint: Option<String>,
    pub retention: RetentionWindow,
}

/// Default public endpoint for a storage account.
pub fn default_endpoint(account: &str) -> String {
    format!("https://{account}.table.core.windows.net")
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    value: Vec<EntityRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntityRecord {
    partition_key: String,
    row_key: String,
    timestamp: DateTime<Utc>,
}

/// [`RemoteTableRepository`] backed by one Azure Storage table.
#[derive(Debug, Clone)]
pub struct AzureTableRepository {
    client: reqwest::Client,
    credential: SharedKeyCredential,
    endpoint: String,
    table: String,
    retention: RetentionWindow,
}

impl AzureTableRepository {
    /// Create a repository using a shared HTTP client.
    pub fn new(client: reqwest::Client, settings: AzureTableSettings) -> RemoteResult<Self> {
        let credential = SharedKeyCredential::new(settings.account.clone(), &settings.key)?;
        let endpoint = settings
            .endpoint
            .unwrap_or_else(|| default_endpoint(&settings.account));
        Url::parse(&endpoint)
            .map_err(|e| RemoteError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

        Ok(Self {
            client,
            credential,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            table: settings.table,
            retention: settings.retention,
        })
    }

    /// Build the HTTP client used by every repository.
    pub fn http_client(timeout: Duration) -> RemoteResult<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(timeout).build()?)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn url(&self, resource: &str, query: &[(&str, String)]) -> RemoteResult<Url> {
        let mut raw = format!("{}/{}", self.endpoint, resource);
        for (i, (name, value)) in query.iter().enumerate() {
            raw.push(if i == 0 { '?' } else { '&' });
            raw.push_str(name);
            raw.push('=');
            raw.push_str(&odata::encode_component(value));
        }
        Url::parse(&raw).map_err(|e| RemoteError::InvalidEndpoint(format!("{raw}: {e}")))
    }

    fn signed(&self, builder: RequestBuilder, url: &Url) -> RemoteResult<RequestBuilder> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let authorization = self.credential.authorization(&date, url)?;
        Ok(builder
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header("DataServiceVersion", "3.0;NetFx")
            .header("MaxDataServiceVersion", "3.0;NetFx")
            .header("Authorization", authorization))
    }

    async fn submit_batch(&self, rows: &[StagingRow]) -> RemoteResult<BatchOutcome> {
        let url = self.url("$batch", &[])?;
        let batch = DeleteBatch::new(&self.endpoint, &self.table, rows);

        let response = self
            .signed(self.client.post(url.clone()), &url)?
            .header(CONTENT_TYPE, batch.content_type())
            .body(batch.into_body())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(batch::classify_response(status, &body))
    }
}

/// Turn a non-success response into a status error.
async fn error_for_status(response: Response) -> RemoteError {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => RemoteError::status(status, batch::error_message(&body)),
        Err(e) => RemoteError::Http(e),
    }
}

fn next_token(response: &Response) -> RemoteResult<Option<ContinuationToken>> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    match header(NEXT_PARTITION_KEY_HEADER) {
        Some(next_partition_key) => ScanPosition {
            next_partition_key,
            next_row_key: header(NEXT_ROW_KEY_HEADER),
        }
        .into_token()
        .map(Some),
        None => Ok(None),
    }
}

#[async_trait]
impl RemoteTableRepository for AzureTableRepository {
    async fn get_rows(
        &self,
        token: Option<&ContinuationToken>,
        page_size: u32,
    ) -> RemoteResult<RowPage> {
        let cutoff = self.retention.cutoff_at(Utc::now());
        let top = page_size.clamp(1, MAX_PAGE_SIZE);

        let mut query = vec![
            ("$filter", odata::older_than_filter(cutoff)),
            ("$top", top.to_string()),
            ("$select", odata::SELECTED_PROPERTIES.to_string()),
        ];
        if let Some(token) = token {
            let position = ScanPosition::from_token(token)?;
            query.push(("NextPartitionKey", position.next_partition_key));
            if let Some(next_row_key) = position.next_row_key {
                query.push(("NextRowKey", next_row_key));
            }
        }

        let url = self.url(&format!("{}()", self.table), &query)?;
        let response = self
            .signed(self.client.get(url.clone()), &url)?
            .header(ACCEPT, NO_METADATA)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let next = next_token(&response)?;
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        let rows = body
            .value
            .into_iter()
            .map(|e| RemoteRow::new(e.partition_key, e.row_key, e.timestamp))
            .collect::<Vec<_>>();

        tracing::trace!(
            table = %self.table,
            rows = rows.len(),
            has_more = next.is_some(),
            "Fetched page from remote table"
        );

        Ok(RowPage::new(rows, next))
    }

    async fn delete_batch(&self, batch: &[StagingRow]) -> BatchOutcome {
        match self.submit_batch(batch).await {
            Ok(outcome) => outcome,
            Err(e) => BatchOutcome::Failed(e),
        }
    }
}
