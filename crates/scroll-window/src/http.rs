//! Record source backed by a paginated JSON endpoint.

use crate::record::{Offset, Record};
use crate::source::{RecordSource, SourceError};
use async_trait::async_trait;
use reqwest::Client;

/// Calls `GET <endpoint>?offset=<o>&count=<c>` and expects a JSON array of
/// `{"SRC": .., "OFFSET": ..}` objects.
#[derive(Clone, Debug)]
pub struct HttpRecordSource {
    http: Client,
    endpoint: String,
}

impl HttpRecordSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_page(&self, offset: Offset, count: usize) -> Result<Vec<Record>, SourceError> {
        let res = self
            .http
            .get(&self.endpoint)
            .query(&[("offset", offset), ("count", count as Offset)])
            .send()
            .await?;

        if res.status().is_success() {
            Ok(res.json::<Vec<Record>>().await?)
        } else {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(SourceError::UnexpectedStatus { status, body })
        }
    }
}
