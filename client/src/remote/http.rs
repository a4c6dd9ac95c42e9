//! HTTP client for the Cask record service.

use super::{RemoteError, RemoteService};
use async_trait::async_trait;
use cask_engine::Record;
use reqwest::{Client, Response, Url};
use std::time::Duration;

/// Talks to the record service over its REST surface:
///
/// - `GET    /tables/{table}/records`
/// - `POST   /tables/{table}/records`
/// - `PATCH  /tables/{table}/records/{id}`
/// - `DELETE /tables/{table}/records/{id}`
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
}

impl HttpRemote {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url).map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Fetch every record of a table, for read paths that feed the merge layer.
    pub async fn list(&self, table: &str) -> Result<Vec<Record>, RemoteError> {
        let response = self
            .client
            .get(self.endpoint(table, None))
            .send()
            .await
            .map_err(unreachable)?;

        check(response)
            .await?
            .json::<Vec<Record>>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    fn endpoint(&self, table: &str, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["tables", table, "records"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn insert(&self, table: &str, record: &Record) -> Result<Record, RemoteError> {
        let response = self
            .client
            .post(self.endpoint(table, None))
            .json(record)
            .send()
            .await
            .map_err(unreachable)?;

        read_record(check(response).await?).await
    }

    async fn update(&self, table: &str, id: &str, patch: &Record) -> Result<Record, RemoteError> {
        let response = self
            .client
            .patch(self.endpoint(table, Some(id)))
            .json(patch)
            .send()
            .await
            .map_err(unreachable)?;

        read_record(check(response).await?).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.endpoint(table, Some(id)))
            .send()
            .await
            .map_err(unreachable)?;

        check(response).await?;
        Ok(())
    }
}

fn unreachable(err: reqwest::Error) -> RemoteError {
    RemoteError::Unreachable(err.to_string())
}

async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn read_record(response: Response) -> Result<Record, RemoteError> {
    response
        .json::<Record>()
        .await
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}
