use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::{
    error::ServiceError,
    query::{ChannelData, SampleQuery},
};

/// A data-api instance answering `POST /query`.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn query(&self, query: &SampleQuery) -> Result<Vec<ChannelData>, ServiceError>;
}

#[derive(Clone)]
pub struct HttpQueryService {
    client: Client,
    url: String,
}

impl HttpQueryService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::Client)?;
        Ok(Self {
            client,
            url: format!("{}/query", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QueryService for HttpQueryService {
    async fn query(&self, query: &SampleQuery) -> Result<Vec<ChannelData>, ServiceError> {
        debug!(url = %self.url, ?query, "post query");

        let request_error = |source| ServiceError::Request {
            url: self.url.clone(),
            source,
        };

        let response = self
            .client
            .post(&self.url)
            .json(query)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(request_error)?;
        if status != StatusCode::OK {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(ServiceError::Decode)
    }
}
