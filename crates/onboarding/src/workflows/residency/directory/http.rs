use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{ApartmentDirectory, BlockSet, DirectoryError};
use crate::config::DirectoryConfig;
use crate::workflows::residency::domain::ApartmentId;

/// Subset of the apartment service's apartment resource that registration
/// relies on.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApartmentDetails {
    #[serde(default)]
    block_names: Option<Vec<String>>,
}

/// reqwest adapter for `GET {base_url}/api/v1/apartments/{id}`.
#[derive(Debug, Clone)]
pub struct HttpApartmentDirectory {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpApartmentDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(DirectoryError::InvalidUrl("URL cannot be empty".into()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(DirectoryError::InvalidUrl(format!(
                "'{base_url}' must start with http:// or https://"
            )));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .user_agent(format!("onboarding/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;

        Ok(Self {
            http,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn apartment_url(&self, apartment_id: ApartmentId) -> String {
        format!("{}/api/v1/apartments/{}", self.base_url, apartment_id)
    }
}

#[async_trait]
impl ApartmentDirectory for HttpApartmentDirectory {
    async fn lookup(&self, apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError> {
        let url = self.apartment_url(apartment_id);
        debug!(url = %url, "looking up apartment blocks");

        let response = self.http.get(&url).send().await.map_err(|err| {
            if err.is_timeout() {
                DirectoryError::Timeout(self.request_timeout)
            } else {
                DirectoryError::Unavailable(err.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(apartment_id));
        }
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Unavailable(format!("status {status}: {message}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let details: ApartmentDetails = response
            .json()
            .await
            .map_err(|err| DirectoryError::InvalidResponse(err.to_string()))?;

        Ok(details
            .block_names
            .unwrap_or_default()
            .into_iter()
            .collect())
    }
}
