//! WP Engine API endpoints used by the backup engine.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::credentials::ApiCredentials;

use super::wire::{BackupList, CreateBackupRequest, InstallPage, RemoteBackup};
use super::{sanitize_body, ApiError, HttpRequest, HttpResponse, HttpTransport};

/// Authenticated client for the remote backup API.
#[derive(Clone)]
pub struct RemoteApi {
    base_url: Url,
    credentials: ApiCredentials,
    user_agent: String,
    read_timeout: Duration,
    backup_timeout: Duration,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for RemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApi")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl RemoteApi {
    /// Build a client. No request is made.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingCredentials`] if either credential is empty,
    /// or [`ApiError::Url`] if the base URL is invalid.
    pub fn new(
        config: &ApiConfig,
        credentials: ApiCredentials,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ApiError> {
        if !credentials.is_complete() {
            return Err(ApiError::MissingCredentials);
        }
        let base_url =
            Url::parse(&config.base_url).map_err(|e| ApiError::Url(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Url(config.base_url.clone()));
        }
        Ok(Self {
            base_url,
            credentials,
            user_agent: config.user_agent.clone(),
            read_timeout: config.read_timeout(),
            backup_timeout: config.backup_timeout(),
            transport,
        })
    }

    /// Fetch one page of `GET /installs?limit&offset`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-200 status, or an
    /// unparseable body.
    pub async fn list_installs_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<InstallPage, ApiError> {
        let mut url = self.endpoint(&["installs"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        debug!(limit, offset, "fetching installs page");
        let response = self.transport.get(self.request(url, self.read_timeout)).await?;
        let body = expect_ok(response)?;
        serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// `POST /installs/{id}/backups`.
    ///
    /// Returns the raw response whatever its status; interpreting the status
    /// belongs to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when no response is received.
    pub async fn create_backup(
        &self,
        install_id: &str,
        request: &CreateBackupRequest,
    ) -> Result<HttpResponse, ApiError> {
        let url = self.endpoint(&["installs", install_id, "backups"])?;
        let body = serde_json::to_string(request).map_err(|e| ApiError::Parse(e.to_string()))?;
        debug!(install_id, "requesting backup");
        let response = self
            .transport
            .post(self.request(url, self.backup_timeout), body)
            .await?;
        Ok(response)
    }

    /// `GET /installs/{id}/backups`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-200 status, or an
    /// unparseable body.
    pub async fn list_backups(&self, install_id: &str) -> Result<Vec<RemoteBackup>, ApiError> {
        let url = self.endpoint(&["installs", install_id, "backups"])?;
        let response = self.transport.get(self.request(url, self.read_timeout)).await?;
        let body = expect_ok(response)?;
        let list: BackupList =
            serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(list.into_vec())
    }

    /// Probe `GET /accounts` to verify the credentials.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or any status other than 200.
    pub async fn check_credentials(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["accounts"])?;
        let response = self.transport.get(self.request(url, self.read_timeout)).await?;
        expect_ok(response).map(|_| ())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: Url, timeout: Duration) -> HttpRequest {
        HttpRequest {
            url,
            headers: vec![
                (
                    "Authorization".to_owned(),
                    self.credentials.basic_auth_header(),
                ),
                ("Content-Type".to_owned(), "application/json".to_owned()),
                ("User-Agent".to_owned(), self.user_agent.clone()),
            ],
            timeout,
        }
    }
}

fn expect_ok(response: HttpResponse) -> Result<String, ApiError> {
    if response.status == 200 {
        Ok(response.body)
    } else {
        Err(ApiError::HttpStatus {
            status: response.status,
            body: sanitize_body(&response.body),
        })
    }
}
