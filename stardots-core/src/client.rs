use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.stardots.io";
const DEFAULT_PORTAL_BASE: &str = "https://i.stardots.io";
const PAGE_SIZE: usize = 100;
const NONCE_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum StardotsError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("host rejected request: {message}")]
    Rejected { message: String },
    #[error("api response missing data payload")]
    MissingData,
    #[error("portal base url cannot hold a path")]
    PortalBase,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    ts: Option<i64>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct FileListData {
    #[serde(default)]
    list: Vec<RemoteFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ticket {
    pub ticket: String,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    space: &'a str,
    #[serde(rename = "filenameList")]
    filename_list: &'a [String],
}

#[derive(Serialize)]
struct TicketRequest<'a> {
    space: &'a str,
    filename: &'a str,
}

#[derive(Clone)]
pub struct StardotsClient {
    http: Client,
    api_base: Url,
    portal_base: Url,
    key: String,
    secret: String,
    space: String,
    // Signed timestamps must match the host's clock, not ours.
    clock_skew: Arc<AtomicI64>,
}

impl StardotsClient {
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        space: impl Into<String>,
    ) -> Result<Self, StardotsError> {
        Self::with_base_urls(DEFAULT_API_BASE, DEFAULT_PORTAL_BASE, key, secret, space)
    }

    pub fn with_base_urls(
        api_base: &str,
        portal_base: &str,
        key: impl Into<String>,
        secret: impl Into<String>,
        space: impl Into<String>,
    ) -> Result<Self, StardotsError> {
        Ok(Self {
            http: Client::new(),
            api_base: Url::parse(api_base)?,
            portal_base: Url::parse(portal_base)?,
            key: key.into(),
            secret: secret.into(),
            space: space.into(),
            clock_skew: Arc::new(AtomicI64::new(0)),
        })
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    /// Learns the server/local clock offset from the space-list envelope.
    pub async fn sync_clock(&self) -> Result<(), StardotsError> {
        let url = self.endpoint("/openapi/space/list")?;
        let response = self.signed_request(Method::GET, url).send().await?;
        self.handle_ack(response).await
    }

    pub async fn list_files(&self) -> Result<Vec<RemoteFile>, StardotsError> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let mut url = self.endpoint("/openapi/file/list")?;
            url.query_pairs_mut()
                .append_pair("space", &self.space)
                .append_pair("page", &page.to_string())
                .append_pair("pageSize", &PAGE_SIZE.to_string());
            let response = self.signed_request(Method::GET, url).send().await?;
            let data: FileListData = self.handle_envelope(response).await?;
            let count = data.list.len();
            all.extend(data.list);
            if count < PAGE_SIZE {
                return Ok(all);
            }
            page += 1;
        }
    }

    pub async fn upload(
        &self,
        remote_name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<(), StardotsError> {
        let url = self.endpoint("/openapi/file/upload")?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(remote_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("space", self.space.clone());
        let response = self
            .signed_request(Method::PUT, url)
            .multipart(form)
            .send()
            .await?;
        self.handle_ack(response).await
    }

    pub async fn delete_files(&self, remote_names: &[String]) -> Result<(), StardotsError> {
        let url = self.endpoint("/openapi/file/delete")?;
        let response = self
            .signed_request(Method::DELETE, url)
            .json(&DeleteRequest {
                space: &self.space,
                filename_list: remote_names,
            })
            .send()
            .await?;
        self.handle_ack(response).await
    }

    pub async fn issue_ticket(&self, remote_name: &str) -> Result<Ticket, StardotsError> {
        let url = self.endpoint("/openapi/file/ticket")?;
        let response = self
            .signed_request(Method::POST, url)
            .json(&TicketRequest {
                space: &self.space,
                filename: remote_name,
            })
            .send()
            .await?;
        self.handle_envelope(response).await
    }

    /// Issues an access ticket and composes the portal URL the bytes are
    /// served from.
    pub async fn ticketed_download_url(&self, remote_name: &str) -> Result<Url, StardotsError> {
        let ticket = self.issue_ticket(remote_name).await?;
        self.download_url(remote_name, &ticket)
    }

    pub fn download_url(&self, remote_name: &str, ticket: &Ticket) -> Result<Url, StardotsError> {
        let mut url = self.portal_base.clone();
        url.path_segments_mut()
            .map_err(|_| StardotsError::PortalBase)?
            .push(&self.space)
            .push(remote_name);
        url.query_pairs_mut().append_pair("ticket", &ticket.ticket);
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, StardotsError> {
        Ok(self.api_base.join(path)?)
    }

    fn signed_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let timestamp =
            OffsetDateTime::now_utc().unix_timestamp() + self.clock_skew.load(Ordering::Relaxed);
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let digest = md5::compute(format!("{timestamp}|{}|{nonce}", self.secret));
        let sign = format!("{digest:x}").to_ascii_uppercase();
        self.http
            .request(method, url)
            .header("x-stardots-timestamp", timestamp.to_string())
            .header("x-stardots-nonce", nonce)
            .header("x-stardots-key", &self.key)
            .header("x-stardots-sign", sign)
    }

    async fn handle_envelope<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StardotsError> {
        let envelope = self.parse_envelope::<T>(response).await?;
        envelope.data.ok_or(StardotsError::MissingData)
    }

    async fn handle_ack(&self, response: reqwest::Response) -> Result<(), StardotsError> {
        self.parse_envelope::<IgnoredAny>(response).await?;
        Ok(())
    }

    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Envelope<T>, StardotsError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StardotsError::Api { status, body });
        }
        let envelope: Envelope<T> = response.json().await?;
        if let Some(ts) = envelope.ts {
            let skew = ts / 1000 - OffsetDateTime::now_utc().unix_timestamp();
            self.clock_skew.store(skew, Ordering::Relaxed);
        }
        if !envelope.success {
            return Err(StardotsError::Rejected {
                message: envelope.message,
            });
        }
        Ok(envelope)
    }
}
