// Copyright 2021, Collabora Ltd.
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;
use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use url::Url;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Observer invoked during a multipart upload with the number of bytes sent
/// so far and the total file size. It is called at most once per whole
/// percent of progress.
pub type ProgressObserver = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Resource kinds tracked in the client's last-used-ID store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Resource {
    /// Target device
    #[strum(serialize = "target")]
    Target,
    /// Software module
    #[strum(serialize = "software module")]
    SoftwareModule,
    /// Artifact of a software module
    #[strum(serialize = "artifact")]
    Artifact,
    /// Distribution set
    #[strum(serialize = "distribution set")]
    DistributionSet,
    /// Target filter
    #[strum(serialize = "target filter")]
    TargetFilter,
    /// Assignment action
    #[strum(serialize = "action")]
    Action,
}

/// Body of a non-2xx response, JSON-decoded when possible.
#[derive(Debug)]
pub enum ErrorBody {
    /// The server replied with a JSON document
    Json(serde_json::Value),
    /// The server replied with something else
    Text(String),
}

impl ErrorBody {
    fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(json) => ErrorBody::Json(json),
            Err(_) => ErrorBody::Text(text),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorBody::Json(json) => write!(f, "{}", json),
            ErrorBody::Text(text) => write!(f, "{}", text),
        }
    }
}

/// Management API errors
#[derive(Error, Debug)]
pub enum Error {
    /// URL error
    #[error("Could not parse url")]
    ParseUrlError(#[from] url::ParseError),
    /// HTTP error
    #[error("Failed to process request")]
    ReqwestError(#[from] reqwest::Error),
    /// IO error
    #[error("Failed to read upload file")]
    Io(#[from] std::io::Error),
    /// The server replied with a non-2xx status
    #[error("HTTP error {status}: {body}")]
    Server {
        /// HTTP status code of the reply
        status: StatusCode,
        /// Reply body, JSON-decoded if possible
        body: ErrorBody,
    },
    /// A default identifier was requested but none was created in this run
    #[error("{0} not yet created")]
    NotYetCreated(Resource),
    /// A "most recent" query matched nothing on the server
    #[error("no {0} found on the server")]
    NoneOnServer(Resource),
}

#[derive(Debug, Default)]
struct IdStore {
    target: Option<String>,
    numeric: HashMap<Resource, i64>,
}

/// [Management API](https://eclipse.dev/hawkbit/apis/management_api/) client.
///
/// The client remembers the most recently created identifier of each
/// [`Resource`] kind. Convenience methods taking an `Option` identifier fall
/// back to that stored identifier when passed `None` and fail with
/// [`Error::NotYetCreated`] if none has been stored yet.
#[derive(Debug)]
pub struct Client {
    base_url: Url,
    client: reqwest::Client,
    username: String,
    password: String,
    ids: Mutex<IdStore>,
}

impl Client {
    /// Create a new Management API client.
    ///
    /// Port 443 selects `https`, any other port plain `http`. Credentials are
    /// sent as HTTP Basic authentication on every request.
    ///
    /// # Arguments
    /// * `host`: host name of the hawkBit server
    /// * `port`: port of the Management API
    /// * `username`: Management API user
    /// * `password`: Management API password
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Result<Self, Error> {
        let scheme = if port == 443 { "https" } else { "http" };
        let base_url: Url = format!("{}://{}:{}/rest/v1/", scheme, host, port).parse()?;

        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url,
            client,
            username: username.to_string(),
            password: password.to_string(),
            ids: Mutex::new(IdStore::default()),
        })
    }

    /// Resolve `endpoint`, either an absolute URL or a path relative to the
    /// `/rest/v1/` root.
    fn endpoint_url(&self, endpoint: &str) -> Result<Url, Error> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Ok(endpoint.parse()?)
        } else {
            Ok(self.base_url.join(endpoint)?)
        }
    }

    async fn json_body<T: DeserializeOwned>(reply: Response) -> Result<T, Error> {
        let reply = Self::check_status(reply).await?;
        Ok(reply.json().await?)
    }

    async fn check_status(reply: Response) -> Result<Response, Error> {
        let status = reply.status();
        if status.is_success() {
            Ok(reply)
        } else {
            let text = reply.text().await.unwrap_or_default();
            Err(Error::Server {
                status,
                body: ErrorBody::from_text(text),
            })
        }
    }

    /// Perform an authenticated GET request on `endpoint` and decode the JSON
    /// reply.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, Error> {
        let url = self.endpoint_url(endpoint)?;
        let reply = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        Self::json_body(reply).await
    }

    /// Same as [`Client::get`] with additional query parameters, encoded
    /// properly.
    pub(crate) async fn get_with_query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Error> {
        let mut url = self.endpoint_url(endpoint)?;
        url.query_pairs_mut().extend_pairs(params);

        let reply = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        Self::json_body(reply).await
    }

    /// Perform an authenticated POST request on `endpoint` with a JSON
    /// payload and decode the JSON reply.
    pub async fn post<B, T>(&self, endpoint: &str, json_data: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint_url(endpoint)?;
        let reply = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(json_data)
            .send()
            .await?;

        Self::json_body(reply).await
    }

    /// Perform an authenticated PUT request on `endpoint` with a JSON
    /// payload. The reply body is discarded.
    pub async fn put<B>(&self, endpoint: &str, json_data: &B) -> Result<(), Error>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint_url(endpoint)?;
        let reply = self
            .client
            .put(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(json_data)
            .send()
            .await?;

        Self::check_status(reply).await?;
        Ok(())
    }

    /// Perform an authenticated DELETE request on `endpoint`. The reply body
    /// is discarded.
    pub async fn delete(&self, endpoint: &str) -> Result<(), Error> {
        let url = self.endpoint_url(endpoint)?;
        let reply = self
            .client
            .delete(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        Self::check_status(reply).await?;
        Ok(())
    }

    /// Perform an authenticated multipart POST request on `endpoint`,
    /// streaming `file` as the `file` part, and decode the JSON reply.
    ///
    /// `progress`, if set, is invoked while the body is sent, at most once
    /// per whole percent of progress.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        file: &Path,
        progress: Option<ProgressObserver>,
    ) -> Result<T, Error> {
        let url = self.endpoint_url(endpoint)?;

        let f = File::open(file).await?;
        let total = f.metadata().await?.len();
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact")
            .to_string();

        struct UploadState {
            file: File,
            sent: u64,
            total: u64,
            last_percent: u64,
            progress: Option<ProgressObserver>,
        }

        let state = UploadState {
            file: f,
            sent: 0,
            total,
            last_percent: 0,
            progress,
        };

        let body = stream::try_unfold(state, |mut state| async move {
            let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
            let n = state.file.read(&mut buf).await?;
            if n == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            buf.truncate(n);
            state.sent += n as u64;

            if let Some(observer) = &state.progress {
                let percent = if state.total == 0 {
                    100
                } else {
                    state.sent * 100 / state.total
                };
                if percent > state.last_percent {
                    state.last_percent = percent;
                    observer(state.sent, state.total);
                }
            }

            Ok(Some((Bytes::from(buf), state)))
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let reply = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .multipart(form)
            .send()
            .await?;

        Self::json_body(reply).await
    }

    pub(crate) fn remember_target(&self, id: &str) {
        self.ids.lock().unwrap().target = Some(id.to_string());
    }

    pub(crate) fn target_or_last(&self, explicit: Option<&str>) -> Result<String, Error> {
        match explicit {
            Some(id) => Ok(id.to_string()),
            None => self
                .ids
                .lock()
                .unwrap()
                .target
                .clone()
                .ok_or(Error::NotYetCreated(Resource::Target)),
        }
    }

    pub(crate) fn forget_target(&self, id: &str) {
        let mut ids = self.ids.lock().unwrap();
        if ids.target.as_deref() == Some(id) {
            ids.target = None;
        }
    }

    pub(crate) fn remember(&self, kind: Resource, id: i64) {
        self.ids.lock().unwrap().numeric.insert(kind, id);
    }

    pub(crate) fn id_or_last(&self, explicit: Option<i64>, kind: Resource) -> Result<i64, Error> {
        match explicit {
            Some(id) => Ok(id),
            None => self
                .ids
                .lock()
                .unwrap()
                .numeric
                .get(&kind)
                .copied()
                .ok_or(Error::NotYetCreated(kind)),
        }
    }

    pub(crate) fn forget(&self, kind: Resource, id: i64) {
        let mut ids = self.ids.lock().unwrap();
        if ids.numeric.get(&kind) == Some(&id) {
            ids.numeric.remove(&kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new("hawkbit.example.com", 8080, "admin", "admin").unwrap()
    }

    #[test]
    fn scheme_from_port() {
        let c = Client::new("hawkbit.example.com", 443, "admin", "admin").unwrap();
        // the url crate drops the default https port
        assert_eq!(c.base_url.as_str(), "https://hawkbit.example.com/rest/v1/");

        let c = client();
        assert_eq!(
            c.base_url.as_str(),
            "http://hawkbit.example.com:8080/rest/v1/"
        );
    }

    #[test]
    fn endpoint_resolution() {
        let c = client();
        assert_eq!(
            c.endpoint_url("targets").unwrap().as_str(),
            "http://hawkbit.example.com:8080/rest/v1/targets"
        );
        // absolute URLs pass through unchanged
        assert_eq!(
            c.endpoint_url("https://other.example.com/rest/v1/rollouts/7")
                .unwrap()
                .as_str(),
            "https://other.example.com/rest/v1/rollouts/7"
        );
    }

    #[test]
    fn default_id_resolution() {
        let c = client();

        match c.id_or_last(None, Resource::DistributionSet) {
            Err(Error::NotYetCreated(Resource::DistributionSet)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(c.target_or_last(None).is_err());

        c.remember(Resource::DistributionSet, 42);
        assert_eq!(c.id_or_last(None, Resource::DistributionSet).unwrap(), 42);
        // an explicit id wins over the stored one
        assert_eq!(c.id_or_last(Some(7), Resource::DistributionSet).unwrap(), 7);

        c.forget(Resource::DistributionSet, 42);
        assert!(c.id_or_last(None, Resource::DistributionSet).is_err());
    }

    #[test]
    fn not_yet_created_display() {
        let err = Error::NotYetCreated(Resource::SoftwareModule);
        assert_eq!(err.to_string(), "software module not yet created");
    }

    #[test]
    fn error_body_display() {
        let body = ErrorBody::from_text("{\"errorCode\":\"oops\"}".to_string());
        assert_eq!(body.to_string(), "{\"errorCode\":\"oops\"}");

        let body = ErrorBody::from_text("plain text".to_string());
        assert_eq!(body.to_string(), "plain text");
    }
}
