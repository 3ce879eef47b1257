//! Typed per-registry client facades.
//!
//! One [`RegistryClient`] per hostname, built and cached by
//! [`ClientProvider`] so every consumer of a host shares one connection
//! pool. Each method is a straight translation onto the wire types;
//! retries and pagination belong to callers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::registry::types::*;

const USER_AGENT: &str = concat!("lode/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct RegistryClient {
    host: String,
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    fn new(host: String, base_url: String, http: reqwest::Client) -> Self {
        Self {
            host,
            base_url,
            http,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn resolve_commits(
        &self,
        request: &ResolveCommitsRequest,
    ) -> Result<ResolveCommitsResponse> {
        self.call("commit/resolve", "ref", request).await
    }

    pub async fn get_commits(&self, request: &GetCommitsRequest) -> Result<GetCommitsResponse> {
        self.call("commit/get", "commit", request).await
    }

    pub async fn list_commits(&self, request: &ListCommitsRequest) -> Result<ListCommitsResponse> {
        self.call("commit/list", "commit", request).await
    }

    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResponse> {
        self.call("download", "commit", request).await
    }

    /// Blob fetch for one entity; callers chunk to
    /// [`MAX_BLOBS_PER_CALL`] digests per call.
    pub async fn get_blobs(&self, request: &GetBlobsRequest) -> Result<GetBlobsResponse> {
        if request.digests.len() > MAX_BLOBS_PER_CALL {
            return Err(Error::system(format!(
                "blob request carries {} digests, maximum is {MAX_BLOBS_PER_CALL}",
                request.digests.len()
            )));
        }
        self.call("blob/get", "blob", request).await
    }

    pub async fn list_labels(&self, request: &ListLabelsRequest) -> Result<ListLabelsResponse> {
        self.call("label/list", "label", request).await
    }

    pub async fn list_label_history(
        &self,
        request: &ListLabelHistoryRequest,
    ) -> Result<ListLabelHistoryResponse> {
        self.call("label/history", "label", request).await
    }

    pub async fn get_labels(&self, request: &GetLabelsRequest) -> Result<GetLabelsResponse> {
        self.call("label/get", "label", request).await
    }

    pub async fn create_or_update_labels(
        &self,
        request: &CreateOrUpdateLabelsRequest,
    ) -> Result<CreateOrUpdateLabelsResponse> {
        self.call("label/set", "label", request).await
    }

    pub async fn archive_labels(
        &self,
        request: &ArchiveLabelsRequest,
    ) -> Result<ArchiveLabelsResponse> {
        self.call("label/archive", "label", request).await
    }

    pub async fn get_resources(
        &self,
        request: &GetResourcesRequest,
    ) -> Result<GetResourcesResponse> {
        self.call("resource/get", "resource", request).await
    }

    pub async fn create_plugins(&self, request: &CreateEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("plugin/create", "plugin", request).await
    }

    pub async fn update_plugins(&self, request: &CreateEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("plugin/update", "plugin", request).await
    }

    pub async fn delete_plugins(&self, request: &DeleteEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("plugin/delete", "plugin", request).await
    }

    pub async fn get_plugins(&self, request: &GetEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("plugin/get", "plugin", request).await
    }

    pub async fn list_plugins(&self, request: &ListEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("plugin/list", "plugin", request).await
    }

    pub async fn create_policies(&self, request: &CreateEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("policy/create", "policy", request).await
    }

    pub async fn update_policies(&self, request: &CreateEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("policy/update", "policy", request).await
    }

    pub async fn delete_policies(&self, request: &DeleteEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("policy/delete", "policy", request).await
    }

    pub async fn get_policies(&self, request: &GetEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("policy/get", "policy", request).await
    }

    pub async fn list_policies(&self, request: &ListEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("policy/list", "policy", request).await
    }

    pub async fn create_modules(&self, request: &CreateEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("module/create", "module", request).await
    }

    pub async fn get_modules(&self, request: &GetEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("module/get", "module", request).await
    }

    pub async fn delete_modules(&self, request: &DeleteEntitiesRequest) -> Result<EntitiesResponse> {
        self.call("module/delete", "module", request).await
    }

    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse> {
        self.call("upload", "commit", request).await
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        kind: &'static str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}/api/v1/{path}", self.base_url);
        tracing::debug!("calling {url}");
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| self.transport(e));
        }

        let message = match response.json::<WireError>().await {
            Ok(body) if !body.message.is_empty() => body.message,
            _ => status.to_string(),
        };
        Err(match status.as_u16() {
            404 => Error::NotFound {
                kind,
                input: message,
            },
            409 => Error::AlreadyExists {
                kind,
                input: message,
            },
            _ => Error::Transport {
                host: self.host.clone(),
                message: format!("{status}: {message}"),
            },
        })
    }

    fn transport(&self, e: reqwest::Error) -> Error {
        Error::Transport {
            host: self.host.clone(),
            message: e.to_string(),
        }
    }
}

/// Typed configuration for client construction. Endpoint overrides route a
/// registry hostname to an explicit base URL (integration tests point them
/// at local mock servers).
#[derive(Debug, Clone)]
pub struct ClientProviderOptions {
    pub endpoint_overrides: HashMap<String, String>,
    pub timeout: Duration,
}

impl Default for ClientProviderOptions {
    fn default() -> Self {
        Self {
            endpoint_overrides: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Hands out one [`RegistryClient`] per distinct registry hostname.
pub struct ClientProvider {
    options: ClientProviderOptions,
    clients: Mutex<HashMap<String, RegistryClient>>,
}

impl ClientProvider {
    pub fn new(options: ClientProviderOptions) -> Self {
        Self {
            options,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn client_for_host(&self, host: &str) -> Result<RegistryClient> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| Error::system("client cache lock poisoned"))?;
        if let Some(client) = clients.get(host) {
            return Ok(client.clone());
        }
        let base_url = match self.options.endpoint_overrides.get(host) {
            Some(url) => url.trim_end_matches('/').to_owned(),
            None => format!("https://{host}"),
        };
        let http = reqwest::Client::builder()
            .timeout(self.options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Transport {
                host: host.to_owned(),
                message: e.to_string(),
            })?;
        let client = RegistryClient::new(host.to_owned(), base_url, http);
        clients.insert(host.to_owned(), client.clone());
        Ok(client)
    }
}
