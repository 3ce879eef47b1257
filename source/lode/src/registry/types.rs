//! Wire shapes for the registry's request/reply operations.
//!
//! The transport itself is not designed here; these are the typed bodies
//! the core exchanges with it, one pair per operation, JSON-encoded.

use serde::{Deserialize, Serialize};

pub const COMPRESSION_NONE: &str = "NONE";
pub const COMPRESSION_ZSTD: &str = "ZSTD";

/// How many blob digests a single `GetBlobs` call may carry.
pub const MAX_BLOBS_PER_CALL: usize = 250;

/// A reference to an entity within one registry: owner, name, and an
/// optional ref string (commit, tag, branch, label, or digest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRef {
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "ref")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireCommit {
    /// Dashless commit id.
    pub id: String,
    pub owner: String,
    pub name: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFileNode {
    pub path: String,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDep {
    /// Full `registry/owner/name` of the dependency.
    pub module: String,
    pub commit: String,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireContent {
    pub path: String,
    /// Base64 payload bytes, compressed per `compression`.
    pub data: String,
    pub compression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLabel {
    pub name: String,
    pub commit: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntity {
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

/// Error body returned alongside non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ---- commits ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveCommitsRequest {
    pub refs: Vec<WireRef>,
    pub digest_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveCommitsResponse {
    pub commits: Vec<WireCommit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCommitsRequest {
    pub refs: Vec<WireRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCommitsResponse {
    pub commits: Vec<WireCommit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCommitsRequest {
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCommitsResponse {
    pub commits: Vec<WireCommit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

// ---- content ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// `module`, `plugin`, or `policy`.
    pub kind: String,
    pub digest_type: String,
    pub values: Vec<DownloadRequestValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequestValue {
    pub owner: String,
    pub name: String,
    /// Dashless commit id.
    pub commit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub values: Vec<DownloadResponseValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadResponseValue {
    pub commit: String,
    #[serde(default)]
    pub file_nodes: Vec<WireFileNode>,
    #[serde(default)]
    pub declared_deps: Vec<WireDep>,
    /// Inline file contents. When absent, the caller fetches blobs by
    /// digest instead.
    #[serde(default)]
    pub contents: Vec<WireContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlobsRequest {
    pub owner: String,
    pub name: String,
    pub digests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBlobsResponse {
    pub blobs: Vec<WireBlob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBlob {
    pub digest: String,
    /// Base64, uncompressed.
    pub data: String,
}

// ---- labels ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListLabelsRequest {
    pub owner: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListLabelsResponse {
    pub labels: Vec<WireLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListLabelHistoryRequest {
    pub owner: String,
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListLabelHistoryResponse {
    pub commits: Vec<WireCommit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLabelsRequest {
    pub owner: String,
    pub name: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLabelsResponse {
    pub labels: Vec<WireLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrUpdateLabelsRequest {
    pub owner: String,
    pub name: String,
    pub labels: Vec<WireLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrUpdateLabelsResponse {
    pub labels: Vec<WireLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveLabelsRequest {
    pub owner: String,
    pub name: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveLabelsResponse {}

// ---- resources ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResourcesRequest {
    pub refs: Vec<WireRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResourcesResponse {
    pub resources: Vec<WireResource>,
}

/// A ref resolves to exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireResource {
    Commit(WireCommit),
    Label(WireLabel),
    Module(WireEntity),
    Plugin(WireEntity),
    Policy(WireEntity),
}

// ---- entity lifecycle ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntitiesRequest {
    pub values: Vec<WireNewEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNewEntity {
    pub owner: String,
    pub name: String,
    pub visibility: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetEntitiesRequest {
    pub refs: Vec<WireRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteEntitiesRequest {
    pub refs: Vec<WireRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntitiesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesResponse {
    pub values: Vec<WireEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

// ---- upload ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// `module`, `plugin`, or `policy`.
    pub kind: String,
    pub values: Vec<UploadValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadValue {
    pub owner: String,
    pub name: String,
    pub compression: String,
    /// Base64 payload, compressed per `compression`. Single-blob entities
    /// (plugins, policies) use this; modules upload `files` instead.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<WireContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scoped_label_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_control_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub commits: Vec<WireCommit>,
}
