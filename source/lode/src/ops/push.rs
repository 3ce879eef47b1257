//! `push`: validate an entity locally, then upload it with its labels and
//! receive the one commit the registry assigns.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use lode_config::{DigestType, FullName, Key};

use crate::error::{Error, Result};
use crate::module::Module;
use crate::plugin::PluginVisibility;
use crate::provider::key::key_for_commit;
use crate::registry::types::*;
use crate::registry::{ClientProvider, RegistryClient};
use crate::wasm::WasmValidator;

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Labels to associate with the uploaded commit.
    pub labels: Vec<String>,
    /// VCS link embedded in the upload metadata.
    pub source_control_url: Option<String>,
    /// Create the entity with this visibility before uploading when it
    /// does not exist yet.
    pub create_if_not_exist: Option<PluginVisibility>,
}

/// Pushes a Wasm plugin: compile-validate locally, zstd-compress with no
/// dictionary, upload one content entry, and return the key the registry
/// assigned. The digest in the key is the server's.
pub async fn push_plugin(
    clients: &ClientProvider,
    validator: &WasmValidator,
    full_name: &FullName,
    wasm: Bytes,
    options: PushOptions,
) -> Result<Key> {
    validator.validate(&wasm)?;
    tracing::debug!("wasm for {full_name} compiled cleanly ({} bytes)", wasm.len());

    let client = clients.client_for_host(full_name.registry())?;
    ensure_entity_exists(&client, EntityKind::Plugin, full_name, &options).await?;

    let compressed = zstd::stream::encode_all(wasm.as_ref(), 0).map_err(|e| Error::Io {
        context: "failed to compress wasm payload".to_owned(),
        message: e.to_string(),
    })?;
    upload_single(
        &client,
        "plugin",
        full_name,
        UploadValue {
            owner: full_name.owner().to_owned(),
            name: full_name.name().to_owned(),
            compression: COMPRESSION_ZSTD.to_owned(),
            data: BASE64.encode(compressed),
            files: Vec::new(),
            scoped_label_refs: options.labels.clone(),
            source_control_url: options.source_control_url.clone(),
        },
        DigestType::P1,
    )
    .await
}

/// Pushes a policy document. Validation is a full parse of the YAML,
/// including its plugin refs.
pub async fn push_policy(
    clients: &ClientProvider,
    full_name: &FullName,
    doc: Bytes,
    options: PushOptions,
) -> Result<Key> {
    crate::policy::parse_policy_config(&doc)?;

    let client = clients.client_for_host(full_name.registry())?;
    ensure_entity_exists(&client, EntityKind::Policy, full_name, &options).await?;

    upload_single(
        &client,
        "policy",
        full_name,
        UploadValue {
            owner: full_name.owner().to_owned(),
            name: full_name.name().to_owned(),
            compression: COMPRESSION_NONE.to_owned(),
            data: BASE64.encode(&doc),
            files: Vec::new(),
            scoped_label_refs: options.labels.clone(),
            source_control_url: options.source_control_url.clone(),
        },
        DigestType::O1,
    )
    .await
}

/// Pushes a module's file view. The local validation requires at least
/// one proto file.
pub async fn push_module(
    clients: &ClientProvider,
    module: &Module,
    full_name: &FullName,
    options: PushOptions,
) -> Result<Key> {
    let infos = module.walk_file_infos().await?;
    if !infos
        .iter()
        .any(|info| info.file_type() == crate::module::FileType::Proto)
    {
        return Err(Error::NotFound {
            kind: "proto file",
            input: full_name.to_string(),
        });
    }
    let mut files = Vec::with_capacity(infos.len());
    for info in infos.iter() {
        let data = module.get_file(info.path()).await?;
        files.push(WireContent {
            path: info.path().to_owned(),
            data: BASE64.encode(&data),
            compression: COMPRESSION_NONE.to_owned(),
        });
    }

    let client = clients.client_for_host(full_name.registry())?;
    ensure_entity_exists(&client, EntityKind::Module, full_name, &options).await?;

    upload_single(
        &client,
        "module",
        full_name,
        UploadValue {
            owner: full_name.owner().to_owned(),
            name: full_name.name().to_owned(),
            compression: COMPRESSION_NONE.to_owned(),
            data: String::new(),
            files,
            scoped_label_refs: options.labels.clone(),
            source_control_url: options.source_control_url.clone(),
        },
        DigestType::B5,
    )
    .await
}

#[derive(Clone, Copy)]
enum EntityKind {
    Module,
    Plugin,
    Policy,
}

/// Preflight: the entity must exist before upload. With
/// `create_if_not_exist`, a missing entity is created first, and losing a
/// create race to someone else is fine.
async fn ensure_entity_exists(
    client: &RegistryClient,
    kind: EntityKind,
    full_name: &FullName,
    options: &PushOptions,
) -> Result<()> {
    let get = GetEntitiesRequest {
        refs: vec![WireRef {
            owner: full_name.owner().to_owned(),
            name: full_name.name().to_owned(),
            reference: None,
        }],
    };
    let found = match kind {
        EntityKind::Module => client.get_modules(&get).await,
        EntityKind::Plugin => client.get_plugins(&get).await,
        EntityKind::Policy => client.get_policies(&get).await,
    };
    match found {
        Ok(_) => Ok(()),
        Err(Error::NotFound { .. }) => {
            let Some(visibility) = options.create_if_not_exist else {
                return Err(Error::NotFound {
                    kind: match kind {
                        EntityKind::Module => "module",
                        EntityKind::Plugin => "plugin",
                        EntityKind::Policy => "policy",
                    },
                    input: full_name.to_string(),
                });
            };
            tracing::info!("creating {full_name} before upload");
            let create = CreateEntitiesRequest {
                values: vec![WireNewEntity {
                    owner: full_name.owner().to_owned(),
                    name: full_name.name().to_owned(),
                    visibility: visibility.as_str().to_owned(),
                    entity_type: match kind {
                        EntityKind::Plugin => Some("check".to_owned()),
                        _ => None,
                    },
                }],
            };
            let created = match kind {
                EntityKind::Module => client.create_modules(&create).await,
                EntityKind::Plugin => client.create_plugins(&create).await,
                EntityKind::Policy => client.create_policies(&create).await,
            };
            match created {
                Ok(_) => Ok(()),
                // lost a race to a concurrent create; the upload can proceed
                Err(Error::AlreadyExists { .. }) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

async fn upload_single(
    client: &RegistryClient,
    kind: &str,
    full_name: &FullName,
    value: UploadValue,
    digest_type: DigestType,
) -> Result<Key> {
    let response = client
        .upload(&UploadRequest {
            kind: kind.to_owned(),
            values: vec![value],
        })
        .await?;
    let [commit] = <[WireCommit; 1]>::try_from(response.commits).map_err(|commits| {
        Error::system(format!(
            "upload of {full_name} returned {} commits, expected one",
            commits.len()
        ))
    })?;
    let key = key_for_commit(full_name.registry(), commit, digest_type)?;
    tracing::info!("pushed {key}");
    Ok(key)
}
