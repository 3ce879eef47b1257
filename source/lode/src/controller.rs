//! Top-level operations, composing workspace discovery, providers, and
//! the lock-file transformations. No business logic of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use lode_config::{DigestType, FullName, Key, Reference};

use crate::bucket::{Bucket, FsBucket};
use crate::error::{Error, Result};
use crate::module::ModuleDep;
use crate::ops::push::{push_module, push_plugin, push_policy, PushOptions};
use crate::ops::update::UpdateOptions;
use crate::ops::{prune, update};
use crate::provider::{
    KeyProvider, ModuleDataProvider, PluginDataProvider, RegistryKeyProvider,
    RegistryModuleDataProvider, RegistryPluginDataProvider, RegistryPolicyDataProvider,
};
use crate::registry::{ClientProvider, ClientProviderOptions};
use crate::wasm::WasmValidator;
use crate::workspace::{discovery, Workspace, WorkspaceOptions};

#[derive(Default)]
pub struct ControllerOptions {
    pub client: ClientProviderOptions,
}

pub struct Controller {
    clients: Arc<ClientProvider>,
    key_provider: Arc<RegistryKeyProvider>,
    module_data_provider: Arc<RegistryModuleDataProvider>,
    policy_data_provider: Arc<RegistryPolicyDataProvider>,
    plugin_data_provider: Arc<RegistryPluginDataProvider>,
    wasm_validator: WasmValidator,
}

impl Controller {
    pub fn new(options: ControllerOptions) -> Self {
        let clients = Arc::new(ClientProvider::new(options.client));
        Self {
            key_provider: Arc::new(RegistryKeyProvider::new(Arc::clone(&clients))),
            module_data_provider: Arc::new(RegistryModuleDataProvider::new(Arc::clone(&clients))),
            policy_data_provider: Arc::new(RegistryPolicyDataProvider::new(Arc::clone(&clients))),
            plugin_data_provider: Arc::new(RegistryPluginDataProvider::new(Arc::clone(&clients))),
            wasm_validator: WasmValidator::new(),
            clients,
        }
    }

    /// Discovers and builds the workspace under `root`, targeting
    /// `sub_dir`.
    pub async fn load_workspace(
        &self,
        root: &Path,
        sub_dir: &str,
        options: WorkspaceOptions,
    ) -> Result<Workspace> {
        let bucket: Arc<dyn Bucket> = Arc::new(FsBucket::new(root));
        let data_provider: Arc<dyn ModuleDataProvider> =
            Arc::clone(&self.module_data_provider) as Arc<dyn ModuleDataProvider>;
        discovery::load_workspace(bucket, sub_dir, options, data_provider, DigestType::B5).await
    }

    pub async fn update(&self, root: &Path, sub_dir: &str, options: UpdateOptions) -> Result<()> {
        // the graph may reference deps that are not pinned yet, so the
        // resolvability validation waits until after the lock is written
        let workspace = self
            .load_workspace(root, sub_dir, config_only_options())
            .await?;
        let lock_dir = workspace_lock_dir(root, &workspace);
        update::update(
            &lock_dir,
            &workspace,
            &*self.key_provider,
            &*self.policy_data_provider,
            options,
        )
        .await
    }

    pub async fn prune(&self, root: &Path, sub_dir: &str) -> Result<()> {
        let workspace = self
            .load_workspace(root, sub_dir, config_only_options())
            .await?;
        let lock_dir = workspace_lock_dir(root, &workspace);
        prune::prune(&lock_dir, &workspace).await
    }

    pub async fn push_plugin(
        &self,
        full_name: &FullName,
        wasm: Bytes,
        options: PushOptions,
    ) -> Result<Key> {
        push_plugin(&self.clients, &self.wasm_validator, full_name, wasm, options).await
    }

    pub async fn push_policy(
        &self,
        full_name: &FullName,
        doc: Bytes,
        options: PushOptions,
    ) -> Result<Key> {
        push_policy(&self.clients, full_name, doc, options).await
    }

    /// Pushes the single module rooted at `root`/`sub_dir` under
    /// `full_name`.
    pub async fn push_module(
        &self,
        root: &Path,
        sub_dir: &str,
        full_name: &FullName,
        options: PushOptions,
    ) -> Result<Key> {
        let workspace = self
            .load_workspace(root, sub_dir, WorkspaceOptions::default())
            .await?;
        let module = workspace
            .module_set()
            .target_modules()
            .next()
            .ok_or_else(|| Error::NotFound {
                kind: "module",
                input: sub_dir.to_owned(),
            })?;
        push_module(&self.clients, module.as_ref(), full_name, options).await
    }

    /// Resolves one ref to a key at the given digest type.
    pub async fn resolve_ref(&self, reference: &Reference, digest_type: DigestType) -> Result<Key> {
        let keys = self
            .key_provider
            .keys_for_refs(std::slice::from_ref(reference), digest_type)
            .await?;
        keys.into_iter()
            .next()
            .ok_or_else(|| Error::system("key provider returned no key"))
    }

    /// Resolves a plugin ref and pulls its Wasm binary.
    pub async fn pull_plugin(&self, reference: &Reference) -> Result<(Key, Bytes)> {
        let key = self.resolve_ref(reference, DigestType::P1).await?;
        let datas = self
            .plugin_data_provider
            .datas_for_keys(std::slice::from_ref(&key))
            .await?;
        let data = datas
            .into_iter()
            .next()
            .ok_or_else(|| Error::system("plugin data provider returned no data"))?;
        Ok((key, data.wasm()?))
    }

    /// The dependency edges of every target module, for display.
    pub async fn workspace_deps(
        &self,
        root: &Path,
        sub_dir: &str,
    ) -> Result<Vec<(String, Vec<ModuleDep>)>> {
        let workspace = self
            .load_workspace(root, sub_dir, WorkspaceOptions::default())
            .await?;
        let mut out = Vec::new();
        for module in workspace.module_set().target_modules() {
            out.push((module.opaque_id().to_owned(), module.deps().await?));
        }
        Ok(out)
    }
}

fn config_only_options() -> WorkspaceOptions {
    WorkspaceOptions {
        skip_import_validation: true,
        ..Default::default()
    }
}

fn workspace_lock_dir(root: &Path, workspace: &Workspace) -> PathBuf {
    let mut dir = root.to_path_buf();
    for segment in workspace
        .root_sub_dir()
        .split('/')
        .filter(|s| !s.is_empty())
    {
        dir.push(segment);
    }
    dir
}
