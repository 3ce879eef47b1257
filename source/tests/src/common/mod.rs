//! A scripted in-process registry plus helpers for building on-disk
//! workspaces in temp directories.

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lode::cas::{digest_for_bytes, digest_for_digests, FileNode, Manifest};
use lode::controller::{Controller, ControllerOptions};
use lode::registry::ClientProviderOptions;
use lode_config::{Digest, DigestType};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const HOST: &str = "lode.example.com";

/// The smallest valid Wasm module: magic plus version.
pub const EMPTY_WASM: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

#[derive(Clone)]
struct Entry {
    commit: String,
    digest: String,
    files: Vec<(String, Vec<u8>)>,
    declared_deps: Vec<(String, String, String)>, // full name, commit, digest
}

/// Scripted registry content, keyed by `owner/name`.
#[derive(Default, Clone)]
pub struct RegistryScript {
    modules: HashMap<String, Entry>,
    plugins: HashMap<String, Entry>,
    policies: HashMap<String, Entry>,
}

impl RegistryScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module whose deps (named `owner/name`) must already exist.
    pub fn module(&mut self, name: &str, files: &[(&str, &str)], deps: &[&str]) -> &mut Self {
        let files: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|(p, d)| ((*p).to_owned(), d.as_bytes().to_vec()))
            .collect();
        let declared_deps: Vec<(String, String, String)> = deps
            .iter()
            .map(|dep| {
                let entry = &self.modules[*dep];
                (
                    format!("{HOST}/{dep}"),
                    entry.commit.clone(),
                    entry.digest.clone(),
                )
            })
            .collect();

        let nodes: Vec<FileNode> = files
            .iter()
            .map(|(p, d)| FileNode::new(p.clone(), digest_for_bytes(DigestType::B5, d)).unwrap())
            .collect();
        let manifest_digest = Manifest::new(nodes).unwrap().digest(DigestType::B5);
        let mut digests = vec![manifest_digest];
        for (_, _, digest) in &declared_deps {
            digests.push(digest.parse::<Digest>().unwrap());
        }
        let digest = digest_for_digests(DigestType::B5, &digests).to_string();

        self.modules.insert(
            name.to_owned(),
            Entry {
                commit: Uuid::new_v4().simple().to_string(),
                digest,
                files,
                declared_deps,
            },
        );
        self
    }

    pub fn plugin(&mut self, name: &str, wasm: &[u8]) -> &mut Self {
        self.plugins.insert(
            name.to_owned(),
            Entry {
                commit: Uuid::new_v4().simple().to_string(),
                digest: digest_for_bytes(DigestType::P1, wasm).to_string(),
                files: vec![("plugin.wasm".to_owned(), wasm.to_vec())],
                declared_deps: Vec::new(),
            },
        );
        self
    }

    pub fn policy(&mut self, name: &str, doc: &str) -> &mut Self {
        self.policies.insert(
            name.to_owned(),
            Entry {
                commit: Uuid::new_v4().simple().to_string(),
                digest: digest_for_bytes(DigestType::O1, doc.as_bytes()).to_string(),
                files: vec![("policy.yaml".to_owned(), doc.as_bytes().to_vec())],
                declared_deps: Vec::new(),
            },
        );
        self
    }

    fn entries_for(&self, digest_type: &str) -> &HashMap<String, Entry> {
        match digest_type {
            "p1" => &self.plugins,
            "o1" => &self.policies,
            _ => &self.modules,
        }
    }

    fn entries_for_kind(&self, kind: &str) -> &HashMap<String, Entry> {
        match kind {
            "plugin" => &self.plugins,
            "policy" => &self.policies,
            _ => &self.modules,
        }
    }

    pub async fn start(self) -> MockRegistry {
        let server = MockServer::start().await;

        let script = self.clone();
        Mock::given(method("POST"))
            .and(path("/api/v1/commit/resolve"))
            .respond_with(move |req: &Request| {
                let body: serde_json::Value = req.body_json().unwrap();
                let digest_type = body["digest_type"].as_str().unwrap_or("b5");
                let entries = script.entries_for(digest_type);
                let mut commits = Vec::new();
                for r in body["refs"].as_array().unwrap() {
                    let owner = r["owner"].as_str().unwrap();
                    let name = r["name"].as_str().unwrap();
                    let Some(entry) = entries.get(&format!("{owner}/{name}")) else {
                        let mut input = format!("{HOST}/{owner}/{name}");
                        if let Some(rf) = r["ref"].as_str() {
                            input = format!("{input}:{rf}");
                        }
                        return ResponseTemplate::new(404)
                            .set_body_json(json!({"code": "NOT_FOUND", "message": input}));
                    };
                    commits.push(json!({
                        "id": entry.commit,
                        "owner": owner,
                        "name": name,
                        "digest": entry.digest,
                    }));
                }
                ResponseTemplate::new(200).set_body_json(json!({ "commits": commits }))
            })
            .mount(&server)
            .await;

        let script = self.clone();
        Mock::given(method("POST"))
            .and(path("/api/v1/download"))
            .respond_with(move |req: &Request| {
                let body: serde_json::Value = req.body_json().unwrap();
                let kind = body["kind"].as_str().unwrap_or("module");
                let entries = script.entries_for_kind(kind);
                let mut values = Vec::new();
                for v in body["values"].as_array().unwrap() {
                    let owner = v["owner"].as_str().unwrap();
                    let name = v["name"].as_str().unwrap();
                    let commit = v["commit"].as_str().unwrap();
                    let Some(entry) = entries.get(&format!("{owner}/{name}")) else {
                        return ResponseTemplate::new(404).set_body_json(
                            json!({"code": "NOT_FOUND", "message": format!("{HOST}/{owner}/{name}")}),
                        );
                    };
                    let contents: Vec<_> = entry
                        .files
                        .iter()
                        .map(|(p, d)| {
                            json!({"path": p, "data": BASE64.encode(d), "compression": "NONE"})
                        })
                        .collect();
                    let declared_deps: Vec<_> = entry
                        .declared_deps
                        .iter()
                        .map(|(module, commit, digest)| {
                            json!({"module": module, "commit": commit, "digest": digest})
                        })
                        .collect();
                    values.push(json!({
                        "commit": commit,
                        "declared_deps": declared_deps,
                        "contents": contents,
                    }));
                }
                ResponseTemplate::new(200).set_body_json(json!({ "values": values }))
            })
            .mount(&server)
            .await;

        MockRegistry {
            server,
            script: self,
        }
    }
}

pub struct MockRegistry {
    pub server: MockServer,
    script: RegistryScript,
}

impl MockRegistry {
    pub fn controller(&self) -> Controller {
        Controller::new(ControllerOptions {
            client: ClientProviderOptions {
                endpoint_overrides: HashMap::from([(HOST.to_owned(), self.server.uri())]),
                ..Default::default()
            },
        })
    }

    pub fn module_digest(&self, name: &str) -> String {
        self.script.modules[name].digest.clone()
    }

    pub fn plugin_digest(&self, name: &str) -> String {
        self.script.plugins[name].digest.clone()
    }

    pub fn policy_digest(&self, name: &str) -> String {
        self.script.policies[name].digest.clone()
    }

    /// A v2 lock file pinning the named modules at the registry's commits,
    /// optionally overriding a digest to simulate tampering.
    pub fn lock_v2(&self, modules: &[&str], digest_override: Option<(&str, &str)>) -> String {
        let mut out = String::from("# Generated by lode. DO NOT EDIT.\nversion: v2\ndeps:\n");
        let mut sorted: Vec<&&str> = modules.iter().collect();
        sorted.sort();
        for name in sorted {
            let entry = &self.script.modules[*name];
            let digest = match digest_override {
                Some((overridden, digest)) if overridden == *name => digest.to_owned(),
                _ => entry.digest.clone(),
            };
            out.push_str(&format!(
                "- module: {HOST}/{name}\n  commit: {}\n  digest: {digest}\n",
                entry.commit,
            ));
        }
        out
    }
}

/// A fabricated but well-formed digest that matches no content.
pub fn bogus_digest() -> String {
    Digest::new(DigestType::B5, vec![0u8; 32]).unwrap().to_string()
}

/// Writes `files` under `root`, creating parent directories.
pub fn write_tree<P: AsRef<str>, C: AsRef<[u8]>>(root: &Path, files: &[(P, C)]) {
    for (rel, content) in files {
        let full = root.join(rel.as_ref());
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content.as_ref()).unwrap();
    }
}
