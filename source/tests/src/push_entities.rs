//! The push pipeline: local wasm validation, zstd payload encoding,
//! labels, create-on-missing, and the returned key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use lode::cas::digest_for_bytes;
use lode::ops::push::PushOptions;
use lode::plugin::PluginVisibility;
use lode_config::{DigestType, FullName};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::common::{RegistryScript, EMPTY_WASM, HOST};

/// Mounts an upload endpoint that computes the digest of the payload it
/// received, like the real registry would.
async fn mount_upload(server: &MockServer, digest_type: DigestType) {
    Mock::given(method("POST"))
        .and(path("/api/v1/upload"))
        .respond_with(move |req: &Request| {
            let body: serde_json::Value = req.body_json().unwrap();
            let value = &body["values"][0];
            let raw = BASE64.decode(value["data"].as_str().unwrap()).unwrap();
            let payload = match value["compression"].as_str().unwrap() {
                "ZSTD" => zstd::stream::decode_all(raw.as_slice()).unwrap(),
                _ => raw,
            };
            let commit = json!({
                "id": Uuid::new_v4().simple().to_string(),
                "owner": value["owner"],
                "name": value["name"],
                "digest": digest_for_bytes(digest_type, &payload).to_string(),
            });
            ResponseTemplate::new(200).set_body_json(json!({ "commits": [commit] }))
        })
        .mount(server)
        .await;
}

async fn mount_entity_get(server: &MockServer, kind: &str, status: u16) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_json(json!({ "values": [] }))
    } else {
        ResponseTemplate::new(status)
            .set_body_json(json!({"code": "NOT_FOUND", "message": "no such entity"}))
    };
    Mock::given(method("POST"))
        .and(path(format!("/api/v1/{kind}/get")))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn plugin_push_round_trip() {
    let registry = RegistryScript::new().start().await;
    let server = &registry.server;
    mount_entity_get(server, "plugin", 200).await;
    mount_upload(server, DigestType::P1).await;

    let controller = registry.controller();
    let full_name = FullName::parse(&format!("{HOST}/acme/plug")).unwrap();
    let key = controller
        .push_plugin(
            &full_name,
            Bytes::copy_from_slice(&EMPTY_WASM),
            PushOptions {
                labels: vec!["main".to_owned()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // the key carries the registry's commit and the p1 digest of the
    // uncompressed bytes
    assert_eq!(key.full_name().to_string(), format!("{HOST}/acme/plug"));
    assert_eq!(
        key.digest().unwrap(),
        digest_for_bytes(DigestType::P1, &EMPTY_WASM)
    );

    // the wire saw one zstd-compressed content entry with the label
    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/upload")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&upload.body).unwrap();
    let values = body["values"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["compression"], "ZSTD");
    assert_eq!(values[0]["scoped_label_refs"], json!(["main"]));
}

#[tokio::test]
async fn invalid_wasm_fails_before_any_network_call() {
    let registry = RegistryScript::new().start().await;
    let controller = registry.controller();
    let full_name = FullName::parse(&format!("{HOST}/acme/plug")).unwrap();

    let err = controller
        .push_plugin(
            &full_name,
            Bytes::from_static(b"not wasm at all"),
            PushOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, lode::Error::WasmCompile { .. }));
    assert!(registry.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn push_without_create_propagates_not_found() {
    let registry = RegistryScript::new().start().await;
    mount_entity_get(&registry.server, "plugin", 404).await;

    let controller = registry.controller();
    let full_name = FullName::parse(&format!("{HOST}/acme/plug")).unwrap();
    let err = controller
        .push_plugin(
            &full_name,
            Bytes::copy_from_slice(&EMPTY_WASM),
            PushOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, lode::Error::NotFound { kind: "plugin", .. }));
}

#[tokio::test]
async fn push_with_create_creates_then_uploads() {
    let registry = RegistryScript::new().start().await;
    let server = &registry.server;
    mount_entity_get(server, "plugin", 404).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/plugin/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": [
            {"owner": "acme", "name": "plug", "visibility": "private"}
        ] })))
        .expect(1)
        .mount(server)
        .await;
    mount_upload(server, DigestType::P1).await;

    let controller = registry.controller();
    let full_name = FullName::parse(&format!("{HOST}/acme/plug")).unwrap();
    let key = controller
        .push_plugin(
            &full_name,
            Bytes::copy_from_slice(&EMPTY_WASM),
            PushOptions {
                create_if_not_exist: Some(PluginVisibility::Private),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        key.digest().unwrap(),
        digest_for_bytes(DigestType::P1, &EMPTY_WASM)
    );
}

#[tokio::test]
async fn losing_the_create_race_still_uploads() {
    let registry = RegistryScript::new().start().await;
    let server = &registry.server;
    mount_entity_get(server, "plugin", 404).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/plugin/create"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            json!({"code": "ALREADY_EXISTS", "message": "someone else won"}),
        ))
        .mount(server)
        .await;
    mount_upload(server, DigestType::P1).await;

    let controller = registry.controller();
    let full_name = FullName::parse(&format!("{HOST}/acme/plug")).unwrap();
    let key = controller
        .push_plugin(
            &full_name,
            Bytes::copy_from_slice(&EMPTY_WASM),
            PushOptions {
                create_if_not_exist: Some(PluginVisibility::Public),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(key.full_name().to_string(), format!("{HOST}/acme/plug"));
}

#[tokio::test]
async fn policy_push_validates_and_uploads_uncompressed() {
    let registry = RegistryScript::new().start().await;
    let server = &registry.server;
    mount_entity_get(server, "policy", 200).await;
    mount_upload(server, DigestType::O1).await;

    let controller = registry.controller();
    let full_name = FullName::parse(&format!("{HOST}/policies/strict")).unwrap();
    let doc = b"version: v1\nplugins:\n  - plugin: lode.example.com/plugins/naming\n";
    let key = controller
        .push_policy(&full_name, Bytes::copy_from_slice(doc), PushOptions::default())
        .await
        .unwrap();
    assert_eq!(key.digest().unwrap(), digest_for_bytes(DigestType::O1, doc));

    // a document that does not parse never reaches the registry
    let err = controller
        .push_policy(
            &full_name,
            Bytes::from_static(b"version: v1\nbogus-field: true\n"),
            PushOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, lode::Error::Config(_)));
}
