//! Digest verification between lock-file pins and downloaded content.

use lode::workspace::WorkspaceOptions;
use lode_config::Reference;

use crate::common::{bogus_digest, write_tree, RegistryScript, EMPTY_WASM, HOST};

#[tokio::test]
async fn tampered_module_content_fails_the_build() {
    let mut script = RegistryScript::new();
    script.module(
        "acme/date",
        &[("acme/date/v1/date.proto", "syntax = \"proto3\";\n")],
        &[],
    );
    let registry = script.start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    // the lock pins a digest that cannot match the served content
    let bogus = bogus_digest();
    let lock = registry.lock_v2(&["acme/date"], Some(("acme/date", bogus.as_str())));
    write_tree(
        dir.path(),
        &[
            (
                "lode.yaml",
                format!("version: v2\nmodules:\n  - path: proto\ndeps:\n  - {HOST}/acme/date\n"),
            ),
            ("lode.lock", lock),
            (
                "proto/me/me.proto",
                // the import forces the pinned module to materialize
                "import \"acme/date/v1/date.proto\";\n".to_owned(),
            ),
        ],
    );

    let err = controller
        .load_workspace(dir.path(), "", WorkspaceOptions::default())
        .await
        .unwrap_err();
    match err {
        lode::Error::Tamper { expected, actual, .. } => {
            assert_eq!(expected, bogus_digest());
            assert_eq!(actual, registry.module_digest("acme/date"));
        }
        other => panic!("expected Tamper, got {other:?}"),
    }
}

#[tokio::test]
async fn untampered_content_builds_and_matches_its_pin() {
    let mut script = RegistryScript::new();
    script.module(
        "acme/date",
        &[("acme/date/v1/date.proto", "syntax = \"proto3\";\n")],
        &[],
    );
    let registry = script.start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            (
                "lode.yaml",
                format!("version: v2\nmodules:\n  - path: proto\ndeps:\n  - {HOST}/acme/date\n"),
            ),
            ("lode.lock", registry.lock_v2(&["acme/date"], None)),
            (
                "proto/me/me.proto",
                "import \"acme/date/v1/date.proto\";\n".to_owned(),
            ),
        ],
    );

    let workspace = controller
        .load_workspace(dir.path(), "", WorkspaceOptions::default())
        .await
        .unwrap();
    let date = workspace
        .module_set()
        .module_for_full_name(&format!("{HOST}/acme/date"))
        .unwrap();
    assert_eq!(
        date.digest().await.unwrap().to_string(),
        registry.module_digest("acme/date")
    );
}

#[tokio::test]
async fn plugin_pull_round_trips_wasm_bytes() {
    let mut script = RegistryScript::new();
    script.plugin("plugins/check", &EMPTY_WASM);
    let registry = script.start().await;
    let controller = registry.controller();

    let reference = Reference::parse(&format!("{HOST}/plugins/check")).unwrap();
    let (key, wasm) = controller.pull_plugin(&reference).await.unwrap();
    assert_eq!(wasm.as_ref(), EMPTY_WASM);
    assert_eq!(
        key.digest().unwrap().to_string(),
        registry.plugin_digest("plugins/check")
    );
}
