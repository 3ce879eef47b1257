//! `update` and `prune` against a scripted registry: lock contents,
//! policy plugin derivation, idempotence, and the no-op case.

use lode_config::lock_file::{LockFile, LOCK_FILE_NAME};

use crate::common::{write_tree, RegistryScript, EMPTY_WASM, HOST};

const POLICY_DOC: &str =
    "version: v1\nlint:\n  use: [STANDARD]\nplugins:\n  - plugin: lode.example.com/plugins/naming\n";

fn registry() -> RegistryScript {
    let mut script = RegistryScript::new();
    script.module(
        "acme/date",
        &[("acme/date/v1/date.proto", "syntax = \"proto3\";\n")],
        &[],
    );
    script.plugin("plugins/check", &EMPTY_WASM);
    script.plugin("plugins/naming", &EMPTY_WASM);
    script.plugin("plugins/extra", &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]);
    script.policy("policies/strict", POLICY_DOC);
    script
}

fn full_config() -> String {
    format!(
        "version: v2\nmodules:\n  - path: proto\ndeps:\n  - {HOST}/acme/date\nplugins:\n  - {HOST}/plugins/check\npolicies:\n  - {HOST}/policies/strict\npolicy-plugins:\n  {HOST}/policies/strict:\n    - {HOST}/plugins/extra\n"
    )
}

fn read_lock(dir: &std::path::Path) -> LockFile {
    let bytes = std::fs::read(dir.join(LOCK_FILE_NAME)).unwrap();
    LockFile::read(bytes.as_slice()).unwrap()
}

#[tokio::test]
async fn update_pins_modules_plugins_and_policies() {
    let registry = registry().start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("lode.yaml", full_config()),
            ("proto/me/me.proto", "syntax = \"proto3\";\n".to_owned()),
        ],
    );

    controller
        .update(dir.path(), "", Default::default())
        .await
        .unwrap();

    let lock = read_lock(dir.path());
    assert_eq!(lock.deps().len(), 1);
    assert_eq!(
        lock.deps()[0].full_name().to_string(),
        format!("{HOST}/acme/date")
    );
    assert_eq!(
        lock.deps()[0].digest().unwrap().to_string(),
        registry.module_digest("acme/date")
    );

    assert_eq!(lock.plugins().len(), 1);
    assert_eq!(
        lock.plugins()[0].digest().unwrap().to_string(),
        registry.plugin_digest("plugins/check")
    );

    assert_eq!(lock.policies().len(), 1);
    assert_eq!(
        lock.policies()[0].digest().unwrap().to_string(),
        registry.policy_digest("policies/strict")
    );

    // the policy's own plugin deps union with the configured map
    let policy_plugins = lock
        .policy_plugins()
        .get(&format!("{HOST}/policies/strict"))
        .unwrap();
    let names: Vec<String> = policy_plugins
        .iter()
        .map(|k| k.full_name().to_string())
        .collect();
    assert_eq!(
        names,
        [
            format!("{HOST}/plugins/extra"),
            format!("{HOST}/plugins/naming"),
        ]
    );

    lock.validate_digests().unwrap();
}

#[tokio::test]
async fn update_is_a_noop_without_config_or_lock() {
    let registry = RegistryScript::new().start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("proto/me/me.proto", "syntax = \"proto3\";\n")]);

    controller
        .update(dir.path(), "proto", Default::default())
        .await
        .unwrap();
    assert!(!dir.path().join("proto").join(LOCK_FILE_NAME).exists());
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

#[tokio::test]
async fn update_rejects_the_only_flag() {
    let registry = RegistryScript::new().start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("proto/me/me.proto", "syntax = \"proto3\";\n")]);

    let err = controller
        .update(
            dir.path(),
            "proto",
            lode::ops::update::UpdateOptions {
                only: vec!["something".to_owned()],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, lode::Error::Unimplemented { flag: "--only" }));
}

#[tokio::test]
async fn prune_drops_unconfigured_entries_and_is_idempotent() {
    let registry = registry().start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("lode.yaml", full_config()),
            ("proto/me/me.proto", "syntax = \"proto3\";\n".to_owned()),
        ],
    );
    controller
        .update(dir.path(), "", Default::default())
        .await
        .unwrap();

    // narrow the configuration down to the module dep only
    write_tree(
        dir.path(),
        &[(
            "lode.yaml",
            format!("version: v2\nmodules:\n  - path: proto\ndeps:\n  - {HOST}/acme/date\n"),
        )],
    );
    controller.prune(dir.path(), "").await.unwrap();

    let pruned = read_lock(dir.path());
    assert_eq!(pruned.deps().len(), 1);
    assert!(pruned.plugins().is_empty());
    assert!(pruned.policies().is_empty());
    assert!(pruned.policy_plugins().is_empty());

    // after update-then-prune the lock holds exactly the configured keys
    let names: Vec<String> = pruned
        .deps()
        .iter()
        .map(|k| k.full_name().to_string())
        .collect();
    assert_eq!(names, [format!("{HOST}/acme/date")]);

    let first = std::fs::read(dir.path().join(LOCK_FILE_NAME)).unwrap();
    controller.prune(dir.path(), "").await.unwrap();
    let second = std::fs::read(dir.path().join(LOCK_FILE_NAME)).unwrap();
    assert_eq!(first, second);
}
