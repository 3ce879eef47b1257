//! Full workspace resolution over a mix of local modules and
//! registry-hosted dependencies, ending in a deterministic DAG.

use std::collections::BTreeMap;

use lode::workspace::WorkspaceOptions;
use lode::module::TargetPaths;

use crate::common::{write_tree, RegistryScript, HOST};

const GEO: &str = "syntax = \"proto3\";\npackage acme.geo.v1;\n";
const MONEY: &str = "syntax = \"proto3\";\npackage acme.money.v1;\n";
const CURRENCY: &str = "syntax = \"proto3\";\npackage acme.money.v1;\n";
const BOND: &str = "syntax = \"proto3\";\npackage acme.bond.v1;\nimport \"acme/date/v1/date.proto\";\nimport \"acme/geo/v1/geo.proto\";\nimport \"acme/money/v1/money.proto\";\n";
const PORTFOLIO: &str = "syntax = \"proto3\";\npackage finance.portfolio.v1;\nimport \"acme/bond/v1/bond.proto\";\n";

fn workspace_files() -> Vec<(&'static str, String)> {
    vec![
        (
            "lode.yaml",
            format!(
                "version: v2\nmodules:\n  - path: common/geo/proto\n    name: {HOST}/acme/geo\n  - path: common/money/proto\n    name: {HOST}/acme/money\n  - path: common/bond/proto\n    name: {HOST}/acme/bond\n  - path: finance/portfolio/proto\ndeps:\n  - {HOST}/acme/date\n"
            ),
        ),
        ("common/geo/proto/acme/geo/v1/geo.proto", GEO.to_owned()),
        ("common/money/proto/acme/money/v1/money.proto", MONEY.to_owned()),
        (
            "common/money/proto/acme/money/v1/currency_code.proto",
            CURRENCY.to_owned(),
        ),
        ("common/bond/proto/acme/bond/v1/bond.proto", BOND.to_owned()),
        (
            "finance/portfolio/proto/finance/portfolio/v1/portfolio.proto",
            PORTFOLIO.to_owned(),
        ),
    ]
}

fn hosted_registry() -> RegistryScript {
    let mut script = RegistryScript::new();
    script.module(
        "acme/extension",
        &[(
            "acme/extension/v1/extension.proto",
            "syntax = \"proto3\";\npackage acme.extension.v1;\n",
        )],
        &[],
    );
    script.module(
        "acme/date",
        &[(
            "acme/date/v1/date.proto",
            "syntax = \"proto3\";\npackage acme.date.v1;\nimport \"acme/extension/v1/extension.proto\";\n",
        )],
        &["acme/extension"],
    );
    script
}

fn direct_deps(deps: &[lode::module::ModuleDep]) -> Vec<String> {
    deps.iter()
        .filter(|d| d.is_direct())
        .map(|d| d.module().opaque_id().to_owned())
        .collect()
}

#[tokio::test]
async fn workspace_dag_resolution() {
    let registry = hosted_registry().start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &workspace_files());

    // pin the configured dep, then build
    controller
        .update(dir.path(), "", Default::default())
        .await
        .unwrap();

    let workspace = controller
        .load_workspace(dir.path(), "", WorkspaceOptions::default())
        .await
        .unwrap();
    let set = workspace.module_set();

    let ids: Vec<String> = set
        .modules()
        .iter()
        .map(|m| m.opaque_id().to_owned())
        .collect();
    assert_eq!(
        ids,
        vec![
            "finance/portfolio/proto".to_owned(),
            format!("{HOST}/acme/bond"),
            format!("{HOST}/acme/date"),
            format!("{HOST}/acme/extension"),
            format!("{HOST}/acme/geo"),
            format!("{HOST}/acme/money"),
        ]
    );

    let mut edges = BTreeMap::new();
    for module in set.modules() {
        edges.insert(
            module.opaque_id().to_owned(),
            direct_deps(&module.deps().await.unwrap()),
        );
    }

    assert_eq!(
        edges["finance/portfolio/proto"],
        [format!("{HOST}/acme/bond")]
    );
    assert_eq!(
        edges[&format!("{HOST}/acme/bond")],
        [
            format!("{HOST}/acme/date"),
            format!("{HOST}/acme/geo"),
            format!("{HOST}/acme/money"),
        ]
    );
    assert_eq!(
        edges[&format!("{HOST}/acme/date")],
        [format!("{HOST}/acme/extension")]
    );
    assert!(edges[&format!("{HOST}/acme/extension")].is_empty());
    assert!(edges[&format!("{HOST}/acme/geo")].is_empty());
    assert!(edges[&format!("{HOST}/acme/money")].is_empty());
}

#[tokio::test]
async fn target_path_restriction() {
    let registry = hosted_registry().start().await;
    let controller = registry.controller();

    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &workspace_files());
    controller
        .update(dir.path(), "", Default::default())
        .await
        .unwrap();

    let workspace = controller
        .load_workspace(
            dir.path(),
            "",
            WorkspaceOptions {
                target_sub_dir_path: Some("common/money/proto".to_owned()),
                target_paths: Some(TargetPaths {
                    include: vec!["acme/money/v1/currency_code.proto".to_owned()],
                    exclude: Vec::new(),
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let set = workspace.module_set();

    let money = set
        .module_for_full_name(&format!("{HOST}/acme/money"))
        .unwrap();
    assert!(money.is_target());

    let infos = money.walk_file_infos().await.unwrap();
    let currency = infos
        .iter()
        .find(|i| i.path() == "acme/money/v1/currency_code.proto")
        .unwrap();
    assert!(currency.is_target_file());
    let money_proto = infos
        .iter()
        .find(|i| i.path() == "acme/money/v1/money.proto")
        .unwrap();
    assert!(!money_proto.is_target_file());

    let bond = set
        .module_for_full_name(&format!("{HOST}/acme/bond"))
        .unwrap();
    assert!(!bond.is_target());
}
