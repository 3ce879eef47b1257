use std::collections::HashMap;

use bytes::Bytes;
use clap::Parser;
use lode::cli::{Cli, Command};
use lode::controller::{Controller, ControllerOptions};
use lode::ops::push::PushOptions;
use lode::ops::update::UpdateOptions;
use lode::plugin::PluginVisibility;
use lode_config::{DigestType, FullName, Reference};
use miette::{miette, IntoDiagnostic, Result};
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let rt = Runtime::new().expect("Failed to build Tokio runtime");

    let controller = Controller::new(ControllerOptions {
        client: lode::registry::ClientProviderOptions {
            endpoint_overrides: endpoint_overrides_from_env(),
            ..Default::default()
        },
    });

    rt.block_on(run(cli, controller))
}

async fn run(cli: Cli, controller: Controller) -> Result<()> {
    match cli.command {
        Command::Update { only } => {
            controller
                .update(&cli.dir, &cli.path, UpdateOptions { only })
                .await?;
        }
        Command::Prune => {
            controller.prune(&cli.dir, &cli.path).await?;
        }
        Command::Deps => {
            let deps = controller.workspace_deps(&cli.dir, &cli.path).await?;
            for (module, module_deps) in deps {
                println!("{module}");
                for dep in module_deps {
                    let marker = if dep.is_direct() { "" } else { " (transitive)" };
                    println!("  -> {}{marker}", dep.module().opaque_id());
                }
            }
        }
        Command::Resolve {
            reference,
            digest_type,
        } => {
            let reference = Reference::parse(&reference)?;
            let digest_type = DigestType::parse(&digest_type)?;
            let key = controller.resolve_ref(&reference, digest_type).await?;
            println!("{key} {}", key.digest()?);
        }
        Command::Push {
            reference,
            binary,
            policy,
            labels,
            create,
            create_visibility,
            source_control_url,
        } => {
            let full_name = FullName::parse(&reference)?;
            let options = PushOptions {
                labels,
                source_control_url,
                create_if_not_exist: create
                    .then(|| PluginVisibility::parse(&create_visibility))
                    .transpose()?,
            };
            let key = match (binary, policy) {
                (Some(binary), None) => {
                    let wasm = tokio::fs::read(&binary).await.into_diagnostic()?;
                    controller
                        .push_plugin(&full_name, Bytes::from(wasm), options)
                        .await?
                }
                (None, Some(policy)) => {
                    let doc = tokio::fs::read(&policy).await.into_diagnostic()?;
                    controller
                        .push_policy(&full_name, Bytes::from(doc), options)
                        .await?
                }
                (None, None) => {
                    controller
                        .push_module(&cli.dir, &cli.path, &full_name, options)
                        .await?
                }
                (Some(_), Some(_)) => {
                    return Err(miette!("--binary and --policy are mutually exclusive"))
                }
            };
            println!("{key} {}", key.digest()?);
        }
    }
    Ok(())
}

/// `LODE_REGISTRY_OVERRIDES=host=http://addr[,host=url...]` routes
/// registry hostnames to explicit endpoints. Credentials stay with the
/// transport collaborators; the core only ever sees typed configuration.
fn endpoint_overrides_from_env() -> HashMap<String, String> {
    let Ok(raw) = std::env::var("LODE_REGISTRY_OVERRIDES") else {
        return HashMap::new();
    };
    raw.split(',')
        .filter_map(|pair| {
            pair.split_once('=')
                .map(|(host, url)| (host.trim().to_owned(), url.trim().to_owned()))
        })
        .collect()
}
