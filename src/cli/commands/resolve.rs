//! Resolve command - show the install order without fetching

use super::CommandEnv;
use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::error::SkillsyncResult;
use crate::resolver::{self, Resolution};

/// Execute the resolve command
pub async fn execute(
    args: ResolveArgs,
    env: &CommandEnv,
    lock: Option<&str>,
    client: Option<&str>,
) -> SkillsyncResult<()> {
    let loaded = env.load_lock(lock).await?;
    let ctx = env.context(args.global).await;
    let resolution = resolver::resolve(&loaded.lock, &ctx, client)?;

    if resolution.is_empty() {
        println!("No artifacts apply to this context.");
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&resolution),
        OutputFormat::Json => print_json(&resolution)?,
        OutputFormat::Plain => {
            for artifact in &resolution.order {
                println!("{}", artifact.id());
            }
        }
    }

    Ok(())
}

fn print_table(resolution: &Resolution) {
    println!(
        "{:<4} {:<28} {:<12} {:<12} {:<24}",
        "#", "NAME", "VERSION", "TYPE", "SCOPE"
    );
    println!("{}", "-".repeat(80));

    for (i, artifact) in resolution.order.iter().enumerate() {
        println!(
            "{:<4} {:<28} {:<12} {:<12} {:<24}",
            i + 1,
            artifact.name,
            artifact.version,
            artifact.artifact_type,
            artifact.effective_scope().key()
        );
    }

    println!();
    println!("Total: {} artifact(s)", resolution.len());
}

fn print_json(resolution: &Resolution) -> SkillsyncResult<()> {
    #[derive(serde::Serialize)]
    struct ResolvedJson {
        name: String,
        version: String,
        #[serde(rename = "type")]
        artifact_type: String,
        scope: String,
        source: String,
        dependencies: Vec<String>,
    }

    let entries: Vec<ResolvedJson> = resolution
        .order
        .iter()
        .map(|artifact| ResolvedJson {
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            artifact_type: artifact.artifact_type.to_string(),
            scope: artifact.effective_scope().key(),
            source: artifact.source.describe(),
            dependencies: resolution
                .dependencies_of(&artifact.id())
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
