//! Install command - fetch and install everything the lock resolves to

use super::CommandEnv;
use crate::cli::args::InstallArgs;
use crate::error::{SkillsyncError, SkillsyncResult};
use crate::installer::{
    ArchiveHandlerFactory, CancelSignal, InstallOptions, InstallReport, Installer,
};
use console::{style, Emoji};
use std::sync::Arc;

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
static MINUS: Emoji<'_, '_> = Emoji("− ", "[DEL] ");

/// Execute the install command
pub async fn execute(
    args: InstallArgs,
    env: &CommandEnv,
    lock: Option<&str>,
    client: Option<&str>,
    cancel: CancelSignal,
) -> SkillsyncResult<()> {
    let loaded = env.load_lock(lock).await?;
    let ctx = env.context(args.global).await;

    let install = &env.config.install;
    let options = InstallOptions {
        concurrency: args.jobs.unwrap_or(install.concurrency),
        global_dir: install.global_dir_path(env.home.as_deref()),
        repo_dir_name: install.repo_dir.clone(),
    };

    let installer = Installer::new(
        Arc::new(env.fetcher(loaded.base_dir.clone())),
        Arc::new(ArchiveHandlerFactory),
        options,
    )
    .with_cancel(cancel);

    let report = installer.run(&loaded.lock, &ctx, client).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.cancelled {
        return Err(SkillsyncError::Cancelled);
    }
    if !report.is_success() {
        return Err(SkillsyncError::User(format!(
            "{} artifact(s) failed",
            report.failed.len()
        )));
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    for id in &report.installed {
        println!("{}{}", CHECK, id);
    }
    for id in &report.removed {
        println!("{}{} {}", MINUS, id, style("(removed)").dim());
    }
    for failure in &report.failed {
        println!(
            "{}{} {} {}",
            CROSS,
            failure.id,
            style(format!("[{}]", failure.phase)).red(),
            failure.error
        );
    }

    println!();
    println!("{}", style(report.summary()).bold());
}
