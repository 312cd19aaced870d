//! Cache command - inspect and clear the artifact cache

use super::CommandEnv;
use crate::cli::args::{CacheAction, CacheArgs};
use crate::error::SkillsyncResult;
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, env: &CommandEnv) -> SkillsyncResult<()> {
    match args.action {
        CacheAction::Path => {
            println!("{}", env.cache.root().display());
        }
        CacheAction::Info => {
            println!("{:<10} {}", "Path:", env.cache.root().display());
            println!("{:<10} {}", "Size:", format_bytes(env.cache.size()));
        }
        CacheAction::Clear => {
            let freed = env.cache.clear().await?;
            println!(
                "{} Cleared {}",
                style("✓").green(),
                format_bytes(freed)
            );
        }
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
