//! Check command - verify a requirements file against the lock

use super::CommandEnv;
use crate::cli::args::CheckArgs;
use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::requirements::read_requirements;
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[MISSING] ");

/// Execute the check command
pub async fn execute(args: CheckArgs, env: &CommandEnv, lock: Option<&str>) -> SkillsyncResult<()> {
    let path = env.cwd.join(&args.requirements);
    let requirements = read_requirements(&path).await?;
    let loaded = env.load_lock(lock).await?;

    let mut missing = 0;
    for requirement in &requirements {
        if requirement.satisfied_by(&loaded.lock) {
            println!("{}{}", CHECK, requirement);
        } else {
            missing += 1;
            println!("{}{}", CROSS, style(requirement).red());
        }
    }

    if missing > 0 {
        return Err(SkillsyncError::User(format!(
            "{} of {} requirement(s) not satisfied by lock {}",
            missing,
            requirements.len(),
            loaded.lock.version
        )));
    }

    println!();
    println!(
        "{}",
        style(format!("All {} requirement(s) satisfied", requirements.len())).green()
    );
    Ok(())
}
