//! Integration tests for skillsync

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Offline workspace: path-sourced artifacts, a lock and a config
    /// pointing the cache and global target into the temp dir
    struct Workspace {
        temp: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path();

            write_artifact(root, "code-review", "skill", "# Review code");
            write_artifact(root, "formatter", "agent", "# Format code");

            fs::write(
                root.join("config.toml"),
                format!(
                    "[cache]\ndir = '{}'\n\n[install]\nglobal_dir = '{}'\n",
                    root.join("cache").display(),
                    root.join("home").join(".claude").display()
                ),
            )
            .unwrap();

            Self { temp }
        }

        fn path(&self) -> &Path {
            self.temp.path()
        }

        fn write_lock(&self, body: &str) {
            fs::write(
                self.path().join("skills.lock"),
                format!(
                    "lock-version = \"1.0\"\nversion = \"v1\"\ncreated-by = \"test\"\n{}",
                    body
                ),
            )
            .unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("skillsync");
            cmd.current_dir(self.path())
                .env_remove("SKILLSYNC_CACHE_DIR")
                .env_remove("SKILLSYNC_SERVER_URL")
                .env_remove("SKILLSYNC_SILENT")
                .env_remove("SKILLSYNC_CONFIG")
                .arg("--config")
                .arg(self.path().join("config.toml"));
            cmd
        }
    }

    fn write_artifact(root: &Path, name: &str, artifact_type: &str, body: &str) {
        let dir = root.join("artifacts").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("metadata.toml"),
            format!(
                "[artifact]\nname = \"{}\"\nversion = \"1.0.0\"\ntype = \"{}\"\n",
                name, artifact_type
            ),
        )
        .unwrap();
        fs::write(dir.join("README.md"), body).unwrap();
    }

    const TWO_ARTIFACTS: &str = r#"
[[artifacts]]
name = "code-review"
version = "1.0.0"
type = "skill"

[artifacts.source-path]
path = "./artifacts/code-review"

[[artifacts.dependencies]]
name = "formatter"

[[artifacts]]
name = "formatter"
version = "1.0.0"
type = "agent"

[artifacts.source-path]
path = "./artifacts/formatter"
"#;

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("skillsync")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("reproducible installs"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("skillsync")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("skillsync"));
    }

    #[test]
    fn install_from_path_sources() {
        let ws = Workspace::new();
        ws.write_lock(TWO_ARTIFACTS);

        ws.cmd()
            .args(["install", "--global"])
            .assert()
            .success()
            .stdout(predicate::str::contains("formatter@1.0.0"))
            .stdout(predicate::str::contains("2 installed, 0 failed, 0 removed"));

        let global = ws.path().join("home").join(".claude");
        assert!(global.join("skills/code-review/README.md").is_file());
        assert!(global.join("agents/formatter/metadata.toml").is_file());
        assert!(ws.path().join("cache/installed-state/global.json").is_file());
    }

    #[test]
    fn reinstall_with_smaller_lock_removes() {
        let ws = Workspace::new();
        ws.write_lock(TWO_ARTIFACTS);
        ws.cmd().args(["install", "--global"]).assert().success();

        ws.write_lock(
            r#"
[[artifacts]]
name = "formatter"
version = "1.0.0"
type = "agent"

[artifacts.source-path]
path = "./artifacts/formatter"
"#,
        );
        ws.cmd()
            .args(["install", "--global"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 removed"));

        let global = ws.path().join("home").join(".claude");
        assert!(!global.join("skills/code-review").exists());
        assert!(global.join("agents/formatter").is_dir());
    }

    #[test]
    fn missing_source_fails_with_partial_report() {
        let ws = Workspace::new();
        ws.write_lock(
            r#"
[[artifacts]]
name = "formatter"
version = "1.0.0"
type = "agent"

[artifacts.source-path]
path = "./artifacts/formatter"

[[artifacts]]
name = "ghost"
version = "1.0.0"
type = "skill"

[artifacts.source-path]
path = "./artifacts/ghost"
"#,
        );

        ws.cmd()
            .args(["install", "--global"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("ghost@1.0.0 [fetch]"))
            .stderr(predicate::str::contains("1 artifact(s) failed"));

        assert!(ws
            .path()
            .join("home/.claude/agents/formatter")
            .is_dir());
    }

    #[test]
    fn resolve_prints_dependency_order() {
        let ws = Workspace::new();
        ws.write_lock(TWO_ARTIFACTS);

        ws.cmd()
            .args(["resolve", "--global", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::diff(
                "formatter@1.0.0\ncode-review@1.0.0\n",
            ));

        // Resolving never touches the cache
        assert!(!ws.path().join("cache").exists());
    }

    #[test]
    fn cycle_is_fatal() {
        let ws = Workspace::new();
        ws.write_lock(
            r#"
[[artifacts]]
name = "a"
version = "1.0.0"
type = "skill"

[artifacts.source-path]
path = "./artifacts/code-review"

[[artifacts.dependencies]]
name = "b"

[[artifacts]]
name = "b"
version = "1.0.0"
type = "skill"

[artifacts.source-path]
path = "./artifacts/formatter"

[[artifacts.dependencies]]
name = "a"
"#,
        );

        ws.cmd()
            .args(["install", "--global"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Circular dependency"));
        assert!(!ws.path().join("home").exists());
    }

    #[test]
    fn check_reports_unsatisfied_requirements() {
        let ws = Workspace::new();
        ws.write_lock(TWO_ARTIFACTS);
        fs::write(
            ws.path().join("requirements.txt"),
            "# pinned\ncode-review>=1.0\nformatter==2.0.0\n",
        )
        .unwrap();

        ws.cmd()
            .arg("check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 2 requirement(s)"));
    }

    #[test]
    fn missing_lock_has_hint() {
        let ws = Workspace::new();

        ws.cmd()
            .args(["resolve", "--global"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No lock file found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn cache_path_honors_config() {
        let ws = Workspace::new();

        ws.cmd()
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"));
    }

    #[test]
    fn cache_dir_env_override() {
        let ws = Workspace::new();
        let custom = ws.path().join("env-cache");

        ws.cmd()
            .env("SKILLSYNC_CACHE_DIR", &custom)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("env-cache"));
    }
}
