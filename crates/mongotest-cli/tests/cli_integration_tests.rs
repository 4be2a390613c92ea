//! End-to-end tests of the `mongotest` binary
//!
//! Nothing here needs a MongoDB server: runs use `--skip-startup` and tests
//! without version requirements, so no probe ever reaches the network.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn mongotest_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mongotest").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("MONGOTEST_TOPOLOGY")
        .env_remove("MONGOTEST_JSON")
        .env_remove("MONGOTEST_SKIP_STARTUP")
        .env("NO_COLOR", "1");
    cmd
}

fn write_manifest(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

// ══════════════════════════════════════════════════════════════════════════════
// HELP AND COMPLETIONS
// ══════════════════════════════════════════════════════════════════════════════

mod help_messages {
    use super::*;

    #[test]
    fn test_main_help_shows_commands_and_env_vars() {
        let dir = TempDir::new().unwrap();
        mongotest_cmd(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("discover"))
            .stdout(predicate::str::contains("completions"))
            .stdout(predicate::str::contains("MONGOTEST_TOPOLOGY"));
    }

    #[test]
    fn test_run_help_lists_flags() {
        let dir = TempDir::new().unwrap();
        mongotest_cmd(dir.path())
            .args(["run", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--environment"))
            .stdout(predicate::str::contains("--skip-startup"))
            .stdout(predicate::str::contains("--skip-version-check"))
            .stdout(predicate::str::contains("--timeout"));
    }

    #[test]
    fn test_bash_completions() {
        let dir = TempDir::new().unwrap();
        mongotest_cmd(dir.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("mongotest"));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION ERRORS
// ══════════════════════════════════════════════════════════════════════════════

mod configuration_errors {
    use super::*;

    #[test]
    fn test_unknown_topology_fails_before_start() {
        let dir = TempDir::new().unwrap();
        mongotest_cmd(dir.path())
            .args(["run", "-e", "mesh"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("unknown topology 'mesh'"));
    }

    #[test]
    fn test_unknown_topology_from_env() {
        let dir = TempDir::new().unwrap();
        mongotest_cmd(dir.path())
            .arg("run")
            .env("MONGOTEST_TOPOLOGY", "ssl")
            .assert()
            .failure();
    }

    #[test]
    fn test_malformed_metadata_is_reported() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "bad.test.toml",
            "[[test]]\nname = \"broken\"\ncommand = [\"true\"]\n\n[test.metadata.requires]\nfeatures = [\"telepathy\"]\n",
        );

        mongotest_cmd(dir.path())
            .args(["run", "--skip-startup"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("broken"))
            .stderr(predicate::str::contains("bad.test.toml"));
    }

    #[test]
    fn test_invalid_project_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("mongotest.toml"), "[runner]\ntimeout_ms = 0\n").unwrap();

        mongotest_cmd(dir.path())
            .arg("run")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("timeout_ms"));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ══════════════════════════════════════════════════════════════════════════════

mod discovery {
    use super::*;

    #[test]
    fn test_discover_json() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "crud.test.toml",
            "[[test]]\nname = \"insert\"\ncommand = [\"true\"]\n\n[[test]]\nname = \"resume\"\ncommand = [\"true\"]\n\n[test.metadata.requires]\ntopology = \"replicaset\"\n",
        );

        let output = mongotest_cmd(dir.path())
            .args(["discover", "--json"])
            .output()
            .unwrap();

        assert!(output.status.success());
        let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(listing["tests"], 2);
        assert_eq!(
            listing["results"][1]["metadata"]["requires"]["topology"],
            "replicaset"
        );
    }

    #[test]
    fn test_discover_uses_configured_test_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("functional")).unwrap();
        fs::write(
            dir.path().join("mongotest.toml"),
            "[runner]\ntests = \"functional\"\n",
        )
        .unwrap();
        write_manifest(
            &dir.path().join("functional"),
            "a.test.toml",
            "[[test]]\nname = \"configured path\"\ncommand = [\"true\"]\n",
        );

        mongotest_cmd(dir.path())
            .arg("discover")
            .assert()
            .success()
            .stdout(predicate::str::contains("configured path"));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// RUNS AGAINST AN EXTERNAL TOPOLOGY
// ══════════════════════════════════════════════════════════════════════════════

#[cfg(unix)]
mod external_runs {
    use super::*;

    const SUITE: &str = r#"
[[test]]
name = "passes"
command = ["true"]

[[test]]
name = "fails"
command = ["sh", "-c", "echo 'boom' >&2; exit 1"]

[[test]]
name = "needs sharded"
command = ["false"]

[test.metadata.requires]
topology = "sharded"
"#;

    #[test]
    fn test_exit_code_is_failure_count() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "suite.test.toml", SUITE);

        mongotest_cmd(dir.path())
            .args(["run", "--skip-startup", "--verbose"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("PASS passes"))
            .stdout(predicate::str::contains("FAIL fails"))
            .stdout(predicate::str::contains("SKIP needs sharded"))
            .stdout(predicate::str::contains("boom"));
    }

    #[test]
    fn test_grep_narrows_suite() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "suite.test.toml", SUITE);

        mongotest_cmd(dir.path())
            .args(["run", "--skip-startup", "--grep", "passes"])
            .assert()
            .success();
    }

    #[test]
    fn test_json_report() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "suite.test.toml", SUITE);

        let output = mongotest_cmd(dir.path())
            .args(["run", "--skip-startup", "--json", "-e", "sharded"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(2));
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["topology"], "sharded");
        assert_eq!(report["passed"], 1);
        assert_eq!(report["failed"], 2);
        assert_eq!(report["skipped"], 0);
        assert!(report["finished_at"].is_string());
    }

    #[test]
    fn test_host_requirement_without_host_version_fails() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "node.test.toml",
            "[[test]]\nname = \"old node\"\ncommand = [\"true\"]\n\n[test.metadata.requires]\nnode = \">=4.0.0\"\n",
        );

        mongotest_cmd(dir.path())
            .args(["run", "--skip-startup"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("no host runtime version configured"));
    }

    #[test]
    fn test_configured_host_version_satisfies_host_requirement() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("mongotest.toml"), "[host]\nversion = \"18.2.0\"\n").unwrap();
        write_manifest(
            dir.path(),
            "node.test.toml",
            "[[test]]\nname = \"old node\"\ncommand = [\"true\"]\n\n[test.metadata.requires]\nnode = \">=4.0.0\"\n",
        );

        mongotest_cmd(dir.path())
            .args(["run", "--skip-startup", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"passed\":1"));
    }

    #[test]
    fn test_skip_version_check_lets_version_gated_tests_run() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "gated.test.toml",
            "[[test]]\nname = \"future server\"\ncommand = [\"true\"]\n\n[test.metadata.requires]\nmongodb = \">=99.0.0\"\n",
        );

        mongotest_cmd(dir.path())
            .args(["run", "--skip-startup", "--skip-version-check", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"passed\":1"));
    }
}
