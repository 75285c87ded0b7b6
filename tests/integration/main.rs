//! Integration tests for the node plugin CLI

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from host configuration
    fn plugin(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("fluid-csi-node");
        cmd.env_remove("NODE_ID")
            .env_remove("ALLOW_PATCH_STALE_NODE")
            .env("FLUID_CSI_CONFIG", temp.path().join("csi-node.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Fluid CSI node plugin"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("fluid-csi-node"));
    }

    #[test]
    fn capabilities_lists_stage_unstage() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .arg("capabilities")
            .assert()
            .success()
            .stdout(predicate::str::contains("STAGE_UNSTAGE_VOLUME"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("csi-node.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[node]"))
            .stdout(predicate::str::contains("allow_stale_node = true"));
    }

    #[test]
    fn config_show_reads_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("csi-node.toml"),
            "[session_manager]\nmax_attempts = 5\n",
        )
        .unwrap();
        plugin(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_attempts = 5"));
    }

    #[test]
    fn stale_node_env_override() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .env("ALLOW_PATCH_STALE_NODE", "false")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("allow_stale_node = false"));
    }

    #[test]
    fn invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("csi-node.toml"), "[node\n").unwrap();
        plugin(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn stage_requires_node_id() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .args(["stage", "--volume-id", "default-hbase"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("node id is not set"))
            .stderr(predicate::str::contains("InvalidArgument"));
    }

    #[test]
    fn publish_without_fluid_path_is_invalid() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        std::fs::create_dir(&target).unwrap();

        plugin(&temp)
            .args(["--node-id", "worker-1", "publish", "--volume-id", "default-hbase"])
            .arg("--target-path")
            .arg(&target)
            .args(["--context", "fluid_path="])
            .assert()
            .failure()
            .stderr(predicate::str::contains("fluid_path is not set"))
            .stderr(predicate::str::contains("InvalidArgument"));
    }

    #[test]
    fn publish_requires_target_path() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .args(["publish", "--volume-id", "default-hbase"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--target-path"));
    }

    #[test]
    fn malformed_context_is_rejected() {
        let temp = TempDir::new().unwrap();
        plugin(&temp)
            .args(["stage", "--volume-id", "default-hbase", "--context", "fluid_path"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("KEY=VALUE"));
    }
}
