//! Mount, unmount and mount-check commands
//!
//! Translates process outcomes of the host mount tools and the Fluid helper
//! scripts into typed results.

use crate::config::schema::CommandsConfig;
use crate::error::{CsiError, CsiResult};
use crate::mount::command::{render, CommandOutput, CommandRunner};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Gateway to the external mount tooling
pub struct MountGateway {
    runner: Arc<dyn CommandRunner>,
    commands: CommandsConfig,
}

impl MountGateway {
    /// Create a gateway running commands through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>, commands: CommandsConfig) -> Self {
        Self { runner, commands }
    }

    /// Bind mount `source` onto `target`, read-only if requested
    pub async fn bind_mount(&self, source: &Path, target: &Path, read_only: bool) -> CsiResult<()> {
        let mut args = vec!["--bind".to_string()];
        if read_only {
            args.push("-o".to_string());
            args.push("ro".to_string());
        }
        args.push(source.display().to_string());
        args.push(target.display().to_string());

        let out = match self.runner.run(&self.commands.mount, &args).await {
            Ok(out) => out,
            Err(CsiError::CommandFailed { command, source })
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                return Err(CsiError::PermissionDenied(format!("{}: {}", command, source)));
            }
            Err(e) => return Err(e),
        };

        if out.success() {
            debug!("Succeed in binding {} to {}", source.display(), target.display());
            return Ok(());
        }

        let lowered = out.output.to_lowercase();
        let message = format!("{}: {}", render(&self.commands.mount, &args), out.output.trim_end());
        if lowered.contains("permission denied") || lowered.contains("only root") {
            Err(CsiError::PermissionDenied(message))
        } else if lowered.contains("invalid argument") {
            Err(CsiError::InvalidArgument(message))
        } else {
            Err(CsiError::Mount {
                source_path: source.to_path_buf(),
                target: target.to_path_buf(),
                output: out.output.trim_end().to_string(),
            })
        }
    }

    /// Unmount `target` once
    pub async fn unmount(&self, target: &Path) -> CsiResult<()> {
        let args = vec![target.display().to_string()];
        let out = self.runner.run(&self.commands.umount, &args).await?;

        if out.success() {
            Ok(())
        } else {
            Err(CsiError::Unmount {
                target: target.to_path_buf(),
                output: out.output.trim_end().to_string(),
            })
        }
    }

    /// Report whether any bind target still references `volume_id`
    pub async fn is_volume_in_use(&self, volume_id: &str) -> CsiResult<bool> {
        info!("Try to check if the volume {} is being used", volume_id);
        if volume_id.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volumeName is not specified".to_string(),
            ));
        }

        let program = self.commands.check_bind_mounts.display().to_string();
        let args = vec![volume_id.to_string()];
        let out = self.runner.run(&program, &args).await?;
        info!("{}: {}", render(&program, &args), out.output.trim_end());

        in_use_from_exit(&render(&program, &args), &out)
    }

    /// Block until the FUSE mount at `fluid_path` is ready and `sub_path`
    /// exists beneath it
    pub async fn wait_until_ready(
        &self,
        fluid_path: &Path,
        mount_type: &str,
        sub_path: Option<&str>,
    ) -> CsiResult<()> {
        info!("Try to check if the mount target {} is ready", fluid_path.display());
        if fluid_path.as_os_str().is_empty() {
            return Err(CsiError::Internal(
                "target is not specified for checking the mount".to_string(),
            ));
        }

        let mut args = vec![fluid_path.display().to_string(), mount_type.to_string()];
        if let Some(sub_path) = sub_path {
            args.push(sub_path.to_string());
        }

        let program = self.commands.check_mount.display().to_string();
        let out = self.runner.run(&program, &args).await?;
        if out.success() {
            Ok(())
        } else {
            Err(CsiError::MountNotReady {
                path: fluid_path.to_path_buf(),
                output: out.output.trim_end().to_string(),
            })
        }
    }
}

/// Map the in-use checker's exit status. The checker greps the mount table,
/// so 0 means a match (in use) and 1 means no match (not in use). Anything
/// else is an error.
pub(crate) fn in_use_from_exit(command: &str, out: &CommandOutput) -> CsiResult<bool> {
    match out.code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        code => Err(CsiError::CommandExecution {
            command: command.to_string(),
            code,
            output: out.output.trim_end().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use crate::testing::FakeRunner;
    use std::path::PathBuf;

    fn gateway(runner: &Arc<FakeRunner>) -> MountGateway {
        MountGateway::new(runner.clone(), CommandsConfig::default())
    }

    #[test]
    fn in_use_exit_codes() {
        assert!(in_use_from_exit("check", &CommandOutput::new(0, "")).unwrap());
        assert!(!in_use_from_exit("check", &CommandOutput::new(1, "")).unwrap());
        assert!(in_use_from_exit("check", &CommandOutput::new(2, "boom")).is_err());
        let killed = CommandOutput {
            code: None,
            output: String::new(),
        };
        assert!(in_use_from_exit("check", &killed).is_err());
    }

    #[tokio::test]
    async fn bind_mount_read_write_args() {
        let runner = Arc::new(FakeRunner::new());
        gateway(&runner)
            .bind_mount(Path::new("/data/ds/sub"), Path::new("/target"), false)
            .await
            .unwrap();

        assert_eq!(runner.calls(), vec!["mount --bind /data/ds/sub /target"]);
    }

    #[tokio::test]
    async fn bind_mount_read_only_args() {
        let runner = Arc::new(FakeRunner::new());
        gateway(&runner)
            .bind_mount(Path::new("/data/ds"), Path::new("/target"), true)
            .await
            .unwrap();

        assert_eq!(runner.calls(), vec!["mount --bind -o ro /data/ds /target"]);
    }

    #[tokio::test]
    async fn bind_mount_classifies_failures() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("mount", CommandOutput::new(32, "mount: /target: permission denied."));
        runner.respond("mount", CommandOutput::new(32, "mount: /target: Invalid argument"));
        runner.respond("mount", CommandOutput::new(32, "mount: special device does not exist"));
        let gw = gateway(&runner);
        let (src, dst) = (Path::new("/src"), Path::new("/target"));

        let err = gw.bind_mount(src, dst, false).await.unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);
        let err = gw.bind_mount(src, dst, false).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        let err = gw.bind_mount(src, dst, false).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.to_string().contains("special device does not exist"));
    }

    #[tokio::test]
    async fn unmount_failure_carries_output() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("umount", CommandOutput::new(32, "umount: /target: target is busy."));

        let err = gateway(&runner).unmount(Path::new("/target")).await.unwrap_err();
        assert!(matches!(err, CsiError::Unmount { ref target, .. } if target == &PathBuf::from("/target")));
        assert!(err.to_string().contains("target is busy"));
    }

    #[tokio::test]
    async fn in_use_rejects_empty_volume() {
        let runner = Arc::new(FakeRunner::new());
        let err = gateway(&runner).is_volume_in_use("").await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn in_use_runs_checker_script() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("/usr/local/bin/check_bind_mounts.sh", CommandOutput::new(1, ""));

        let in_use = gateway(&runner).is_volume_in_use("default-hbase").await.unwrap();
        assert!(!in_use);
        assert_eq!(
            runner.calls(),
            vec!["/usr/local/bin/check_bind_mounts.sh default-hbase"]
        );
    }

    #[tokio::test]
    async fn wait_until_ready_passes_sub_path() {
        let runner = Arc::new(FakeRunner::new());
        let gw = gateway(&runner);
        gw.wait_until_ready(Path::new("/runtime/fuse"), "fuse.alluxio-fuse", Some("sub"))
            .await
            .unwrap();
        gw.wait_until_ready(Path::new("/runtime/fuse"), "fuse.alluxio-fuse", None)
            .await
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "/usr/local/bin/check_mount.sh /runtime/fuse fuse.alluxio-fuse sub",
                "/usr/local/bin/check_mount.sh /runtime/fuse fuse.alluxio-fuse",
            ]
        );
    }

    #[tokio::test]
    async fn wait_until_ready_failure_is_internal() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("/usr/local/bin/check_mount.sh", CommandOutput::new(1, "not mounted"));

        let err = gateway(&runner)
            .wait_until_ready(Path::new("/runtime/fuse"), "fuse.alluxio-fuse", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.to_string().contains("not mounted"));
    }
}
