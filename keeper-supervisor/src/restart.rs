//! Restart orchestration: schedule a replacement front-end that waits for this
//! process to exit, then shut down.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use keeper_core::DaemonIdentity;

use crate::error::SupervisorError;
use crate::supervisor::{Control, Supervisor};
use crate::surface::Surface;

/// Schedules a fresh front-end once process `pid` is gone.
pub trait Relauncher {
    fn schedule(&self, pid: u32, identity: &DaemonIdentity) -> Result<(), SupervisorError>;
}

/// Relaunch through a detached `sh -c` wait-then-exec sequence.
#[derive(Debug, Clone)]
pub struct ShellRelauncher {
    exe: PathBuf,
}

impl ShellRelauncher {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// Relaunch the running executable.
    pub fn current() -> Result<Self, SupervisorError> {
        std::env::current_exe()
            .map(Self::new)
            .map_err(SupervisorError::Relaunch)
    }
}

impl Relauncher for ShellRelauncher {
    fn schedule(&self, pid: u32, identity: &DaemonIdentity) -> Result<(), SupervisorError> {
        let command = relaunch_command(std::env::consts::OS, pid, &self.exe, identity);
        tracing::info!(%command, "scheduling front-end relaunch");

        let mut shell = Command::new("sh");
        shell
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            shell.process_group(0);
        }
        shell.spawn().map(|_| ()).map_err(SupervisorError::Relaunch)
    }
}

/// Shell line that blocks until `pid` exits, then starts `exe run` for `identity`.
pub fn relaunch_command(os: &str, pid: u32, exe: &Path, identity: &DaemonIdentity) -> String {
    let wait = if os == "macos" {
        format!("lsof -p {pid} +r 1 &>/dev/null")
    } else {
        format!("tail --pid={pid} -f /dev/null")
    };
    format!(
        "{wait}; '{}' run --config-name '{}'",
        exe.display(),
        identity.as_str()
    )
}

impl<S: Surface> Supervisor<S> {
    /// Schedule a replacement front-end and shut down, stopping the daemon.
    ///
    /// Returns [`Control::Exit`]; the caller terminates the process.
    pub fn restart(&mut self) -> Result<Control, SupervisorError> {
        let pid = std::process::id();
        self.relauncher.schedule(pid, &self.identity)?;
        self.shutdown(Some(true))?;
        Ok(Control::Exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_waits_on_pid_with_tail() {
        let cmd = relaunch_command(
            "linux",
            4242,
            Path::new("/usr/bin/keeper"),
            &DaemonIdentity::from("work"),
        );
        assert_eq!(
            cmd,
            "tail --pid=4242 -f /dev/null; '/usr/bin/keeper' run --config-name 'work'"
        );
    }

    #[test]
    fn macos_waits_on_open_files_with_lsof() {
        let cmd = relaunch_command(
            "macos",
            7,
            Path::new("/Applications/keeper"),
            &DaemonIdentity::default(),
        );
        assert!(cmd.starts_with("lsof -p 7 +r 1 &>/dev/null; "));
        assert!(cmd.ends_with("run --config-name 'keeper'"));
    }
}
