//! External tool invocation
//!
//! Every adapter talks to the OS through a [`CommandRunner`]. The system runner
//! shells out with `tokio::process`; tests swap in a scripted runner so the
//! exact command sequence of an adapter can be asserted without touching the
//! host.

use crate::error::{FantasmaError, FantasmaResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs
///
/// `run` only returns `Err` when the program could not be launched at all; a
/// non-zero exit is reported through [`CommandOutput::code`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> FantasmaResult<CommandOutput>;

    /// Launch a long-running daemon without waiting for it
    async fn spawn_detached(&self, program: &str, args: &[&str]) -> FantasmaResult<()>;

    /// Read a (small) file such as a sysfs or procfs entry
    async fn read_file(&self, path: &str) -> Option<String>;
}

/// [`CommandRunner`] backed by the real system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> FantasmaResult<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FantasmaError::ToolInvocation {
                cmd: command_line(program, args),
                code: None,
                stderr: e.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn_detached(&self, program: &str, args: &[&str]) -> FantasmaResult<()> {
        // Teardown kills daemons by name
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| FantasmaError::ToolInvocation {
                cmd: command_line(program, args),
                code: None,
                stderr: e.to_string(),
            })?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        tokio::fs::read_to_string(path).await.ok()
    }
}

/// How privileged commands are elevated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Run as-is (already root, or the platform has no elevation wrapper)
    None,
    /// `sudo program args...`
    Sudo,
    /// `su -c "program args..."` (Android)
    Su,
}

impl Elevation {
    /// `sudo` unless the process already runs as root
    pub fn sudo_unless_root() -> Self {
        if is_root() {
            Elevation::None
        } else {
            Elevation::Sudo
        }
    }

    fn wrap<'a>(&self, program: &'a str, args: &[&'a str]) -> (String, Vec<String>) {
        match self {
            Elevation::None => (
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            ),
            Elevation::Sudo => {
                let mut wrapped = Vec::with_capacity(args.len() + 1);
                wrapped.push(program.to_string());
                wrapped.extend(args.iter().map(|a| a.to_string()));
                ("sudo".to_string(), wrapped)
            }
            Elevation::Su => (
                "su".to_string(),
                vec!["-c".to_string(), command_line(program, args)],
            ),
        }
    }
}

/// Check if the current process is running as root
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Command helper shared by the adapters
#[derive(Clone)]
pub struct ShellTool {
    runner: Arc<dyn CommandRunner>,
    elevation: Elevation,
}

impl ShellTool {
    pub fn new(runner: Arc<dyn CommandRunner>, elevation: Elevation) -> Self {
        Self { runner, elevation }
    }

    pub fn system(elevation: Elevation) -> Self {
        Self::new(Arc::new(SystemRunner), elevation)
    }

    pub fn elevation(&self) -> Elevation {
        self.elevation
    }

    /// Run unprivileged and return whatever came back
    pub async fn output(&self, program: &str, args: &[&str]) -> FantasmaResult<CommandOutput> {
        debug!("exec: {}", command_line(program, args));
        self.runner.run(program, args).await
    }

    /// Run unprivileged; non-zero exit is an error
    pub async fn run(&self, program: &str, args: &[&str]) -> FantasmaResult<CommandOutput> {
        let output = self.output(program, args).await?;
        check(command_line(program, args), output)
    }

    /// Run elevated; non-zero exit is an error
    pub async fn privileged(&self, program: &str, args: &[&str]) -> FantasmaResult<CommandOutput> {
        let (program, args) = self.elevation.wrap(program, args);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.output(&program, &args).await?;
        let output = check(command_line(&program, &args), output)?;
        Ok(output)
    }

    /// Like [`ShellTool::privileged`] but the arguments (a passphrase, say)
    /// never reach the log or the error message
    pub async fn privileged_quiet(
        &self,
        program: &str,
        args: &[&str],
    ) -> FantasmaResult<CommandOutput> {
        let (wrapped, wrapped_args) = self.elevation.wrap(program, args);
        let wrapped_args: Vec<&str> = wrapped_args.iter().map(String::as_str).collect();
        debug!("exec: {} ({} arguments hidden)", wrapped, wrapped_args.len());

        let output = self
            .runner
            .run(&wrapped, &wrapped_args)
            .await
            .map_err(|e| match e {
                FantasmaError::ToolInvocation { code, stderr, .. } => FantasmaError::ToolInvocation {
                    cmd: program.to_string(),
                    code,
                    stderr,
                },
                other => other,
            })?;
        check(program.to_string(), output)
    }

    /// Run elevated and ignore the outcome; returns whether it succeeded
    pub async fn try_privileged(&self, program: &str, args: &[&str]) -> bool {
        match self.privileged(program, args).await {
            Ok(_) => true,
            Err(e) => {
                debug!("ignored: {}", e);
                false
            }
        }
    }

    /// Launch an elevated daemon in the background
    pub async fn spawn_privileged(&self, program: &str, args: &[&str]) -> FantasmaResult<()> {
        let (program, args) = self.elevation.wrap(program, args);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!("spawn: {}", command_line(&program, &args));
        self.runner.spawn_detached(&program, &args).await
    }

    /// Whether an unprivileged command exits 0
    pub async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        self.output(program, args).await.map(|o| o.success()).unwrap_or(false)
    }

    /// Same as [`ShellTool::output`] but gives up after `limit`
    pub async fn output_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        limit: Duration,
    ) -> FantasmaResult<CommandOutput> {
        tokio::time::timeout(limit, self.output(program, args))
            .await
            .map_err(|_| FantasmaError::Timeout(format!(
                "'{}' did not finish within {:?}",
                command_line(program, args),
                limit
            )))?
    }

    /// Whether `name` resolves on PATH
    pub async fn has_command(&self, name: &str) -> bool {
        let locator = if cfg!(windows) { "where" } else { "which" };
        self.succeeds(locator, &[name]).await
    }

    pub async fn read_file(&self, path: &str) -> Option<String> {
        self.runner.read_file(path).await
    }
}

fn check(cmd: String, output: CommandOutput) -> FantasmaResult<CommandOutput> {
    if output.success() {
        return Ok(output);
    }
    if is_permission_failure(&output.stderr) {
        return Err(FantasmaError::PermissionDenied(format!("{}: {}", cmd, output.stderr.trim())));
    }
    Err(FantasmaError::ToolInvocation {
        cmd,
        code: output.code,
        stderr: output.stderr,
    })
}

fn is_permission_failure(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("operation not permitted")
        || lower.contains("permission denied")
        || lower.contains("must be root")
        || lower.contains("a password is required")
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for adapter tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeRunner {
        responses: Mutex<Vec<(String, CommandOutput)>>,
        unlaunchable: Mutex<Vec<String>>,
        files: Mutex<HashMap<String, String>>,
        calls: Mutex<Vec<String>>,
        spawned: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Commands whose line starts with `prefix` return `output`;
        /// unmatched commands succeed with empty output
        pub fn respond(&self, prefix: &str, output: CommandOutput) -> &Self {
            self.responses.lock().unwrap().push((prefix.to_string(), output));
            self
        }

        pub fn fail(&self, prefix: &str) -> &Self {
            self.respond(prefix, CommandOutput::failed(1, format!("{}: failed", prefix)))
        }

        /// Launching a program with this prefix errors like a missing binary
        pub fn unlaunchable(&self, prefix: &str) -> &Self {
            self.unlaunchable.lock().unwrap().push(prefix.to_string());
            self
        }

        pub fn file(&self, path: &str, content: &str) -> &Self {
            self.files.lock().unwrap().insert(path.to_string(), content.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn spawned(&self) -> Vec<String> {
            self.spawned.lock().unwrap().clone()
        }

        pub fn called(&self, prefix: &str) -> bool {
            self.calls().iter().any(|c| c.starts_with(prefix))
        }

        pub fn position(&self, prefix: &str) -> Option<usize> {
            self.calls().iter().position(|c| c.starts_with(prefix))
        }

        fn launch_error(&self, line: &str) -> Option<FantasmaError> {
            let unlaunchable = self.unlaunchable.lock().unwrap();
            unlaunchable.iter().find(|p| line.starts_with(p.as_str())).map(|_| {
                FantasmaError::ToolInvocation {
                    cmd: line.to_string(),
                    code: None,
                    stderr: "No such file or directory (os error 2)".to_string(),
                }
            })
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, program: &str, args: &[&str]) -> FantasmaResult<CommandOutput> {
            let line = command_line(program, args);
            self.calls.lock().unwrap().push(line.clone());
            if let Some(err) = self.launch_error(&line) {
                return Err(err);
            }
            let responses = self.responses.lock().unwrap();
            Ok(responses
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(|| CommandOutput::ok("")))
        }

        async fn spawn_detached(&self, program: &str, args: &[&str]) -> FantasmaResult<()> {
            let line = command_line(program, args);
            self.spawned.lock().unwrap().push(line.clone());
            match self.launch_error(&line) {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn read_file(&self, path: &str) -> Option<String> {
            self.files.lock().unwrap().get(path).cloned()
        }
    }
}
