// File: testing-framework/src/orchestrator/supervisor.rs
//
// Process supervision for external node binaries
//
// Starting a node writes its seed files, resolves the binary and spawns it
// with output either discarded or forwarded to the log. Stopping escalates
// from a caller-supplied graceful step (usually the `Stop` RPC) to a
// terminate signal and finally to a kill, each step bounded by its own
// timeout.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::{HarnessError, Result};

/// Everything needed to launch one node process
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Display name used in logs (`lit0`, `bcnode0`, ...)
    pub name: String,
    /// Binary name (searched in PATH) or path
    pub binary: PathBuf,
    /// Command-line arguments
    pub args: Vec<OsString>,
    /// Working directory, also the node's data directory
    pub working_dir: PathBuf,
    /// Files written into `working_dir` before spawning
    pub seed_files: Vec<(String, String)>,
}

impl ProcessSpec {
    /// New spec with no arguments or seed files
    pub fn new(name: impl Into<String>, binary: impl Into<PathBuf>, working_dir: &Path) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            args: Vec::new(),
            working_dir: working_dir.to_path_buf(),
            seed_files: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Write `contents` to `working_dir/file_name` before start
    pub fn seed_file(mut self, file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.seed_files.push((file_name.into(), contents.into()));
        self
    }
}

/// Starts node processes with a shared output policy
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    show_output: bool,
    step_timeout: Duration,
}

impl ProcessSupervisor {
    /// `step_timeout` bounds each stage of the stop escalation
    pub fn new(show_output: bool, step_timeout: Duration) -> Self {
        Self {
            show_output,
            step_timeout,
        }
    }

    /// Timeout of each stop stage
    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Write seed files and spawn the process
    ///
    /// Readiness is not implied: callers poll the node's RPC port afterwards.
    pub fn start(&self, spec: &ProcessSpec) -> Result<NodeProcess> {
        let binary = resolve_binary(&spec.binary)?;

        std::fs::create_dir_all(&spec.working_dir)?;
        for (file_name, contents) in &spec.seed_files {
            let path = spec.working_dir.join(file_name);
            std::fs::write(&path, contents)?;
            debug!("[{}] wrote seed file {}", spec.name, path.display());
        }

        let mut cmd = Command::new(&binary);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.show_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        debug!("[{}] spawning {} {:?}", spec.name, binary.display(), spec.args);
        let mut child = cmd.spawn()?;

        if self.show_output {
            if let Some(stdout) = child.stdout.take() {
                forward_output(spec.name.clone(), stdout);
            }
            if let Some(stderr) = child.stderr.take() {
                forward_output(spec.name.clone(), stderr);
            }
        }

        info!(
            "[{}] started pid {}",
            spec.name,
            child.id().map(|id| id.to_string()).unwrap_or_default()
        );

        Ok(NodeProcess {
            name: spec.name.clone(),
            data_dir: spec.working_dir.clone(),
            args: spec.args.clone(),
            child,
            exit_status: None,
        })
    }
}

fn forward_output<R>(name: String, stream: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let target = format!("node::{}", name);
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: &target, "{}", line);
        }
    });
}

/// Resolve `binary` to an executable file
///
/// Paths containing a separator are checked as given, bare names are looked
/// up in `PATH`.
pub fn resolve_binary(binary: &Path) -> Result<PathBuf> {
    if binary.components().count() > 1 || binary.is_absolute() {
        if binary.is_file() {
            return Ok(binary.to_path_buf());
        }
        return Err(HarnessError::BinaryNotFound {
            binary: binary.display().to_string(),
            searched: vec![binary.to_path_buf()],
        });
    }

    let searched: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default();
    searched
        .iter()
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| HarnessError::BinaryNotFound {
            binary: binary.display().to_string(),
            searched,
        })
}

/// One running external process
#[derive(Debug)]
pub struct NodeProcess {
    name: String,
    data_dir: PathBuf,
    args: Vec<OsString>,
    child: Child,
    exit_status: Option<ExitStatus>,
}

impl NodeProcess {
    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data directory the process was started in
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Arguments the process was started with
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// OS process id while alive
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Poll the process without blocking
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Error with `ProcessExited` if the process is gone
    pub fn ensure_alive(&mut self) -> Result<()> {
        if self.is_alive() {
            return Ok(());
        }
        Err(HarnessError::ProcessExited {
            name: self.name.clone(),
            status: self
                .exit_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Stop the process
    ///
    /// Runs `graceful` first and waits for the exit, then sends a terminate
    /// signal and waits again, and finally kills. Each stage is bounded by
    /// `step`. Returns the exit status when one could be collected.
    pub async fn stop<F>(&mut self, graceful: F, step: Duration) -> Result<Option<ExitStatus>>
    where
        F: Future<Output = Result<()>>,
    {
        if !self.is_alive() {
            debug!("[{}] already exited", self.name);
            return Ok(self.exit_status);
        }

        match timeout(step, graceful).await {
            Ok(Ok(())) => {
                if let Some(status) = self.wait_for_exit(step).await? {
                    info!("[{}] stopped ({})", self.name, status);
                    return Ok(Some(status));
                }
                warn!("[{}] still running after graceful stop", self.name);
            }
            Ok(Err(e)) => warn!("[{}] graceful stop failed: {}", self.name, e),
            Err(_) => warn!("[{}] graceful stop timed out", self.name),
        }

        self.terminate(step).await
    }

    /// Stop without a graceful stage: terminate signal, then kill
    pub async fn terminate(&mut self, step: Duration) -> Result<Option<ExitStatus>> {
        if !self.is_alive() {
            return Ok(self.exit_status);
        }

        if let Err(e) = self.send_terminate() {
            warn!("[{}] terminate failed: {}", self.name, e);
        }
        if let Some(status) = self.wait_for_exit(step).await? {
            info!("[{}] terminated ({})", self.name, status);
            return Ok(Some(status));
        }

        warn!("[{}] did not exit after terminate, killing", self.name);
        self.child.start_kill()?;
        let status = self.wait_for_exit(step).await?;
        if status.is_none() {
            warn!("[{}] did not exit after kill", self.name);
        }
        Ok(status)
    }

    async fn wait_for_exit(&mut self, limit: Duration) -> Result<Option<ExitStatus>> {
        match timeout(limit, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                self.exit_status = Some(status);
                Ok(Some(status))
            }
            Err(_) => Ok(None),
        }
    }

    #[cfg(unix)]
    fn send_terminate(&mut self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};

        if let Some(pid) = self.child.id() {
            kill(signal_target(pid)?, Signal::SIGTERM)
                .map_err(|e| HarnessError::Io(std::io::Error::from(e)))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn send_terminate(&mut self) -> Result<()> {
        self.child.start_kill()?;
        Ok(())
    }
}

/// Signal target for a child pid as reported by tokio
#[cfg(unix)]
fn signal_target(pid: u32) -> Result<nix::unistd::Pid> {
    let raw = i32::try_from(pid).map_err(|_| {
        HarnessError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("pid {} does not fit a signal target", pid),
        ))
    })?;
    Ok(nix::unistd::Pid::from_raw(raw))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(false, Duration::from_secs(2))
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let err = resolve_binary(Path::new("definitely-not-a-real-binary-4711")).unwrap_err();
        assert!(matches!(err, HarnessError::BinaryNotFound { .. }));

        let err = resolve_binary(Path::new("/nonexistent/dir/lit")).unwrap_err();
        match err {
            HarnessError::BinaryNotFound { searched, .. } => {
                assert_eq!(searched, vec![PathBuf::from("/nonexistent/dir/lit")]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_seed_files_written_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new("seeded", "true", dir.path())
            .seed_file("privkey.hex", "11ff\n");

        let mut process = supervisor().start(&spec).unwrap();
        let contents = std::fs::read_to_string(dir.path().join("privkey.hex")).unwrap();
        assert_eq!(contents, "11ff\n");

        let status = process
            .stop(async { Ok(()) }, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(status.is_some());
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_stop_escalates_to_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new("sleeper", "sleep", dir.path()).arg("30");
        let mut process = supervisor().start(&spec).unwrap();
        assert!(process.is_alive());

        // graceful step fails, terminate must take over
        let status = process
            .stop(
                async { Err(HarnessError::transport("sleeper", "no rpc")) },
                Duration::from_millis(500),
            )
            .await
            .unwrap();
        assert!(status.is_some());
        assert!(process.ensure_alive().is_err());
    }

    #[test]
    fn test_signal_target_rejects_out_of_range_pid() {
        assert_eq!(signal_target(4242).unwrap().as_raw(), 4242);
        assert!(matches!(signal_target(u32::MAX), Err(HarnessError::Io(_))));
    }

    #[tokio::test]
    async fn test_ensure_alive_reports_exit() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new("quitter", "false", dir.path());
        let mut process = supervisor().start(&spec).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        match process.ensure_alive() {
            Err(HarnessError::ProcessExited { name, .. }) => assert_eq!(name, "quitter"),
            other => panic!("expected ProcessExited, got {:?}", other),
        }
    }
}
