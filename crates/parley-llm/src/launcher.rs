use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parley_core::errors::BackendError;
use parley_core::generation::LaunchParams;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Spawns and supervises a local `llama-server` process.
pub struct ModelLauncher {
    executable: PathBuf,
    host: String,
    port: u16,
    process: Mutex<Option<Child>>,
}

impl ModelLauncher {
    pub fn new(executable: impl Into<PathBuf>, host: impl Into<String>, port: u16) -> Self {
        Self {
            executable: executable.into(),
            host: host.into(),
            port,
            process: Mutex::new(None),
        }
    }

    /// Command-line arguments for serving `model` with `params`.
    pub fn build_args(&self, model: &str, params: &LaunchParams) -> Vec<String> {
        vec![
            "--model".into(),
            model.into(),
            "--threads".into(),
            params.num_threads.to_string(),
            "--ctx-size".into(),
            params.context_size.to_string(),
            "--n-gpu-layers".into(),
            params.ngl.to_string(),
            "--batch-size".into(),
            params.batch_size.to_string(),
            "--host".into(),
            self.host.clone(),
            "--port".into(),
            self.port.to_string(),
        ]
    }

    /// Start (or restart) the server. Any previous process is killed first.
    pub async fn launch(&self, model: &str, params: &LaunchParams) -> Result<(), BackendError> {
        if model.is_empty() {
            return Err(BackendError::LaunchFailed("no model path set".into()));
        }

        let mut guard = self.process.lock().await;
        if let Some(mut old) = guard.take() {
            if let Err(e) = old.kill().await {
                warn!(error = %e, "failed to stop previous model server");
            }
        }

        let args = self.build_args(model, params);
        info!(executable = %self.executable.display(), ?args, "launching model server");
        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BackendError::LaunchFailed(format!("{}: {e}", self.executable.display()))
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "parley_llm::server_output", "{line}");
                }
            });
        }

        *guard = Some(child);
        Ok(())
    }

    /// Poll `/health` until the server answers or `deadline` passes.
    pub async fn wait_ready(&self, deadline: Duration) -> Result<(), BackendError> {
        let client = reqwest::Client::new();
        let url = format!("http://{}:{}/health", self.host, self.port);
        let poll = async {
            loop {
                if let Ok(resp) = client.get(&url).send().await {
                    if resp.status().is_success() {
                        return;
                    }
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(deadline, poll).await.map_err(|_| {
            BackendError::LaunchFailed(format!("server not ready after {deadline:?}"))
        })
    }

    pub async fn is_running(&self) -> bool {
        let mut guard = self.process.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub async fn shutdown(&self) {
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
        }
    }
}
