//! Code execution for fenced blocks found in agent responses.
//!
//! An [`InterpreterRegistry`] maps a language to an [`Interpreter`]. Blocks in
//! unregistered languages go to an inert default that only records them.
//! [`SandboxInterpreter`] runs an optional build step and a run step through
//! [`CommandRunner`]s, publishing `build_started`/`build_finished` around each.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use parley_core::events::{BuildNotice, BuildPhase, BuildReport, StreamEvent};
use parley_core::ids::BuildId;

use crate::code::CodeBlock;
use crate::error::SandboxError;
use crate::sink::EventSink;

const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of one command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub return_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.return_code == 0
    }

    /// Plain-text report shown to the model.
    pub fn format(&self) -> String {
        format!(
            "Return code: {}\nStandard Output Stream:\n{}\nStandard Error Stream:\n{}\n",
            self.return_code, self.stdout, self.stderr
        )
    }
}

/// Runs source code in some environment and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, code: &str, language: &str) -> Result<CommandOutput, SandboxError>;
}

/// Local subprocess with the code fed on stdin.
pub struct LocalProcessRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl LocalProcessRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn python() -> Self {
        Self::new("python3", vec!["-".into()])
    }

    pub fn node() -> Self {
        Self::new("node", Vec::new())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for LocalProcessRunner {
    async fn run(&self, code: &str, _language: &str) -> Result<CommandOutput, SandboxError> {
        let start = Instant::now();
        let spawn_err = |e: std::io::Error| SandboxError::Spawn {
            command: self.program.clone(),
            reason: e.to_string(),
        };

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await.map_err(spawn_err)?;
            // Dropping stdin closes the pipe so the interpreter sees EOF.
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(spawn_err)?,
            Err(_) => {
                warn!(program = %self.program, timeout = ?self.timeout, "sandboxed process timed out");
                return Err(SandboxError::Timeout(self.timeout));
            }
        };

        let return_code = output.status.code().unwrap_or(-1);
        debug!(program = %self.program, return_code, elapsed_ms = start.elapsed().as_millis() as u64, "sandboxed process finished");
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            return_code,
        })
    }
}

#[derive(Serialize)]
struct RemoteRunRequest<'a> {
    code: &'a str,
    language: &'a str,
}

/// Sandbox service reached over HTTP: POST `{code, language}`, answer
/// `{stdout, stderr, return_code}`.
pub struct RemoteRunner {
    client: reqwest::Client,
    url: String,
}

impl RemoteRunner {
    pub fn new(url: impl Into<String>) -> Result<Self, SandboxError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_RUN_TIMEOUT)
            .build()
            .map_err(|e| SandboxError::Remote(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CommandRunner for RemoteRunner {
    async fn run(&self, code: &str, language: &str) -> Result<CommandOutput, SandboxError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&RemoteRunRequest { code, language })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SandboxError::Timeout(DEFAULT_RUN_TIMEOUT)
                } else {
                    SandboxError::Remote(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SandboxError::Remote(format!("status {}", status.as_u16())));
        }
        resp.json::<CommandOutput>()
            .await
            .map_err(|e| SandboxError::Remote(format!("bad response body: {e}")))
    }
}

/// Handles one fenced code block.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Text to hand back to the model, or `None` when there is nothing to report.
    async fn execute(&self, block: &CodeBlock, sink: &dyn EventSink) -> Result<Option<String>, SandboxError>;
}

/// Inert interpreter: keeps the blocks it sees and runs nothing.
#[derive(Default)]
pub struct RecordingInterpreter {
    blocks: Mutex<Vec<CodeBlock>>,
}

impl RecordingInterpreter {
    pub fn blocks(&self) -> Vec<CodeBlock> {
        self.blocks.lock().clone()
    }
}

#[async_trait]
impl Interpreter for RecordingInterpreter {
    async fn execute(&self, block: &CodeBlock, _sink: &dyn EventSink) -> Result<Option<String>, SandboxError> {
        self.blocks.lock().push(block.clone());
        Ok(None)
    }
}

/// Optional build step followed by a run step.
pub struct SandboxInterpreter {
    language: String,
    build: Option<Arc<dyn CommandRunner>>,
    run: Arc<dyn CommandRunner>,
}

impl SandboxInterpreter {
    pub fn new(language: impl Into<String>, run: Arc<dyn CommandRunner>) -> Self {
        Self {
            language: language.into(),
            build: None,
            run,
        }
    }

    pub fn with_build(mut self, build: Arc<dyn CommandRunner>) -> Self {
        self.build = Some(build);
        self
    }

    async fn phase(
        &self,
        runner: &dyn CommandRunner,
        phase: BuildPhase,
        source: &str,
        sink: &dyn EventSink,
    ) -> Result<CommandOutput, SandboxError> {
        let id = BuildId::new();
        sink.emit(StreamEvent::BuildStarted(BuildNotice {
            id: id.clone(),
            phase,
            language: Some(self.language.clone()),
        }))
        .await;

        let result = runner.run(source, &self.language).await;
        let (success, output) = match &result {
            Ok(out) => (out.success(), out.format()),
            Err(e) => (false, e.to_string()),
        };
        sink.emit(StreamEvent::BuildFinished(BuildReport {
            id,
            phase,
            success,
            output,
        }))
        .await;
        result
    }
}

fn wrap(phase: BuildPhase, output: &CommandOutput) -> String {
    match phase {
        BuildPhase::Build => format!("BUILD START\n{}\nBUILD END", output.format()),
        BuildPhase::Run => format!("CODE EXECUTION START\n{}\nCODE EXECUTION END", output.format()),
    }
}

#[async_trait]
impl Interpreter for SandboxInterpreter {
    async fn execute(&self, block: &CodeBlock, sink: &dyn EventSink) -> Result<Option<String>, SandboxError> {
        let source = block.source();
        let mut report = String::new();

        if let Some(build) = &self.build {
            let out = self.phase(build.as_ref(), BuildPhase::Build, source, sink).await?;
            report.push_str(&wrap(BuildPhase::Build, &out));
            if !out.success() {
                return Ok(Some(report));
            }
            report.push('\n');
        }

        let out = self.phase(self.run.as_ref(), BuildPhase::Run, source, sink).await?;
        report.push_str(&wrap(BuildPhase::Run, &out));
        Ok(Some(report))
    }
}

/// Language-to-interpreter table with an inert fallback.
pub struct InterpreterRegistry {
    interpreters: HashMap<String, Arc<dyn Interpreter>>,
    fallback: Arc<dyn Interpreter>,
}

impl InterpreterRegistry {
    pub fn new() -> Self {
        Self {
            interpreters: HashMap::new(),
            fallback: Arc::new(RecordingInterpreter::default()),
        }
    }

    /// Local python3 and node interpreters.
    pub fn local() -> Self {
        let mut registry = Self::new();
        registry.register("python", Arc::new(SandboxInterpreter::new("python", Arc::new(LocalProcessRunner::python()))));
        registry.register(
            "javascript",
            Arc::new(SandboxInterpreter::new("javascript", Arc::new(LocalProcessRunner::node()))),
        );
        registry
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Interpreter>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn register(&mut self, language: &str, interpreter: Arc<dyn Interpreter>) {
        debug!(language, "interpreter registered");
        let _ = self.interpreters.insert(language.to_ascii_lowercase(), interpreter);
    }

    pub fn languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.interpreters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn resolve(&self, language: Option<&str>) -> Arc<dyn Interpreter> {
        language
            .and_then(|lang| self.interpreters.get(&lang.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for InterpreterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
