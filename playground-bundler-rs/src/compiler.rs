//! Component compilation.
//!
//! The component compiler is an external collaborator. [`CommandCompiler`]
//! runs it as a child process speaking JSON over stdin and stdout:
//!
//! ```text
//! stdin:  {"source": "<component source>", "options": {"css": "injected"}}
//! stdout: {"js": {"code": "<javascript module>"}}
//! ```

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Where compiled component styles end up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CssHandling {
    /// Styles are injected at runtime by the compiled module.
    #[default]
    Injected,
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileOptions {
    pub css: CssHandling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledComponent {
    pub js: String,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to run component compiler `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("component compiler exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("invalid component compiler output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Synchronous component compiler. Shared with the bundler thread, hence
/// `Send + Sync`.
pub trait ComponentCompiler: Send + Sync {
    fn compile(
        &self,
        source: &str,
        options: &CompileOptions,
    ) -> Result<CompiledComponent, CompileError>;
}

#[derive(Serialize)]
struct CompileRequest<'a> {
    source: &'a str,
    options: &'a CompileOptions,
}

#[derive(Deserialize)]
struct CompileResponse {
    js: CompiledCode,
}

#[derive(Deserialize)]
struct CompiledCode {
    code: String,
}

/// Runs an external program once per compilation.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn spawn_error(&self, source: io::Error) -> CompileError {
        CompileError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl ComponentCompiler for CommandCompiler {
    fn compile(
        &self,
        source: &str,
        options: &CompileOptions,
    ) -> Result<CompiledComponent, CompileError> {
        let request = serde_json::to_vec(&CompileRequest { source, options })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A compiler that exits early reports through its status instead.
            if let Err(err) = stdin.write_all(&request) {
                if err.kind() != io::ErrorKind::BrokenPipe {
                    return Err(self.spawn_error(err));
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            return Err(CompileError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let response: CompileResponse = serde_json::from_slice(&output.stdout)?;
        Ok(CompiledComponent {
            js: response.js.code,
        })
    }
}
