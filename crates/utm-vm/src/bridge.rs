//! Script execution against a scriptable macOS application.

use crate::error::{Result, VmError};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

/// Default location of the AppleScript interpreter.
const OSASCRIPT: &str = "/usr/bin/osascript";

/// Runs script statements against a named application.
///
/// Implementations execute all lines as one script and return its result as a
/// string. They do no locking of their own: callers must not overlap calls
/// that expect to observe consistent intermediate state.
#[async_trait]
pub trait ScriptBridge: Send + Sync {
    /// Execute `script` inside a `tell application` block for `application`.
    ///
    /// # Errors
    /// Returns [`VmError::Script`] when the application is not running, the
    /// script does not compile, or the application reports a runtime error.
    async fn tell(&self, application: &str, script: &[String]) -> Result<String>;
}

/// [`ScriptBridge`] backed by the `osascript` command.
#[derive(Debug, Clone)]
pub struct OsascriptBridge {
    program: PathBuf,
}

impl Default for OsascriptBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl OsascriptBridge {
    /// Bridge using `/usr/bin/osascript`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(OSASCRIPT),
        }
    }

    /// Bridge using a different interpreter binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Wrap statements in a `tell application` block.
pub fn tell_script(application: &str, script: &[String]) -> String {
    let mut out = format!("tell application {}\n", crate::record::quote(application));
    for line in script {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("end tell");
    out
}

#[async_trait]
impl ScriptBridge for OsascriptBridge {
    async fn tell(&self, application: &str, script: &[String]) -> Result<String> {
        let source = tell_script(application, script);
        tracing::trace!(%application, script = %source, "Running osascript");

        let output = Command::new(&self.program)
            .arg("-e")
            .arg(&source)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VmError::Script {
                application: application.to_string(),
                message: format!("{} ({})", stderr.trim(), output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.trim_end_matches(['\r', '\n']).to_string())
    }
}
