//! UTM client - entry point for talking to the UTM application.

use crate::bridge::{OsascriptBridge, ScriptBridge};
use crate::error::Result;
use crate::machine::{VirtualMachine, Vm};
use std::fmt;
use std::sync::Arc;

/// Name UTM registers for AppleScript.
pub const DEFAULT_APPLICATION: &str = "UTM";

/// Client for one scriptable UTM application.
///
/// Cheap to clone; every clone shares the same bridge. Construct it once and
/// pass it to whatever needs to talk to UTM.
#[derive(Clone)]
pub struct UtmClient {
    bridge: Arc<dyn ScriptBridge>,
    application: String,
}

impl fmt::Debug for UtmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtmClient")
            .field("application", &self.application)
            .finish_non_exhaustive()
    }
}

impl UtmClient {
    /// Create a client that sends scripts through `bridge`.
    pub fn new(bridge: Arc<dyn ScriptBridge>) -> Self {
        Self {
            bridge,
            application: DEFAULT_APPLICATION.to_string(),
        }
    }

    /// Create a client backed by `osascript`.
    pub fn osascript() -> Self {
        Self::new(Arc::new(OsascriptBridge::new()))
    }

    /// Target a differently named application (e.g. a side-by-side UTM build).
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// Get the target application name.
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Wrap a listed VM in a command handle.
    pub fn machine(&self, vm: Vm) -> VirtualMachine {
        VirtualMachine::new(vm, self.clone())
    }

    /// Send one script to UTM.
    pub(crate) async fn tell(&self, script: Vec<String>) -> Result<String> {
        let start = std::time::Instant::now();
        tracing::debug!(application = %self.application, lines = script.len(), "Sending script");

        let result = self.bridge.tell(&self.application, &script).await;
        match &result {
            Ok(output) => tracing::debug!(
                application = %self.application,
                elapsed_ms = start.elapsed().as_millis() as u64,
                output_len = output.len(),
                "Script completed"
            ),
            Err(e) => tracing::debug!(
                application = %self.application,
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "Script failed"
            ),
        }
        result
    }
}
