//! Scripted [`ScriptBridge`] for tests.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `testing` feature.

use crate::bridge::ScriptBridge;
use crate::error::{Result, VmError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One script sent through the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub application: String,
    pub script: Vec<String>,
}

impl Call {
    /// The script as a single newline-joined string.
    pub fn text(&self) -> String {
        self.script.join("\n")
    }
}

struct Rule {
    pattern: String,
    replies: VecDeque<std::result::Result<String, String>>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    calls: Vec<Call>,
}

/// Bridge that answers scripts from substring rules and records every call.
///
/// The first rule whose pattern occurs in the script wins. Scripts matching
/// no rule succeed with an empty string. `Err` replies surface as
/// [`VmError::Script`].
#[derive(Default)]
pub struct FakeBridge {
    state: Mutex<State>,
}

impl FakeBridge {
    /// Bridge with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer scripts containing `pattern` with `reply`.
    pub fn on(&self, pattern: &str, reply: std::result::Result<&str, &str>) -> &Self {
        self.on_sequence(pattern, [reply])
    }

    /// Answer scripts containing `pattern` with `replies` in order; the last
    /// reply repeats once the others are used up.
    pub fn on_sequence<'a>(
        &self,
        pattern: &str,
        replies: impl IntoIterator<Item = std::result::Result<&'a str, &'a str>>,
    ) -> &Self {
        let replies = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        self.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            replies,
        });
        self
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls whose script contains `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.text().contains(pattern))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ScriptBridge for FakeBridge {
    async fn tell(&self, application: &str, script: &[String]) -> Result<String> {
        let call = Call {
            application: application.to_string(),
            script: script.to_vec(),
        };
        let text = call.text();

        let mut state = self.lock();
        state.calls.push(call);

        let reply = state
            .rules
            .iter_mut()
            .find(|rule| text.contains(&rule.pattern))
            .and_then(|rule| {
                if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                }
            });

        match reply {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(VmError::Script {
                application: application.to_string(),
                message,
            }),
            None => Ok(String::new()),
        }
    }
}
