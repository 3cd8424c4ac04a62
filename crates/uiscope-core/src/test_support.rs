//! In-memory [`CommandRunner`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::{BridgeError, CommandOutput, CommandRunner};

/// A canned reply for one bridge invocation.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Stdout(Vec<u8>),
    Exit(i32),
    Killed,
    Timeout,
}

impl Reply {
    pub(crate) fn text(text: &str) -> Self {
        Reply::Stdout(text.as_bytes().to_vec())
    }
}

/// Replays scripted replies keyed by the space-joined argument list.
///
/// Unscripted commands fail with exit code 1. Replies for the same command
/// are consumed in order; the last one repeats.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, command: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub(crate) fn timeouts(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run_raw(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, BridgeError> {
        let command = args.join(" ");
        self.calls.lock().unwrap().push((command.clone(), timeout));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&command) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Stdout(stdout)) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Some(Reply::Exit(exit_code)) => Err(BridgeError::Failed {
                command,
                exit_code,
                stderr: "scripted failure".to_string(),
            }),
            Some(Reply::Killed) => Err(BridgeError::Killed {
                command,
                exit_code: Some(137),
                signal: None,
                stderr: String::new(),
            }),
            Some(Reply::Timeout) => Err(BridgeError::Timeout { command, timeout }),
            None => Err(BridgeError::Failed {
                command,
                exit_code: 1,
                stderr: "no scripted reply".to_string(),
            }),
        }
    }
}
