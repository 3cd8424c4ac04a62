//! Input event injection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bridge::{CommandRunner, DEFAULT_COMMAND_TIMEOUT};

/// Sends tap events through a [`CommandRunner`].
pub struct TapDispatcher {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl TapDispatcher {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Taps at `(x, y)` in device pixels.
    ///
    /// Returns `false` if the input command fails; the failure is logged,
    /// not propagated.
    pub async fn tap(&self, x: i32, y: i32) -> bool {
        let (x_arg, y_arg) = (x.to_string(), y.to_string());
        match self
            .runner
            .run(&["shell", "input", "tap", &x_arg, &y_arg], self.timeout)
            .await
        {
            Ok(_) => {
                debug!(x, y, "Tap dispatched");
                true
            }
            Err(e) => {
                warn!(x, y, error = %e, "Tap failed");
                false
            }
        }
    }
}
