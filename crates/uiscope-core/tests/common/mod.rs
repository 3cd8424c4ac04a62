//! Shared test helpers for uiscope-core integration tests.
//!
//! [`FakeBridge`] stands in for `adb`: each invocation is answered by a
//! closure, recorded, and optionally delayed so tests can observe overlap.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use uiscope_core::bridge::{BridgeError, CommandOutput, CommandRunner};
use uiscope_core::config::InspectorConfig;
use uiscope_core::device::Device;

pub type Handler = Box<dyn Fn(&str) -> Result<Vec<u8>, BridgeError> + Send + Sync>;

/// Closure-driven [`CommandRunner`].
pub struct FakeBridge {
    handler: Handler,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeBridge {
    pub fn new(handler: impl Fn(&str) -> Result<Vec<u8>, BridgeError> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Makes every invocation take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of invocations that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for FakeBridge {
    async fn run_raw(&self, args: &[&str], _timeout: Duration) -> Result<CommandOutput, BridgeError> {
        let command = args.join(" ");
        self.calls.lock().unwrap().push(command.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.handler)(&command).map(|stdout| CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// A non-zero exit for `command`.
pub fn failed(command: &str) -> BridgeError {
    BridgeError::Failed {
        command: command.to_string(),
        exit_code: 1,
        stderr: "ERROR: could not get idle state.".to_string(),
    }
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// A [`Device`] over `bridge` with screenshots written below `screenshot_dir`.
pub fn device(serial: &str, bridge: Arc<FakeBridge>, screenshot_dir: PathBuf) -> Device {
    let config = InspectorConfig {
        screenshot_dir,
        ..Default::default()
    };
    Device::with_runner(Some(serial.to_string()), bridge, &config)
}
