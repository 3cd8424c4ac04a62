//! A single Android device and the operations an inspector runs against it.
//!
//! [`Device`] bundles a [`ScreenCapturer`], a [`HierarchyFetcher`] and a
//! [`TapDispatcher`] over one shared [`CommandRunner`], and serializes the
//! device-touching operations through [`DeviceLocks`].
//!
//! # Example
//!
//! ```no_run
//! use uiscope_core::config::InspectorConfig;
//! use uiscope_core::device::Device;
//!
//! # async fn example() {
//! let device = Device::from_config(&InspectorConfig::load());
//! let hierarchy = device.fetch_hierarchy().await;
//! if let Some(node) = device.find_element_at(hierarchy.tree(), 540, 1200) {
//!     device.tap_node(node).await;
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use crate::bridge::{AdbRunner, BridgeError, CommandRunner};
use crate::config::InspectorConfig;
use crate::element::UiNode;
use crate::hierarchy::{Hierarchy, HierarchyFetcher};
use crate::input::TapDispatcher;
use crate::locate;
use crate::lock::DeviceLocks;
use crate::screenshot::{CaptureError, ScreenCapturer, Screenshot};

/// Lock key used when no serial is configured.
pub const DEFAULT_DEVICE_KEY: &str = "default";

const DEVICE_LIST_HEADER: &str = "List of devices attached";
const PHYSICAL_SIZE_PREFIX: &str = "Physical size:";

/// Errors from device enumeration and device info queries.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device query failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Unexpected bridge output: {0}")]
    UnexpectedOutput(String),
}

/// A device reported by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub id: String,
    pub status: String,
}

/// Basic facts about a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub model: String,
    pub android_version: String,
    /// Raw `wm size` output.
    pub screen_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Lists devices in the `device` state.
///
/// `runner` should not be bound to a serial; `adb -s X devices` still lists
/// every device but fails when `X` is absent on some adb versions.
pub async fn list_devices(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> Result<Vec<DeviceEntry>, DeviceError> {
    let output = runner.run(&["devices"], timeout).await?;
    parse_device_list(&output)
}

/// Parses `adb devices` output.
///
/// Lines after the header whose state column is exactly `device` become
/// entries with status `connected`; `offline`, `unauthorized` and similar are
/// skipped. Daemon start-up chatter before the header is ignored.
pub fn parse_device_list(output: &str) -> Result<Vec<DeviceEntry>, DeviceError> {
    let mut lines = output.lines();
    if !lines.any(|line| line.trim() == DEVICE_LIST_HEADER) {
        return Err(DeviceError::UnexpectedOutput(format!(
            "missing `{}` header",
            DEVICE_LIST_HEADER
        )));
    }

    Ok(lines
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            match (columns.next(), columns.next()) {
                (Some(id), Some("device")) => Some(DeviceEntry {
                    id: id.to_string(),
                    status: "connected".to_string(),
                }),
                _ => None,
            }
        })
        .collect())
}

/// Parses `Physical size: 1080x2400` out of `wm size` output.
pub fn parse_screen_size(output: &str) -> Option<(u32, u32)> {
    output.lines().find_map(|line| {
        let size = line.trim().strip_prefix(PHYSICAL_SIZE_PREFIX)?.trim();
        let (width, height) = size.split_once('x')?;
        Some((width.parse().ok()?, height.parse().ok()?))
    })
}

/// One addressable device.
pub struct Device {
    key: String,
    runner: Arc<dyn CommandRunner>,
    locks: &'static DeviceLocks,
    command_timeout: Duration,
    capturer: ScreenCapturer,
    fetcher: HierarchyFetcher,
    tapper: TapDispatcher,
}

impl Device {
    /// Device reached through the configured `adb`.
    pub fn from_config(config: &InspectorConfig) -> Self {
        let runner = AdbRunner::with_program(&config.adb_path, config.device_serial.clone());
        Self::with_runner(config.device_serial.clone(), Arc::new(runner), config)
    }

    /// Device reached through an arbitrary runner. `serial` is only used as
    /// the lock key and in log spans.
    pub fn with_runner(
        serial: Option<String>,
        runner: Arc<dyn CommandRunner>,
        config: &InspectorConfig,
    ) -> Self {
        let command_timeout = config.command_timeout();
        Self {
            key: serial.unwrap_or_else(|| DEFAULT_DEVICE_KEY.to_string()),
            capturer: ScreenCapturer::new(
                runner.clone(),
                &config.screenshot_dir,
                &config.screenshot_url_prefix,
            )
            .with_timeout(command_timeout),
            fetcher: HierarchyFetcher::new(runner.clone(), config.fetch_config()),
            tapper: TapDispatcher::new(runner.clone()).with_timeout(command_timeout),
            runner,
            locks: DeviceLocks::global(),
            command_timeout,
        }
    }

    /// The serial, or [`DEFAULT_DEVICE_KEY`].
    pub fn id(&self) -> &str {
        &self.key
    }

    pub async fn capture_screenshot(&self) -> Result<Screenshot, CaptureError> {
        let span = info_span!("capture_screenshot", device = %self.key);
        async {
            let _guard = self.locks.acquire(&self.key).await;
            self.capturer.capture().await
        }
        .instrument(span)
        .await
    }

    pub async fn fetch_hierarchy(&self) -> Hierarchy {
        let span = info_span!("fetch_hierarchy", device = %self.key);
        async {
            let _guard = self.locks.acquire(&self.key).await;
            self.fetcher.fetch().await
        }
        .instrument(span)
        .await
    }

    /// Smallest node of `tree` containing `(x, y)`.
    pub fn find_element_at<'a>(&self, tree: &'a UiNode, x: i32, y: i32) -> Option<&'a UiNode> {
        locate::find_element_at(tree, x, y)
    }

    pub async fn tap(&self, x: i32, y: i32) -> bool {
        let span = info_span!("tap", device = %self.key, x, y);
        async {
            let _guard = self.locks.acquire(&self.key).await;
            self.tapper.tap(x, y).await
        }
        .instrument(span)
        .await
    }

    /// Taps the center of `node`. Returns `false` without touching the device
    /// when the node's bounds do not parse.
    pub async fn tap_node(&self, node: &UiNode) -> bool {
        match node.bounds_rect() {
            Some(rect) => {
                let (x, y) = rect.center();
                debug!(id = node.id, selector = %node.selector, x, y, "Tapping node center");
                self.tap(x, y).await
            }
            None => {
                warn!(id = node.id, bounds = %node.bounds, "Node has no usable bounds, not tapping");
                false
            }
        }
    }

    /// Model, Android release and screen size.
    ///
    /// The three queries run one after another under the device lock.
    pub async fn info(&self) -> Result<DeviceInfo, DeviceError> {
        let span = info_span!("info", device = %self.key);
        async {
            let _guard = self.locks.acquire(&self.key).await;
            let timeout = self.command_timeout;
            let model = self
                .runner
                .run(&["shell", "getprop", "ro.product.model"], timeout)
                .await?;
            let android_version = self
                .runner
                .run(&["shell", "getprop", "ro.build.version.release"], timeout)
                .await?;
            let screen_size = self.runner.run(&["shell", "wm", "size"], timeout).await?;

            let size = parse_screen_size(&screen_size);
            Ok::<_, DeviceError>(DeviceInfo {
                model,
                android_version,
                width: size.map(|(w, _)| w),
                height: size.map(|(_, h)| h),
                screen_size,
            })
        }
        .instrument(span)
        .await
    }
}
