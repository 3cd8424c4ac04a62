//! # uiscope-core
//!
//! Core library for inspecting the UI of Android devices over `adb`.
//!
//! This crate captures screenshots, retrieves and normalizes the
//! `uiautomator` view hierarchy, answers "which element is at this point"
//! queries and injects taps. It is the engine behind an inspector front-end
//! that overlays the hierarchy on a screenshot.
//!
//! ## Modules
//!
//! - [`bridge`] - Async wrapper around the `adb` executable with timeouts and failure classification
//! - [`screenshot`] - Screen capture to timestamped PNG files with web-relative URLs
//! - [`hierarchy`] - Multi-strategy UI dump retrieval with a degraded fallback
//! - [`normalize`] - XML parsing and conversion into an id-numbered element tree
//! - [`element`] - The normalized [`UiNode`](element::UiNode) tree
//! - [`bounds`] - Parsing of `[x1,y1][x2,y2]` bounds strings
//! - [`locate`] - Smallest-element-at-point spatial queries
//! - [`input`] - Tap injection
//! - [`lock`] - Per-device mutual exclusion
//! - [`device`] - Device facade, enumeration and device info
//! - [`config`] - Persistent configuration in `~/.uiscope/config.json`
//!
//! ## External Dependencies
//!
//! This crate requires the Android platform tools (`adb`) to be installed
//! and a device or emulator reachable by them.
//!
//! ## Example
//!
//! ```no_run
//! use uiscope_core::config::InspectorConfig;
//! use uiscope_core::device::Device;
//!
//! # async fn example() {
//! let device = Device::from_config(&InspectorConfig::load());
//!
//! // Dump the UI hierarchy (never fails; may be a placeholder)
//! let hierarchy = device.fetch_hierarchy().await;
//! if let Some(warning) = hierarchy.warning() {
//!     eprintln!("{}", warning);
//! }
//!
//! // Find and tap whatever is at a point
//! if let Some(node) = device.find_element_at(hierarchy.tree(), 540, 1200) {
//!     println!("{} ({})", node.selector, node.bounds);
//!     device.tap_node(node).await;
//! }
//! # }
//! ```

pub mod bounds;
pub mod bridge;
pub mod config;
pub mod device;
pub mod element;
pub mod hierarchy;
pub mod input;
pub mod locate;
pub mod lock;
pub mod normalize;
pub mod screenshot;

#[cfg(test)]
mod test_support;
