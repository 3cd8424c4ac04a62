//! End-to-end inspector flows against a fake bridge.
//!
//! These tests exercise the full path a front-end takes:
//!   capture screenshot -> fetch hierarchy -> locate element at a point -> tap

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{device, failed, fixture, FakeBridge};
use uiscope_core::hierarchy::{is_placeholder, DegradedReason, DumpStrategy, Hierarchy};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

fn settings_bridge() -> FakeBridge {
    let dump = fixture("settings_dump.xml");
    FakeBridge::new(move |command| match command {
        "exec-out screencap -p" => Ok(PNG.to_vec()),
        "shell uiautomator dump /sdcard/ui.xml" => {
            Ok(b"UI hierchary dumped to: /sdcard/ui.xml\n".to_vec())
        }
        "shell cat /sdcard/ui.xml" => Ok(dump.clone().into_bytes()),
        c if c.starts_with("shell input tap ") => Ok(Vec::new()),
        other => Err(failed(other)),
    })
}

// =============================================================================
// 1. Full inspection round trip
// =============================================================================

#[tokio::test]
async fn test_capture_fetch_locate_tap() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = Arc::new(settings_bridge());
    let device = device("pipeline-emulator", bridge.clone(), tmp.path().join("shots"));

    let shot = device.capture_screenshot().await.unwrap();
    assert_eq!(std::fs::read(&shot.path).unwrap(), PNG);
    assert!(shot.url.starts_with("/screenshots/screenshot_"));

    let hierarchy = device.fetch_hierarchy().await;
    assert_eq!(hierarchy.strategy(), Some(DumpStrategy::Standard));
    let tree = hierarchy.tree();
    assert_eq!(tree.node_count(), 12);
    let ids: Vec<u64> = tree.iter().map(|n| n.id).collect();
    assert_eq!(ids, (0..12).collect::<Vec<_>>());

    let title = device.find_element_at(tree, 300, 680).unwrap();
    assert_eq!(title.id, 7);
    assert_eq!(title.text, "Network & internet");
    assert_eq!(title.selector, r#"android.widget.TextView[@resource-id="android:id/title"]"#);

    let row = device.find_element_at(tree, 100, 700).unwrap();
    assert_eq!(row.id, 6);
    assert!(row.clickable);
    assert!(device.tap_node(row).await);
    assert_eq!(bridge.calls().last().unwrap(), "shell input tap 540 718");
}

#[tokio::test]
async fn test_shared_edge_picks_smaller_element() {
    let tmp = tempfile::tempdir().unwrap();
    let device = device("edge-emulator", Arc::new(settings_bridge()), tmp.path().to_path_buf());

    let hierarchy = device.fetch_hierarchy().await;
    // y = 712 is the bottom edge of the title and the top edge of the summary.
    let node = device.find_element_at(hierarchy.tree(), 300, 712).unwrap();
    assert_eq!(node.text, "Network & internet");
}

#[tokio::test]
async fn test_point_outside_screen_finds_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let device = device("outside-emulator", Arc::new(settings_bridge()), tmp.path().to_path_buf());

    let hierarchy = device.fetch_hierarchy().await;
    assert!(device.find_element_at(hierarchy.tree(), 2000, 100).is_none());
    assert!(device.find_element_at(hierarchy.tree(), -1, 100).is_none());
}

// =============================================================================
// 2. Fallback and degraded results
// =============================================================================

#[tokio::test]
async fn test_direct_stream_fallback_with_trailing_status() {
    let tmp = tempfile::tempdir().unwrap();
    let dump = fixture("settings_dump.xml");
    let bridge = Arc::new(FakeBridge::new(move |command| match command {
        "shell uiautomator dump /dev/tty" => {
            Ok(format!("{}UI hierchary dumped to: /dev/tty\n", dump).into_bytes())
        }
        other => Err(failed(other)),
    }));
    let device = device("stream-emulator", bridge.clone(), tmp.path().to_path_buf());

    let hierarchy = device.fetch_hierarchy().await;
    assert_eq!(hierarchy.strategy(), Some(DumpStrategy::DirectStream));
    assert_eq!(hierarchy.tree().node_count(), 12);

    // The two file strategies stop at their failing dump command.
    assert_eq!(
        bridge.calls(),
        vec![
            "shell uiautomator dump /sdcard/ui.xml",
            "shell uiautomator dump --compressed /sdcard/ui.xml",
            "shell uiautomator dump /dev/tty",
        ]
    );
}

#[tokio::test]
async fn test_all_strategies_failing_yields_placeholder() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = Arc::new(FakeBridge::new(|command| Err(failed(command))));
    let device = device("dead-emulator", bridge, tmp.path().to_path_buf());

    let hierarchy = device.fetch_hierarchy().await;
    assert!(hierarchy.is_degraded());
    assert!(is_placeholder(hierarchy.tree()));
    match hierarchy.reason() {
        Some(DegradedReason::AllStrategiesFailed { attempts }) => assert_eq!(attempts.len(), 4),
        other => panic!("Expected AllStrategiesFailed, got {:?}", other),
    }
    assert!(hierarchy.warning().unwrap().contains("placeholder"));

    // The placeholder is still a usable tree for spatial queries; root and
    // leaf share bounds, so the first in pre-order wins.
    assert_eq!(device.find_element_at(hierarchy.tree(), 10, 10).unwrap().id, 0);
}

#[tokio::test]
async fn test_hierarchy_serializes_with_status_tag() {
    let tmp = tempfile::tempdir().unwrap();
    let device = device("json-emulator", Arc::new(settings_bridge()), tmp.path().to_path_buf());

    let hierarchy = device.fetch_hierarchy().await;
    let json = serde_json::to_value(&hierarchy).unwrap();
    assert_eq!(json["status"], "live");
    assert_eq!(json["strategy"], "standard");
    assert_eq!(json["tree"]["children"][0]["resourceId"], "com.android.settings:id/main_content");

    let degraded: Hierarchy = device_with_dead_bridge().fetch_hierarchy().await;
    let json = serde_json::to_value(&degraded).unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["reason"]["kind"], "all_strategies_failed");
}

fn device_with_dead_bridge() -> uiscope_core::device::Device {
    device(
        "dead-json-emulator",
        Arc::new(FakeBridge::new(|command| Err(failed(command)))),
        std::env::temp_dir(),
    )
}

// =============================================================================
// 3. Per-device serialization
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_device_operations_do_not_overlap() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = Arc::new(settings_bridge().with_delay(Duration::from_millis(20)));
    let a = device("serial-lock-emulator", bridge.clone(), tmp.path().to_path_buf());
    let b = device("serial-lock-emulator", bridge.clone(), tmp.path().to_path_buf());

    let (first, second, tapped) = tokio::join!(a.fetch_hierarchy(), b.fetch_hierarchy(), a.tap(1, 1));

    assert!(!first.is_degraded());
    assert!(!second.is_degraded());
    assert!(tapped);
    assert_eq!(bridge.max_in_flight(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_devices_run_in_parallel() {
    let tmp = tempfile::tempdir().unwrap();
    let bridge = Arc::new(settings_bridge().with_delay(Duration::from_millis(50)));
    let a = device("parallel-emulator-a", bridge.clone(), tmp.path().to_path_buf());
    let b = device("parallel-emulator-b", bridge.clone(), tmp.path().to_path_buf());

    let (ta, tb) = tokio::join!(a.tap(1, 1), b.tap(2, 2));

    assert!(ta && tb);
    assert_eq!(bridge.max_in_flight(), 2);
}
