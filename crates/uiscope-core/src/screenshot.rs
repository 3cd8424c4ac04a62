//! Screen capture to web-servable PNG files.
//!
//! Captures are written as `screenshot_<unixMillis>.png` into a local
//! directory and referenced by a relative URL under a configurable prefix
//! (by default `/screenshots/`), so an inspector front-end can load them
//! directly.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::bridge::{BridgeError, CommandRunner, DEFAULT_COMMAND_TIMEOUT};

/// Errors that can occur while capturing a screenshot.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture command failed.
    #[error("Screenshot failed: {0}")]
    Bridge(#[from] BridgeError),

    /// The destination directory or file could not be written.
    #[error("Screenshot failed: IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The capture command succeeded but produced no image data.
    #[error("Screenshot failed: device returned an empty image")]
    EmptyImage,
}

/// A screenshot written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    /// Local filesystem path of the PNG.
    pub path: PathBuf,
    /// Relative URL, e.g. `/screenshots/screenshot_1700000000000.png`.
    pub url: String,
    pub captured_at: DateTime<Utc>,
    pub size_bytes: usize,
}

/// Captures the device screen through a [`CommandRunner`].
pub struct ScreenCapturer {
    runner: Arc<dyn CommandRunner>,
    output_dir: PathBuf,
    url_prefix: String,
    timeout: Duration,
}

impl ScreenCapturer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        output_dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            output_dir: output_dir.into(),
            url_prefix: url_prefix.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Overrides the capture command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Captures the screen and writes it to a new timestamped file.
    ///
    /// The PNG is read from `exec-out screencap -p` as raw bytes, so no
    /// newline translation or trimming touches it.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::Io`] if the directory or file cannot be written
    /// - [`CaptureError::Bridge`] if the capture command fails
    /// - [`CaptureError::EmptyImage`] if the device returned nothing
    pub async fn capture(&self) -> Result<Screenshot, CaptureError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let output = self
            .runner
            .run_raw(&["exec-out", "screencap", "-p"], self.timeout)
            .await?;
        if output.stdout.is_empty() {
            return Err(CaptureError::EmptyImage);
        }

        let (millis, filename, path) = self.write_new_file(&output.stdout).await?;
        let captured_at = DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now);

        let screenshot = Screenshot {
            url: format!("{}/{}", self.url_prefix.trim_end_matches('/'), filename),
            path,
            captured_at,
            size_bytes: output.stdout.len(),
        };
        info!(path = %screenshot.path.display(), bytes = screenshot.size_bytes, "Screenshot captured");
        Ok(screenshot)
    }

    /// Writes `bytes` to a new `screenshot_<millis>.png`, claiming the name
    /// with `create_new` and bumping the timestamp while the name is taken.
    async fn write_new_file(&self, bytes: &[u8]) -> Result<(i64, String, PathBuf), CaptureError> {
        let mut millis = Utc::now().timestamp_millis();
        loop {
            let filename = format!("screenshot_{}.png", millis);
            let path = self.output_dir.join(&filename);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    return Ok((millis, filename, path));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(%filename, "Screenshot name taken, bumping timestamp");
                    millis += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedRunner};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR  \n";
    const SCREENCAP: &str = "exec-out screencap -p";

    fn capturer(runner: ScriptedRunner, dir: &Path) -> ScreenCapturer {
        ScreenCapturer::new(Arc::new(runner), dir.join("public/screenshots"), "/screenshots")
    }

    #[tokio::test]
    async fn capture_writes_exact_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let capturer = capturer(
            ScriptedRunner::new().on(SCREENCAP, Reply::Stdout(PNG.to_vec())),
            tmp.path(),
        );

        let shot = capturer.capture().await.unwrap();

        assert_eq!(std::fs::read(&shot.path).unwrap(), PNG);
        assert_eq!(shot.size_bytes, PNG.len());
        assert!(shot.path.starts_with(tmp.path().join("public/screenshots")));
    }

    #[tokio::test]
    async fn capture_returns_relative_url() {
        let tmp = tempfile::tempdir().unwrap();
        let capturer = capturer(
            ScriptedRunner::new().on(SCREENCAP, Reply::Stdout(PNG.to_vec())),
            tmp.path(),
        );

        let shot = capturer.capture().await.unwrap();
        let filename = shot.path.file_name().unwrap().to_str().unwrap().to_string();

        assert!(filename.starts_with("screenshot_"));
        assert!(filename.ends_with(".png"));
        assert_eq!(shot.url, format!("/screenshots/{}", filename));
        let millis: i64 = filename["screenshot_".len()..filename.len() - 4].parse().unwrap();
        assert_eq!(millis, shot.captured_at.timestamp_millis());
    }

    #[tokio::test]
    async fn consecutive_captures_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let capturer = capturer(
            ScriptedRunner::new().on(SCREENCAP, Reply::Stdout(PNG.to_vec())),
            tmp.path(),
        );

        let first = capturer.capture().await.unwrap();
        let second = capturer.capture().await.unwrap();
        let third = capturer.capture().await.unwrap();

        assert_ne!(first.path, second.path);
        assert_ne!(second.path, third.path);
        assert_ne!(first.path, third.path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_captures_into_one_directory_keep_every_image() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("shared");
        let capturers: Vec<Arc<ScreenCapturer>> = (0..8u8)
            .map(|i| {
                let mut image = PNG.to_vec();
                image.push(i);
                Arc::new(ScreenCapturer::new(
                    Arc::new(ScriptedRunner::new().on(SCREENCAP, Reply::Stdout(image))),
                    &dir,
                    "/screenshots",
                ))
            })
            .collect();

        let handles: Vec<_> = capturers
            .iter()
            .cloned()
            .map(|c| tokio::spawn(async move { c.capture().await.unwrap() }))
            .collect();
        let mut shots = Vec::new();
        for handle in handles {
            shots.push(handle.await.unwrap());
        }

        let mut contents: Vec<Vec<u8>> = shots
            .iter()
            .map(|shot| std::fs::read(&shot.path).unwrap())
            .collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), 8);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 8);
    }

    #[tokio::test]
    async fn bridge_failure_is_capture_error() {
        let tmp = tempfile::tempdir().unwrap();
        let capturer = capturer(ScriptedRunner::new().on(SCREENCAP, Reply::Exit(1)), tmp.path());

        let err = capturer.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::Bridge(BridgeError::Failed { .. })));
        assert!(err.to_string().starts_with("Screenshot failed"));
    }

    #[tokio::test]
    async fn empty_output_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let capturer = capturer(ScriptedRunner::new().on(SCREENCAP, Reply::text("")), tmp.path());

        let err = capturer.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::EmptyImage));
        assert_eq!(std::fs::read_dir(capturer.output_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unwritable_directory_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let capturer = ScreenCapturer::new(
            Arc::new(ScriptedRunner::new().on(SCREENCAP, Reply::Stdout(PNG.to_vec()))),
            blocker.join("screenshots"),
            "/screenshots/",
        );

        let err = capturer.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
