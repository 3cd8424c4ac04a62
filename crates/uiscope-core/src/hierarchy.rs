//! Resilient retrieval of the device's UI hierarchy.
//!
//! `uiautomator dump` is flaky: it can fail when the screen is animating,
//! when the default dump path is not writable, or when the accessibility
//! service is busy. [`HierarchyFetcher::fetch`] therefore tries a fixed
//! sequence of [`DumpStrategy`]s and accepts the first one that yields a
//! parseable document. It never fails: when every strategy fails the caller
//! gets a [`Hierarchy::Degraded`] placeholder tree it can still render.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use uiscope_core::bridge::AdbRunner;
//! use uiscope_core::hierarchy::{FetchConfig, HierarchyFetcher};
//!
//! # async fn example() {
//! let fetcher = HierarchyFetcher::new(Arc::new(AdbRunner::new(None)), FetchConfig::default());
//! let hierarchy = fetcher.fetch().await;
//! if let Some(warning) = hierarchy.warning() {
//!     eprintln!("{}", warning);
//! }
//! println!("{} nodes", hierarchy.tree().node_count());
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeError, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use crate::element::{UiNode, DEFAULT_BOUNDS};
use crate::normalize::{
    build_node, normalize, parse_document, with_defaults, ParseError, HIERARCHY_TAG,
};

/// Text every accepted dump must contain.
pub const HIERARCHY_MARKER: &str = "<hierarchy";

const HIERARCHY_END: &str = "</hierarchy>";

/// `text` of the synthetic leaf in the placeholder tree.
pub const PLACEHOLDER_TEXT: &str = "UI hierarchy could not be retrieved - please refresh";

/// Paths and timeouts used by the dump strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// On-device file used by the standard and compressed dumps.
    pub primary_dump_path: String,
    /// On-device file used when the primary path is not writable.
    pub alternate_dump_path: String,
    /// Timeout for `uiautomator dump` to a file.
    pub dump_timeout: Duration,
    /// Timeout for `uiautomator dump` streamed to stdout.
    pub stream_timeout: Duration,
    /// Timeout for reading the dump file back.
    pub read_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            primary_dump_path: "/sdcard/ui.xml".to_string(),
            alternate_dump_path: "/data/local/tmp/ui.xml".to_string(),
            dump_timeout: Duration::from_secs(15),
            stream_timeout: Duration::from_secs(20),
            read_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// One way of asking the device for a hierarchy dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpStrategy {
    /// Dump to the primary path, then read it back.
    Standard,
    /// Same as `Standard` with `--compressed`.
    Compressed,
    /// Dump straight to the command's stdout.
    DirectStream,
    /// Dump to the alternate path, then read it back.
    AlternateLocation,
}

impl DumpStrategy {
    /// Strategies in the order they are attempted.
    pub const ALL: [DumpStrategy; 4] = [
        DumpStrategy::Standard,
        DumpStrategy::Compressed,
        DumpStrategy::DirectStream,
        DumpStrategy::AlternateLocation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DumpStrategy::Standard => "standard",
            DumpStrategy::Compressed => "compressed",
            DumpStrategy::DirectStream => "direct-stream",
            DumpStrategy::AlternateLocation => "alternate-location",
        }
    }
}

impl fmt::Display for DumpStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a single strategy was rejected.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The command succeeded but its output is not a hierarchy dump.
    #[error("Dump output is empty or has no <hierarchy> element")]
    MissingMarker,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A rejected strategy and the reason, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: DumpStrategy,
    pub error: String,
}

/// Why a fetch produced a degraded tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedReason {
    /// Every strategy was rejected; the tree is the placeholder.
    AllStrategiesFailed { attempts: Vec<StrategyFailure> },
    /// A dump parsed but was not shaped like a hierarchy; the tree is a
    /// single node describing the problem.
    Malformed {
        strategy: DumpStrategy,
        message: String,
    },
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::AllStrategiesFailed { attempts } => {
                write!(f, "UI dump failed after {} attempts", attempts.len())?;
                if let Some(last) = attempts.last() {
                    write!(f, " (last: {}: {})", last.strategy, last.error)?;
                }
                Ok(())
            }
            DegradedReason::Malformed { strategy, message } => {
                write!(f, "UI dump via {} was malformed: {}", strategy, message)
            }
        }
    }
}

/// Result of a hierarchy fetch. Both variants carry a renderable tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Hierarchy {
    /// The tree was read from the device.
    Live { tree: UiNode, strategy: DumpStrategy },
    /// The device could not provide a usable dump.
    Degraded { tree: UiNode, reason: DegradedReason },
}

impl Hierarchy {
    pub fn tree(&self) -> &UiNode {
        match self {
            Hierarchy::Live { tree, .. } | Hierarchy::Degraded { tree, .. } => tree,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Hierarchy::Degraded { .. })
    }

    /// The strategy that produced a live tree.
    pub fn strategy(&self) -> Option<DumpStrategy> {
        match self {
            Hierarchy::Live { strategy, .. } => Some(*strategy),
            Hierarchy::Degraded { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&DegradedReason> {
        match self {
            Hierarchy::Degraded { reason, .. } => Some(reason),
            Hierarchy::Live { .. } => None,
        }
    }

    /// User-facing warning for degraded results.
    pub fn warning(&self) -> Option<String> {
        self.reason()
            .map(|reason| format!("UI dump failed, showing placeholder data: {}", reason))
    }
}

/// Fetches UI hierarchies through a [`CommandRunner`].
pub struct HierarchyFetcher {
    runner: Arc<dyn CommandRunner>,
    config: FetchConfig,
}

impl HierarchyFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>, config: FetchConfig) -> Self {
        Self { runner, config }
    }

    /// Retrieves and normalizes the current UI hierarchy.
    ///
    /// Strategies are tried in [`DumpStrategy::ALL`] order. A strategy is
    /// rejected if its command fails, its output lacks the `<hierarchy`
    /// marker, or the output is not well-formed XML; the next one is then
    /// tried. A well-formed document that is not shaped like a dump ends the
    /// fetch with a single-node [`DegradedReason::Malformed`] tree. If every
    /// strategy is rejected the result is the [`placeholder_tree`].
    pub async fn fetch(&self) -> Hierarchy {
        let mut attempts = Vec::new();

        for strategy in DumpStrategy::ALL {
            debug!(%strategy, "Attempting UI dump");

            let document = match self.dump(strategy).await {
                Ok(text) => parse_document(extract_document(&text)).map_err(DumpError::from),
                Err(e) => Err(e),
            };
            let document = match document {
                Ok(document) => document,
                Err(e) => {
                    warn!(%strategy, error = %e, "UI dump strategy failed, trying next");
                    attempts.push(StrategyFailure {
                        strategy,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            return match normalize(&document) {
                Ok(tree) => {
                    info!(%strategy, nodes = tree.node_count(), "UI hierarchy retrieved");
                    Hierarchy::Live { tree, strategy }
                }
                Err(e) => {
                    warn!(%strategy, error = %e, "UI dump has an invalid structure");
                    Hierarchy::Degraded {
                        tree: malformed_tree(&e.to_string()),
                        reason: DegradedReason::Malformed {
                            strategy,
                            message: e.to_string(),
                        },
                    }
                }
            };
        }

        error!(attempts = attempts.len(), "All UI dump methods failed, returning placeholder hierarchy");
        Hierarchy::Degraded {
            tree: placeholder_tree(),
            reason: DegradedReason::AllStrategiesFailed { attempts },
        }
    }

    /// Runs one strategy and returns its text if it looks like a dump.
    async fn dump(&self, strategy: DumpStrategy) -> Result<String, DumpError> {
        let text = match strategy {
            DumpStrategy::Standard => self.dump_to_file(&self.config.primary_dump_path, false).await?,
            DumpStrategy::Compressed => self.dump_to_file(&self.config.primary_dump_path, true).await?,
            DumpStrategy::DirectStream => {
                self.runner
                    .run(&["shell", "uiautomator", "dump", "/dev/tty"], self.config.stream_timeout)
                    .await?
            }
            DumpStrategy::AlternateLocation => {
                self.dump_to_file(&self.config.alternate_dump_path, false).await?
            }
        };

        if text.is_empty() || !text.contains(HIERARCHY_MARKER) {
            return Err(DumpError::MissingMarker);
        }
        Ok(text)
    }

    async fn dump_to_file(&self, path: &str, compressed: bool) -> Result<String, BridgeError> {
        let mut args = vec!["shell", "uiautomator", "dump"];
        if compressed {
            args.push("--compressed");
        }
        args.push(path);

        self.runner.run(&args, self.config.dump_timeout).await?;
        self.runner
            .run(&["shell", "cat", path], self.config.read_timeout)
            .await
    }
}

/// Cuts dump output down to the XML document.
///
/// Streamed dumps are followed by a status line such as
/// `UI hierchary dumped to: /dev/tty`, and some devices print warnings first.
pub fn extract_document(text: &str) -> &str {
    let start = text
        .find("<?xml")
        .or_else(|| text.find(HIERARCHY_MARKER))
        .unwrap_or(0);
    let end = text
        .rfind(HIERARCHY_END)
        .map(|i| i + HIERARCHY_END.len())
        .filter(|&end| end > start)
        .unwrap_or(text.len());
    &text[start..end]
}

/// The tree returned when no strategy succeeded: a `hierarchy` root with a
/// single non-clickable leaf whose text says the dump failed.
pub fn placeholder_tree() -> UiNode {
    let leaf = build_node(
        1,
        with_defaults([
            ("class", "android.widget.FrameLayout"),
            ("text", PLACEHOLDER_TEXT),
            ("bounds", DEFAULT_BOUNDS),
            ("content-desc", "UI dump failed"),
            ("clickable", "false"),
        ]),
        Vec::new(),
    );
    build_node(
        0,
        with_defaults([
            ("class", HIERARCHY_TAG),
            ("text", "UI Dump Failed"),
            ("content-desc", "UI hierarchy could not be retrieved"),
        ]),
        vec![leaf],
    )
}

/// Structural check for [`placeholder_tree`], for consumers that only see
/// the serialized tree.
pub fn is_placeholder(tree: &UiNode) -> bool {
    tree.id == 0
        && tree.tag == HIERARCHY_TAG
        && tree.children.len() == 1
        && tree.children[0].text == PLACEHOLDER_TEXT
}

/// Single-node tree returned for a structurally invalid dump.
fn malformed_tree(message: &str) -> UiNode {
    build_node(
        0,
        with_defaults([
            ("class", "android.widget.FrameLayout"),
            ("bounds", DEFAULT_BOUNDS),
            ("content-desc", message),
        ]),
        Vec::new(),
    )
}
