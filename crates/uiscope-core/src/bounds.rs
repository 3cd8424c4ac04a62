//! Screen-space rectangles in the `[x1,y1][x2,y2]` encoding used by UI dumps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when bounds text is not a well-formed `[x1,y1][x2,y2]` rectangle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid bounds: {0:?}")]
pub struct InvalidBounds(pub String);

/// An axis-aligned rectangle with inclusive edges.
///
/// Coordinates are non-negative device pixels with `x1 <= x2` and `y1 <= y2`.
/// Text that does not satisfy this never produces a partial rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundsRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundsRect {
    /// Parses `[x1,y1][x2,y2]`, returning `None` for anything malformed.
    pub fn parse(text: &str) -> Option<Self> {
        let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
        let (top_left, bottom_right) = inner.split_once("][")?;
        let (x1, y1) = parse_point(top_left)?;
        let (x2, y2) = parse_point(bottom_right)?;

        if x1 > x2 || y1 > y2 {
            return None;
        }
        Some(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// `(x2 - x1) * (y2 - y1)`; zero for degenerate rectangles.
    pub fn area(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }

    /// Midpoint, rounded down.
    pub fn center(&self) -> (i32, i32) {
        (self.x1 + self.width() / 2, self.y1 + self.height() / 2)
    }

    /// Returns true if the point lies inside or on any edge.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }
}

impl fmt::Display for BoundsRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}][{},{}]", self.x1, self.y1, self.x2, self.y2)
    }
}

impl FromStr for BoundsRect {
    type Err = InvalidBounds;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidBounds(s.to_string()))
    }
}

fn parse_point(text: &str) -> Option<(i32, i32)> {
    let (x, y) = text.split_once(',')?;
    Some((parse_coordinate(x)?, parse_coordinate(y)?))
}

fn parse_coordinate(text: &str) -> Option<i32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
