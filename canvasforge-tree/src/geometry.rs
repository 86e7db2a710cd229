//! Resize and rotate handle geometry for a selected component.
//!
//! Everything here is pure: given a bounding box and a drag, compute where the
//! handles sit and what the box becomes. Canvas space has `y` growing down.

use crate::error::TreeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance, in canvas pixels, that an edge handle sits outside the box.
pub const HANDLE_MARGIN: f64 = 4.0;

/// Distance above the top edge at which the rotation handle sits.
pub const ROTATION_HANDLE_OFFSET: f64 = 24.0;

/// Cursor shown over the rotation handle.
pub const ROTATION_CURSOR: &str = "grab";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box of a component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn translate(&self, delta: Point) -> Rect {
        Rect::new(self.x + delta.x, self.y + delta.y, self.width, self.height)
    }
}

/// One of the eight resize handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::S,
        Direction::E,
        Direction::W,
        Direction::NE,
        Direction::NW,
        Direction::SE,
        Direction::SW,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::N => "n",
            Direction::S => "s",
            Direction::E => "e",
            Direction::W => "w",
            Direction::NE => "ne",
            Direction::NW => "nw",
            Direction::SE => "se",
            Direction::SW => "sw",
        }
    }

    // Each character pins one edge, independently of the others.
    pub fn has_north(&self) -> bool {
        self.as_str().contains('n')
    }

    pub fn has_south(&self) -> bool {
        self.as_str().contains('s')
    }

    pub fn has_east(&self) -> bool {
        self.as_str().contains('e')
    }

    pub fn has_west(&self) -> bool {
        self.as_str().contains('w')
    }

    /// CSS cursor name for hovering this handle.
    pub fn cursor(&self) -> &'static str {
        match self {
            Direction::N => "n-resize",
            Direction::S => "s-resize",
            Direction::E => "e-resize",
            Direction::W => "w-resize",
            Direction::NE => "ne-resize",
            Direction::NW => "nw-resize",
            Direction::SE => "se-resize",
            Direction::SW => "sw-resize",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| TreeError::UnknownDirection(s.to_string()))
    }
}

/// Where a handle sits along one axis, relative to the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    /// Pinned to the leading edge (top or left), inset by the given amount.
    /// A negative inset places the handle outside the box.
    Leading(f64),
    /// Pinned to the trailing edge (bottom or right).
    Trailing(f64),
    /// Centered on the axis (`50%` plus a `-50%` translate).
    Centered,
}

impl Anchor {
    fn css(&self, leading: &str, trailing: &str, out: &mut Vec<String>) -> bool {
        match self {
            Anchor::Leading(inset) => {
                out.push(format!("{}:{}px", leading, inset));
                false
            }
            Anchor::Trailing(inset) => {
                out.push(format!("{}:{}px", trailing, inset));
                false
            }
            Anchor::Centered => {
                out.push(format!("{}:50%", leading));
                true
            }
        }
    }
}

/// Placement of a handle relative to its component's box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandlePlacement {
    pub vertical: Anchor,
    pub horizontal: Anchor,
    pub cursor: &'static str,
}

impl HandlePlacement {
    /// Inline style for an absolutely positioned handle element.
    pub fn css(&self) -> String {
        let mut parts = Vec::new();
        let center_y = self.vertical.css("top", "bottom", &mut parts);
        let center_x = self.horizontal.css("left", "right", &mut parts);
        match (center_x, center_y) {
            (true, true) => parts.push("transform:translate(-50%,-50%)".to_string()),
            (true, false) => parts.push("transform:translateX(-50%)".to_string()),
            (false, true) => parts.push("transform:translateY(-50%)".to_string()),
            (false, false) => {}
        }
        parts.push(format!("cursor:{}", self.cursor));
        parts.join(";")
    }
}

/// Anchor of the resize handle for `direction`.
pub fn handle_placement(direction: Direction) -> HandlePlacement {
    let vertical = if direction.has_north() {
        Anchor::Leading(-HANDLE_MARGIN)
    } else if direction.has_south() {
        Anchor::Trailing(-HANDLE_MARGIN)
    } else {
        Anchor::Centered
    };
    let horizontal = if direction.has_west() {
        Anchor::Leading(-HANDLE_MARGIN)
    } else if direction.has_east() {
        Anchor::Trailing(-HANDLE_MARGIN)
    } else {
        Anchor::Centered
    };
    HandlePlacement {
        vertical,
        horizontal,
        cursor: direction.cursor(),
    }
}

/// Anchor of the rotation handle: centered horizontally, above the top edge.
pub fn rotation_handle_placement() -> HandlePlacement {
    HandlePlacement {
        vertical: Anchor::Leading(-ROTATION_HANDLE_OFFSET),
        horizontal: Anchor::Centered,
        cursor: ROTATION_CURSOR,
    }
}

/// Canvas-space center of the resize handle for `direction` on `rect`.
pub fn handle_point(rect: &Rect, direction: Direction) -> Point {
    let x = if direction.has_west() {
        rect.x - HANDLE_MARGIN
    } else if direction.has_east() {
        rect.right() + HANDLE_MARGIN
    } else {
        rect.center().x
    };
    let y = if direction.has_north() {
        rect.y - HANDLE_MARGIN
    } else if direction.has_south() {
        rect.bottom() + HANDLE_MARGIN
    } else {
        rect.center().y
    };
    Point::new(x, y)
}

/// Canvas-space center of the rotation handle on `rect`.
pub fn rotation_handle_point(rect: &Rect) -> Point {
    Point::new(rect.center().x, rect.y - ROTATION_HANDLE_OFFSET)
}

/// Applies a drag of `delta` on the `direction` handle.
///
/// Edges not named by the direction stay where they are. Width and height
/// clamp at zero with the opposite edge pinned, so the box never inverts.
pub fn resize(rect: &Rect, direction: Direction, delta: Point) -> Rect {
    let mut out = *rect;

    if direction.has_east() {
        out.width = (rect.width + delta.x).max(0.0);
    } else if direction.has_west() {
        out.width = (rect.width - delta.x).max(0.0);
        out.x = rect.right() - out.width;
    }

    if direction.has_south() {
        out.height = (rect.height + delta.y).max(0.0);
    } else if direction.has_north() {
        out.height = (rect.height - delta.y).max(0.0);
        out.y = rect.bottom() - out.height;
    }

    out
}

/// Wraps any finite angle into `[0, 360)`. Non-finite input maps to 0.
pub fn normalize_angle(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Angle of `pointer` around the center of `rect`.
///
/// Straight up from the center is 0°, increasing clockwise, matching how the
/// rotation handle starts above the box.
pub fn rotation_from_pointer(rect: &Rect, pointer: Point) -> f64 {
    let center = rect.center();
    let dx = pointer.x - center.x;
    let dy = pointer.y - center.y;
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    normalize_angle(dx.atan2(-dy).to_degrees())
}
