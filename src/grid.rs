//! Grid snapping and the symbol-to-schematic coordinate transform.
//!
//! Symbol libraries use Y-up coordinates while schematics use Y-down.
//! A pin defined at library position `(px, py)` on a symbol placed at
//! `(sx, sy)` lands at:
//!
//! ```text
//! rotation 0:   (sx + px, sy - py)
//! rotation 90:  (sx + py, sy + px)
//! rotation 180: (sx - px, sy + py)
//! rotation 270: (sx - py, sy - px)
//! ```
//!
//! Every emitted coordinate goes through [`snap`]; guessed pin positions
//! are the main source of dangling-label ERC errors.

use crate::error::GridError;

/// Schematic grid pitch in mm (50 mil).
pub const GRID: f64 = 1.27;

/// Snap a coordinate to the nearest grid multiple.
///
/// Half-way values round away from zero (`f64::round`). Idempotent up to
/// floating point noise.
pub fn snap(v: f64) -> f64 {
    (v / GRID).round() * GRID
}

/// Symbol rotation, restricted to the four orientations the schematic
/// format supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = GridError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            other => Err(GridError::InvalidRotation(other)),
        }
    }
}

/// Map a pin position from library space to a schematic offset for the
/// given symbol rotation.
pub fn pin_transform(px: f64, py: f64, rotation: Rotation) -> (f64, f64) {
    match rotation {
        Rotation::R0 => (px, -py),
        Rotation::R90 => (py, px),
        Rotation::R180 => (-px, py),
        Rotation::R270 => (-py, -px),
    }
}

/// Absolute, grid-snapped schematic position of a pin on a symbol placed
/// at `(sx, sy)`. Y-mirroring negates the library X before rotating.
pub fn pin_absolute(
    sx: f64,
    sy: f64,
    px: f64,
    py: f64,
    rotation: Rotation,
    mirror_y: bool,
) -> (f64, f64) {
    let px = if mirror_y { -px } else { px };
    let (dx, dy) = pin_transform(px, py, rotation);
    (snap(sx + dx), snap(sy + dy))
}
