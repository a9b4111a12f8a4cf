//! Coordinate types and spatial constants.
//!
//! Defines the coordinate system for the map:
//! - [`WorldPos`]: Absolute world position (i64 so panning can wander
//!   arbitrarily far without overflow concerns)
//! - [`RegionPos`]: Region grid position (i32)
//!
//! World space is grouped into square regions of [`REGION_EDGE`] pixels;
//! a world position maps to its region by floor division, so negative
//! coordinates land in negative regions instead of rounding toward zero.

/// Edge length of a square map region, in world pixels.
pub const REGION_EDGE: u32 = 512;

/// Absolute position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WorldPos {
  pub x: i64,
  pub z: i64,
}

impl WorldPos {
  /// Creates a new world position.
  pub const fn new(x: i64, z: i64) -> Self {
    Self { x, z }
  }

  /// Returns this position translated by the given deltas.
  pub const fn offset(self, dx: i64, dz: i64) -> Self {
    Self {
      x: self.x + dx,
      z: self.z + dz,
    }
  }

  /// Returns the region containing this position.
  ///
  /// Uses floor division: world position -1 is in region -1, not 0.
  pub fn region(self) -> RegionPos {
    let edge = REGION_EDGE as i64;
    RegionPos::new(self.x.div_euclid(edge) as i32, self.z.div_euclid(edge) as i32)
  }

  /// Non-negative offset of this position within its region.
  ///
  /// Always in `0..REGION_EDGE` on both axes, also for negative world
  /// coordinates.
  pub fn region_offset(self) -> (u32, u32) {
    let edge = REGION_EDGE as i64;
    (self.x.rem_euclid(edge) as u32, self.z.rem_euclid(edge) as u32)
  }
}

/// Position in the region grid.
///
/// Each region spans [`REGION_EDGE`] world pixels in each dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionPos {
  pub x: i32,
  pub z: i32,
}

impl RegionPos {
  /// Creates a new region position.
  pub const fn new(x: i32, z: i32) -> Self {
    Self { x, z }
  }

  /// Returns this region translated by the given number of regions.
  pub const fn offset(self, dx: i32, dz: i32) -> Self {
    Self {
      x: self.x + dx,
      z: self.z + dz,
    }
  }

  /// World position of this region's north-west corner.
  pub fn origin(self) -> WorldPos {
    let edge = REGION_EDGE as i64;
    WorldPos::new(self.x as i64 * edge, self.z as i64 * edge)
  }
}

/// Inclusive bounding-box test.
///
/// Used to filter overlay items to the visible window; both corners are
/// part of the box.
pub fn in_range(pos: WorldPos, begin: WorldPos, end: WorldPos) -> bool {
  pos.x >= begin.x && pos.x <= end.x && pos.z >= begin.z && pos.z <= end.z
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn region_floor_division() {
    assert_eq!(WorldPos::new(0, 0).region(), RegionPos::new(0, 0));
    assert_eq!(WorldPos::new(511, 511).region(), RegionPos::new(0, 0));
    assert_eq!(WorldPos::new(512, 0).region(), RegionPos::new(1, 0));
    assert_eq!(WorldPos::new(-1, -1).region(), RegionPos::new(-1, -1));
    assert_eq!(WorldPos::new(-512, -513).region(), RegionPos::new(-1, -2));
  }

  #[test]
  fn region_offset_is_non_negative() {
    assert_eq!(WorldPos::new(0, 0).region_offset(), (0, 0));
    assert_eq!(WorldPos::new(513, 5).region_offset(), (1, 5));
    assert_eq!(WorldPos::new(-1, -512).region_offset(), (511, 0));
    assert_eq!(WorldPos::new(-513, 1).region_offset(), (511, 1));
  }

  #[test]
  fn region_origin_round_trips() {
    for region in [
      RegionPos::new(0, 0),
      RegionPos::new(3, -2),
      RegionPos::new(-1, -1),
    ] {
      assert_eq!(region.origin().region(), region);
      assert_eq!(region.origin().region_offset(), (0, 0));
    }
  }

  #[test]
  fn in_range_is_inclusive() {
    let begin = WorldPos::new(-512, -512);
    let end = WorldPos::new(511, 511);
    assert!(in_range(begin, begin, end));
    assert!(in_range(end, begin, end));
    assert!(in_range(WorldPos::new(0, 0), begin, end));
    assert!(!in_range(WorldPos::new(512, 0), begin, end));
    assert!(!in_range(WorldPos::new(0, -513), begin, end));
  }
}
