//! Overlay items pinned to world positions.
//!
//! Markers are the map's decorations: free-floating waypoints and
//! per-layer labels. The overlay keeps the subset inside the current
//! window (and on a visible layer) ready for the presentation layer;
//! how they are styled and drawn is not this crate's concern.

use crate::coords::{WorldPos, in_range};
use crate::layers::LayerId;

/// A world-anchored overlay item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marker {
  /// Identity used for removal; unique per overlay.
  pub id: u64,
  pub position: WorldPos,
  /// `None` for free-floating waypoints; `Some` ties the marker's
  /// visibility to a layer's.
  pub layer: Option<LayerId>,
}

impl Marker {
  /// Creates a free-floating waypoint marker.
  pub fn waypoint(id: u64, position: WorldPos) -> Self {
    Self {
      id,
      position,
      layer: None,
    }
  }

  /// Creates a label marker tied to a layer.
  pub fn label(id: u64, position: WorldPos, layer: LayerId) -> Self {
    Self {
      id,
      position,
      layer: Some(layer),
    }
  }
}

/// The visible window an overlay filters against.
#[derive(Clone, Copy, Debug)]
pub struct OverlayWindow<'a> {
  pub begin: WorldPos,
  pub end: WorldPos,
  /// Layers currently visible; labels on other layers are filtered out.
  pub visible_layers: &'a [LayerId],
}

impl OverlayWindow<'_> {
  fn admits(&self, marker: &Marker) -> bool {
    if !in_range(marker.position, self.begin, self.end) {
      return false;
    }
    match marker.layer {
      None => true,
      Some(layer) => self.visible_layers.contains(&layer),
    }
  }
}

/// All known markers plus the filtered visible subset.
///
/// The visible list is re-derived wholesale on every window change and
/// kept incrementally consistent on add/remove in between.
#[derive(Debug, Default)]
pub struct MarkerOverlay {
  all: Vec<Marker>,
  visible: Vec<Marker>,
}

impl MarkerOverlay {
  /// Markers inside the current window, in insertion order.
  pub fn visible(&self) -> &[Marker] {
    &self.visible
  }

  /// Total number of known markers, visible or not.
  pub fn len(&self) -> usize {
    self.all.len()
  }

  /// Returns true if no markers are known.
  pub fn is_empty(&self) -> bool {
    self.all.is_empty()
  }

  /// Re-derives the visible subset for a new window.
  pub fn refresh(&mut self, window: OverlayWindow<'_>) {
    self.visible.clear();
    self
      .visible
      .extend(self.all.iter().filter(|m| window.admits(m)).cloned());
  }

  /// Adds a marker, including it in the visible subset when the window
  /// admits it. Replaces any existing marker with the same id.
  pub fn add(&mut self, marker: Marker, window: OverlayWindow<'_>) {
    self.remove(marker.id);
    if window.admits(&marker) {
      self.visible.push(marker.clone());
    }
    self.all.push(marker);
  }

  /// Removes a marker by id from both lists. Returns whether it
  /// existed.
  pub fn remove(&mut self, id: u64) -> bool {
    self.visible.retain(|m| m.id != id);
    let before = self.all.len();
    self.all.retain(|m| m.id != id);
    self.all.len() != before
  }

  /// Drops all markers.
  pub fn clear(&mut self) {
    self.all.clear();
    self.visible.clear();
  }
}
