//! The consumer-facing map view.
//!
//! A [`MapView`] owns the viewport, the current map mode, the marker
//! overlay and the destination buffer, and serializes compositing
//! passes through a dirty flag: geometry or content changes mark the
//! view dirty, the embedding render tick calls
//! [`redraw`](MapView::redraw), and [`present`](MapView::present) hands
//! the buffer out only once the latest pass has fully completed.
//!
//! Collaborators (tile source, worker pool, available modes) are passed
//! in at construction; the view holds no process-wide state.

use std::sync::Arc;
use std::time::Instant;

use crate::compositor::{BackgroundExecutor, ComposeError, Compositor, TileSource};
use crate::config::EngineConfig;
use crate::coords::WorldPos;
use crate::diagnostics::TimeSeries;
use crate::layers::{LayerId, LayerVisibility, MapMode, MapModeId};
use crate::markers::{Marker, MarkerOverlay, OverlayWindow};
use crate::surface::PixelBuffer;
use crate::viewport::Viewport;

/// How many pass durations the view retains for diagnostics.
const TIMING_WINDOW: usize = 64;

/// A completed, presentable frame: the composited buffer plus the
/// world-space window it covers.
pub struct MapFrame<'a> {
  pub pixels: &'a PixelBuffer,
  pub begin: WorldPos,
  pub end: WorldPos,
}

/// Live view onto the tile map.
pub struct MapView<S: TileSource + 'static> {
  viewport: Viewport,
  compositor: Compositor<S>,
  modes: Vec<MapMode>,
  mode: usize,
  visibility: LayerVisibility,
  visible_layers: Vec<LayerId>,
  markers: MarkerOverlay,
  buffer: PixelBuffer,
  dirty: bool,
  timings: TimeSeries,
}

impl<S: TileSource + 'static> MapView<S> {
  /// Creates a view over the given collaborators, selecting the first
  /// declared mode.
  ///
  /// # Panics
  /// Panics if `modes` is empty.
  pub fn new(
    modes: Vec<MapMode>,
    source: Arc<S>,
    executor: Arc<dyn BackgroundExecutor>,
    config: &EngineConfig,
    width: u32,
    height: u32,
  ) -> Self {
    assert!(!modes.is_empty(), "a map view needs at least one mode");

    let viewport = Viewport::new(
      width,
      height,
      config.viewport.min_zoom,
      config.viewport.max_zoom,
    );
    let compositor = Compositor::new(source, executor)
      .with_parallel_threshold(config.compositor.parallel_threshold);
    let buffer = PixelBuffer::new(viewport.map_width(), viewport.map_height());

    let mut view = Self {
      viewport,
      compositor,
      modes,
      mode: 0,
      visibility: LayerVisibility::default(),
      visible_layers: Vec::new(),
      markers: MarkerOverlay::default(),
      buffer,
      dirty: true,
      timings: TimeSeries::new(TIMING_WINDOW),
    };
    view.refresh_layers();
    view
  }

  /// The currently selected mode.
  pub fn mode(&self) -> &MapMode {
    &self.modes[self.mode]
  }

  /// Switches to the mode with the given id.
  ///
  /// Returns `false` if the id is unknown or already selected. The
  /// previous mode's disabled-layer choices are remembered.
  pub fn set_mode(&mut self, id: MapModeId) -> bool {
    let Some(index) = self.modes.iter().position(|mode| mode.id == id) else {
      return false;
    };
    if index == self.mode {
      return false;
    }
    self.mode = index;
    self.refresh_layers();
    self.dirty = true;
    true
  }

  /// Visible layers of the current mode, in blend order.
  pub fn visible_layers(&self) -> &[LayerId] {
    &self.visible_layers
  }

  /// Flips a layer's visibility in the current mode.
  ///
  /// Returns `false` if the mode does not declare the layer.
  pub fn toggle_layer(&mut self, layer: LayerId) -> bool {
    if !self.visibility.toggle(&self.modes[self.mode], layer) {
      return false;
    }
    self.refresh_layers();
    self.dirty = true;
    true
  }

  /// Returns true if the current mode declares `layer` and it is not
  /// disabled.
  pub fn is_layer_visible(&self, layer: LayerId) -> bool {
    self.visibility.is_visible(&self.modes[self.mode], layer)
  }

  /// Read access to the viewport geometry.
  pub fn viewport(&self) -> &Viewport {
    &self.viewport
  }

  /// Recenters the view.
  pub fn set_center(&mut self, center: WorldPos) {
    self.viewport.set_center(center);
    self.refresh_geometry();
  }

  /// Pans the view by world-space deltas.
  pub fn move_center(&mut self, dx: i64, dz: i64) {
    self.viewport.move_center(dx, dz);
    self.refresh_geometry();
  }

  /// Changes the device extent.
  pub fn resize(&mut self, width: u32, height: u32) {
    self.viewport.resize(width, height);
    self.refresh_geometry();
  }

  /// Sets the zoom factor, clamped to the configured range. Returns
  /// whether anything changed.
  pub fn set_zoom(&mut self, zoom: f64) -> bool {
    if !self.viewport.set_zoom(zoom) {
      return false;
    }
    self.refresh_geometry();
    true
  }

  /// Adds an overlay marker.
  pub fn add_marker(&mut self, marker: Marker) {
    let window = OverlayWindow {
      begin: self.viewport.begin(),
      end: self.viewport.end(),
      visible_layers: &self.visible_layers,
    };
    self.markers.add(marker, window);
  }

  /// Removes an overlay marker by id. Returns whether it existed.
  pub fn remove_marker(&mut self, id: u64) -> bool {
    self.markers.remove(id)
  }

  /// Markers inside the current window.
  pub fn visible_markers(&self) -> &[Marker] {
    self.markers.visible()
  }

  /// Marks the view as needing a redraw.
  ///
  /// This is the hook for "tile changed" signals, typically fired from
  /// a debounce callback once a region settles.
  pub fn mark_dirty(&mut self) {
    self.dirty = true;
  }

  /// Returns true if the buffer no longer reflects the latest state.
  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Runs a compositing pass if the view is dirty.
  ///
  /// Returns `Ok(true)` when a pass ran, `Ok(false)` when the buffer
  /// was already current. On error the view stays dirty so the next
  /// tick retries.
  pub fn redraw(&mut self) -> Result<bool, ComposeError> {
    if !self.dirty {
      return Ok(false);
    }

    let started = Instant::now();
    self
      .compositor
      .compose(&self.viewport, &self.visible_layers, &mut self.buffer)?;
    self.timings.record(started.elapsed());
    self.dirty = false;
    Ok(true)
  }

  /// The latest completed frame, or `None` while a redraw is pending.
  pub fn present(&self) -> Option<MapFrame<'_>> {
    if self.dirty {
      return None;
    }
    Some(MapFrame {
      pixels: &self.buffer,
      begin: self.viewport.begin(),
      end: self.viewport.end(),
    })
  }

  /// Recent pass durations.
  pub fn timings(&self) -> &TimeSeries {
    &self.timings
  }

  /// Re-derives the visible layer list for the current mode and
  /// re-filters labels against it.
  fn refresh_layers(&mut self) {
    self.visible_layers = self.visibility.visible(&self.modes[self.mode]);
    self.refresh_markers();
  }

  /// Rebuilds everything that hangs off the viewport geometry: the
  /// destination buffer (extent may have changed) and the marker
  /// overlay filter.
  fn refresh_geometry(&mut self) {
    let (width, height) = (self.viewport.map_width(), self.viewport.map_height());
    if self.buffer.width() != width || self.buffer.height() != height {
      self.buffer = PixelBuffer::new(width, height);
    }
    self.refresh_markers();
    self.dirty = true;
  }

  fn refresh_markers(&mut self) {
    let window = OverlayWindow {
      begin: self.viewport.begin(),
      end: self.viewport.end(),
      visible_layers: &self.visible_layers,
    };
    self.markers.refresh(window);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compositor::{PixelSource, TileError};
  use crate::coords::RegionPos;
  use crate::surface::Rgba;

  const TERRAIN: LayerId = LayerId("terrain");
  const WATER: LayerId = LayerId("water");

  /// Every region of every layer exists and is one solid color.
  struct UniformSource;

  struct UniformTile {
    color: Rgba,
  }

  impl PixelSource for UniformTile {
    fn width(&self) -> u32 {
      crate::coords::REGION_EDGE
    }

    fn height(&self) -> u32 {
      crate::coords::REGION_EDGE
    }

    fn pixel(&self, _x: u32, _z: u32) -> Rgba {
      self.color
    }
  }

  impl TileSource for UniformSource {
    type Tile = UniformTile;

    fn tile(&self, layer: LayerId, _region: RegionPos) -> Result<Option<UniformTile>, TileError> {
      let color = match layer {
        TERRAIN => Rgba::rgb(50, 100, 50),
        WATER => Rgba::rgb(0, 0, 200),
        _ => return Ok(None),
      };
      Ok(Some(UniformTile { color }))
    }
  }

  struct InlineExecutor;

  impl BackgroundExecutor for InlineExecutor {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
      job();
    }
  }

  fn view() -> MapView<UniformSource> {
    let modes = vec![
      MapMode::new(MapModeId("surface"), vec![TERRAIN, WATER]),
      MapMode::new(MapModeId("caves"), vec![TERRAIN]),
    ];
    MapView::new(
      modes,
      Arc::new(UniformSource),
      Arc::new(InlineExecutor),
      &EngineConfig::default(),
      512,
      512,
    )
  }

  #[test]
  fn fresh_view_needs_a_redraw_before_presenting() {
    let mut view = view();
    assert!(view.present().is_none());
    assert!(view.redraw().unwrap());
    let frame = view.present().unwrap();
    assert_eq!(frame.begin, WorldPos::new(-256, -256));
    assert_eq!(frame.end, WorldPos::new(255, 255));
    // Water is the topmost layer and fully opaque.
    assert_eq!(frame.pixels.get(0, 0), Some(Rgba::rgb(0, 0, 200)));
  }

  #[test]
  fn clean_view_skips_the_pass() {
    let mut view = view();
    assert!(view.redraw().unwrap());
    assert!(!view.redraw().unwrap());
    assert_eq!(view.timings().len(), 1);
  }

  #[test]
  fn panning_invalidates_the_frame() {
    let mut view = view();
    view.redraw().unwrap();
    view.move_center(100, 0);
    assert!(view.present().is_none());
    assert!(view.redraw().unwrap());
    assert_eq!(view.present().unwrap().begin, WorldPos::new(-156, -256));
  }

  #[test]
  fn toggling_a_layer_changes_the_composite() {
    let mut view = view();
    assert!(view.toggle_layer(WATER));
    view.redraw().unwrap();
    assert_eq!(
      view.present().unwrap().pixels.get(0, 0),
      Some(Rgba::rgb(50, 100, 50))
    );

    assert!(!view.toggle_layer(LayerId("lava")));
  }

  #[test]
  fn mode_switch_remembers_layer_choices() {
    let mut view = view();
    view.toggle_layer(WATER);
    assert!(view.set_mode(MapModeId("caves")));
    assert_eq!(view.visible_layers(), &[TERRAIN]);
    assert!(view.set_mode(MapModeId("surface")));
    // WATER stayed disabled in the surface mode.
    assert_eq!(view.visible_layers(), &[TERRAIN]);
    assert!(!view.set_mode(MapModeId("surface")));
  }

  #[test]
  fn zooming_resizes_the_buffer() {
    let mut view = view();
    assert!(view.set_zoom(0.5));
    view.redraw().unwrap();
    let frame = view.present().unwrap();
    assert_eq!(frame.pixels.width(), 1024);
    assert_eq!(frame.begin, WorldPos::new(-512, -512));
  }

  #[test]
  fn markers_follow_the_window() {
    let mut view = view();
    view.add_marker(Marker::waypoint(1, WorldPos::new(0, 0)));
    view.add_marker(Marker::waypoint(2, WorldPos::new(5_000, 0)));
    assert_eq!(view.visible_markers().len(), 1);

    view.set_center(WorldPos::new(5_000, 0));
    assert_eq!(view.visible_markers().len(), 1);
    assert_eq!(view.visible_markers()[0].id, 2);
  }

  #[test]
  fn label_markers_track_layer_visibility() {
    let mut view = view();
    view.add_marker(Marker::label(1, WorldPos::new(0, 0), WATER));
    assert_eq!(view.visible_markers().len(), 1);
    view.toggle_layer(WATER);
    assert!(view.visible_markers().is_empty());
  }

  #[test]
  fn mark_dirty_forces_a_new_pass() {
    let mut view = view();
    view.redraw().unwrap();
    view.mark_dirty();
    assert!(view.present().is_none());
    assert!(view.redraw().unwrap());
  }
}
