//! Concurrency and compositing core for a live, pannable, zoomable
//! tile map.
//!
//! The map is built from discrete square regions of pixels that are
//! produced asynchronously and may change at any time. This crate
//! covers the part that makes that hard:
//!
//! - [`Debouncer`] coalesces floods of "this key changed" signals into
//!   one deferred callback per key, bounded by a quiet period and a
//!   hard deadline, without ever starving a key.
//! - [`Viewport`] + [`Compositor`] turn a center/size/zoom triple into
//!   the covering set of regions, fetch every visible (layer, region)
//!   pair through an injected [`TileSource`], and blend the results
//!   into a [`PixelBuffer`] — inline for small windows, fanned out
//!   across a [`BackgroundExecutor`] and joined on a
//!   [`CompletionBarrier`] for large ones.
//! - [`MapView`] ties it together behind a dirty flag and hands frames
//!   out only once a pass has fully completed.
//!
//! Rendering, tile storage and UI stay outside, consumed through the
//! narrow traits in [`compositor`].

pub mod barrier;
pub mod compositor;
pub mod config;
pub mod coords;
pub mod debounce;
pub mod diagnostics;
pub mod layers;
pub mod markers;
pub mod surface;
pub mod view;
pub mod viewport;

pub use barrier::CompletionBarrier;
pub use compositor::{
  BackgroundExecutor, BlendFn, ComposeError, Compositor, PARALLEL_REGION_THRESHOLD, PixelSource,
  RayonExecutor, TileError, TileSource,
};
pub use config::{CompositorSettings, DebounceSettings, EngineConfig, ViewportSettings};
pub use coords::{REGION_EDGE, RegionPos, WorldPos, in_range};
pub use debounce::Debouncer;
pub use diagnostics::TimeSeries;
pub use layers::{LayerId, LayerVisibility, MapMode, MapModeId};
pub use markers::{Marker, MarkerOverlay, OverlayWindow};
pub use surface::{PixelBuffer, Rgba};
pub use view::{MapFrame, MapView};
pub use viewport::{RegionWindow, Viewport};
