//! The tile compositing pass.
//!
//! A [`Compositor`] fetches every (layer, region) pair covering the
//! viewport through an injected [`TileSource`] and blends the fetched
//! pixels into a destination [`PixelBuffer`]. Small windows run on the
//! calling thread; windows above the dispatch threshold fan out one job
//! per region across a [`BackgroundExecutor`] and join on a
//! [`CompletionBarrier`] before the buffer is considered valid.
//!
//! Missing tiles are the normal degraded state of a live map and simply
//! contribute nothing. Hard tile-source failures and panicking region
//! jobs surface as [`ComposeError`]; they are never swallowed the way
//! debounce callback failures are.

use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::barrier::CompletionBarrier;
use crate::coords::{REGION_EDGE, RegionPos};
use crate::layers::LayerId;
use crate::surface::{PixelBuffer, Rgba};
use crate::viewport::Viewport;

/// Region count above which a pass dispatches to the background
/// executor instead of compositing inline.
pub const PARALLEL_REGION_THRESHOLD: usize = 24;

/// Pixel blend function: combines the existing destination pixel with a
/// fetched source pixel. Must be pure.
pub type BlendFn = fn(Rgba, Rgba) -> Rgba;

/// A fetched tile raster: fixed extent, per-pixel color lookup.
pub trait PixelSource {
  /// Width of the raster in pixels.
  fn width(&self) -> u32;

  /// Height of the raster in pixels.
  fn height(&self) -> u32;

  /// Color at raster-local (x, z). Both coordinates are within the
  /// reported extent.
  fn pixel(&self, x: u32, z: u32) -> Rgba;
}

/// Hard failure while fetching a tile (storage corruption, I/O, ...).
///
/// A tile that simply is not available yet is *not* an error; sources
/// report that as `Ok(None)`.
#[derive(Debug)]
pub struct TileError {
  message: String,
}

impl TileError {
  /// Creates a tile error from any printable cause.
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

impl fmt::Display for TileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

impl Error for TileError {}

/// Supplies tile pixel data per (layer, region).
///
/// Implementations must be safe to call concurrently: parallel passes
/// fetch different regions from multiple worker jobs at once.
pub trait TileSource: Send + Sync {
  /// The raster type fetches produce.
  type Tile: PixelSource;

  /// Fetches the tile for `layer` at `region`. `Ok(None)` means the
  /// tile is not (yet) available.
  fn tile(&self, layer: LayerId, region: RegionPos) -> Result<Option<Self::Tile>, TileError>;
}

/// Fire-and-forget background dispatch.
///
/// The compositor assumes nothing about ordering or thread affinity,
/// only that every submitted job eventually runs and may signal a
/// barrier from wherever it ran.
pub trait BackgroundExecutor: Send + Sync {
  /// Submits a job for execution on some background thread.
  fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Executor backed by rayon's global thread pool.
pub struct RayonExecutor;

impl BackgroundExecutor for RayonExecutor {
  fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
    rayon::spawn(job);
  }
}

/// Error surfaced by a compositing pass.
#[derive(Debug)]
pub enum ComposeError {
  /// The tile source failed hard for one (layer, region) pair.
  Fetch {
    layer: LayerId,
    region: RegionPos,
    source: TileError,
  },
  /// A dispatched region job panicked; the buffer contents are
  /// undefined and the pass must be retried or abandoned.
  JobPanicked { region: RegionPos },
}

impl fmt::Display for ComposeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Fetch {
        layer,
        region,
        source,
      } => write!(
        f,
        "tile fetch failed for layer {:?} region ({}, {}): {source}",
        layer.0, region.x, region.z
      ),
      Self::JobPanicked { region } => {
        write!(f, "region job panicked at ({}, {})", region.x, region.z)
      }
    }
  }
}

impl Error for ComposeError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      Self::Fetch { source, .. } => Some(source),
      Self::JobPanicked { .. } => None,
    }
  }
}

/// Shared buffer handle for dispatched region jobs.
///
/// # Safety
/// Jobs write through the pointer without any runtime checks. This is
/// sound because every job's writes are clipped to its own region's
/// destination span (disjoint across grid cells, see `blend_tile`) and
/// `compose` joins every job on the barrier before the `&mut` borrow of
/// the buffer ends.
struct PassAccess {
  dst: *mut PixelBuffer,
}

// SAFETY: see PassAccess; span partitioning plus the barrier join make
// the aliased writes race-free.
unsafe impl Send for PassAccess {}
unsafe impl Sync for PassAccess {}

/// Per-redraw orchestrator: fetch, blend, dispatch, join.
pub struct Compositor<S: TileSource> {
  source: Arc<S>,
  executor: Arc<dyn BackgroundExecutor>,
  threshold: usize,
  blend: BlendFn,
}

impl<S: TileSource + 'static> Compositor<S> {
  /// Creates a compositor over the given tile source and executor,
  /// blending with [`Rgba::over`] and dispatching in parallel above
  /// [`PARALLEL_REGION_THRESHOLD`] regions.
  pub fn new(source: Arc<S>, executor: Arc<dyn BackgroundExecutor>) -> Self {
    Self {
      source,
      executor,
      threshold: PARALLEL_REGION_THRESHOLD,
      blend: Rgba::over,
    }
  }

  /// Overrides the parallel dispatch threshold.
  pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
    self.threshold = threshold;
    self
  }

  /// Overrides the blend function.
  pub fn with_blend(mut self, blend: BlendFn) -> Self {
    self.blend = blend;
    self
  }

  /// Runs one compositing pass into `dst`.
  ///
  /// Clears the buffer, then blends every visible layer of every region
  /// covering the viewport, in declared layer order, each region
  /// completing its whole layer loop within one unit of work. On return
  /// the buffer is fully composited; the parallel path blocks on its
  /// barrier until the last job signals.
  ///
  /// Must not be called from inside a fetch/blend job: the parallel
  /// path joins on the job pool and would deadlock.
  pub fn compose(
    &self,
    viewport: &Viewport,
    layers: &[LayerId],
    dst: &mut PixelBuffer,
  ) -> Result<(), ComposeError> {
    dst.clear();
    let regions = viewport.regions();
    if regions.is_empty() || layers.is_empty() {
      return Ok(());
    }

    let (cx, cz) = viewport.begin().region_offset();
    if regions.len() > self.threshold {
      self.compose_parallel(viewport, layers, dst, cx, cz)
    } else {
      for (ix, iz, region) in regions.iter() {
        compose_region(
          self.source.as_ref(),
          dst,
          layers,
          region,
          ix,
          iz,
          cx,
          cz,
          self.blend,
        )?;
      }
      Ok(())
    }
  }

  /// One job per region; all jobs joined on a barrier sized to the
  /// region count before the pass reports completion.
  fn compose_parallel(
    &self,
    viewport: &Viewport,
    layers: &[LayerId],
    dst: &mut PixelBuffer,
    cx: u32,
    cz: u32,
  ) -> Result<(), ComposeError> {
    let regions = viewport.regions();
    let barrier = Arc::new(CompletionBarrier::new(regions.len()));
    let failure: Arc<Mutex<Option<ComposeError>>> = Arc::new(Mutex::new(None));
    let layers: Arc<[LayerId]> = layers.into();
    let access = Arc::new(PassAccess { dst });

    for (ix, iz, region) in regions.iter() {
      let barrier = Arc::clone(&barrier);
      let failure = Arc::clone(&failure);
      let layers = Arc::clone(&layers);
      let access = Arc::clone(&access);
      let source = Arc::clone(&self.source);
      let blend = self.blend;

      self.executor.execute(Box::new(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
          // SAFETY: writes are confined to this region's destination
          // span; see PassAccess.
          let dst = unsafe { &mut *access.dst };
          compose_region(source.as_ref(), dst, &layers, region, ix, iz, cx, cz, blend)
        }));
        let error = match outcome {
          Ok(Ok(())) => None,
          Ok(Err(error)) => Some(error),
          Err(_) => Some(ComposeError::JobPanicked { region }),
        };
        if let Some(error) = error
          && let Ok(mut slot) = failure.lock()
          && slot.is_none()
        {
          *slot = Some(error);
        }
        // Signalled last, also on failure: the waiter must never hang.
        barrier.done();
      }));
    }

    barrier.wait();
    match failure.lock() {
      Ok(mut slot) => slot.take().map_or(Ok(()), Err),
      Err(_) => Err(ComposeError::JobPanicked {
        region: regions.origin(),
      }),
    }
  }
}

/// Fetches and blends every visible layer of one region, in declared
/// order.
#[allow(clippy::too_many_arguments)]
fn compose_region<S: TileSource>(
  source: &S,
  dst: &mut PixelBuffer,
  layers: &[LayerId],
  region: RegionPos,
  ix: u32,
  iz: u32,
  cx: u32,
  cz: u32,
  blend: BlendFn,
) -> Result<(), ComposeError> {
  for &layer in layers {
    let tile = source
      .tile(layer, region)
      .map_err(|source| ComposeError::Fetch {
        layer,
        region,
        source,
      })?;
    if let Some(tile) = tile {
      blend_tile(dst, &tile, ix, iz, cx, cz, blend);
    }
  }
  Ok(())
}

/// Blends one tile raster into the buffer at the destination span of
/// grid cell (ix, iz).
///
/// Writes are clipped to the region's own span (at most `REGION_EDGE`
/// pixels per axis from the span origin), so concurrent region jobs
/// never touch the same destination pixel. Pixels mapping outside the
/// buffer are skipped: partial overlap at viewport edges is expected.
fn blend_tile(
  dst: &mut PixelBuffer,
  tile: &impl PixelSource,
  ix: u32,
  iz: u32,
  cx: u32,
  cz: u32,
  blend: BlendFn,
) {
  let edge = REGION_EDGE as i64;
  let base_x = ix as i64 * edge - cx as i64;
  let base_z = iz as i64 * edge - cz as i64;
  let width = dst.width() as i64;
  let height = dst.height() as i64;

  for x in 0..tile.width().min(REGION_EDGE) {
    let tx = base_x + x as i64;
    if tx < 0 || tx >= width {
      continue;
    }
    for z in 0..tile.height().min(REGION_EDGE) {
      let tz = base_z + z as i64;
      if tz < 0 || tz >= height {
        continue;
      }
      let at = (tx as u32, tz as u32);
      dst[at] = blend(dst[at], tile.pixel(x, z));
    }
  }
}
