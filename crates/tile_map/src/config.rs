//! Engine settings with TOML persistence.
//!
//! Missing files yield defaults; unparsable files log a warning and
//! yield defaults, so a stale or hand-mangled settings file can never
//! keep the map from coming up.

use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compositor::PARALLEL_REGION_THRESHOLD;

/// Debounce scheduler knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceSettings {
  /// Quiet period: how long after the last signal before firing, in
  /// milliseconds.
  pub step_ms: u64,
  /// Hard ceiling from the first signal, in milliseconds.
  pub max_ms: u64,
}

impl Default for DebounceSettings {
  fn default() -> Self {
    Self {
      step_ms: 500,
      max_ms: 2_000,
    }
  }
}

impl DebounceSettings {
  /// Quiet period as a [`Duration`].
  pub fn step(&self) -> Duration {
    Duration::from_millis(self.step_ms)
  }

  /// Hard ceiling as a [`Duration`].
  pub fn max(&self) -> Duration {
    Duration::from_millis(self.max_ms)
  }
}

/// Compositing pass knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSettings {
  /// Region count above which a pass dispatches to the worker pool.
  pub parallel_threshold: usize,
}

impl Default for CompositorSettings {
  fn default() -> Self {
    Self {
      parallel_threshold: PARALLEL_REGION_THRESHOLD,
    }
  }
}

/// Viewport knobs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
  pub min_zoom: f64,
  pub max_zoom: f64,
}

impl Default for ViewportSettings {
  fn default() -> Self {
    Self {
      min_zoom: 0.25,
      max_zoom: 8.0,
    }
  }
}

/// All engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub debounce: DebounceSettings,
  pub compositor: CompositorSettings,
  pub viewport: ViewportSettings,
}

impl EngineConfig {
  /// Loads settings from `path`, falling back to defaults when the file
  /// is missing or does not parse. The result is always sanitized.
  pub fn load(path: &Path) -> Self {
    let config = match std::fs::read_to_string(path) {
      Ok(contents) => match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
          log::warn!("failed to parse engine settings: {e}, using defaults");
          Self::default()
        }
      },
      Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
      Err(e) => {
        log::warn!("failed to read engine settings: {e}, using defaults");
        Self::default()
      }
    };
    config.sanitized()
  }

  /// Writes settings to `path` as pretty TOML.
  pub fn save(&self, path: &Path) -> io::Result<()> {
    let contents = toml::to_string_pretty(self).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
  }

  /// Enforces the settings invariants, logging any adjustment.
  ///
  /// `step <= max` and `min_zoom <= max_zoom`; zeros and inverted
  /// ranges come from hand-edited files.
  pub fn sanitized(mut self) -> Self {
    if self.debounce.step_ms == 0 {
      log::warn!("debounce step of 0ms clamped to 1ms");
      self.debounce.step_ms = 1;
    }
    if self.debounce.max_ms < self.debounce.step_ms {
      log::warn!(
        "debounce max {}ms below step {}ms, raising to step",
        self.debounce.max_ms,
        self.debounce.step_ms
      );
      self.debounce.max_ms = self.debounce.step_ms;
    }
    if !(self.viewport.min_zoom > 0.0) {
      log::warn!("non-positive min_zoom replaced with default");
      self.viewport.min_zoom = ViewportSettings::default().min_zoom;
    }
    if self.viewport.max_zoom < self.viewport.min_zoom {
      log::warn!(
        "max_zoom {} below min_zoom {}, raising to min_zoom",
        self.viewport.max_zoom,
        self.viewport.min_zoom
      );
      self.viewport.max_zoom = self.viewport.min_zoom;
    }
    self
  }
}
