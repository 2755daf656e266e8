//! The boundary between the host and the game.
//!
//! The host owns the window, the event loop and everything in
//! [`EngineContext`]; the game only sees the context it is handed. State that
//! must survive a reload lives in [`EngineContext::memory`], never in the
//! module itself.

use std::{
  fs,
  path::{Path, PathBuf},
  time::SystemTime,
};

use log::{debug, info};

use crate::{
  config::EngineConfig,
  error::EngineError,
  input::InputState,
  memory::PersistentMemory,
  render::Renderer,
};

/// Interface version the host implements. Bump on any breaking change to
/// [`GameModule`] or [`EngineContext`].
pub const MODULE_API_VERSION: u32 = 1;

/// Per-frame timing, filled in by the host before `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTiming {
  /// Seconds since the previous frame.
  pub delta:       f64,
  /// Frames completed since startup.
  pub frame_count: u64,
  /// Frames per second, averaged over the last second.
  pub fps:         f64,
}

/// Everything the host shares with the game.
pub struct EngineContext {
  pub config:         EngineConfig,
  pub memory:         PersistentMemory,
  pub input:          InputState,
  pub timing:         FrameTiming,
  pub width:          u32,
  pub height:         u32,
  /// `None` until the window exists.
  pub renderer:       Option<Renderer>,
  /// Set by the game to ask the host to exit after this frame.
  pub exit_requested: bool,
}

impl EngineContext {
  /// Allocates the persistent block described by `config.memory`.
  pub fn new(config: EngineConfig) -> Self {
    let memory = PersistentMemory::new(config.memory.permanent_size);
    info!(
      "reserved {:.1} MiB of persistent memory",
      memory.size() as f64 / (1024.0 * 1024.0)
    );

    Self {
      width: config.window.width,
      height: config.window.height,
      config,
      memory,
      input: InputState::default(),
      timing: FrameTiming::default(),
      renderer: None,
      exit_requested: false,
    }
  }

  pub fn renderer(&mut self) -> Result<&mut Renderer, EngineError> {
    self.renderer.as_mut().ok_or(EngineError::NoRenderer)
  }

  pub fn aspect_ratio(&self) -> f64 {
    if self.height == 0 {
      1.0
    } else {
      self.width as f64 / self.height as f64
    }
  }
}

/// A game driven by the host.
///
/// `init` runs once, after the window and renderer exist. `update` runs once
/// per frame. `reload` runs when the configuration file changes on disk; the
/// persistent memory block is untouched across it.
pub trait GameModule {
  fn name(&self) -> &str;

  fn api_version(&self) -> u32 {
    MODULE_API_VERSION
  }

  fn init(&mut self, ctx: &mut EngineContext) -> Result<(), EngineError>;

  fn update(&mut self, ctx: &mut EngineContext) -> Result<(), EngineError>;

  fn reload(&mut self, _ctx: &mut EngineContext) -> Result<(), EngineError> {
    Ok(())
  }

  fn shutdown(&mut self, _ctx: &mut EngineContext) {}
}

/// Rejects modules built against another interface version.
pub fn check_module_version(module: &dyn GameModule) -> Result<(), EngineError> {
  let found = module.api_version();
  if found != MODULE_API_VERSION {
    return Err(EngineError::ModuleVersion {
      name: module.name().to_string(),
      found,
      expected: MODULE_API_VERSION,
    });
  }
  Ok(())
}

/// Polls a file's modification time.
#[derive(Debug)]
pub struct FileWatcher {
  path:          PathBuf,
  last_modified: Option<SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
  fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

impl FileWatcher {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let last_modified = modified(&path);
    debug!("watching '{}'", path.display());
    Self {
      path,
      last_modified,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// True once per change of the timestamp. A file that disappears is not a
  /// change; one that appears is.
  pub fn poll(&mut self) -> bool {
    match modified(&self.path) {
      Some(time) if self.last_modified != Some(time) => {
        self.last_modified = Some(time);
        true
      }
      _ => false,
    }
  }
}
