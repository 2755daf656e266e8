//! Error types shared across the engine.
//!
//! Every failure in the engine is fatal to the process: errors travel up to the
//! host through `?`, get logged once, and the event loop exits. The enums exist
//! so the log line says what actually went wrong.

use std::{fmt::Debug, path::PathBuf};

use thiserror::Error;

/// Errors raised by [`crate::memory::MemoryArena`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
  /// The request does not fit in the remaining capacity.
  #[error("arena exhausted: requested {requested} bytes, {used} of {size} already used")]
  OutOfMemory {
    /// Bytes requested by the failing call.
    requested: usize,
    /// Bytes in use before the call.
    used:      usize,
    /// Total capacity of the arena.
    size:      usize,
  },

  /// A sub-arena or typed array size overflowed `usize`.
  #[error("arena request size overflows: {count} x {stride} bytes")]
  SizeOverflow {
    /// Number of elements requested.
    count:  usize,
    /// Size of one element.
    stride: usize,
  },
}

/// Errors raised while loading OBJ meshes.
#[derive(Error, Debug)]
pub enum MeshError {
  /// The OBJ file could not be read or parsed.
  #[error("failed to load mesh '{path}': {source}")]
  Load {
    /// File that failed.
    path:   PathBuf,
    /// Parser error.
    #[source]
    source: tobj::LoadError,
  },

  /// A face references an attribute that does not exist.
  #[error("mesh '{path}' references {attribute} index {index} but only {available} exist")]
  IndexOutOfRange {
    /// File that failed.
    path:      PathBuf,
    /// Which attribute list was indexed.
    attribute: &'static str,
    /// The offending (0-based) index.
    index:     u32,
    /// Length of the attribute list.
    available: usize,
  },

  /// Storing the mesh in the asset arena failed.
  #[error(transparent)]
  Arena(#[from] ArenaError),
}

/// Errors raised while reading the engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// The config file exists but could not be read.
  #[error("failed to read config '{path}': {source}")]
  Read {
    /// Config file path.
    path:   PathBuf,
    /// I/O error.
    #[source]
    source: std::io::Error,
  },

  /// The config file is not valid TOML for [`crate::config::EngineConfig`].
  #[error("invalid config '{path}': {source}")]
  Parse {
    /// Config file path.
    path:   PathBuf,
    /// Deserialization error.
    #[source]
    source: toml::de::Error,
  },

  /// A value parsed but makes no sense.
  #[error("invalid config value for {field}: {reason}")]
  Invalid {
    /// Dotted field name.
    field:  &'static str,
    /// What is wrong with it.
    reason: String,
  },
}

/// Errors raised while decoding image assets.
#[derive(Error, Debug)]
pub enum AssetError {
  /// The image could not be opened or decoded.
  #[error("failed to load image '{path}': {source}")]
  Image {
    /// Image path.
    path:   PathBuf,
    /// Decoder error.
    #[source]
    source: image::ImageError,
  },

  /// Six cubemap faces were given but they are not square and equally sized.
  #[error("cubemap face '{path}' is {width}x{height}, expected {expected}x{expected}")]
  CubemapFace {
    /// Offending face image.
    path:     PathBuf,
    /// Face width.
    width:    u32,
    /// Face height.
    height:   u32,
    /// Size of the first face.
    expected: u32,
  },
}

/// Errors raised by the GPU layer.
#[derive(Error, Debug)]
pub enum RenderError {
  /// A Vulkan call failed.
  #[error("{what} failed: {details}")]
  Gpu {
    /// The operation that failed.
    what:    &'static str,
    /// Debug rendering of the underlying vulkano error.
    details: String,
  },

  /// No physical device can render to the window surface.
  #[error("no Vulkan device with graphics and presentation support")]
  NoSuitableDevice,

  /// Image decoding failed during upload.
  #[error(transparent)]
  Asset(#[from] AssetError),
}

/// Top-level error returned by the host and the game module.
#[derive(Error, Debug)]
pub enum EngineError {
  /// See [`ArenaError`].
  #[error(transparent)]
  Arena(#[from] ArenaError),
  /// See [`MeshError`].
  #[error(transparent)]
  Mesh(#[from] MeshError),
  /// See [`ConfigError`].
  #[error(transparent)]
  Config(#[from] ConfigError),
  /// See [`AssetError`].
  #[error(transparent)]
  Asset(#[from] AssetError),
  /// See [`RenderError`].
  #[error(transparent)]
  Render(#[from] RenderError),

  /// The game module was built against a different host interface.
  #[error("game module '{name}' implements interface v{found}, host expects v{expected}")]
  ModuleVersion {
    /// Module name.
    name:     String,
    /// Version reported by the module.
    found:    u32,
    /// Version this host implements.
    expected: u32,
  },

  /// `update` or `reload` ran before `init` succeeded.
  #[error("game module '{0}' is not initialized")]
  NotInitialized(String),

  /// The module asked for something that needs a window before one exists.
  #[error("renderer is not available yet")]
  NoRenderer,

  /// Window creation or the event loop failed.
  #[error("platform error: {0}")]
  Platform(String),
}

/// Folds vulkano's many error types into [`RenderError::Gpu`].
pub(crate) trait GpuResultExt<T> {
  fn gpu(self, what: &'static str) -> Result<T, RenderError>;
}

impl<T, E: Debug> GpuResultExt<T> for Result<T, E> {
  fn gpu(self, what: &'static str) -> Result<T, RenderError> {
    self.map_err(|e| RenderError::Gpu {
      what,
      details: format!("{e:?}"),
    })
  }
}

impl<T> GpuResultExt<T> for Option<T> {
  fn gpu(self, what: &'static str) -> Result<T, RenderError> {
    self.ok_or(RenderError::Gpu {
      what,
      details: "no value".to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arena_error_message_names_sizes() {
    let err = ArenaError::OutOfMemory {
      requested: 40,
      used:      80,
      size:      100,
    };
    assert_eq!(
      err.to_string(),
      "arena exhausted: requested 40 bytes, 80 of 100 already used"
    );
  }

  #[test]
  fn gpu_ext_wraps_debug_output() {
    let result: Result<(), &str> = Err("device lost");
    let err = result.gpu("queue submit").unwrap_err();
    assert_eq!(err.to_string(), "queue submit failed: \"device lost\"");

    let none: Option<u32> = None;
    assert!(matches!(none.gpu("pick queue"), Err(RenderError::Gpu { what: "pick queue", .. })));
  }

  #[test]
  fn engine_error_is_transparent_for_arena() {
    let err: EngineError = ArenaError::SizeOverflow {
      count:  usize::MAX,
      stride: 2,
    }
    .into();
    assert!(err.to_string().starts_with("arena request size overflows"));
  }
}
