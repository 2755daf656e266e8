//! Engine configuration.
//!
//! Everything is optional: a missing file or a missing table falls back to the
//! defaults below, which reproduce the engine's built-in constants. The file is
//! `epsilon.toml` in the working directory unless `EPSILON_CONFIG` names
//! another path.
//!
//! ```toml
//! [window]
//! title = "epsilon"
//! target_fps = 60
//!
//! [camera]
//! position = [0.0, 1.0, 5.0]
//! look_mode = "euler"
//!
//! [input]
//! look = "always"
//!
//! [[scene.objects]]
//! mesh = "assets/cube.obj"
//! albedo = "assets/crate.png"
//!
//! [scene]
//! skybox = { hdr = "assets/studio.hdr" }
//! ```

use std::{
  fs,
  path::{Path, PathBuf},
};

use glam::DVec3;
use log::info;
use serde::Deserialize;

use crate::{camera::LookMode, error::ConfigError, input::KeyBindings};

pub const CONFIG_ENV_VAR: &str = "EPSILON_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "epsilon.toml";

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub window: WindowConfig,
  pub memory: MemoryConfig,
  pub camera: CameraConfig,
  pub input:  KeyBindings,
  pub render: RenderConfig,
  pub ibl:    IblConfig,
  pub scene:  SceneConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
  pub title:      String,
  pub width:      u32,
  pub height:     u32,
  /// Frame limiter target; 0 disables the limiter.
  pub target_fps: u32,
}

impl Default for WindowConfig {
  fn default() -> Self {
    Self {
      title:      "epsilon".to_string(),
      width:      1280,
      height:     720,
      target_fps: 0,
    }
  }
}

/// Sizes of the persistent block and the asset pool carved from it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
  pub permanent_size: usize,
  pub assets_size:    usize,
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self {
      permanent_size: 256 * MIB,
      assets_size:    192 * MIB,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
  pub position:    [f64; 3],
  pub target:      [f64; 3],
  /// Vertical field of view in degrees.
  pub fov:         f64,
  pub near:        f64,
  pub far:         f64,
  pub speed:       f64,
  pub sensitivity: f64,
  pub look_mode:   LookMode,
}

impl Default for CameraConfig {
  fn default() -> Self {
    Self {
      position:    [0.0, 0.0, 5.0],
      target:      [0.0, 0.0, 0.0],
      fov:         45.0,
      near:        0.1,
      far:         100.0,
      speed:       crate::camera::Camera::DEFAULT_SPEED,
      sensitivity: crate::camera::Camera::DEFAULT_SENSITIVITY,
      look_mode:   LookMode::Local,
    }
  }
}

impl CameraConfig {
  pub fn position(&self) -> DVec3 {
    DVec3::from_array(self.position)
  }

  pub fn target(&self) -> DVec3 {
    DVec3::from_array(self.target)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
  pub vsync:       bool,
  pub wireframe:   bool,
  pub clear_color: [f32; 4],
  /// Show the egui stats window.
  pub overlay:     bool,
}

impl Default for RenderConfig {
  fn default() -> Self {
    Self {
      vsync:       false,
      wireframe:   false,
      clear_color: [0.7, 0.2, 0.2, 1.0],
      overlay:     true,
    }
  }
}

/// Resolution and sample counts for the image-based-lighting precomputation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IblConfig {
  pub environment_size:        u32,
  pub irradiance_size:         u32,
  /// Angular step in radians of the irradiance hemisphere walk.
  pub irradiance_sample_delta: f32,
  pub prefilter_size:          u32,
  pub prefilter_mips:          u32,
  pub prefilter_samples:       u32,
  pub brdf_lut_size:           u32,
  pub brdf_samples:            u32,
}

impl Default for IblConfig {
  fn default() -> Self {
    Self {
      environment_size:        256,
      irradiance_size:         16,
      irradiance_sample_delta: 0.05,
      prefilter_size:          64,
      prefilter_mips:          5,
      prefilter_samples:       128,
      brdf_lut_size:           128,
      brdf_samples:            256,
    }
  }
}

/// Texture maps and scalar factors of one PBR material.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
  pub albedo:           Option<PathBuf>,
  pub normal:           Option<PathBuf>,
  pub metalness:        Option<PathBuf>,
  pub roughness:        Option<PathBuf>,
  pub albedo_factor:    Option<[f32; 4]>,
  pub metalness_factor: Option<f32>,
  pub roughness_factor: Option<f32>,
}

impl MaterialConfig {
  /// `(albedo, metalness, roughness)` multipliers.
  ///
  /// A factor that is not given is 1.0 when its map is present, otherwise a
  /// plain dielectric default.
  pub fn factors(&self) -> ([f32; 4], f32, f32) {
    let albedo = self.albedo_factor.unwrap_or([1.0; 4]);
    let metalness = self
      .metalness_factor
      .unwrap_or(if self.metalness.is_some() { 1.0 } else { 0.0 });
    let roughness = self
      .roughness_factor
      .unwrap_or(if self.roughness.is_some() { 1.0 } else { 0.5 });
    (albedo, metalness, roughness)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SceneObject {
  pub mesh:        PathBuf,
  #[serde(flatten)]
  pub material:    MaterialConfig,
  #[serde(default)]
  pub translation: [f32; 3],
  #[serde(default)]
  pub rotation:    [f32; 3],
  #[serde(default = "unit_scale")]
  pub scale:       f32,
}

fn unit_scale() -> f32 {
  1.0
}

/// Where the environment cubemap comes from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkyboxSource {
  /// Equirectangular (HDR or LDR) image.
  Hdr(PathBuf),
  /// Six images in +X, -X, +Y, -Y, +Z, -Z order.
  Faces([PathBuf; 6]),
  /// A generated sky gradient.
  #[default]
  Gradient,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
  pub objects: Vec<SceneObject>,
  pub skybox:  SkyboxSource,
}

impl Default for SceneConfig {
  fn default() -> Self {
    Self {
      objects: vec![SceneObject {
        mesh:        PathBuf::from("assets/cube.obj"),
        material:    MaterialConfig::default(),
        translation: [0.0; 3],
        rotation:    [0.0; 3],
        scale:       1.0,
      }],
      skybox:  SkyboxSource::Gradient,
    }
  }
}

impl EngineConfig {
  /// The config path from `EPSILON_CONFIG`, or `epsilon.toml`.
  pub fn default_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
      .map(PathBuf::from)
      .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
  }

  /// Reads `path`, or returns defaults when it does not exist.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      info!("no config at '{}', using defaults", path.display());
      let config = Self::default();
      config.validate()?;
      return Ok(config);
    }

    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = Self::from_toml(&text, path)?;
    info!("loaded config from '{}'", path.display());
    Ok(config)
  }

  /// Parses and validates TOML text; `origin` only labels errors.
  pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
      path: origin.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.memory.assets_size > self.memory.permanent_size {
      return Err(ConfigError::Invalid {
        field:  "memory.assets_size",
        reason: format!(
          "{} bytes does not fit in permanent_size {}",
          self.memory.assets_size, self.memory.permanent_size
        ),
      });
    }
    if self.window.width == 0 || self.window.height == 0 {
      return Err(ConfigError::Invalid {
        field:  "window",
        reason: "width and height must be non-zero".to_string(),
      });
    }
    if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
      return Err(ConfigError::Invalid {
        field:  "camera.near",
        reason: format!("need 0 < near < far, got {} and {}", self.camera.near, self.camera.far),
      });
    }
    if !(1.0..179.0).contains(&self.camera.fov) {
      return Err(ConfigError::Invalid {
        field:  "camera.fov",
        reason: format!("{} degrees is out of range", self.camera.fov),
      });
    }
    if self.camera.position() == self.camera.target() {
      return Err(ConfigError::Invalid {
        field:  "camera.target",
        reason: "target must differ from position".to_string(),
      });
    }
    if self.ibl.prefilter_mips == 0
      || self.ibl.prefilter_size.checked_shr(self.ibl.prefilter_mips - 1).unwrap_or(0) == 0
    {
      return Err(ConfigError::Invalid {
        field:  "ibl.prefilter_mips",
        reason: format!(
          "{} mips do not fit a {}px prefilter map",
          self.ibl.prefilter_mips, self.ibl.prefilter_size
        ),
      });
    }
    for (field, value) in [
      ("ibl.environment_size", self.ibl.environment_size),
      ("ibl.irradiance_size", self.ibl.irradiance_size),
      ("ibl.brdf_lut_size", self.ibl.brdf_lut_size),
      ("ibl.brdf_samples", self.ibl.brdf_samples),
    ] {
      if value == 0 {
        return Err(ConfigError::Invalid {
          field,
          reason: "must be non-zero".to_string(),
        });
      }
    }
    if !(self.ibl.irradiance_sample_delta > 0.0) {
      return Err(ConfigError::Invalid {
        field:  "ibl.irradiance_sample_delta",
        reason: "must be positive".to_string(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::{Key, LookTrigger, MouseButton};

  fn parse(text: &str) -> Result<EngineConfig, ConfigError> {
    EngineConfig::from_toml(text, Path::new("test.toml"))
  }

  #[test]
  fn empty_file_gives_defaults() {
    let config = parse("").unwrap();
    assert_eq!(config.window, WindowConfig::default());
    assert_eq!(config.camera.position(), DVec3::new(0.0, 0.0, 5.0));
    assert_eq!(config.camera.speed, 0.1);
    assert_eq!(config.input, KeyBindings::default());
    assert_eq!(config.scene.skybox, SkyboxSource::Gradient);
    assert_eq!(config.scene.objects.len(), 1);
  }

  #[test]
  fn tables_override_fields() {
    let config = parse(
      r#"
        [window]
        width = 800
        target_fps = 60

        [camera]
        look_mode = "euler"
        sensitivity = 0.25

        [input]
        forward = "Up"
        look = "always"

        [scene]
        skybox = { hdr = "assets/env.hdr" }

        [[scene.objects]]
        mesh = "assets/helmet.obj"
        albedo = "assets/helmet_albedo.png"
        roughness_factor = 0.3
        translation = [1.0, 0.0, -2.0]
      "#,
    )
    .unwrap();

    assert_eq!(config.window.width, 800);
    assert_eq!(config.window.height, 720);
    assert_eq!(config.window.target_fps, 60);
    assert_eq!(config.camera.look_mode, LookMode::Euler);
    assert_eq!(config.camera.sensitivity, 0.25);
    assert_eq!(config.input.forward, Key::Up);
    assert_eq!(config.input.backward, Key::S);
    assert_eq!(config.input.look, LookTrigger::Always);
    assert_eq!(config.scene.skybox, SkyboxSource::Hdr("assets/env.hdr".into()));

    let object = &config.scene.objects[0];
    assert_eq!(object.mesh, PathBuf::from("assets/helmet.obj"));
    assert_eq!(object.scale, 1.0);
    assert_eq!(object.translation, [1.0, 0.0, -2.0]);
    assert_eq!(object.material.factors(), ([1.0; 4], 0.0, 0.3));
  }

  #[test]
  fn look_button_and_faces_parse() {
    let config = parse(
      r#"
        [input]
        look = { held = "middle" }

        [scene]
        objects = []
        skybox = { faces = ["r.jpg", "l.jpg", "t.jpg", "b.jpg", "f.jpg", "k.jpg"] }
      "#,
    )
    .unwrap();
    assert_eq!(config.input.look, LookTrigger::Held(MouseButton::Middle));
    assert!(matches!(config.scene.skybox, SkyboxSource::Faces(ref faces) if faces[5] == PathBuf::from("k.jpg")));
    assert!(config.scene.objects.is_empty());
  }

  #[test]
  fn material_factor_defaults_follow_maps() {
    let material = MaterialConfig {
      metalness: Some("m.png".into()),
      roughness: Some("r.png".into()),
      ..Default::default()
    };
    assert_eq!(material.factors(), ([1.0; 4], 1.0, 1.0));
    assert_eq!(MaterialConfig::default().factors(), ([1.0; 4], 0.0, 0.5));
  }

  #[test]
  fn rejects_inconsistent_values() {
    assert!(matches!(
      parse("[memory]\npermanent_size = 10\nassets_size = 20"),
      Err(ConfigError::Invalid { field: "memory.assets_size", .. })
    ));
    assert!(matches!(
      parse("[camera]\nnear = 5.0\nfar = 1.0"),
      Err(ConfigError::Invalid { field: "camera.near", .. })
    ));
    assert!(matches!(
      parse("[camera]\ntarget = [0.0, 0.0, 5.0]"),
      Err(ConfigError::Invalid { field: "camera.target", .. })
    ));
    assert!(matches!(
      parse("[ibl]\nprefilter_size = 8\nprefilter_mips = 6"),
      Err(ConfigError::Invalid { field: "ibl.prefilter_mips", .. })
    ));
    assert!(matches!(parse("[window]\nwidth = \"wide\""), Err(ConfigError::Parse { .. })));
  }

  #[test]
  fn rejects_empty_ibl_maps_and_sample_counts() {
    for (text, expected) in [
      ("[ibl]\nbrdf_samples = 0", "ibl.brdf_samples"),
      ("[ibl]\nenvironment_size = 0", "ibl.environment_size"),
      ("[ibl]\nirradiance_size = 0", "ibl.irradiance_size"),
      ("[ibl]\nbrdf_lut_size = 0", "ibl.brdf_lut_size"),
      ("[ibl]\nirradiance_sample_delta = nan", "ibl.irradiance_sample_delta"),
    ] {
      match parse(text) {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
        other => panic!("{text:?} gave {other:?}"),
      }
    }
  }

  #[test]
  fn top_down_camera_is_accepted() {
    let config = parse("[camera]\nposition = [0.0, 5.0, 0.0]\ntarget = [0.0, 0.0, 0.0]").unwrap();
    let camera = crate::camera::Camera::new(
      glam::DMat4::IDENTITY,
      config.camera.position(),
      config.camera.target(),
    );
    assert!(camera.orientation.is_finite());
    assert!(camera.view_matrix.is_finite());
  }

  #[test]
  fn missing_file_means_defaults() {
    let path = std::env::temp_dir().join("epsilon-config-that-does-not-exist.toml");
    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.memory, MemoryConfig::default());
  }

  #[test]
  fn shipped_config_parses() {
    let config = parse(include_str!("../epsilon.toml")).unwrap();
    assert_eq!(config.memory, MemoryConfig::default());
    assert_eq!(config.scene.skybox, SkyboxSource::Gradient);
    assert_eq!(config.scene.objects.len(), 2);
    assert_eq!(config.scene.objects[1].scale, 0.75);
  }
}
