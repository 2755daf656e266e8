//! The demo game: OBJ meshes with PBR materials under an image-lit sky,
//! viewed through the free-fly camera.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
  time::Instant,
};

use glam::{EulerRot, Mat4, Quat, Vec3};
use log::{debug, info, warn};
use vulkano::image::view::ImageView;

use crate::{
  assets::{load_environment, load_rgba8},
  camera::{Camera, Perspective},
  config::{CameraConfig, EngineConfig, IblConfig, MaterialConfig, MemoryConfig, SceneConfig, SceneObject},
  error::EngineError,
  gui::{OverlayChanges, OverlayState, OverlayStats, draw_overlay},
  ibl::EnvironmentMaps,
  input::Key,
  memory::MemoryArena,
  mesh::MeshData,
  module::{EngineContext, GameModule},
  platform::apply_sticks,
  render::{DrawCall, FrameParams, GpuEnvironment, GpuMaterial, GpuMesh, Renderer},
};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];
/// Tangent-space +Z.
const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];

/// Key that shows and hides the overlay.
pub const OVERLAY_TOGGLE: Key = Key::F1;

/// Where one material map comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextureSource {
  File { path: PathBuf, srgb: bool },
  Solid { rgba: [u8; 4], srgb: bool },
}

impl TextureSource {
  fn new(path: Option<&Path>, fallback: [u8; 4], srgb: bool) -> Self {
    match path {
      Some(path) => Self::File {
        path: path.to_path_buf(),
        srgb,
      },
      None => Self::Solid {
        rgba: fallback,
        srgb,
      },
    }
  }
}

/// Albedo, normal, metalness and roughness sources, in that order.
///
/// Albedo is color data and sampled as sRGB; the other maps are linear.
/// Missing maps become white albedo, a flat normal, zero metalness and full
/// roughness, which the material factors then scale.
pub fn material_sources(material: &MaterialConfig) -> [TextureSource; 4] {
  [
    TextureSource::new(material.albedo.as_deref(), WHITE, true),
    TextureSource::new(material.normal.as_deref(), FLAT_NORMAL, false),
    TextureSource::new(material.metalness.as_deref(), BLACK, false),
    TextureSource::new(material.roughness.as_deref(), WHITE, false),
  ]
}

/// Scale, then rotation, then translation.
///
/// `rotation` is in degrees and composes as `Rx * Ry * Rz`, so a point turns
/// about the world Z axis first, then Y, then X.
pub fn object_world(object: &SceneObject) -> Mat4 {
  let [x, y, z] = object.rotation.map(f32::to_radians);
  Mat4::from_scale_rotation_translation(
    Vec3::splat(object.scale),
    Quat::from_euler(EulerRot::XYZ, x, y, z),
    Vec3::from_array(object.translation),
  )
}

pub fn perspective(config: &CameraConfig, fov: f64, aspect: f64) -> Perspective {
  Perspective {
    fov,
    aspect,
    near: config.near,
    far: config.far,
  }
}

/// Copies the tunable camera settings from config. Position and orientation
/// are left alone.
pub fn apply_camera_settings(camera: &mut Camera, config: &CameraConfig) {
  camera.speed = config.speed;
  camera.sensitivity = config.sensitivity;
  camera.set_look_mode(config.look_mode);
}

/// Uploads each distinct texture once.
struct TextureCache<'a> {
  renderer: &'a Renderer,
  loaded:   HashMap<TextureSource, Arc<ImageView>>,
}

impl<'a> TextureCache<'a> {
  fn new(renderer: &'a Renderer) -> Self {
    Self {
      renderer,
      loaded: HashMap::new(),
    }
  }

  fn get(&mut self, source: TextureSource) -> Result<Arc<ImageView>, EngineError> {
    if let Some(view) = self.loaded.get(&source) {
      return Ok(view.clone());
    }

    let view = match &source {
      TextureSource::File { path, srgb } => self.renderer.texture_rgba8(&load_rgba8(path)?, *srgb)?,
      TextureSource::Solid { rgba, srgb } => self.renderer.solid_texture(*rgba, *srgb)?,
    };
    self.loaded.insert(source, view.clone());
    Ok(view)
  }

  fn material(&mut self, config: &MaterialConfig) -> Result<GpuMaterial, EngineError> {
    let [albedo, normal, metalness, roughness] = material_sources(config);
    let has_normal_map = matches!(normal, TextureSource::File { .. });
    let (albedo_factor, metalness_factor, roughness_factor) = config.factors();

    Ok(GpuMaterial {
      albedo: self.get(albedo)?,
      normal: self.get(normal)?,
      metalness: self.get(metalness)?,
      roughness: self.get(roughness)?,
      albedo_factor,
      metalness_factor,
      roughness_factor,
      has_normal_map,
    })
  }
}

struct Instance {
  mesh:     usize,
  material: GpuMaterial,
  world:    Mat4,
}

/// Everything `init` builds.
struct Scene {
  camera:      Camera,
  perspective: Perspective,
  meshes:      Vec<GpuMesh>,
  instances:   Vec<Instance>,
  environment: GpuEnvironment,
  assets:      MemoryArena,
  overlay:     OverlayState,
  device:      String,
  /// Settings the scene was built from; changing them needs a restart.
  built_from:  (SceneConfig, IblConfig, MemoryConfig),
}

impl Scene {
  fn load(ctx: &mut EngineContext) -> Result<Self, EngineError> {
    let config = &ctx.config;
    let renderer = ctx.renderer.as_ref().ok_or(EngineError::NoRenderer)?;
    let mut assets = ctx.memory.permanent().sub_arena(config.memory.assets_size)?;

    let perspective = perspective(&config.camera, config.camera.fov, renderer.aspect_ratio());
    let mut camera = Camera::new(
      perspective.matrix(),
      config.camera.position(),
      config.camera.target(),
    );
    apply_camera_settings(&mut camera, &config.camera);

    let mut meshes = Vec::new();
    let mut mesh_slots: HashMap<&Path, usize> = HashMap::new();
    let mut textures = TextureCache::new(renderer);
    let mut instances = Vec::with_capacity(config.scene.objects.len());

    for object in &config.scene.objects {
      let mesh = match mesh_slots.get(object.mesh.as_path()) {
        Some(&slot) => slot,
        None => {
          let stored = MeshData::load(&object.mesh)?.store(&mut ctx.memory, &mut assets)?;
          let vertices = stored.vertices(&ctx.memory);
          let indices = stored.indices(&ctx.memory);
          meshes.push(renderer.upload_mesh(&vertices, &indices)?);
          info!(
            "loaded mesh '{}' ({} vertices)",
            object.mesh.display(),
            stored.vertex_count
          );
          mesh_slots.insert(&object.mesh, meshes.len() - 1);
          meshes.len() - 1
        }
      };

      instances.push(Instance {
        mesh,
        material: textures.material(&object.material)?,
        world: object_world(object),
      });
    }
    debug!("{} distinct textures uploaded", textures.loaded.len());

    let started = Instant::now();
    let source = load_environment(&config.scene.skybox, config.ibl.environment_size)?;
    let maps = EnvironmentMaps::compute(source, &config.ibl);
    info!("precomputed environment lighting in {:.2?}", started.elapsed());
    let environment = renderer.upload_environment(&maps)?;

    info!(
      "assets arena: {} of {} bytes used",
      assets.used(),
      assets.size()
    );

    let overlay = OverlayState {
      visible: config.render.overlay,
      ..OverlayState::from_camera(&camera, config.camera.fov, renderer.wireframe())
    };

    Ok(Self {
      camera,
      perspective,
      meshes,
      instances,
      environment,
      assets,
      overlay,
      device: renderer.device_name(),
      built_from: (config.scene.clone(), config.ibl.clone(), config.memory.clone()),
    })
  }

  fn apply_overlay(&mut self, changes: OverlayChanges, renderer: &mut Renderer, config: &CameraConfig) {
    if let Some(wireframe) = changes.wireframe {
      renderer.set_wireframe(wireframe);
    }
    if let Some(fov) = changes.fov {
      self.perspective.fov = fov;
      self.camera.set_projection(&self.perspective);
    }
    if let Some(look_mode) = changes.look_mode {
      self.camera.set_look_mode(look_mode);
    }
    if let Some(speed) = changes.speed {
      self.camera.speed = speed;
    }
    if changes.camera_reset {
      self.camera.reset(config.position(), config.target());
    }
  }
}

/// The game module the `epsilon` binary runs.
#[derive(Default)]
pub struct Epsilon {
  scene: Option<Scene>,
}

impl Epsilon {
  pub fn new() -> Self {
    Self::default()
  }

  fn scene(&mut self) -> Result<&mut Scene, EngineError> {
    let name = self.name().to_string();
    self.scene.as_mut().ok_or(EngineError::NotInitialized(name))
  }
}

impl GameModule for Epsilon {
  fn name(&self) -> &str {
    "epsilon"
  }

  fn init(&mut self, ctx: &mut EngineContext) -> Result<(), EngineError> {
    let started = Instant::now();
    let scene = Scene::load(ctx)?;
    info!(
      "scene ready: {} objects, {} meshes, in {:.2?}",
      scene.instances.len(),
      scene.meshes.len(),
      started.elapsed()
    );
    self.scene = Some(scene);
    Ok(())
  }

  fn update(&mut self, ctx: &mut EngineContext) -> Result<(), EngineError> {
    let scene = self.scene()?;
    let renderer = ctx.renderer.as_mut().ok_or(EngineError::NoRenderer)?;

    let aspect = renderer.aspect_ratio();
    if aspect != scene.perspective.aspect {
      scene.perspective.aspect = aspect;
      scene.camera.set_projection(&scene.perspective);
    }

    if ctx.input.was_key_pressed(OVERLAY_TOGGLE) {
      scene.overlay.visible = !scene.overlay.visible;
    }

    let input = apply_sticks(
      ctx.config.input.camera_input(&ctx.input),
      ctx.input.left_stick,
      ctx.input.right_stick,
    );
    scene.camera.update(&input);

    let stats = OverlayStats {
      fps:                ctx.timing.fps,
      frame_time_ms:      ctx.timing.delta * 1000.0,
      device:             &scene.device,
      permanent_used:     ctx.memory.permanent_used(),
      permanent_size:     ctx.memory.size(),
      assets_used:        scene.assets.used(),
      assets_size:        scene.assets.size(),
      object_count:       scene.instances.len(),
      supports_wireframe: renderer.supports_wireframe(),
    };
    let mut changes = OverlayChanges::default();
    let overlay = &mut scene.overlay;
    let camera = &scene.camera;
    renderer.overlay(|ui_ctx| changes = draw_overlay(ui_ctx, overlay, &stats, camera));
    if !changes.is_empty() {
      scene.apply_overlay(changes, renderer, &ctx.config.camera);
    }

    let frame = FrameParams {
      view:            scene.camera.view_matrix.as_mat4(),
      projection:      scene.camera.projection_matrix.as_mat4(),
      camera_position: scene.camera.position.as_vec3(),
    };
    let draws: Vec<DrawCall> = scene
      .instances
      .iter()
      .filter_map(|instance| {
        Some(DrawCall {
          mesh:     scene.meshes.get(instance.mesh)?,
          material: &instance.material,
          world:    instance.world,
        })
      })
      .collect();

    renderer.draw_frame(&frame, &draws, &scene.environment)?;
    Ok(())
  }

  fn reload(&mut self, ctx: &mut EngineContext) -> Result<(), EngineError> {
    let scene = self.scene()?;
    let config: &EngineConfig = &ctx.config;

    apply_camera_settings(&mut scene.camera, &config.camera);
    scene.perspective = perspective(&config.camera, config.camera.fov, scene.perspective.aspect);
    scene.camera.set_projection(&scene.perspective);

    if let Some(renderer) = ctx.renderer.as_mut() {
      renderer.set_clear_color(config.render.clear_color);
      renderer.set_wireframe(config.render.wireframe);
      scene.overlay = OverlayState {
        visible: scene.overlay.visible,
        ..OverlayState::from_camera(&scene.camera, config.camera.fov, renderer.wireframe())
      };
    }

    let (built_scene, built_ibl, built_memory) = &scene.built_from;
    if *built_scene != config.scene || *built_ibl != config.ibl || *built_memory != config.memory {
      warn!("scene, lighting and memory settings take effect after a restart");
    }
    info!("applied new settings");
    Ok(())
  }

  fn shutdown(&mut self, ctx: &mut EngineContext) {
    if let Some(scene) = &self.scene {
      info!(
        "shutting down after {} frames; arena {} of {} bytes, assets {} of {} bytes",
        ctx.timing.frame_count,
        ctx.memory.permanent_used(),
        ctx.memory.size(),
        scene.assets.used(),
        scene.assets.size()
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use glam::{DMat4, DVec3, Vec4};

  use super::*;
  use crate::camera::LookMode;

  fn object() -> SceneObject {
    SceneObject {
      mesh:        PathBuf::from("assets/cube.obj"),
      material:    MaterialConfig::default(),
      translation: [0.0; 3],
      rotation:    [0.0; 3],
      scale:       1.0,
    }
  }

  #[test]
  fn missing_maps_use_neutral_fallbacks() {
    let material = MaterialConfig {
      normal: Some(PathBuf::from("n.png")),
      ..MaterialConfig::default()
    };
    let [albedo, normal, metalness, roughness] = material_sources(&material);
    assert_eq!(albedo, TextureSource::Solid {
      rgba: WHITE,
      srgb: true,
    });
    assert_eq!(normal, TextureSource::File {
      path: PathBuf::from("n.png"),
      srgb: false,
    });
    assert_eq!(metalness, TextureSource::Solid {
      rgba: BLACK,
      srgb: false,
    });
    assert_eq!(roughness, TextureSource::Solid {
      rgba: WHITE,
      srgb: false,
    });
  }

  #[test]
  fn world_matrix_scales_rotates_then_translates() {
    let object = SceneObject {
      translation: [1.0, 2.0, 3.0],
      rotation: [0.0, 90.0, 0.0],
      scale: 2.0,
      ..object()
    };
    let moved = object_world(&object) * Vec4::new(1.0, 0.0, 0.0, 1.0);
    assert!(moved.abs_diff_eq(Vec4::new(1.0, 2.0, 1.0, 1.0), 1e-5));

    assert_eq!(object_world(&self::object()), Mat4::IDENTITY);
  }

  #[test]
  fn world_rotation_turns_about_z_then_y_then_x() {
    let object = SceneObject {
      rotation: [90.0, 90.0, 0.0],
      ..object()
    };
    let turned = object_world(&object) * Vec4::new(1.0, 0.0, 0.0, 0.0);
    assert!(turned.abs_diff_eq(Vec4::new(0.0, 1.0, 0.0, 0.0), 1e-5), "{turned}");

    let object = SceneObject {
      rotation: [0.0, 90.0, 90.0],
      ..self::object()
    };
    let turned = object_world(&object) * Vec4::new(1.0, 0.0, 0.0, 0.0);
    assert!(turned.abs_diff_eq(Vec4::new(0.0, 1.0, 0.0, 0.0), 1e-5), "{turned}");
  }

  #[test]
  fn camera_settings_follow_config() {
    let mut camera = Camera::new(DMat4::IDENTITY, DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO);
    let config = CameraConfig {
      speed: 0.5,
      sensitivity: 0.2,
      look_mode: LookMode::Euler,
      ..CameraConfig::default()
    };
    let position = camera.position;
    apply_camera_settings(&mut camera, &config);
    assert_eq!(camera.speed, 0.5);
    assert_eq!(camera.sensitivity, 0.2);
    assert_eq!(camera.look_mode, LookMode::Euler);
    assert_eq!(camera.position, position);
  }

  #[test]
  fn perspective_takes_clip_planes_from_config() {
    let config = CameraConfig::default();
    let p = perspective(&config, 60.0, 2.0);
    assert_eq!((p.fov, p.aspect, p.near, p.far), (60.0, 2.0, config.near, config.far));
  }

  #[test]
  fn update_before_init_is_an_error() {
    let mut config = EngineConfig::default();
    config.memory.permanent_size = 1024;
    config.memory.assets_size = 512;
    let mut ctx = EngineContext::new(config);
    let mut game = Epsilon::new();
    assert!(matches!(game.update(&mut ctx), Err(EngineError::NotInitialized(_))));
    assert!(matches!(game.init(&mut ctx), Err(EngineError::NoRenderer)));
  }
}
