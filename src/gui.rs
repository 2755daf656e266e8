//! Debug overlay drawn with egui.
//!
//! Shows frame statistics, arena usage and the camera state, and exposes a few
//! live settings. The overlay never touches engine state directly: it edits an
//! [`OverlayState`] and reports what changed through [`OverlayChanges`].

use crate::camera::{Camera, LookMode};

/// Settings the overlay lets the user edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayState {
  /// Vertical field of view in degrees
  pub fov:       f64,
  /// Toggle for wireframe rendering mode
  pub wireframe: bool,
  pub look_mode: LookMode,
  /// Distance moved per frame while a movement key is held
  pub speed:     f64,
  /// Whether the window is shown at all
  pub visible:   bool,
}

impl OverlayState {
  pub fn from_camera(camera: &Camera, fov: f64, wireframe: bool) -> Self {
    Self {
      fov,
      wireframe,
      look_mode: camera.look_mode,
      speed: camera.speed,
      visible: true,
    }
  }
}

/// Read-only numbers shown in the overlay.
#[derive(Debug, Clone, Default)]
pub struct OverlayStats<'a> {
  pub fps:                f64,
  pub frame_time_ms:      f64,
  pub device:             &'a str,
  pub permanent_used:     usize,
  pub permanent_size:     usize,
  pub assets_used:        usize,
  pub assets_size:        usize,
  pub object_count:       usize,
  /// Whether the GPU can draw in line mode
  pub supports_wireframe: bool,
}

/// Represents changes made in the overlay that the game has to apply.
#[derive(Debug, Default, PartialEq)]
pub struct OverlayChanges {
  pub wireframe:    Option<bool>,
  pub fov:          Option<f64>,
  pub look_mode:    Option<LookMode>,
  pub speed:        Option<f64>,
  /// Move the camera back to its configured start
  pub camera_reset: bool,
}

impl OverlayChanges {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

fn kib(bytes: usize) -> f64 {
  bytes as f64 / 1024.0
}

/// Lays out the overlay window for this frame.
pub fn draw_overlay(
  ctx: &egui::Context,
  state: &mut OverlayState,
  stats: &OverlayStats,
  camera: &Camera,
) -> OverlayChanges {
  let mut changes = OverlayChanges::default();
  if !state.visible {
    return changes;
  }

  egui::Window::new("Stats & Controls")
    .default_pos([10.0, 10.0])
    .show(ctx, |ui| {
      ui.heading("Performance");
      ui.label(format!("FPS: {:.1}", stats.fps));
      ui.label(format!("Frame Time: {:.2}ms", stats.frame_time_ms));
      ui.label(format!("Device: {}", stats.device));

      ui.separator();

      ui.heading("Memory");
      ui.label(format!(
        "Permanent: {:.1} / {:.1} KiB",
        kib(stats.permanent_used),
        kib(stats.permanent_size)
      ));
      ui.label(format!(
        "Assets: {:.1} / {:.1} KiB",
        kib(stats.assets_used),
        kib(stats.assets_size)
      ));
      ui.label(format!("Objects: {}", stats.object_count));

      ui.separator();

      ui.heading("Camera");
      ui.label(format!("X: {:.2}", camera.position.x));
      ui.label(format!("Y: {:.2}", camera.position.y));
      ui.label(format!("Z: {:.2}", camera.position.z));
      let q = camera.orientation;
      ui.label(format!(
        "Orientation: ({:.3}, {:.3}, {:.3}, {:.3})",
        q.x, q.y, q.z, q.w
      ));
      let (yaw, pitch) = camera.angles();
      if camera.look_mode == LookMode::Euler {
        ui.label(format!("Yaw: {:.1}°", yaw.to_degrees()));
        ui.label(format!("Pitch: {:.1}°", pitch.to_degrees()));
      }

      ui.horizontal(|ui| {
        ui.label("Speed:");
        if ui
          .add(egui::Slider::new(&mut state.speed, 0.01..=1.0).step_by(0.01))
          .changed()
        {
          changes.speed = Some(state.speed);
        }
      });

      ui.horizontal(|ui| {
        ui.label("Look:");
        let before = state.look_mode;
        ui.radio_value(&mut state.look_mode, LookMode::Local, "Local");
        ui.radio_value(&mut state.look_mode, LookMode::Euler, "Euler");
        if state.look_mode != before {
          changes.look_mode = Some(state.look_mode);
        }
      });

      ui.separator();

      ui.heading("Rendering");
      if stats.supports_wireframe {
        if ui.checkbox(&mut state.wireframe, "Wireframe Mode").changed() {
          changes.wireframe = Some(state.wireframe);
        }
      } else {
        ui.label("Wireframe not supported on this device");
      }

      ui.horizontal(|ui| {
        ui.label("Field of View:");
        if ui
          .add(egui::Slider::new(&mut state.fov, 30.0..=120.0).step_by(1.0))
          .changed()
        {
          changes.fov = Some(state.fov);
        }
      });

      ui.separator();

      ui.heading("Controls");
      ui.label("WASD - Move");
      ui.label("Right mouse - Look");
      ui.label("Escape - Release cursor");
      ui.label("F1 - Toggle this window");

      ui.separator();

      if ui.button("Reset Camera Position").clicked() {
        changes.camera_reset = true;
      }
    });

  changes
}

#[cfg(test)]
mod tests {
  use glam::{DMat4, DVec3};

  use super::*;

  fn camera() -> Camera {
    Camera::new(DMat4::IDENTITY, DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO)
  }

  fn run(state: &mut OverlayState) -> OverlayChanges {
    let ctx = egui::Context::default();
    let mut changes = OverlayChanges::default();
    let _ = ctx.run(egui::RawInput::default(), |ctx| {
      changes = draw_overlay(ctx, state, &OverlayStats::default(), &camera());
    });
    changes
  }

  #[test]
  fn untouched_overlay_reports_nothing() {
    let mut state = OverlayState::from_camera(&camera(), 45.0, false);
    let before = state;
    assert!(run(&mut state).is_empty());
    assert_eq!(state, before);
  }

  #[test]
  fn hidden_overlay_is_skipped() {
    let mut state = OverlayState {
      visible: false,
      ..OverlayState::from_camera(&camera(), 45.0, false)
    };
    assert!(run(&mut state).is_empty());
  }

  #[test]
  fn state_mirrors_camera() {
    let mut camera = camera();
    camera.speed = 0.25;
    camera.set_look_mode(LookMode::Euler);
    let state = OverlayState::from_camera(&camera, 60.0, true);
    assert_eq!(state.speed, 0.25);
    assert_eq!(state.look_mode, LookMode::Euler);
    assert!(state.wireframe && state.visible);
  }
}
