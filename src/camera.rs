//! Quaternion first-person camera.
//!
//! The camera keeps its orientation as a unit quaternion that maps world space
//! into view space. Every frame [`Camera::update`] moves the position along the
//! view-space axes selected by the held movement keys, folds the cursor delta
//! into the orientation, renormalizes it and rebuilds the view matrix.
//!
//! # Example
//! ```
//! use epsilon::camera::{Camera, CameraInput};
//! use glam::{DMat4, DVec3};
//!
//! let projection = DMat4::perspective_rh(45f64.to_radians(), 16.0 / 9.0, 0.1, 100.0);
//! let mut camera = Camera::new(projection, DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO);
//!
//! camera.update(&CameraInput { forward: true, ..Default::default() });
//! assert!(camera.position.z < 5.0);
//! ```

use glam::{DMat4, DQuat, DVec2, DVec3};
use serde::Deserialize;

/// How cursor movement turns into rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookMode {
  /// Yaw and pitch are combined into one local rotation per frame and
  /// multiplied onto the orientation. Can pick up roll over long sessions.
  #[default]
  Local,
  /// Yaw and pitch are accumulated as angles (pitch clamped) and the
  /// orientation is rebuilt from them every frame. Never rolls.
  Euler,
}

/// One frame's worth of camera requests, already mapped from raw input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraInput {
  pub forward:    bool,
  pub backward:   bool,
  pub left:       bool,
  pub right:      bool,
  /// Raw mouse motion counts since the last frame.
  pub look_delta: DVec2,
}

/// Parameters of the perspective projection, kept so it can be rebuilt on resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perspective {
  /// Vertical field of view in degrees.
  pub fov:    f64,
  pub aspect: f64,
  pub near:   f64,
  pub far:    f64,
}

impl Perspective {
  /// Right-handed projection with Vulkan clip conventions (depth 0..1, Y down).
  pub fn matrix(&self) -> DMat4 {
    let mut projection = DMat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far);
    projection.y_axis.y *= -1.0;
    projection
  }
}

const PITCH_LIMIT_DEGREES: f64 = 89.0;

/// A free-fly camera.
#[derive(Debug, Clone)]
pub struct Camera {
  /// Position in world space
  pub position:          DVec3,
  /// World-to-view rotation, unit length after every update
  pub orientation:       DQuat,
  /// `rotation(orientation) * translate(-position)`
  pub view_matrix:       DMat4,
  pub projection_matrix: DMat4,
  /// Distance moved per frame while a movement key is held
  pub speed:             f64,
  /// Degrees of rotation per raw mouse count
  pub sensitivity:       f64,
  pub look_mode:         LookMode,
  yaw:                   f64,
  pitch:                 f64,
}

impl Camera {
  pub const DEFAULT_SPEED: f64 = 0.1;
  pub const DEFAULT_SENSITIVITY: f64 = 0.1;

  /// Creates a camera at `position` looking at `target`.
  ///
  /// The initial orientation is extracted from the look-at view matrix.
  pub fn new(projection: DMat4, position: DVec3, target: DVec3) -> Self {
    let mut camera = Self {
      position,
      orientation: DQuat::IDENTITY,
      view_matrix: DMat4::IDENTITY,
      projection_matrix: projection,
      speed: Self::DEFAULT_SPEED,
      sensitivity: Self::DEFAULT_SENSITIVITY,
      look_mode: LookMode::default(),
      yaw: 0.0,
      pitch: 0.0,
    };
    camera.reset(position, target);
    camera
  }

  /// Moves the camera to `position` and points it at `target`.
  ///
  /// A view straight up or down uses -Z (down) or +Z (up) as the screen's
  /// up axis. A target equal to the position keeps the default heading.
  pub fn reset(&mut self, position: DVec3, target: DVec3) {
    self.position = position;
    self.orientation = look_orientation(position, target);
    self.sync_angles();
    self.update_view();
  }

  pub fn set_look_mode(&mut self, mode: LookMode) {
    if mode == LookMode::Euler && self.look_mode != LookMode::Euler {
      self.sync_angles();
    }
    self.look_mode = mode;
  }

  pub fn set_projection(&mut self, perspective: &Perspective) {
    self.projection_matrix = perspective.matrix();
  }

  /// Rotates a world axis into the camera's frame.
  fn axis(&self, world: DVec3) -> DVec3 {
    self.orientation.conjugate() * world
  }

  pub fn forward(&self) -> DVec3 {
    self.axis(DVec3::NEG_Z)
  }

  pub fn backward(&self) -> DVec3 {
    self.axis(DVec3::Z)
  }

  pub fn left(&self) -> DVec3 {
    self.axis(DVec3::NEG_X)
  }

  pub fn right(&self) -> DVec3 {
    self.axis(DVec3::X)
  }

  pub fn up(&self) -> DVec3 {
    self.axis(DVec3::Y)
  }

  /// Heading angles in radians, `(yaw, pitch)`. Positive pitch looks down.
  pub fn angles(&self) -> (f64, f64) {
    (self.yaw, self.pitch)
  }

  /// Applies one frame of input.
  pub fn update(&mut self, input: &CameraInput) {
    let mut direction = DVec3::ZERO;
    if input.forward {
      direction += self.forward();
    }
    if input.backward {
      direction += self.backward();
    }
    if input.left {
      direction += self.left();
    }
    if input.right {
      direction += self.right();
    }

    // Opposing keys can cancel exactly; normalizing zero would give NaN.
    if direction.length() > 0.0 {
      direction = direction.normalize();
    }
    self.position += direction * self.speed;

    let yaw_angle = self.sensitivity * input.look_delta.x.to_radians();
    let pitch_angle = self.sensitivity * input.look_delta.y.to_radians();

    match self.look_mode {
      LookMode::Local => {
        let yaw = DQuat::from_axis_angle(DVec3::Y, yaw_angle);
        let pitch = DQuat::from_axis_angle(self.right().normalize(), pitch_angle);
        self.orientation = (self.orientation * (yaw * pitch)).normalize();
      }
      LookMode::Euler => {
        let limit = PITCH_LIMIT_DEGREES.to_radians();
        self.yaw += yaw_angle;
        self.pitch = (self.pitch + pitch_angle).clamp(-limit, limit);
        self.orientation =
          (DQuat::from_rotation_x(self.pitch) * DQuat::from_rotation_y(self.yaw)).normalize();
      }
    }

    self.update_view();
  }

  fn update_view(&mut self) {
    let rotation = DMat4::from_quat(self.orientation);
    let translation = DMat4::from_translation(-self.position);
    self.view_matrix = rotation * translation;
  }

  /// Recovers yaw/pitch from the current forward vector.
  fn sync_angles(&mut self) {
    let forward = self.forward();
    let limit = PITCH_LIMIT_DEGREES.to_radians();
    self.pitch = (-forward.y).clamp(-1.0, 1.0).asin().clamp(-limit, limit);
    self.yaw = forward.x.atan2(-forward.z);
  }
}

fn look_orientation(position: DVec3, target: DVec3) -> DQuat {
  let direction = (target - position).normalize_or_zero();
  if direction == DVec3::ZERO {
    return DQuat::IDENTITY;
  }
  let up = if direction.cross(DVec3::Y).length_squared() > 1e-12 {
    DVec3::Y
  } else if direction.y < 0.0 {
    DVec3::NEG_Z
  } else {
    DVec3::Z
  };
  DQuat::from_mat4(&DMat4::look_at_rh(position, target, up)).normalize()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn camera() -> Camera {
    let perspective = Perspective {
      fov:    45.0,
      aspect: 16.0 / 9.0,
      near:   0.1,
      far:    100.0,
    };
    Camera::new(perspective.matrix(), DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO)
  }

  #[test]
  fn look_at_round_trips_through_quaternion() {
    let eye = DVec3::new(3.0, 2.0, -4.0);
    let target = DVec3::new(-1.0, 0.5, 2.0);
    let look_at = DMat4::look_at_rh(eye, target, DVec3::Y);

    let rotation = DMat4::from_quat(DQuat::from_mat4(&look_at));

    for (a, b) in [
      (rotation.x_axis.truncate(), look_at.x_axis.truncate()),
      (rotation.y_axis.truncate(), look_at.y_axis.truncate()),
      (rotation.z_axis.truncate(), look_at.z_axis.truncate()),
    ] {
      assert!(a.abs_diff_eq(b, 1e-9), "{a} != {b}");
    }
  }

  #[test]
  fn initial_view_matches_look_at() {
    let camera = camera();
    let expected = DMat4::look_at_rh(DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO, DVec3::Y);
    assert!(camera.view_matrix.abs_diff_eq(expected, 1e-9));
    assert!(camera.forward().abs_diff_eq(DVec3::NEG_Z, 1e-9));
  }

  #[test]
  fn no_keys_leaves_position_alone() {
    let mut camera = camera();
    let before = camera.position;
    camera.update(&CameraInput {
      look_delta: DVec2::new(12.0, -7.0),
      ..Default::default()
    });
    assert_eq!(camera.position, before);
  }

  #[test]
  fn opposing_keys_cancel_without_nan() {
    let mut camera = camera();
    let before = camera.position;
    camera.update(&CameraInput {
      forward: true,
      backward: true,
      left: true,
      right: true,
      look_delta: DVec2::ZERO,
    });
    assert!(!camera.position.is_nan());
    assert_eq!(camera.position, before);
  }

  #[test]
  fn diagonal_movement_is_normalized() {
    let mut camera = camera();
    let before = camera.position;
    camera.update(&CameraInput {
      forward: true,
      right: true,
      ..Default::default()
    });
    let moved = camera.position - before;
    assert!((moved.length() - Camera::DEFAULT_SPEED).abs() < 1e-12);
    assert!(moved.x > 0.0 && moved.z < 0.0);
  }

  #[test]
  fn orientation_stays_unit_length() {
    for mode in [LookMode::Local, LookMode::Euler] {
      let mut camera = camera();
      camera.set_look_mode(mode);
      for i in 0..5_000 {
        let t = i as f64 * 0.37;
        camera.update(&CameraInput {
          forward: i % 3 == 0,
          left: i % 5 == 0,
          look_delta: DVec2::new(t.sin() * 40.0, t.cos() * 25.0),
          ..Default::default()
        });
        assert!((camera.orientation.length() - 1.0).abs() < 1e-9);
      }
    }
  }

  #[test]
  fn view_matrix_tracks_position_and_orientation() {
    let mut camera = camera();
    camera.update(&CameraInput {
      forward: true,
      look_delta: DVec2::new(30.0, 10.0),
      ..Default::default()
    });
    let expected =
      DMat4::from_quat(camera.orientation) * DMat4::from_translation(-camera.position);
    assert!(camera.view_matrix.abs_diff_eq(expected, 1e-12));
  }

  #[test]
  fn one_count_turns_sensitivity_degrees() {
    for mode in [LookMode::Local, LookMode::Euler] {
      let mut camera = camera();
      camera.set_look_mode(mode);
      camera.update(&CameraInput {
        look_delta: DVec2::new(1.0, 0.0),
        ..Default::default()
      });
      let turned = camera.forward().angle_between(DVec3::NEG_Z).to_degrees();
      assert!((turned - Camera::DEFAULT_SENSITIVITY).abs() < 1e-9, "{mode:?}: {turned}");
    }
  }

  #[test]
  fn cursor_right_turns_right() {
    for mode in [LookMode::Local, LookMode::Euler] {
      let mut camera = camera();
      camera.set_look_mode(mode);
      camera.update(&CameraInput {
        look_delta: DVec2::new(100.0, 0.0),
        ..Default::default()
      });
      assert!(camera.forward().x > 0.0, "{mode:?}");
    }
  }

  #[test]
  fn euler_pitch_is_clamped_and_never_rolls() {
    let mut camera = camera();
    camera.set_look_mode(LookMode::Euler);
    for _ in 0..200 {
      camera.update(&CameraInput {
        look_delta: DVec2::new(50.0, 50.0),
        ..Default::default()
      });
    }
    let (_, pitch) = camera.angles();
    assert!(pitch <= PITCH_LIMIT_DEGREES.to_radians() + 1e-12);
    // No roll: the camera's right vector stays horizontal.
    assert!(camera.right().y.abs() < 1e-9);
  }

  #[test]
  fn euler_mode_starts_from_current_heading() {
    let mut camera = camera();
    camera.reset(DVec3::new(2.0, 1.0, 2.0), DVec3::ZERO);
    let forward = camera.forward();

    camera.set_look_mode(LookMode::Euler);
    camera.update(&CameraInput::default());
    assert!(camera.forward().abs_diff_eq(forward, 1e-9));
  }

  #[test]
  fn vertical_view_has_finite_orientation() {
    let mut camera = camera();
    camera.reset(DVec3::new(0.0, 5.0, 0.0), DVec3::ZERO);
    assert!(camera.orientation.is_finite());
    assert!(camera.forward().abs_diff_eq(DVec3::NEG_Y, 1e-9));
    assert!(camera.up().abs_diff_eq(DVec3::NEG_Z, 1e-9));

    camera.reset(DVec3::new(0.0, -3.0, 0.0), DVec3::ZERO);
    assert!(camera.forward().abs_diff_eq(DVec3::Y, 1e-9));
    assert!(camera.up().abs_diff_eq(DVec3::Z, 1e-9));

    for mode in [LookMode::Local, LookMode::Euler] {
      let mut camera = camera.clone();
      camera.set_look_mode(mode);
      camera.update(&CameraInput {
        forward: true,
        look_delta: DVec2::new(10.0, -5.0),
        ..Default::default()
      });
      assert!(camera.position.is_finite());
      assert!((camera.orientation.length() - 1.0).abs() < 1e-9);
    }
  }

  #[test]
  fn target_on_position_keeps_default_heading() {
    let mut camera = camera();
    camera.reset(DVec3::ONE, DVec3::ONE);
    assert_eq!(camera.orientation, DQuat::IDENTITY);
    assert!(camera.view_matrix.is_finite());
  }

  #[test]
  fn projection_flips_y_for_vulkan() {
    let perspective = Perspective {
      fov:    90.0,
      aspect: 1.0,
      near:   0.1,
      far:    10.0,
    };
    let projection = perspective.matrix();
    assert!(projection.y_axis.y < 0.0);
    assert!(projection.x_axis.x > 0.0);
  }
}
