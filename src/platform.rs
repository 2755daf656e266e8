//! Translation from winit and gilrs events to engine [`InputEvent`]s.

use gilrs::{Axis, Gilrs};
use glam::DVec2;
use log::{info, warn};
use winit::{
  event::{DeviceEvent, ElementState, MouseScrollDelta, WindowEvent},
  keyboard::{KeyCode, ModifiersState, PhysicalKey},
};

use crate::{
  camera::CameraInput,
  input::{InputEvent, InputState, Key, Modifiers, MouseButton},
};

/// Pixels one scroll line counts as.
const LINE_HEIGHT: f64 = 20.0;

pub fn map_key_code(code: KeyCode) -> Option<Key> {
  use KeyCode as K;

  let key = match code {
    K::KeyA => Key::A,
    K::KeyB => Key::B,
    K::KeyC => Key::C,
    K::KeyD => Key::D,
    K::KeyE => Key::E,
    K::KeyF => Key::F,
    K::KeyG => Key::G,
    K::KeyH => Key::H,
    K::KeyI => Key::I,
    K::KeyJ => Key::J,
    K::KeyK => Key::K,
    K::KeyL => Key::L,
    K::KeyM => Key::M,
    K::KeyN => Key::N,
    K::KeyO => Key::O,
    K::KeyP => Key::P,
    K::KeyQ => Key::Q,
    K::KeyR => Key::R,
    K::KeyS => Key::S,
    K::KeyT => Key::T,
    K::KeyU => Key::U,
    K::KeyV => Key::V,
    K::KeyW => Key::W,
    K::KeyX => Key::X,
    K::KeyY => Key::Y,
    K::KeyZ => Key::Z,
    K::Digit0 => Key::Num0,
    K::Digit1 => Key::Num1,
    K::Digit2 => Key::Num2,
    K::Digit3 => Key::Num3,
    K::Digit4 => Key::Num4,
    K::Digit5 => Key::Num5,
    K::Digit6 => Key::Num6,
    K::Digit7 => Key::Num7,
    K::Digit8 => Key::Num8,
    K::Digit9 => Key::Num9,
    K::ArrowUp => Key::Up,
    K::ArrowDown => Key::Down,
    K::ArrowLeft => Key::Left,
    K::ArrowRight => Key::Right,
    K::Space => Key::Space,
    K::Enter | K::NumpadEnter => Key::Enter,
    K::Tab => Key::Tab,
    K::Escape => Key::Escape,
    K::Backspace => Key::Backspace,
    K::ShiftLeft | K::ShiftRight => Key::Shift,
    K::ControlLeft | K::ControlRight => Key::Ctrl,
    K::AltLeft | K::AltRight => Key::Alt,
    K::F1 => Key::F1,
    K::F2 => Key::F2,
    K::F3 => Key::F3,
    K::F4 => Key::F4,
    K::F5 => Key::F5,
    K::F6 => Key::F6,
    K::F7 => Key::F7,
    K::F8 => Key::F8,
    K::F9 => Key::F9,
    K::F10 => Key::F10,
    K::F11 => Key::F11,
    K::F12 => Key::F12,
    _ => return None,
  };
  Some(key)
}

pub fn map_mouse_button(button: winit::event::MouseButton) -> Option<MouseButton> {
  match button {
    winit::event::MouseButton::Left => Some(MouseButton::Left),
    winit::event::MouseButton::Right => Some(MouseButton::Right),
    winit::event::MouseButton::Middle => Some(MouseButton::Middle),
    _ => None,
  }
}

pub fn map_modifiers(state: ModifiersState) -> Modifiers {
  Modifiers {
    ctrl:  state.control_key(),
    shift: state.shift_key(),
    alt:   state.alt_key(),
  }
}

pub fn scroll_delta(delta: MouseScrollDelta) -> DVec2 {
  match delta {
    MouseScrollDelta::LineDelta(x, y) => DVec2::new(x as f64, y as f64) * LINE_HEIGHT,
    MouseScrollDelta::PixelDelta(position) => DVec2::new(position.x, position.y),
  }
}

/// Turns window-system events into engine events.
///
/// Tracks the modifier state and the last cursor position, which winit
/// reports separately from the events that need them.
#[derive(Debug, Default)]
pub struct EventTranslator {
  modifiers: Modifiers,
  cursor:    DVec2,
}

impl EventTranslator {
  pub fn window_event(&mut self, event: &WindowEvent) -> Option<InputEvent> {
    match event {
      WindowEvent::ModifiersChanged(modifiers) => {
        self.modifiers = map_modifiers(modifiers.state());
        None
      }
      WindowEvent::KeyboardInput { event, .. } => {
        let PhysicalKey::Code(code) = event.physical_key else {
          return None;
        };
        let key = map_key_code(code)?;
        Some(match event.state {
          ElementState::Pressed => InputEvent::KeyPress {
            key,
            modifiers: self.modifiers,
            repeat: event.repeat,
          },
          ElementState::Released => InputEvent::KeyRelease {
            key,
            modifiers: self.modifiers,
          },
        })
      }
      WindowEvent::MouseInput { state, button, .. } => {
        let button = map_mouse_button(*button)?;
        let position = self.cursor;
        Some(match state {
          ElementState::Pressed => InputEvent::MousePress { button, position },
          ElementState::Released => InputEvent::MouseRelease { button, position },
        })
      }
      WindowEvent::CursorMoved { position, .. } => {
        self.cursor = DVec2::new(position.x, position.y);
        Some(InputEvent::MouseMove {
          position: Some(self.cursor),
          delta:    DVec2::ZERO,
        })
      }
      WindowEvent::MouseWheel { delta, .. } => Some(InputEvent::MouseScroll {
        delta: scroll_delta(*delta),
      }),
      WindowEvent::Resized(size) => Some(InputEvent::WindowResize {
        width:  size.width,
        height: size.height,
      }),
      _ => None,
    }
  }

  /// Raw mouse motion. Keeps flowing while the cursor is locked.
  pub fn device_event(&self, event: &DeviceEvent) -> Option<InputEvent> {
    match event {
      DeviceEvent::MouseMotion { delta: (x, y) } => Some(InputEvent::MouseMove {
        position: None,
        delta:    DVec2::new(*x, *y),
      }),
      _ => None,
    }
  }
}

/// Stick values inside this radius count as zero.
pub const STICK_DEAD_ZONE: f64 = 0.15;
/// Look delta a fully deflected right stick adds per frame, in mouse counts.
pub const STICK_LOOK_SCALE: f64 = 12.0;

/// Rescales a stick past the dead zone to 0..1 and applies a quadratic
/// response curve. The direction is kept.
pub fn stick_response(stick: DVec2, dead_zone: f64) -> DVec2 {
  let length = stick.length();
  if length <= dead_zone {
    return DVec2::ZERO;
  }
  let normalized = ((length - dead_zone) / (1.0 - dead_zone)).min(1.0);
  stick / length * normalized * normalized
}

/// Merges stick state into keyboard and mouse input.
///
/// `left` and `right` are raw stick values with +Y pointing up.
pub fn apply_sticks(mut input: CameraInput, left: DVec2, right: DVec2) -> CameraInput {
  let movement = stick_response(left, STICK_DEAD_ZONE);
  input.forward |= movement.y > 0.0;
  input.backward |= movement.y < 0.0;
  input.right |= movement.x > 0.0;
  input.left |= movement.x < 0.0;

  let look = stick_response(right, STICK_DEAD_ZONE);
  input.look_delta += DVec2::new(look.x, -look.y) * STICK_LOOK_SCALE;
  input
}

/// Gamepad sticks read through gilrs. Works without a gamepad.
pub struct Gamepad {
  gilrs: Option<Gilrs>,
}

impl Gamepad {
  pub fn new() -> Self {
    let gilrs = match Gilrs::new() {
      Ok(gilrs) => {
        for (_, gamepad) in gilrs.gamepads() {
          info!("gamepad connected: {}", gamepad.name());
        }
        Some(gilrs)
      }
      Err(e) => {
        warn!("gamepad support unavailable: {e}");
        None
      }
    };

    Self { gilrs }
  }

  /// Drains pending gamepad events and stores the sticks of the gamepad that
  /// sent the last one in `input`.
  pub fn poll(&mut self, input: &mut InputState) {
    let Some(gilrs) = &mut self.gilrs else {
      return;
    };

    while let Some(event) = gilrs.next_event() {
      let gamepad = gilrs.gamepad(event.id);
      let axis = |axis| {
        gamepad
          .axis_data(axis)
          .map(|data| data.value() as f64)
          .unwrap_or(0.0)
      };
      input.left_stick = DVec2::new(axis(Axis::LeftStickX), axis(Axis::LeftStickY));
      input.right_stick = DVec2::new(axis(Axis::RightStickX), axis(Axis::RightStickY));
    }
    gilrs.inc();
  }
}

impl Default for Gamepad {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use winit::dpi::{PhysicalPosition, PhysicalSize};

  use super::*;

  #[test]
  fn keys_map_by_physical_position() {
    assert_eq!(map_key_code(KeyCode::KeyW), Some(Key::W));
    assert_eq!(map_key_code(KeyCode::Digit7), Some(Key::Num7));
    assert_eq!(map_key_code(KeyCode::ShiftRight), Some(Key::Shift));
    assert_eq!(map_key_code(KeyCode::F12), Some(Key::F12));
    assert_eq!(map_key_code(KeyCode::NumpadMultiply), None);
  }

  #[test]
  fn extra_mouse_buttons_are_ignored() {
    assert_eq!(
      map_mouse_button(winit::event::MouseButton::Right),
      Some(MouseButton::Right)
    );
    assert_eq!(map_mouse_button(winit::event::MouseButton::Back), None);
  }

  #[test]
  fn modifiers_follow_state() {
    let state = ModifiersState::SHIFT | ModifiersState::ALT;
    assert_eq!(map_modifiers(state), Modifiers {
      ctrl:  false,
      shift: true,
      alt:   true,
    });
  }

  #[test]
  fn scroll_lines_become_pixels() {
    assert_eq!(
      scroll_delta(MouseScrollDelta::LineDelta(0.0, -2.0)),
      DVec2::new(0.0, -2.0 * LINE_HEIGHT)
    );
    assert_eq!(
      scroll_delta(MouseScrollDelta::PixelDelta(PhysicalPosition::new(3.0, 4.0))),
      DVec2::new(3.0, 4.0)
    );
  }

  #[test]
  fn resize_and_raw_motion_translate() {
    let mut translator = EventTranslator::default();
    assert_eq!(
      translator.window_event(&WindowEvent::Resized(PhysicalSize::new(800, 600))),
      Some(InputEvent::WindowResize {
        width:  800,
        height: 600,
      })
    );
    assert_eq!(
      translator.device_event(&DeviceEvent::MouseMotion { delta: (2.0, -1.0) }),
      Some(InputEvent::MouseMove {
        position: None,
        delta:    DVec2::new(2.0, -1.0),
      })
    );
    assert_eq!(translator.window_event(&WindowEvent::Focused(true)), None);
  }

  #[test]
  fn dead_zone_swallows_small_deflection() {
    assert_eq!(stick_response(DVec2::new(0.1, 0.05), STICK_DEAD_ZONE), DVec2::ZERO);
    let full = stick_response(DVec2::new(0.0, 1.0), STICK_DEAD_ZONE);
    assert!(full.abs_diff_eq(DVec2::new(0.0, 1.0), 1e-12));
  }

  #[test]
  fn sticks_merge_into_camera_input() {
    let input = apply_sticks(
      CameraInput::default(),
      DVec2::new(-0.9, 0.9),
      DVec2::new(1.0, 0.0),
    );
    assert!(input.forward && input.left);
    assert!(!input.backward && !input.right);
    assert!(input.look_delta.abs_diff_eq(DVec2::new(STICK_LOOK_SCALE, 0.0), 1e-9));

    let idle = apply_sticks(CameraInput::default(), DVec2::ZERO, DVec2::new(0.0, 0.1));
    assert_eq!(idle, CameraInput::default());
  }
}
