//! Platform-independent input events and per-frame input state.
//!
//! The platform layer (see [`crate::platform`]) translates window-system events
//! into [`InputEvent`]s and pushes them into an [`EventQueue`]. Once per frame
//! the host drains the queue into [`InputState`], which the game reads through
//! [`KeyBindings::camera_input`].

use std::collections::HashSet;

use glam::DVec2;
use log::warn;
use serde::Deserialize;

use crate::camera::CameraInput;

/// Keys the engine knows about, independent of any window system's key codes.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Key {
  A, B, C, D, E, F, G, H, I, J, K, L, M,
  N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
  Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
  Up, Down, Left, Right,
  Space, Enter, Tab, Escape, Backspace,
  Shift, Ctrl, Alt,
  F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
  Left,
  Right,
  Middle,
}

/// Modifier keys held when a key event happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
  pub ctrl:  bool,
  pub shift: bool,
  pub alt:   bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
  KeyPress {
    key:       Key,
    modifiers: Modifiers,
    repeat:    bool,
  },
  KeyRelease {
    key:       Key,
    modifiers: Modifiers,
  },
  MousePress {
    button:   MouseButton,
    position: DVec2,
  },
  MouseRelease {
    button:   MouseButton,
    position: DVec2,
  },
  /// `position` is the cursor in window pixels when known; `delta` is raw
  /// motion and keeps accumulating while the cursor is locked.
  MouseMove {
    position: Option<DVec2>,
    delta:    DVec2,
  },
  MouseScroll {
    delta: DVec2,
  },
  WindowResize {
    width:  u32,
    height: u32,
  },
}

/// Bounded per-frame event queue. Events past capacity are dropped.
#[derive(Debug)]
pub struct EventQueue {
  events:   Vec<InputEvent>,
  capacity: usize,
  dropped:  usize,
}

impl EventQueue {
  pub const DEFAULT_CAPACITY: usize = 1024;

  pub fn new(capacity: usize) -> Self {
    Self {
      events: Vec::with_capacity(capacity),
      capacity,
      dropped: 0,
    }
  }

  /// Queues `event`; returns false if the queue was full.
  pub fn push(&mut self, event: InputEvent) -> bool {
    if self.events.len() >= self.capacity {
      self.dropped += 1;
      return false;
    }
    self.events.push(event);
    true
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  /// Discards every queued event.
  pub fn clear(&mut self) {
    self.events.clear();
  }

  /// Takes every queued event, leaving the queue empty for the next frame.
  pub fn drain(&mut self) -> std::vec::Drain<'_, InputEvent> {
    if self.dropped > 0 {
      warn!("input queue full, dropped {} events this frame", self.dropped);
      self.dropped = 0;
    }
    self.events.drain(..)
  }
}

impl Default for EventQueue {
  fn default() -> Self {
    Self::new(Self::DEFAULT_CAPACITY)
  }
}

/// What is held down right now, plus motion accumulated this frame.
#[derive(Debug, Default, Clone)]
pub struct InputState {
  keys:            HashSet<Key>,
  pressed:         HashSet<Key>,
  buttons:         HashSet<MouseButton>,
  pub position:    DVec2,
  pub mouse_delta: DVec2,
  pub scroll:      DVec2,
  /// Gamepad sticks, +Y up, each component in -1..1.
  pub left_stick:  DVec2,
  pub right_stick: DVec2,
}

impl InputState {
  pub fn apply(&mut self, event: &InputEvent) {
    match *event {
      InputEvent::KeyPress { key, repeat, .. } => {
        self.keys.insert(key);
        if !repeat {
          self.pressed.insert(key);
        }
      }
      InputEvent::KeyRelease { key, .. } => {
        self.keys.remove(&key);
      }
      InputEvent::MousePress { button, position } => {
        self.buttons.insert(button);
        self.position = position;
      }
      InputEvent::MouseRelease { button, position } => {
        self.buttons.remove(&button);
        self.position = position;
      }
      InputEvent::MouseMove { position, delta } => {
        if let Some(position) = position {
          self.position = position;
        }
        self.mouse_delta += delta;
      }
      InputEvent::MouseScroll { delta } => {
        self.scroll += delta;
      }
      InputEvent::WindowResize { .. } => {}
    }
  }

  pub fn is_key_down(&self, key: Key) -> bool {
    self.keys.contains(&key)
  }

  /// True only in the frame the key went down; auto-repeat does not count.
  pub fn was_key_pressed(&self, key: Key) -> bool {
    self.pressed.contains(&key)
  }

  pub fn is_button_down(&self, button: MouseButton) -> bool {
    self.buttons.contains(&button)
  }

  /// Clears per-frame accumulators. Held keys and buttons persist.
  pub fn end_frame(&mut self) {
    self.pressed.clear();
    self.mouse_delta = DVec2::ZERO;
    self.scroll = DVec2::ZERO;
  }

  /// Forgets everything held, e.g. when the window loses focus.
  pub fn release_all(&mut self) {
    self.keys.clear();
    self.buttons.clear();
    self.left_stick = DVec2::ZERO;
    self.right_stick = DVec2::ZERO;
    self.end_frame();
  }
}

/// When cursor motion rotates the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookTrigger {
  Always,
  Held(MouseButton),
}

/// Maps engine keys to camera requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
  pub forward:  Key,
  pub backward: Key,
  pub left:     Key,
  pub right:    Key,
  pub look:     LookTrigger,
}

impl Default for KeyBindings {
  fn default() -> Self {
    Self {
      forward:  Key::W,
      backward: Key::S,
      left:     Key::A,
      right:    Key::D,
      look:     LookTrigger::Held(MouseButton::Right),
    }
  }
}

impl KeyBindings {
  pub fn look_active(&self, input: &InputState) -> bool {
    match self.look {
      LookTrigger::Always => true,
      LookTrigger::Held(button) => input.is_button_down(button),
    }
  }

  pub fn camera_input(&self, input: &InputState) -> CameraInput {
    CameraInput {
      forward:    input.is_key_down(self.forward),
      backward:   input.is_key_down(self.backward),
      left:       input.is_key_down(self.left),
      right:      input.is_key_down(self.right),
      look_delta: if self.look_active(input) {
        input.mouse_delta
      } else {
        DVec2::ZERO
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn press(key: Key) -> InputEvent {
    InputEvent::KeyPress {
      key,
      modifiers: Modifiers::default(),
      repeat: false,
    }
  }

  #[test]
  fn queue_drops_past_capacity() {
    let mut queue = EventQueue::new(2);
    assert!(queue.push(press(Key::W)));
    assert!(queue.push(press(Key::A)));
    assert!(!queue.push(press(Key::S)));
    assert_eq!(queue.len(), 2);

    let drained: Vec<_> = queue.drain().collect();
    assert_eq!(drained, vec![press(Key::W), press(Key::A)]);
    assert!(queue.is_empty());
    assert!(queue.push(press(Key::D)));
  }

  #[test]
  fn held_keys_map_to_camera_input() {
    let mut state = InputState::default();
    state.apply(&press(Key::W));
    state.apply(&press(Key::D));
    state.apply(&InputEvent::KeyRelease {
      key:       Key::D,
      modifiers: Modifiers::default(),
    });

    let input = KeyBindings::default().camera_input(&state);
    assert!(input.forward);
    assert!(!input.right && !input.left && !input.backward);
  }

  #[test]
  fn look_needs_the_bound_button() {
    let bindings = KeyBindings::default();
    let mut state = InputState::default();
    state.apply(&InputEvent::MouseMove {
      position: None,
      delta:    DVec2::new(3.0, 4.0),
    });
    state.apply(&InputEvent::MouseMove {
      position: Some(DVec2::new(10.0, 10.0)),
      delta:    DVec2::new(1.0, 1.0),
    });
    assert_eq!(bindings.camera_input(&state).look_delta, DVec2::ZERO);

    state.apply(&InputEvent::MousePress {
      button:   MouseButton::Right,
      position: DVec2::new(10.0, 10.0),
    });
    assert_eq!(bindings.camera_input(&state).look_delta, DVec2::new(4.0, 5.0));

    let always = KeyBindings {
      look: LookTrigger::Always,
      ..KeyBindings::default()
    };
    state.release_all();
    state.apply(&InputEvent::MouseMove {
      position: None,
      delta:    DVec2::new(-2.0, 0.5),
    });
    assert_eq!(always.camera_input(&state).look_delta, DVec2::new(-2.0, 0.5));
  }

  #[test]
  fn end_frame_keeps_held_keys() {
    let mut state = InputState::default();
    state.apply(&press(Key::S));
    state.apply(&InputEvent::MouseScroll {
      delta: DVec2::new(0.0, 1.0),
    });
    assert!(state.was_key_pressed(Key::S));
    state.end_frame();
    assert!(state.is_key_down(Key::S));
    assert!(!state.was_key_pressed(Key::S));
    assert_eq!(state.scroll, DVec2::ZERO);
  }

  #[test]
  fn repeats_are_not_fresh_presses() {
    let mut state = InputState::default();
    state.apply(&InputEvent::KeyPress {
      key:       Key::F1,
      modifiers: Modifiers::default(),
      repeat:    true,
    });
    assert!(state.is_key_down(Key::F1));
    assert!(!state.was_key_pressed(Key::F1));
  }
}
