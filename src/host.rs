//! Window loop driving a [`GameModule`].
//!
//! [`Host`] implements winit's `ApplicationHandler`:
//! * `resumed` creates the window and the renderer, then runs the module's
//!   `init` exactly once
//! * window and device events are routed through the overlay first, then
//!   translated into engine input events
//! * `RedrawRequested` applies the queued input, runs `update` and sleeps out
//!   the rest of the frame budget
//! * `about_to_wait` polls the config file and hot-applies changes
//!
//! Any error out of the module or the renderer is fatal: it is logged and the
//! event loop exits.

use std::{
  path::PathBuf,
  sync::Arc,
  thread,
  time::{Duration, Instant},
};

use log::{error, info, warn};
use winit::{
  application::ApplicationHandler,
  dpi::LogicalSize,
  event::{DeviceEvent, DeviceId, ElementState, WindowEvent},
  event_loop::ActiveEventLoop,
  keyboard::{KeyCode, PhysicalKey},
  window::{CursorGrabMode, Window, WindowId},
};

use crate::{
  config::EngineConfig,
  error::EngineError,
  input::{EventQueue, LookTrigger},
  module::{EngineContext, FileWatcher, GameModule, check_module_version},
  platform::{EventTranslator, Gamepad, map_mouse_button},
  render::Renderer,
};

/// How much of the frame budget is left after `elapsed`. `None` when there is
/// no limit or the frame already ran over.
pub fn remaining_budget(elapsed: Duration, target_fps: u32) -> Option<Duration> {
  if target_fps == 0 {
    return None;
  }
  let budget = Duration::from_secs(1) / target_fps;
  budget.checked_sub(elapsed).filter(|rest| !rest.is_zero())
}

/// Frame delta and a once-per-second FPS average.
#[derive(Debug)]
pub struct FrameClock {
  last_frame:   Instant,
  window_start: Instant,
  window_count: u32,
  frame_count:  u64,
  fps:          f64,
}

impl FrameClock {
  /// Deltas above this are clamped so a stall does not teleport the camera.
  pub const MAX_DELTA: f64 = 0.1;

  pub fn new(now: Instant) -> Self {
    Self {
      last_frame:   now,
      window_start: now,
      window_count: 0,
      frame_count:  0,
      fps:          0.0,
    }
  }

  /// Starts a new frame at `now`; returns the clamped delta in seconds.
  pub fn tick(&mut self, now: Instant) -> f64 {
    let delta = now.saturating_duration_since(self.last_frame).as_secs_f64();
    self.last_frame = now;
    self.frame_count += 1;
    self.window_count += 1;

    let window = now.saturating_duration_since(self.window_start).as_secs_f64();
    if window >= 1.0 {
      self.fps = self.window_count as f64 / window;
      self.window_count = 0;
      self.window_start = now;
    }

    delta.min(Self::MAX_DELTA)
  }

  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  pub fn fps(&self) -> f64 {
    self.fps
  }
}

pub struct Host<G: GameModule> {
  ctx:             EngineContext,
  game:            G,
  translator:      EventTranslator,
  events:          EventQueue,
  gamepad:         Gamepad,
  config_watcher:  FileWatcher,
  clock:           FrameClock,
  initialised:     bool,
  cursor_captured: bool,
  focused:         bool,
}

impl<G: GameModule> Host<G> {
  /// Rejects `game` if it was built against another module interface.
  pub fn new(config: EngineConfig, config_path: impl Into<PathBuf>, game: G) -> Result<Self, EngineError> {
    check_module_version(&game)?;
    info!("hosting game module '{}'", game.name());

    Ok(Self {
      ctx: EngineContext::new(config),
      game,
      translator: EventTranslator::default(),
      events: EventQueue::default(),
      gamepad: Gamepad::new(),
      config_watcher: FileWatcher::new(config_path),
      clock: FrameClock::new(Instant::now()),
      initialised: false,
      cursor_captured: false,
      focused: true,
    })
  }

  /// Forgets held input. Queued presses go too, or their releases would
  /// never arrive.
  fn release_input(&mut self) {
    self.events.clear();
    self.ctx.input.release_all();
  }

  fn fail(&self, event_loop: &ActiveEventLoop, what: &str, err: EngineError) {
    error!("{what}: {err}");
    event_loop.exit();
  }

  fn window(&self) -> Option<&Arc<Window>> {
    self.ctx.renderer.as_ref().map(Renderer::window)
  }

  fn set_cursor_captured(&mut self, captured: bool) {
    let Some(window) = self.window() else {
      return;
    };

    let result = if captured {
      window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
    } else {
      window.set_cursor_grab(CursorGrabMode::None)
    };

    match result {
      Ok(()) => {
        window.set_cursor_visible(!captured);
        self.cursor_captured = captured;
      }
      Err(e) => warn!("could not change cursor grab: {e}"),
    }
  }

  /// Cursor capture follows the look binding: pressing the look button grabs
  /// the cursor, Escape releases it.
  fn update_cursor_capture(&mut self, event: &WindowEvent) {
    match event {
      WindowEvent::KeyboardInput { event, .. }
        if event.state == ElementState::Pressed
          && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
      {
        if self.cursor_captured {
          self.set_cursor_captured(false);
        }
      }
      WindowEvent::MouseInput {
        state: ElementState::Pressed,
        button,
        ..
      } => {
        let look = self.ctx.config.input.look;
        let grabs = match look {
          LookTrigger::Always => true,
          LookTrigger::Held(look_button) => map_mouse_button(*button) == Some(look_button),
        };
        if grabs && !self.cursor_captured {
          self.set_cursor_captured(true);
        }
      }
      _ => {}
    }
  }

  fn run_frame(&mut self, event_loop: &ActiveEventLoop) {
    let frame_start = Instant::now();
    self.ctx.timing.delta = self.clock.tick(frame_start);
    self.ctx.timing.frame_count = self.clock.frame_count();
    self.ctx.timing.fps = self.clock.fps();

    for event in self.events.drain() {
      self.ctx.input.apply(&event);
    }
    self.gamepad.poll(&mut self.ctx.input);

    let result = self.game.update(&mut self.ctx);
    self.ctx.input.end_frame();
    if let Err(e) = result {
      self.fail(event_loop, "frame update failed", e);
      return;
    }
    if self.ctx.exit_requested {
      event_loop.exit();
      return;
    }

    if let Some(rest) = remaining_budget(frame_start.elapsed(), self.ctx.config.window.target_fps) {
      thread::sleep(rest);
    }
  }

  fn reload_config(&mut self, event_loop: &ActiveEventLoop) {
    match EngineConfig::load(self.config_watcher.path()) {
      Ok(config) => {
        info!("'{}' changed, reloading", self.config_watcher.path().display());
        self.ctx.config = config;
        if let Err(e) = self.game.reload(&mut self.ctx) {
          self.fail(event_loop, "reload failed", e);
        }
      }
      Err(e) => warn!("ignoring invalid config change: {e}"),
    }
  }
}

/// Presses are dropped when the overlay takes them; releases always go
/// through so nothing stays held.
fn is_release(event: &WindowEvent) -> bool {
  match event {
    WindowEvent::KeyboardInput { event, .. } => event.state == ElementState::Released,
    WindowEvent::MouseInput { state, .. } => *state == ElementState::Released,
    _ => false,
  }
}

impl<G: GameModule> ApplicationHandler for Host<G> {
  fn resumed(&mut self, event_loop: &ActiveEventLoop) {
    if self.ctx.renderer.is_some() {
      return;
    }

    let window_config = &self.ctx.config.window;
    let attributes = Window::default_attributes()
      .with_decorations(true)
      .with_title(window_config.title.clone())
      .with_inner_size(LogicalSize::new(window_config.width, window_config.height));

    let window = match event_loop.create_window(attributes) {
      Ok(window) => Arc::new(window),
      Err(e) => {
        self.fail(event_loop, "window creation failed", EngineError::Platform(e.to_string()));
        return;
      }
    };
    let size = window.inner_size();
    (self.ctx.width, self.ctx.height) = (size.width, size.height);

    match Renderer::new(event_loop, window, &self.ctx.config.render) {
      Ok(renderer) => {
        info!("rendering on {}", renderer.device_name());
        self.ctx.renderer = Some(renderer);
      }
      Err(e) => {
        self.fail(event_loop, "renderer initialization failed", e.into());
        return;
      }
    }

    if !self.initialised {
      if let Err(e) = self.game.init(&mut self.ctx) {
        self.fail(event_loop, "game initialization failed", e);
        return;
      }
      self.initialised = true;
      self.clock = FrameClock::new(Instant::now());
    }
  }

  fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
    let consumed = self
      .ctx
      .renderer
      .as_mut()
      .is_some_and(|renderer| renderer.handle_window_event(&event));

    match &event {
      WindowEvent::CloseRequested => {
        event_loop.exit();
        return;
      }
      WindowEvent::Resized(size) => {
        (self.ctx.width, self.ctx.height) = (size.width, size.height);
      }
      WindowEvent::Focused(focused) => {
        self.focused = *focused;
        if !focused {
          self.release_input();
          self.set_cursor_captured(false);
        }
      }
      WindowEvent::RedrawRequested => {
        if self.initialised {
          self.run_frame(event_loop);
        }
        return;
      }
      _ => {}
    }

    if consumed && !is_release(&event) {
      return;
    }
    self.update_cursor_capture(&event);

    if let Some(input) = self.translator.window_event(&event) {
      self.events.push(input);
    }
  }

  fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
    if !self.focused {
      return;
    }
    if let Some(input) = self.translator.device_event(&event) {
      self.events.push(input);
    }
  }

  fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
    if self.initialised && self.config_watcher.poll() {
      self.reload_config(event_loop);
    }
    if let Some(window) = self.window() {
      window.request_redraw();
    }
  }

  fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
    if self.initialised {
      self.game.shutdown(&mut self.ctx);
      self.initialised = false;
    }
    info!("exiting after {} frames", self.clock.frame_count());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::{InputEvent, Key, Modifiers};

  #[test]
  fn limiter_sleeps_the_rest_of_the_budget() {
    assert_eq!(
      remaining_budget(Duration::from_millis(10), 50),
      Some(Duration::from_millis(10))
    );
    assert_eq!(remaining_budget(Duration::from_millis(25), 50), None);
    assert_eq!(remaining_budget(Duration::from_millis(20), 50), None);
    assert_eq!(remaining_budget(Duration::ZERO, 0), None);
  }

  #[test]
  fn clock_clamps_stalls() {
    let start = Instant::now();
    let mut clock = FrameClock::new(start);
    let delta = clock.tick(start + Duration::from_millis(16));
    assert!((delta - 0.016).abs() < 1e-9);
    assert_eq!(clock.tick(start + Duration::from_secs(3)), FrameClock::MAX_DELTA);
    assert_eq!(clock.frame_count(), 2);
  }

  #[test]
  fn clock_averages_fps_per_second() {
    let start = Instant::now();
    let mut clock = FrameClock::new(start);
    for frame in 1..=10 {
      clock.tick(start + Duration::from_millis(100 * frame));
    }
    assert!((clock.fps() - 10.0).abs() < 1e-9);
    assert_eq!(clock.frame_count(), 10);
  }

  #[derive(Default)]
  struct Outdated;

  impl GameModule for Outdated {
    fn name(&self) -> &str {
      "outdated"
    }

    fn api_version(&self) -> u32 {
      crate::module::MODULE_API_VERSION + 1
    }

    fn init(&mut self, _ctx: &mut EngineContext) -> Result<(), EngineError> {
      Ok(())
    }

    fn update(&mut self, _ctx: &mut EngineContext) -> Result<(), EngineError> {
      Ok(())
    }
  }

  #[test]
  fn host_refuses_mismatched_module() {
    let mut config = EngineConfig::default();
    config.memory.permanent_size = 1024;
    config.memory.assets_size = 512;
    let result = Host::new(config, "missing-config.toml", Outdated);
    assert!(matches!(result, Err(EngineError::ModuleVersion { .. })));
  }

  struct Idle;

  impl GameModule for Idle {
    fn name(&self) -> &str {
      "idle"
    }

    fn init(&mut self, _ctx: &mut EngineContext) -> Result<(), EngineError> {
      Ok(())
    }

    fn update(&mut self, _ctx: &mut EngineContext) -> Result<(), EngineError> {
      Ok(())
    }
  }

  #[test]
  fn focus_loss_drops_queued_presses() {
    let mut config = EngineConfig::default();
    config.memory.permanent_size = 1024;
    config.memory.assets_size = 512;
    let mut host = Host::new(config, "missing-config.toml", Idle).unwrap();

    let press = InputEvent::KeyPress {
      key:       Key::W,
      modifiers: Modifiers::default(),
      repeat:    false,
    };
    host.ctx.input.apply(&press);
    host.events.push(press);

    host.release_input();
    for event in host.events.drain() {
      host.ctx.input.apply(&event);
    }
    assert!(!host.ctx.input.is_key_down(Key::W));
    assert!(host.events.is_empty());
  }
}
