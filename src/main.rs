use std::error::Error;

use epsilon::{EngineConfig, Epsilon, Host};
use log::info;
use winit::event_loop::EventLoop;

fn main() -> Result<(), Box<dyn Error>> {
  colog::init();

  let config_path = EngineConfig::default_path();
  let config = EngineConfig::load(&config_path)?;
  info!(
    "{} at {}x{}",
    config.window.title, config.window.width, config.window.height
  );

  let event_loop = EventLoop::new()?;
  let mut host = Host::new(config, config_path, Epsilon::new())?;
  Ok(event_loop.run_app(&mut host)?)
}
