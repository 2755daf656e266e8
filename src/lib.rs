pub mod assets;
pub mod camera;
pub mod config;
pub mod error;
pub mod game;
pub mod gui;
pub mod host;
pub mod ibl;
pub mod input;
pub mod memory;
pub mod mesh;
pub mod module;
pub mod platform;
pub mod render;
pub mod shaders;

// Re-export commonly used items
pub use camera::{Camera, CameraInput, LookMode};
pub use config::EngineConfig;
pub use error::EngineError;
pub use game::Epsilon;
pub use host::Host;
pub use memory::{MemoryArena, PersistentMemory};
pub use module::{EngineContext, GameModule};
