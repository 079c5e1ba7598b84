pub mod constants;
pub mod error;
pub mod framework;
pub mod particles;
pub mod physics;
pub mod renderer;
mod shader;

pub use error::{Error, Result};
