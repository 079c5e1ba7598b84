use std::time::Duration;

pub const TITLE: &str = "Instanced Circles";
pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

pub const NUM_PARTICLES: usize = 100;

pub const CIRCLE_SEGMENTS: u32 = 12;
pub const PIXEL_RADIUS: f32 = 20.0;

pub const STEP_POS: f32 = 0.01;
pub const STEP_COL: f32 = 0.1;

// ~60 updates per second
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(16);

/// Tunables for the random walk. Defaults come from the constants above.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhysicsConfig {
    pub step_pos: f32,
    pub step_col: f32,
    pub interval: Duration,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            step_pos: STEP_POS,
            step_col: STEP_COL,
            interval: UPDATE_INTERVAL,
        }
    }
}
