use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use rand::{rngs::StdRng, Rng};

use crate::constants::PhysicsConfig;
use crate::particles::ParticleState;

/// Shared flag asking the physics loop to finish its current cycle and return.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Where the update loop waits between cycles.
pub trait Clock: Send {
    fn sleep(&mut self, interval: Duration);
}

/// Sleeps the calling thread for real.
#[derive(Copy, Clone, Debug, Default)]
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn sleep(&mut self, interval: Duration) {
        thread::sleep(interval);
    }
}

/// Background random walk over the shared particle state.
pub struct PhysicsUpdater<C = ThreadClock> {
    state: Arc<ParticleState>,
    config: PhysicsConfig,
    rng: StdRng,
    clock: C,
}

impl PhysicsUpdater<ThreadClock> {
    pub fn new(state: Arc<ParticleState>, config: PhysicsConfig, rng: StdRng) -> Self {
        Self::with_clock(state, config, rng, ThreadClock)
    }
}

impl<C: Clock> PhysicsUpdater<C> {
    pub fn with_clock(state: Arc<ParticleState>, config: PhysicsConfig, rng: StdRng, clock: C) -> Self {
        PhysicsUpdater {
            state,
            config,
            rng,
            clock,
        }
    }

    /// One cycle: perturb and clamp every particle under the lock.
    pub fn step(&mut self) {
        let PhysicsConfig {
            step_pos, step_col, ..
        } = self.config;
        let rng = &mut self.rng;

        self.state.update(|particles| {
            for particle in particles.iter_mut() {
                let position_delta = cgmath::vec2(
                    step_pos * (rng.gen::<f32>() - 0.5),
                    step_pos * (rng.gen::<f32>() - 0.5),
                );
                let color_delta = cgmath::vec3(
                    step_col * (rng.gen::<f32>() - 0.5),
                    step_col * (rng.gen::<f32>() - 0.5),
                    step_col * (rng.gen::<f32>() - 0.5),
                );
                particle.nudge(position_delta, color_delta);
            }
        });
    }

    /// Steps until `stop` is raised, sleeping `config.interval` after each cycle.
    /// Returns the number of cycles run.
    pub fn run(&mut self, stop: &StopSignal) -> u64 {
        let mut cycles = 0;
        while !stop.is_stopped() {
            self.step();
            cycles += 1;
            self.clock.sleep(self.config.interval);
        }
        cycles
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C: Clock + 'static> PhysicsUpdater<C> {
    pub fn spawn(mut self, stop: StopSignal) -> std::io::Result<thread::JoinHandle<u64>> {
        thread::Builder::new()
            .name("physics".into())
            .spawn(move || {
                log::info!(
                    "physics thread started: {} particles every {:?}",
                    self.state.len(),
                    self.config.interval
                );
                let cycles = self.run(&stop);
                log::info!("physics thread stopped after {} cycles", cycles);
                cycles
            })
    }
}
