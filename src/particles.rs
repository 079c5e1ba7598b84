use cgmath::{Vector2, Vector3};
use parking_lot::Mutex;
use rand::Rng;

/// A single circle: normalized screen position and rgb color, all fields in [0, 1].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Particle {
    pub position: Vector2<f32>,
    pub color: Vector3<f32>,
}

impl Particle {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Particle {
            position: cgmath::vec2(rng.gen(), rng.gen()),
            color: cgmath::vec3(rng.gen(), rng.gen(), rng.gen()),
        }
    }

    /// Adds the deltas and saturates every field back into [0, 1].
    pub fn nudge(&mut self, position_delta: Vector2<f32>, color_delta: Vector3<f32>) {
        self.position += position_delta;
        self.color += color_delta;
        self.clamp();
    }

    fn clamp(&mut self) {
        self.position.x = self.position.x.clamp(0.0, 1.0);
        self.position.y = self.position.y.clamp(0.0, 1.0);
        self.color.x = self.color.x.clamp(0.0, 1.0);
        self.color.y = self.color.y.clamp(0.0, 1.0);
        self.color.z = self.color.z.clamp(0.0, 1.0);
    }
}

/// Flat per-instance arrays, laid out for a direct upload to the GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceData {
    pub positions: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 3]>,
}

impl InstanceData {
    pub fn with_len(len: usize) -> Self {
        InstanceData {
            positions: vec![[0.0; 2]; len],
            colors: vec![[0.0; 3]; len],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }
}

/// The particle population shared between the physics thread and the renderer.
///
/// Every access goes through one coarse lock over the whole collection, so a
/// reader always sees all five fields of a particle from the same update.
/// The population size is fixed at construction.
pub struct ParticleState {
    particles: Mutex<Vec<Particle>>,
    len: usize,
}

impl ParticleState {
    pub fn random<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let particles = (0..count).map(|_| Particle::random(rng)).collect();
        Self::from_vec(particles)
    }

    /// Builds a state from explicit records, clamping any out-of-range field.
    pub fn from_particles(particles: impl IntoIterator<Item = Particle>) -> Self {
        let particles = particles
            .into_iter()
            .map(|mut particle| {
                particle.clamp();
                particle
            })
            .collect();
        Self::from_vec(particles)
    }

    fn from_vec(particles: Vec<Particle>) -> Self {
        let len = particles.len();
        ParticleState {
            particles: Mutex::new(particles),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn snapshot(&self) -> Vec<Particle> {
        self.particles.lock().clone()
    }

    /// Copies every particle into `out` under a single lock acquisition.
    /// `out` is resized if it was built for a different population.
    pub fn copy_into(&self, out: &mut InstanceData) {
        if out.len() != self.len {
            *out = InstanceData::with_len(self.len);
        }

        let particles = self.particles.lock();
        for ((particle, position), color) in particles
            .iter()
            .zip(out.positions.iter_mut())
            .zip(out.colors.iter_mut())
        {
            *position = particle.position.into();
            *color = particle.color.into();
        }
    }

    /// Runs `f` over the whole population while holding the lock.
    pub fn update<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut [Particle]) -> T,
    {
        let mut particles = self.particles.lock();
        f(&mut particles)
    }
}
