use std::sync::Arc;

use cgmath::{Angle, Rad};

use crate::error::Result;
use crate::particles::{InstanceData, ParticleState};

/// The GPU side of a frame, as seen by the [`Renderer`].
pub trait RenderBackend {
    /// Current size of the drawable surface in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Overwrites both per-instance buffers.
    fn upload_instances(&mut self, positions: &[u8], colors: &[u8]);

    /// Draws `instance_count` circles over a surface of `framebuffer` pixels and presents.
    fn draw_instanced(&mut self, framebuffer: (u32, u32), instance_count: u32) -> Result<()>;
}

/// What a call to [`Renderer::render_frame`] ended up doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn { width: u32, height: u32 },
    /// Nothing to draw into, e.g. the window is minimized.
    Skipped,
}

/// Keeps the staging copy of the instance data and drives one frame at a time.
pub struct Renderer {
    state: Arc<ParticleState>,
    instances: InstanceData,
    frame_num: u64,
}

impl Renderer {
    pub fn new(state: Arc<ParticleState>) -> Self {
        let instances = InstanceData::with_len(state.len());
        Renderer {
            state,
            instances,
            frame_num: 0,
        }
    }

    pub fn instance_count(&self) -> u32 {
        self.state.len() as u32
    }

    pub fn frame_num(&self) -> u64 {
        self.frame_num
    }

    /// Draws one frame: reads the current framebuffer size, copies the particles
    /// out under their lock, then uploads and draws with the lock released.
    pub fn render_frame<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> Result<FrameOutcome> {
        let (width, height) = backend.framebuffer_size();
        if width == 0 || height == 0 {
            return Ok(FrameOutcome::Skipped);
        }

        self.state.copy_into(&mut self.instances);

        backend.upload_instances(self.instances.position_bytes(), self.instances.color_bytes());
        backend.draw_instanced((width, height), self.instance_count())?;

        self.frame_num += 1;
        Ok(FrameOutcome::Drawn { width, height })
    }
}

/// Unit circle as a triangle fan: the centre, then `segments + 1` rim points
/// with the first repeated at the end to close it.
pub fn circle_fan(segments: u32) -> Vec<[f32; 2]> {
    let mut vertices = Vec::with_capacity(segments as usize + 2);
    vertices.push([0.0, 0.0]);
    for i in 0..=segments {
        let angle: Rad<f32> = Rad::full_turn() * (i as f32 / segments as f32);
        let (sin, cos) = angle.sin_cos();
        vertices.push([cos, sin]);
    }
    vertices
}

/// Triangle list indices for a fan built by [`circle_fan`].
pub fn fan_indices(segments: u32) -> Vec<u16> {
    debug_assert!(segments < u16::MAX as u32, "{} segments overflow u16 indices", segments);
    (1..=segments as u16).flat_map(|i| [0, i, i + 1]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::particles::Particle;
    use rand::{rngs::StdRng, SeedableRng};

    #[derive(Default)]
    struct MockBackend {
        size: (u32, u32),
        uploads: Vec<(Vec<u8>, Vec<u8>)>,
        draws: Vec<((u32, u32), u32)>,
        fail_draw: bool,
    }

    impl RenderBackend for MockBackend {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.size
        }

        fn upload_instances(&mut self, positions: &[u8], colors: &[u8]) {
            self.uploads.push((positions.to_vec(), colors.to_vec()));
        }

        fn draw_instanced(&mut self, framebuffer: (u32, u32), instance_count: u32) -> Result<()> {
            if self.fail_draw {
                return Err(Error::Surface(wgpu::SurfaceError::OutOfMemory));
            }
            self.draws.push((framebuffer, instance_count));
            Ok(())
        }
    }

    fn state(count: usize) -> Arc<ParticleState> {
        Arc::new(ParticleState::random(count, &mut StdRng::seed_from_u64(1)))
    }

    #[test]
    fn resize_between_frames_uses_new_size() {
        let mut renderer = Renderer::new(state(10));
        let mut backend = MockBackend {
            size: (800, 600),
            ..Default::default()
        };

        renderer.render_frame(&mut backend).unwrap();
        backend.size = (1024, 768);
        let outcome = renderer.render_frame(&mut backend).unwrap();

        assert_eq!(outcome, FrameOutcome::Drawn { width: 1024, height: 768 });
        assert_eq!(backend.draws, vec![((800, 600), 10), ((1024, 768), 10)]);
    }

    #[test]
    fn uploads_full_buffers_every_frame() {
        let state = Arc::new(ParticleState::from_particles(vec![
            Particle {
                position: cgmath::vec2(0.25, 0.75),
                color: cgmath::vec3(1.0, 0.5, 0.0),
            };
            3
        ]));
        let mut renderer = Renderer::new(state);
        let mut backend = MockBackend {
            size: (640, 480),
            ..Default::default()
        };

        renderer.render_frame(&mut backend).unwrap();

        let (positions, colors) = &backend.uploads[0];
        let expected_positions = [[0.25f32, 0.75]; 3];
        let expected_colors = [[1.0f32, 0.5, 0.0]; 3];
        assert_eq!(positions.len(), 3 * 2 * 4);
        assert_eq!(colors.len(), 3 * 3 * 4);
        assert_eq!(positions.as_slice(), bytemuck::cast_slice::<_, u8>(&expected_positions));
        assert_eq!(colors.as_slice(), bytemuck::cast_slice::<_, u8>(&expected_colors));
    }

    #[test]
    fn redundant_render_is_idempotent() {
        let mut renderer = Renderer::new(state(10));
        let mut backend = MockBackend {
            size: (800, 600),
            ..Default::default()
        };

        renderer.render_frame(&mut backend).unwrap();
        renderer.render_frame(&mut backend).unwrap();

        assert_eq!(backend.uploads.len(), 2);
        assert_eq!(backend.uploads[0], backend.uploads[1]);
        assert_eq!(backend.draws[0], backend.draws[1]);
        assert_eq!(renderer.frame_num(), 2);
    }

    #[test]
    fn zero_sized_surface_is_skipped() {
        let mut renderer = Renderer::new(state(10));
        let mut backend = MockBackend {
            size: (0, 600),
            ..Default::default()
        };

        assert_eq!(renderer.render_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert!(backend.uploads.is_empty());
        assert!(backend.draws.is_empty());
        assert_eq!(renderer.frame_num(), 0);
    }

    #[test]
    fn draw_errors_propagate() {
        let mut renderer = Renderer::new(state(4));
        let mut backend = MockBackend {
            size: (800, 600),
            fail_draw: true,
            ..Default::default()
        };

        assert!(matches!(
            renderer.render_frame(&mut backend),
            Err(Error::Surface(wgpu::SurfaceError::OutOfMemory))
        ));
        assert_eq!(renderer.frame_num(), 0);
    }

    #[test]
    fn circle_fan_is_closed_unit_circle() {
        let fan = circle_fan(12);
        assert_eq!(fan.len(), 14);
        assert_eq!(fan[0], [0.0, 0.0]);
        for v in &fan[1..] {
            let r = (v[0] * v[0] + v[1] * v[1]).sqrt();
            assert!((r - 1.0).abs() < 1e-5);
        }
        let (first, last) = (fan[1], fan[13]);
        assert!((first[0] - last[0]).abs() < 1e-5 && (first[1] - last[1]).abs() < 1e-5);
    }

    #[test]
    fn fan_indices_cover_every_segment() {
        let indices = fan_indices(12);
        assert_eq!(indices.len(), 36);
        assert_eq!(&indices[..3], &[0, 1, 2]);
        assert_eq!(&indices[33..], &[0, 12, 13]);
        assert!(indices.iter().all(|&i| (i as usize) < circle_fan(12).len()));
    }

    #[test]
    fn fan_indices_reach_the_largest_u16_segment_count() {
        let segments = u16::MAX as u32 - 1;
        let indices = fan_indices(segments);
        assert_eq!(indices.len(), segments as usize * 3);
        assert_eq!(*indices.last().unwrap(), u16::MAX);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "overflow u16 indices")]
    fn fan_indices_reject_too_many_segments() {
        fan_indices(u16::MAX as u32);
    }
}
