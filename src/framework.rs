use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::{rngs::StdRng, Rng, SeedableRng};
use winit::{
    dpi::PhysicalSize,
    event::{Event, StartCause, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::particles::ParticleState;
use crate::physics::{PhysicsUpdater, StopSignal};
use crate::renderer::{FrameOutcome, RenderBackend, Renderer};
use crate::shader::Shader;

/// Everything owned by the render thread: the surface, the device and the
/// circle pipeline. The window outlives the surface drawn into it.
pub struct GpuBackend {
    surface: wgpu::Surface,
    config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    shader: Shader,
    window: Window,
}

impl GpuBackend {
    fn reconfigure(&mut self, width: u32, height: u32) {
        log::debug!("configuring surface to {}x{}", width, height);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl RenderBackend for GpuBackend {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn upload_instances(&mut self, positions: &[u8], colors: &[u8]) {
        self.shader.upload(&self.queue, positions, colors);
    }

    fn draw_instanced(&mut self, framebuffer: (u32, u32), instance_count: u32) -> Result<()> {
        if framebuffer != (self.config.width, self.config.height) {
            self.reconfigure(framebuffer.0, framebuffer.1);
        }

        let frame = self.surface.get_current_texture()?;
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.shader.render(&view, &self.device, &self.queue, framebuffer, instance_count);
        frame.present();
        Ok(())
    }
}

/// Runs an initialization step that reports failure by panicking, as winit 0.28
/// does when no display backend can be reached, and turns the panic into
/// [`Error::BackendInit`].
fn catch_init_panic<T>(what: &str, init: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(init)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|reason| reason.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Error::BackendInit(format!("{}: {}", what, reason))
    })
}

/// Whether the event loop keeps producing frames or parks in the platform
/// event wait until the window has something to draw into again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Pacing {
    Continuous,
    Parked,
}

impl Pacing {
    fn after_frame(self, outcome: FrameOutcome) -> Self {
        match outcome {
            FrameOutcome::Drawn { .. } => Pacing::Continuous,
            FrameOutcome::Skipped => Pacing::Parked,
        }
    }

    fn after_resize(self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            Pacing::Continuous
        } else {
            self
        }
    }

    fn wants_redraw(self) -> bool {
        self == Pacing::Continuous
    }

    fn apply(self, control_flow: &mut ControlFlow) {
        match self {
            Pacing::Continuous => control_flow.set_poll(),
            Pacing::Parked => control_flow.set_wait(),
        }
    }
}

struct Setup {
    event_loop: EventLoop<()>,
    gpu: GpuBackend,
}

async fn setup(title: &str, instance_count: usize) -> Result<Setup> {
    let event_loop = catch_init_panic("failed to create event loop", EventLoop::new)?;
    let window = WindowBuilder::new()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(WIDTH, HEIGHT))
        .build(&event_loop)?;

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        dx12_shader_compiler: Default::default(),
    });
    let surface = unsafe { instance.create_surface(&window) }?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .ok_or_else(|| Error::BackendInit("no suitable adapter found".into()))?;

    let adapter_info = adapter.get_info();
    log::info!("using {} ({:?})", adapter_info.name, adapter_info.backend);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                features: wgpu::Features::empty(),
                limits: wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
            },
            None,
        )
        .await?;

    let capabilities = surface.get_capabilities(&adapter);
    let format = capabilities
        .formats
        .first()
        .copied()
        .ok_or_else(|| Error::BackendInit("surface is incompatible with the adapter".into()))?;
    let alpha_mode = capabilities
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    let size = window.inner_size();
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode,
        view_formats: vec![],
    };
    surface.configure(&device, &config);
    log::info!("surface configured: {:?} {}x{}", format, config.width, config.height);

    let shader = Shader::init(&config, &device, instance_count)?;

    Ok(Setup {
        event_loop,
        gpu: GpuBackend {
            surface,
            config,
            device,
            queue,
            shader,
            window,
        },
    })
}

fn start(
    Setup { event_loop, mut gpu }: Setup,
    mut renderer: Renderer,
    stop: StopSignal,
    physics: JoinHandle<u64>,
) -> ! {
    let mut physics = Some(physics);
    let mut last_report = Instant::now();
    let mut frames_since_report = 0u32;
    let mut pacing = Pacing::Continuous;

    let mut shutdown = move |control_flow: &mut ControlFlow, code: i32| {
        stop.stop();
        if let Some(handle) = physics.take() {
            if handle.join().is_err() {
                log::error!("physics thread panicked");
            }
        }
        control_flow.set_exit_with_code(code);
    };

    log::info!("entering render loop");
    event_loop.run(move |event, _, control_flow| {
        match event {
            Event::NewEvents(StartCause::Init) => pacing.apply(control_flow),
            Event::MainEventsCleared => {
                if pacing.wants_redraw() {
                    gpu.request_redraw();
                }
            }
            Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            } => {
                log::debug!("window resized to {}x{}", size.width, size.height);
                let next = pacing.after_resize(size.width, size.height);
                if next != pacing {
                    log::debug!("resuming frames");
                    pacing = next;
                    pacing.apply(control_flow);
                    gpu.request_redraw();
                }
            }
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => shutdown(control_flow, 0),
            Event::RedrawRequested(_) => match renderer.render_frame(&mut gpu) {
                Ok(outcome @ FrameOutcome::Drawn { .. }) => {
                    if !pacing.wants_redraw() {
                        pacing = pacing.after_frame(outcome);
                        pacing.apply(control_flow);
                    }
                    frames_since_report += 1;
                    let elapsed = last_report.elapsed();
                    if elapsed.as_secs() >= 1 {
                        log::debug!(
                            "{:.1} fps, {} frames total",
                            frames_since_report as f32 / elapsed.as_secs_f32(),
                            renderer.frame_num()
                        );
                        last_report = Instant::now();
                        frames_since_report = 0;
                    }
                }
                Ok(FrameOutcome::Skipped) => {
                    if pacing.wants_redraw() {
                        log::debug!("nothing to draw into, waiting for a resize");
                        pacing = pacing.after_frame(FrameOutcome::Skipped);
                        pacing.apply(control_flow);
                    }
                }
                Err(Error::Surface(wgpu::SurfaceError::Lost)) | Err(Error::Surface(wgpu::SurfaceError::Outdated)) => {
                    log::warn!("surface lost or outdated, reconfiguring");
                    let (width, height) = gpu.framebuffer_size();
                    if width > 0 && height > 0 {
                        gpu.reconfigure(width, height);
                    }
                }
                Err(Error::Surface(wgpu::SurfaceError::Timeout)) => {
                    log::warn!("timed out acquiring frame, skipping");
                }
                Err(err) => {
                    log::error!("{}", err);
                    shutdown(control_flow, -1);
                }
            },
            _ => {}
        }
    })
}

/// Seed for the process random source, taken from the wall clock once at startup.
fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

/// Opens the window, starts the physics thread and runs the render loop until
/// the window is closed. Returns only if initialization fails, in which case
/// neither loop has been started.
pub fn run(title: &str) -> Result<()> {
    let setup = pollster::block_on(setup(title, NUM_PARTICLES))?;

    let seed = clock_seed();
    log::debug!("random seed {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let state = Arc::new(ParticleState::random(NUM_PARTICLES, &mut rng));

    let stop = StopSignal::new();
    let updater = PhysicsUpdater::new(
        Arc::clone(&state),
        PhysicsConfig::default(),
        StdRng::seed_from_u64(rng.gen()),
    );
    let physics = updater
        .spawn(stop.clone())
        .map_err(|err| Error::BackendInit(format!("failed to spawn physics thread: {}", err)))?;

    start(setup, Renderer::new(state), stop, physics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_panic_becomes_backend_init_error() {
        let result: Result<()> = catch_init_panic("failed to create event loop", || {
            panic!("Failed to initialize any backend!")
        });

        match result {
            Err(Error::BackendInit(msg)) => {
                assert!(msg.contains("failed to create event loop"));
                assert!(msg.contains("Failed to initialize any backend!"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn init_panic_with_formatted_message_keeps_reason() {
        let display = ":99";
        let result: Result<u32> = catch_init_panic("failed to create event loop", || {
            panic!("cannot open display {}", display)
        });

        assert!(matches!(result, Err(Error::BackendInit(msg)) if msg.contains("cannot open display :99")));
    }

    #[test]
    fn successful_init_passes_through() {
        assert_eq!(catch_init_panic("unused", || 7).unwrap(), 7);
    }

    #[test]
    fn skipped_frame_parks_the_loop() {
        let pacing = Pacing::Continuous.after_frame(FrameOutcome::Skipped);
        assert_eq!(pacing, Pacing::Parked);
        assert!(!pacing.wants_redraw());

        let mut control_flow = ControlFlow::Poll;
        pacing.apply(&mut control_flow);
        assert_eq!(control_flow, ControlFlow::Wait);
    }

    #[test]
    fn zero_sized_resize_stays_parked() {
        assert_eq!(Pacing::Parked.after_resize(800, 0), Pacing::Parked);
        assert_eq!(Pacing::Parked.after_resize(0, 0), Pacing::Parked);
    }

    #[test]
    fn restored_window_resumes_polling() {
        let pacing = Pacing::Parked.after_resize(800, 600);
        assert_eq!(pacing, Pacing::Continuous);
        assert!(pacing.wants_redraw());

        let mut control_flow = ControlFlow::Wait;
        pacing.apply(&mut control_flow);
        assert_eq!(control_flow, ControlFlow::Poll);
    }

    #[test]
    fn drawn_frame_keeps_polling() {
        let pacing = Pacing::Continuous.after_frame(FrameOutcome::Drawn { width: 800, height: 600 });
        assert_eq!(pacing, Pacing::Continuous);
    }
}
