use std::borrow::Cow;

use wgpu::util::DeviceExt;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::renderer::{circle_fan, fan_indices};

#[repr(C)]
#[derive(Copy, Clone, Debug)]
struct Globals {
    window_size: [f32; 2],
    pixel_radius: f32,
    _padding: f32,
}

unsafe impl bytemuck::Zeroable for Globals {}
unsafe impl bytemuck::Pod for Globals {}

const CIRCLE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const OFFSET_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];
const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x3];

/// Shader struct holds references to wgpu resources for the instanced circle draw
pub struct Shader {
    render_bind_group: wgpu::BindGroup,
    render_pipeline: wgpu::RenderPipeline,

    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,

    position_buffer: wgpu::Buffer,
    color_buffer: wgpu::Buffer,
    globals_buffer: wgpu::Buffer,
}

impl Shader {
    fn setup_geometry(device: &wgpu::Device) -> (wgpu::Buffer, wgpu::Buffer, u32) {
        log::debug!("setting up circle geometry with {} segments", CIRCLE_SEGMENTS);
        let vertices = circle_fan(CIRCLE_SEGMENTS);
        let indices = fan_indices(CIRCLE_SEGMENTS);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Circle vertex buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Circle index buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        (vertex_buffer, index_buffer, indices.len() as u32)
    }

    fn setup_instances(device: &wgpu::Device, instance_count: usize) -> (wgpu::Buffer, wgpu::Buffer) {
        let position_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance position buffer"),
            size: (instance_count * std::mem::size_of::<[f32; 2]>()) as _,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let color_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance color buffer"),
            size: (instance_count * std::mem::size_of::<[f32; 3]>()) as _,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        (position_buffer, color_buffer)
    }

    fn setup_render(
        config: &wgpu::SurfaceConfiguration,
        device: &wgpu::Device,
        shader: &wgpu::ShaderModule,
    ) -> (wgpu::Buffer, wgpu::BindGroup, wgpu::RenderPipeline) {
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Globals buffer"),
            size: std::mem::size_of::<Globals>() as _,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let render_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Globals>() as _),
                },
                count: None,
            }],
        });

        let render_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Render bind group"),
            layout: &render_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render pipeline layout"),
            bind_group_layouts: &[&render_bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Circle render pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: "vs_main",
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &CIRCLE_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &OFFSET_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &COLOR_ATTRIBUTES,
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: "fs_main",
                targets: &[Some(config.format.into())],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        (globals_buffer, render_bind_group, render_pipeline)
    }

    /// Builds the pipeline and buffers. Validation errors raised while
    /// compiling the shader or linking the pipeline are returned, not panicked on.
    pub fn init(config: &wgpu::SurfaceConfiguration, device: &wgpu::Device, instance_count: usize) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let draw_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Circle shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("circles.wgsl"))),
        });
        let (globals_buffer, render_bind_group, render_pipeline) = Self::setup_render(config, device, &draw_shader);

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::ShaderCompile(err.to_string()));
        }

        let (vertex_buffer, index_buffer, num_indices) = Self::setup_geometry(device);
        let (position_buffer, color_buffer) = Self::setup_instances(device, instance_count);

        Ok(Shader {
            render_bind_group,
            render_pipeline,

            vertex_buffer,
            index_buffer,
            num_indices,

            position_buffer,
            color_buffer,
            globals_buffer,
        })
    }

    /// Full overwrite of both instance buffers.
    pub fn upload(&self, queue: &wgpu::Queue, positions: &[u8], colors: &[u8]) {
        if positions.is_empty() {
            return;
        }
        queue.write_buffer(&self.position_buffer, 0, positions);
        queue.write_buffer(&self.color_buffer, 0, colors);
    }

    /// render encodes a single instanced draw of the circle fan, one instance per particle
    pub fn render(
        &self,
        view: &wgpu::TextureView,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        framebuffer: (u32, u32),
        instance_count: u32,
    ) {
        let globals = Globals {
            window_size: [framebuffer.0 as f32, framebuffer.1 as f32],
            pixel_radius: PIXEL_RADIUS,
            _padding: 0.0,
        };
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));

        let mut command_encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        command_encoder.push_debug_group("draw circles");
        {
            let mut rpass = command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            rpass.set_pipeline(&self.render_pipeline);
            rpass.set_bind_group(0, &self.render_bind_group, &[]);
            rpass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            rpass.set_vertex_buffer(1, self.position_buffer.slice(..));
            rpass.set_vertex_buffer(2, self.color_buffer.slice(..));
            rpass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..self.num_indices, 0, 0..instance_count);
        }
        command_encoder.pop_debug_group();

        queue.submit(Some(command_encoder.finish()));
    }
}
