//! Batched textured quads in frame pixels.
//!
//! The video background, the keyed sprite and its shadow all go through
//! [`Draw2d`]. Quads are collected into a [`SpriteBatch`] during the frame and
//! drawn in submission order in one pass, one draw call per run of quads that
//! share a texture.

use std::collections::HashMap;

use glam::Vec2;
use image::RgbaImage;

use crate::gpu::GpuContext;
use crate::texture::Texture;

/// Vertex for 2D sprite rendering.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex2d {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex2d {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex2d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
            // color
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x4,
            },
        ],
    };
}

/// Identifies a texture uploaded to [`Draw2d`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKey {
    /// The current camera frame.
    Video,
    /// A keyed sprite, by generation.
    Sprite(u64),
    /// The blurred shadow of a keyed sprite, by generation.
    Shadow(u64),
}

impl TextureKey {
    /// Whether uploading `self` makes `other` obsolete: a new keyed sprite
    /// replaces the textures of the previous generation.
    pub fn supersedes(self, other: TextureKey) -> bool {
        match (self, other) {
            (TextureKey::Sprite(a), TextureKey::Sprite(b))
            | (TextureKey::Shadow(a), TextureKey::Shadow(b)) => a != b,
            _ => false,
        }
    }
}

pub const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Uniforms for 2D rendering.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Draw2dUniforms {
    resolution: [f32; 2],
    _padding: [f32; 2],
}

const MAX_VERTICES: usize = 16384;

/// Quads grouped into runs that share a texture.
#[derive(Debug, Default)]
pub struct SpriteBatch {
    runs: Vec<(TextureKey, Vec<Vertex2d>)>,
}

impl SpriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a textured quad. `corners` are top-left, top-right,
    /// bottom-right, bottom-left; the full texture is mapped onto them.
    pub fn push(&mut self, texture: TextureKey, corners: [Vec2; 4], tint: [f32; 4]) {
        let [tl, tr, br, bl] = corners;
        let v = |p: Vec2, uv: [f32; 2]| Vertex2d {
            position: p.to_array(),
            uv,
            color: tint,
        };
        let quad = [
            v(tl, [0.0, 0.0]),
            v(tr, [1.0, 0.0]),
            v(bl, [0.0, 1.0]),
            v(tr, [1.0, 0.0]),
            v(br, [1.0, 1.0]),
            v(bl, [0.0, 1.0]),
        ];

        match self.runs.last_mut() {
            Some((key, vertices)) if *key == texture => vertices.extend_from_slice(&quad),
            _ => self.runs.push((texture, quad.to_vec())),
        }
    }

    pub fn runs(&self) -> &[(TextureKey, Vec<Vertex2d>)] {
        &self.runs
    }

    pub fn vertex_count(&self) -> usize {
        self.runs.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }
}

struct BoundTexture {
    texture: Texture,
    bind_group: wgpu::BindGroup,
}

/// Immediate-mode textured quad renderer.
///
/// Positions are in frame pixels with Y down; the frame is stretched over the
/// whole render target.
pub struct Draw2d {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    textures: HashMap<TextureKey, BoundTexture>,
    batch: SpriteBatch,
    resolution: [f32; 2],
}

impl Draw2d {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Draw2d Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/draw2d.wgsl").into()),
        });

        // Uniform buffer
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw2d Uniforms"),
            size: std::mem::size_of::<Draw2dUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Uniform bind group layout (group 0)
        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Draw2d Uniform Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw2d Uniform Bind Group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        // Texture bind group layout (group 1)
        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Draw2d Texture Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Draw2d Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout, &texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        // Keyed sprites carry straight alpha.
        let blend_state = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Draw2d Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[Vertex2d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: gpu.config.format,
                    blend: Some(blend_state),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw2d Vertex Buffer"),
            size: (MAX_VERTICES * std::mem::size_of::<Vertex2d>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            vertex_buffer,
            uniform_buffer,
            uniform_bind_group,
            texture_bind_group_layout,
            textures: HashMap::new(),
            batch: SpriteBatch::new(),
            resolution: [gpu.width() as f32, gpu.height() as f32],
        }
    }

    /// Starts a new frame whose quads are given in pixels of a
    /// `width` x `height` frame.
    ///
    /// Uploaded textures are kept across frames, so a sprite that skips a
    /// frame without a hand is not uploaded again.
    pub fn begin(&mut self, width: f32, height: f32) {
        self.batch.clear();
        self.resolution = [width.max(1.0), height.max(1.0)];
    }

    pub fn has_texture(&self, key: TextureKey) -> bool {
        self.textures.contains_key(&key)
    }

    /// Releases every texture except the video frame.
    pub fn release_overlays(&mut self) {
        self.textures.retain(|key, _| *key == TextureKey::Video);
    }

    /// Uploads `image` under `key`, reusing the existing texture when the
    /// size matches.
    pub fn upload(&mut self, gpu: &GpuContext, key: TextureKey, image: &RgbaImage) {
        if let Some(bound) = self.textures.get(&key)
            && bound.texture.update(gpu, image)
        {
            return;
        }

        let texture = Texture::from_image(gpu, image, &format!("{key:?}"));
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw2d Texture Bind Group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
        });
        tracing::debug!(?key, width = texture.width, height = texture.height, "texture uploaded");
        self.textures.retain(|old, _| !key.supersedes(*old));
        self.textures.insert(key, BoundTexture { texture, bind_group });
    }

    /// Queues a quad textured with a previously uploaded texture.
    pub fn quad(&mut self, key: TextureKey, corners: [Vec2; 4], tint: [f32; 4]) {
        if self.batch.vertex_count() + 6 > MAX_VERTICES {
            tracing::warn!(?key, "sprite batch full; dropping quad");
            return;
        }
        self.batch.push(key, corners, tint);
    }

    /// Queues a quad covering the whole frame.
    pub fn fullscreen(&mut self, key: TextureKey) {
        let [w, h] = self.resolution;
        self.quad(
            key,
            [
                Vec2::ZERO,
                Vec2::new(w, 0.0),
                Vec2::new(w, h),
                Vec2::new(0.0, h),
            ],
            WHITE,
        );
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Render all batched quads.
    pub fn render(&self, gpu: &GpuContext, render_pass: &mut wgpu::RenderPass) {
        if self.batch.is_empty() {
            return;
        }

        let uniforms = Draw2dUniforms {
            resolution: self.resolution,
            _padding: [0.0, 0.0],
        };
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));

        let mut offset = 0usize;
        for (key, vertices) in self.batch.runs() {
            let Some(bound) = self.textures.get(key) else {
                tracing::warn!(?key, "texture missing; skipping quads");
                continue;
            };

            gpu.queue.write_buffer(
                &self.vertex_buffer,
                (offset * std::mem::size_of::<Vertex2d>()) as u64,
                bytemuck::cast_slice(vertices),
            );

            render_pass.set_bind_group(1, &bound.bind_group, &[]);
            render_pass.draw(offset as u32..(offset + vertices.len()) as u32, 0..1);

            offset += vertices.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corners() -> [Vec2; 4] {
        [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 2.0),
            Vec2::new(0.0, 2.0),
        ]
    }

    #[test]
    fn quad_maps_full_texture() {
        let mut batch = SpriteBatch::new();
        batch.push(TextureKey::Video, corners(), WHITE);

        let (_, vertices) = &batch.runs()[0];
        assert_eq!(vertices.len(), 6);
        assert_eq!(vertices[0].uv, [0.0, 0.0]);
        assert_eq!(vertices[4].position, [4.0, 2.0]);
        assert_eq!(vertices[4].uv, [1.0, 1.0]);
    }

    #[test]
    fn only_a_new_generation_evicts_sprite_textures() {
        assert!(TextureKey::Sprite(2).supersedes(TextureKey::Sprite(1)));
        assert!(TextureKey::Shadow(2).supersedes(TextureKey::Shadow(1)));
        assert!(!TextureKey::Sprite(2).supersedes(TextureKey::Sprite(2)));
        assert!(!TextureKey::Sprite(2).supersedes(TextureKey::Shadow(1)));
        assert!(!TextureKey::Video.supersedes(TextureKey::Sprite(1)));
        assert!(!TextureKey::Sprite(2).supersedes(TextureKey::Video));
    }

    #[test]
    fn consecutive_quads_share_a_run() {
        let mut batch = SpriteBatch::new();
        batch.push(TextureKey::Sprite(1), corners(), WHITE);
        batch.push(TextureKey::Sprite(1), corners(), WHITE);
        assert_eq!(batch.runs().len(), 1);
        assert_eq!(batch.vertex_count(), 12);
    }

    #[test]
    fn texture_changes_keep_submission_order() {
        let mut batch = SpriteBatch::new();
        batch.push(TextureKey::Video, corners(), WHITE);
        batch.push(TextureKey::Shadow(3), corners(), [1.0, 1.0, 1.0, 0.45]);
        batch.push(TextureKey::Sprite(3), corners(), WHITE);

        let keys: Vec<_> = batch.runs().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![TextureKey::Video, TextureKey::Shadow(3), TextureKey::Sprite(3)]
        );
        assert_eq!(batch.runs()[1].1[0].color[3], 0.45);

        batch.clear();
        assert!(batch.is_empty());
    }
}
