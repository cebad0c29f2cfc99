//! The window-backed [`FrameCanvas`].
//!
//! [`FrameRenderer`] collects one frame's layers and draws them in two passes:
//! the video and sprites first, then the watch meshes over them with a fresh
//! depth buffer.

use crate::camera::Camera;
use crate::canvas::{DropShadow, FrameCanvas, SpriteQuad};
use crate::compositor::KeyedSprite;
use crate::draw2d::{Draw2d, TextureKey, WHITE};
use crate::error::{TryOnError, TryOnResult};
use crate::gpu::GpuContext;
use crate::mesh::Mesh;
use crate::mesh_pass::{DrawCall, MeshPass};
use crate::scene::{Lighting, WristScene};
use crate::video::VideoFrame;
use crate::watch::{MeshAsset, PartColor};

use glam::Mat4;

/// GPU copies of one mesh asset.
struct ModelMeshes {
    asset_id: u64,
    body: Vec<(Mesh, PartColor)>,
    straps: Vec<(Mesh, PartColor)>,
}

impl ModelMeshes {
    fn upload(gpu: &GpuContext, asset: &mut MeshAsset) -> Self {
        let body = asset
            .body
            .iter()
            .map(|part| (Mesh::from_geometry(gpu, &part.geometry), part.color))
            .collect();
        let straps = asset
            .straps
            .iter_mut()
            .map(|strap| {
                strap.take_dirty();
                (Mesh::from_geometry(gpu, &strap.live), strap.color)
            })
            .collect();
        tracing::debug!(asset = asset.id, parts = asset.part_count(), "model uploaded");
        Self {
            asset_id: asset.id,
            body,
            straps,
        }
    }

    /// Re-uploads straps deformed since the last upload.
    fn refresh(&self, gpu: &GpuContext, asset: &mut MeshAsset) {
        for (strap, (mesh, _)) in asset.straps.iter_mut().zip(&self.straps) {
            if strap.take_dirty() {
                mesh.update_vertices(gpu, &strap.live.vertices);
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Part {
    Body(usize),
    Strap(usize),
}

/// Meshes queued for the current frame.
struct ModelFrame {
    camera: Camera,
    lighting: Lighting,
    draws: Vec<(Part, Mat4)>,
}

/// Draws composited frames into the window.
pub struct FrameRenderer {
    gpu: GpuContext,
    draw2d: Draw2d,
    mesh_pass: MeshPass,
    frame_size: (f32, f32),
    models: Option<ModelMeshes>,
    model_frame: Option<ModelFrame>,
}

impl FrameRenderer {
    pub fn new(gpu: GpuContext) -> Self {
        let draw2d = Draw2d::new(&gpu);
        let mesh_pass = MeshPass::new(&gpu);
        let frame_size = (gpu.width() as f32, gpu.height() as f32);
        Self {
            gpu,
            draw2d,
            mesh_pass,
            frame_size,
            models: None,
            model_frame: None,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    /// Releases cached model buffers and sprite textures, e.g. when the
    /// session ends.
    pub fn release_models(&mut self) {
        self.models = None;
        self.model_frame = None;
        self.draw2d.release_overlays();
    }

    /// Drops anything queued so the next present shows a blank frame.
    pub fn clear_frame(&mut self) {
        self.draw2d.begin(self.frame_size.0, self.frame_size.1);
        self.model_frame = None;
    }

    fn frame_aspect(&self) -> f32 {
        let (width, height) = self.frame_size;
        if height > 0.0 { width / height } else { 1.0 }
    }

    /// Submits the collected frame and presents it.
    ///
    /// A lost or outdated surface is reconfigured and the frame dropped; only
    /// running out of memory is an error.
    pub fn present(&mut self) -> TryOnResult<()> {
        let model_frame = self.model_frame.take();

        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost; reconfiguring");
                self.gpu.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(TryOnError::gpu("out of memory acquiring surface texture"));
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropped frame");
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Video Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.draw2d.render(&self.gpu, &mut pass);
        }

        if let (Some(frame), Some(models)) = (&model_frame, &self.models) {
            self.mesh_pass.ensure_depth_size(&self.gpu);
            let draws: Vec<DrawCall> = frame
                .draws
                .iter()
                .filter_map(|(part, model)| {
                    let (mesh, color) = match *part {
                        Part::Body(i) => models.body.get(i)?,
                        Part::Strap(i) => models.straps.get(i)?,
                    };
                    Some(DrawCall {
                        mesh,
                        model: *model,
                        color: *color,
                    })
                })
                .collect();

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Model Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.mesh_pass.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.mesh_pass.render(
                &self.gpu,
                &mut pass,
                &frame.camera,
                &frame.lighting,
                self.frame_aspect(),
                &draws,
            );
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

impl FrameCanvas for FrameRenderer {
    fn draw_video(&mut self, frame: &VideoFrame) {
        self.frame_size = frame.size();
        self.draw2d.begin(self.frame_size.0, self.frame_size.1);
        self.model_frame = None;
        self.draw2d.upload(&self.gpu, TextureKey::Video, &frame.image);
        self.draw2d.fullscreen(TextureKey::Video);
    }

    fn draw_sprite(&mut self, sprite: &KeyedSprite, quad: SpriteQuad, shadow: Option<DropShadow>) {
        if let (Some(shadow), Some(mask)) = (shadow, &sprite.shadow)
            && let Some(shadow_quad) = sprite.shadow_quad(quad, shadow)
        {
            let key = TextureKey::Shadow(sprite.generation);
            if !self.draw2d.has_texture(key) {
                self.draw2d.upload(&self.gpu, key, mask);
            }
            self.draw2d
                .quad(key, shadow_quad.corners(), [1.0, 1.0, 1.0, shadow.opacity]);
        }

        let key = TextureKey::Sprite(sprite.generation);
        if !self.draw2d.has_texture(key) {
            self.draw2d.upload(&self.gpu, key, &sprite.image);
        }
        self.draw2d.quad(key, quad.corners(), WHITE);
    }

    fn draw_model(&mut self, scene: &mut WristScene) {
        let Some(model) = scene.model_matrix() else {
            return;
        };
        let camera = scene.camera;
        let lighting = scene.lighting;
        let asset = scene.asset_mut();

        match &self.models {
            Some(models) if models.asset_id == asset.id => models.refresh(&self.gpu, asset),
            _ => self.models = Some(ModelMeshes::upload(&self.gpu, asset)),
        }

        let draws = (0..asset.body.len())
            .map(|i| (Part::Body(i), model))
            .chain(
                asset
                    .straps
                    .iter()
                    .enumerate()
                    .map(|(i, strap)| (Part::Strap(i), strap.world)),
            )
            .collect();

        self.model_frame = Some(ModelFrame {
            camera,
            lighting,
            draws,
        });
    }
}
