//! GPU point picking.
//!
//! Point sprites are sized in screen space by the vertex shader, so a ray test
//! against a world-space threshold disagrees with what the user sees. The
//! picker instead renders every registered cloud into an offscreen id buffer
//! with the same sizing rules and reads back the pixel under the cursor.

use std::collections::HashMap;

use glam::{Vec2, Vec3, Vec4};
use subpick_core::pick::{color_to_index, IdBlock};
use subpick_core::{PointCloud, PointsId, Registry};
use wgpu::util::DeviceExt;

use crate::camera::Camera;
use crate::error::{RenderError, RenderResult};
use crate::pick::{id_texture_data, id_texture_extent, PointIdRegistry, PointPickUniforms};

/// Result of a GPU point pick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPick {
    /// The cloud that was hit.
    pub points: PointsId,
    /// Vertex index within the cloud.
    pub index: u32,
    /// World position of the vertex, morphs included.
    pub world_position: Vec3,
}

/// Offscreen color + depth target sized to the viewport.
struct PickTarget {
    size: (u32, u32),
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    staging: wgpu::Buffer,
}

/// Per-cloud GPU resources, rebuilt when the cloud's id block changes.
struct CloudResources {
    generation: u64,
    num_points: u32,
    position_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    id_texture_width: u32,
    bind_group: wgpu::BindGroup,
}

/// Renders registered point clouds to an id buffer and decodes clicks.
pub struct GpuPointPicker {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    ids: PointIdRegistry,
    resources: HashMap<PointsId, CloudResources>,
    target: Option<PickTarget>,
    max_texture_dimension: u32,
}

impl GpuPointPicker {
    /// Creates the pick pipeline. GPU buffers are created lazily on first pick.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Point Pick Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/pick_points.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Point Pick Bind Group Layout"),
            entries: &[
                // Pick uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Position storage buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Id color texture
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Point Pick Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Point Pick Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None, // ids must be written exactly
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..wgpu::PrimitiveState::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth24Plus,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            pipeline,
            bind_group_layout,
            ids: PointIdRegistry::new(),
            resources: HashMap::new(),
            target: None,
            max_texture_dimension: device.limits().max_texture_dimension_2d,
        }
    }

    /// Registers a cloud for picking and assigns its per-vertex id colors.
    ///
    /// Calling this again with an unchanged vertex count is a no-op.
    pub fn register_points(&mut self, id: PointsId, cloud: &mut PointCloud) -> Option<IdBlock> {
        self.ids.register(id, cloud)
    }

    /// Stops picking a cloud and frees its GPU resources.
    pub fn unregister_points(&mut self, id: PointsId) {
        self.ids.unregister(id);
        self.resources.remove(&id);
    }

    /// Registers every cloud in `registry` and drops clouds no longer present.
    pub fn sync(&mut self, registry: &mut Registry) {
        let stale: Vec<PointsId> = self
            .ids
            .iter()
            .map(|(id, _)| id)
            .filter(|id| registry.points(*id).is_none())
            .collect();
        for id in stale {
            self.unregister_points(id);
        }

        let live: Vec<PointsId> = registry.point_clouds().map(|(id, _)| id).collect();
        for id in live {
            if let Some(cloud) = registry.points_mut(id) {
                self.register_points(id, cloud);
            }
        }
    }

    pub fn is_registered(&self, id: PointsId) -> bool {
        self.ids.block(id).is_some()
    }

    /// Renders the id pass and returns the point under pixel `(x, y)`.
    ///
    /// `viewport` is the framebuffer size in physical pixels; `(x, y)` is
    /// measured from its top-left corner.
    pub fn pick_at(
        &mut self,
        camera: &Camera,
        registry: &Registry,
        viewport: (u32, u32),
        x: u32,
        y: u32,
    ) -> Option<PointPick> {
        let (width, height) = viewport;
        if x >= width || y >= height {
            return None;
        }
        if let Err(e) = self.ensure_target(width, height) {
            log::warn!("point pick skipped: {e}");
            return None;
        }

        let view = camera.view_matrix();
        let proj = camera.projection_matrix();
        let mut draws: Vec<(PointsId, u32)> = Vec::new();

        let registered: Vec<(PointsId, IdBlock)> = self.ids.iter().collect();
        for (id, block) in registered {
            let Some(cloud) = registry.points(id) else {
                log::debug!("{id}: registered for picking but not in the scene");
                continue;
            };
            if block.count == 0 || cloud.num_points() != block.count as usize {
                continue;
            }
            if !self.ensure_resources(id, block) {
                continue;
            }
            let Some(res) = self.resources.get(&id) else {
                continue;
            };

            let material = cloud.material();
            let uniforms = PointPickUniforms {
                view: view.to_cols_array_2d(),
                proj: proj.to_cols_array_2d(),
                model: cloud.transform().to_cols_array_2d(),
                viewport: [width as f32, height as f32],
                point_size: material.size,
                size_attenuation: u32::from(material.size_attenuation),
                id_texture_width: res.id_texture_width,
                _padding: [0; 3],
            };
            let positions: Vec<[f32; 4]> = cloud
                .morphed_positions()
                .into_iter()
                .map(|p| p.extend(1.0).to_array())
                .collect();

            self.queue
                .write_buffer(&res.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
            self.queue
                .write_buffer(&res.position_buffer, 0, bytemuck::cast_slice(&positions));
            draws.push((id, res.num_points));
        }

        let target = self.target.as_ref()?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Point Pick Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Point Pick Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), // Background = (0,0,0)
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            pass.set_pipeline(&self.pipeline);
            for (id, num_points) in &draws {
                if let Some(res) = self.resources.get(id) {
                    pass.set_bind_group(0, &res.bind_group, &[]);
                    pass.draw(0..num_points * 6, 0..1);
                }
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &target.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(256), // Aligned
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));

        let pixel = match read_pixel(&self.device, &target.staging) {
            Ok(pixel) => pixel,
            Err(e) => {
                log::error!("{e}");
                return None;
            }
        };

        let global_id = color_to_index(pixel[0], pixel[1], pixel[2]);
        let (points, index) = self.ids.resolve(global_id)?;
        let world_position = registry.points(points)?.world_position(index as usize)?;
        log::trace!("point pick at ({x}, {y}): {points}[{index}]");
        Some(PointPick {
            points,
            index,
            world_position,
        })
    }

    /// Picks at a position given in fractional pixels.
    pub fn pick_at_position(
        &mut self,
        camera: &Camera,
        registry: &Registry,
        viewport: (u32, u32),
        position: Vec2,
    ) -> Option<PointPick> {
        if position.x < 0.0 || position.y < 0.0 {
            return None;
        }
        self.pick_at(camera, registry, viewport, position.x as u32, position.y as u32)
    }

    /// Creates or recreates the offscreen target to match the viewport size.
    fn ensure_target(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if self.target.as_ref().is_some_and(|t| t.size == (width, height)) {
            return Ok(());
        }
        let max = self.max_texture_dimension;
        if width > max || height > max {
            return Err(RenderError::TargetTooLarge { width, height, max });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        // Rgba8Unorm keeps id colors exact
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Point Pick Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Point Pick Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth24Plus,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        // Buffer size must be aligned to COPY_BYTES_PER_ROW_ALIGNMENT (256)
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Point Pick Staging Buffer"),
            size: 256,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        log::debug!("point pick target resized to {width}x{height}");
        self.target = Some(PickTarget {
            size: (width, height),
            color,
            color_view,
            depth_view,
            staging,
        });
        Ok(())
    }

    /// Makes sure `id` has GPU resources matching its current id block.
    fn ensure_resources(&mut self, id: PointsId, block: IdBlock) -> bool {
        let Some(generation) = self.ids.generation(id) else {
            return false;
        };
        if self
            .resources
            .get(&id)
            .is_some_and(|r| r.generation == generation)
        {
            return true;
        }

        let Some((tex_width, tex_height)) =
            id_texture_extent(block.count, self.max_texture_dimension)
        else {
            log::error!("{id}: {} points do not fit in an id texture", block.count);
            return false;
        };

        let id_texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some("Point Pick Id Texture"),
                size: wgpu::Extent3d {
                    width: tex_width,
                    height: tex_height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &id_texture_data(block, tex_width, tex_height),
        );
        let id_view = id_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let position_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Point Pick Positions"),
            size: u64::from(block.count) * std::mem::size_of::<Vec4>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Point Pick Uniforms"),
            size: std::mem::size_of::<PointPickUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Point Pick Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: position_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&id_view),
                },
            ],
        });

        self.resources.insert(
            id,
            CloudResources {
                generation,
                num_points: block.count,
                position_buffer,
                uniform_buffer,
                id_texture_width: tex_width,
                bind_group,
            },
        );
        true
    }
}

/// Maps the staging buffer and returns the first RGBA pixel.
fn read_pixel(device: &wgpu::Device, staging: &wgpu::Buffer) -> RenderResult<[u8; 4]> {
    let buffer_slice = staging.slice(..4);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    if let Err(e) = device.poll(wgpu::PollType::wait_indefinitely()) {
        return Err(RenderError::ReadbackFailed(e.to_string()));
    }
    rx.recv()
        .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?
        .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?;

    let data = buffer_slice.get_mapped_range();
    let pixel = [data[0], data[1], data[2], data[3]];
    drop(data);
    staging.unmap();
    Ok(pixel)
}
