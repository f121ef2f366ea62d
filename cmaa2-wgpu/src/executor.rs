//! Records a CMAA2 pass graph into a command encoder.
//!
//! ## Usage
//!
//! Keep one [`GraphExecutor`] per device next to the pipeline cache. For each
//! queued [`Cmaa2Graph`], call [`GraphExecutor::record`] with the view's color
//! texture; transient resources live until the submitted work completes.

use cmaa2::{
    BufferKind, Cmaa2Graph, Dispatch, Extent, ParameterKind, ResourceDesc, ResourceId, StoreMode,
    resources::{EDGES_FORMAT, LIST_HEADS_FORMAT},
};
use thiserror::Error;
use tracing::{debug, instrument};
use wgpu::{TextureFormat, TextureUsages};

use crate::{
    capabilities::AdapterFormatCapabilities,
    pipeline_cache::{Cmaa2PipelineCache, PipelineKey},
    shader::binding_slot,
};

/// Errors raised while recording a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecuteError {
    /// The texture format differs from the one the graph was built for.
    #[error("color texture format {actual:?} does not match the graph's {expected:?}")]
    ColorFormatMismatch {
        /// Format the graph was built for.
        expected: TextureFormat,
        /// Format of the texture.
        actual: TextureFormat,
    },
    /// The texture extent differs from the one the graph was built for.
    #[error("color texture extent {actual:?} does not match the graph's {expected:?}")]
    ColorExtentMismatch {
        /// Extent the graph was built for.
        expected: Extent,
        /// Extent of the texture.
        actual: Extent,
    },
    /// The texture lacks usages the store mode needs.
    #[error("color texture is missing usages {0:?}")]
    MissingColorUsage(TextureUsages),
    /// The device lacks a feature the passes need.
    #[error("device is missing features {0:?}")]
    MissingFeature(wgpu::Features),
    /// A working texture format lacks read-write storage on the adapter.
    #[error("working format {0:?} does not support read-write storage")]
    UnsupportedWorkingFormat(TextureFormat),
    /// No pipeline can be created for the color store format.
    #[error("no storage declaration for color format {0:?}")]
    UnsupportedStorageFormat(TextureFormat),
    /// A pass refers to a resource the graph does not declare.
    #[error("pass refers to undeclared resource {0:?}")]
    MissingResource(ResourceId),
}

/// Texture usages the color surface needs for a store mode.
pub fn required_color_usages(store: &StoreMode) -> TextureUsages {
    match store {
        StoreMode::Typed { .. } | StoreMode::TypedSrgbSibling { .. } => {
            TextureUsages::TEXTURE_BINDING | TextureUsages::STORAGE_BINDING
        }
        StoreMode::Untyped { .. } => {
            TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_SRC | TextureUsages::COPY_DST
        }
    }
}

/// Bytes per row of the raw color buffer, padded for texture copies.
pub fn raw_row_pitch(width: u32) -> u32 {
    (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// Allocation size of a transient buffer.
///
/// Never zero: a tiny view still gets one element per list.
pub fn buffer_allocation_size(stride: u32, count: u64) -> u64 {
    (count.max(1) * u64::from(stride)).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Checks that the edge map and list heads can be bound read-write.
pub fn check_working_formats(capabilities: &AdapterFormatCapabilities) -> Result<(), ExecuteError> {
    for format in [EDGES_FORMAT, LIST_HEADS_FORMAT] {
        if !capabilities.supports_read_write_storage(format) {
            return Err(ExecuteError::UnsupportedWorkingFormat(format));
        }
    }
    Ok(())
}

/// Passes around which an untyped color surface is staged.
///
/// Returns the first pass that writes color, before which the surface is
/// copied into the raw buffer, and the last one, after which it is copied
/// back. `None` for typed stores.
pub fn raw_copy_points(graph: &Cmaa2Graph) -> Option<(usize, usize)> {
    if !graph.store.is_untyped() {
        return None;
    }
    let first = graph.graph.first_writer(ResourceId::Color)?;
    let last = graph.graph.last_writer(ResourceId::Color)?;
    Some((first, last))
}

enum Transient {
    Texture(wgpu::TextureView),
    Buffer(wgpu::Buffer),
}

/// Records built graphs on one device.
#[derive(Debug)]
pub struct GraphExecutor {
    point_clamp_sampler: wgpu::Sampler,
    capabilities: AdapterFormatCapabilities,
}

impl GraphExecutor {
    /// Creates the executor and its shared sampler.
    ///
    /// `capabilities` must describe the adapter `device` was created from.
    pub fn new(device: &wgpu::Device, capabilities: AdapterFormatCapabilities) -> Self {
        let point_clamp_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("CMAA2 point clamp sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });
        Self {
            point_clamp_sampler,
            capabilities,
        }
    }

    /// Records every pass of `graph` against `color`.
    ///
    /// Nothing is recorded when validation fails. A surface written through
    /// its linear sibling must list that format in its view formats.
    #[instrument(level = "debug", skip_all, fields(name = %graph.event_name()))]
    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &Cmaa2PipelineCache,
        graph: &Cmaa2Graph,
        color: &wgpu::Texture,
    ) -> Result<(), ExecuteError> {
        validate_color(graph, color)?;
        let required = wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        if !device.features().contains(required) {
            return Err(ExecuteError::MissingFeature(required));
        }
        check_working_formats(&self.capabilities)?;

        let mut prepared = Vec::with_capacity(graph.graph.passes().len());
        for pass in graph.graph.passes() {
            let pipeline = match pass.program {
                Some(id) => {
                    let pipeline = pipelines
                        .get_or_create(
                            device,
                            PipelineKey::new(id, &graph.store, graph.color.format),
                        )
                        .ok_or(ExecuteError::UnsupportedStorageFormat(graph.color.format))?;
                    Some((id.program, pipeline))
                }
                None => None,
            };
            prepared.push(pipeline);
        }

        let transients = allocate_transients(device, graph);
        let color_source = color.create_view(&wgpu::TextureViewDescriptor {
            label: Some("CMAA2 color source"),
            ..Default::default()
        });
        let color_target = ColorTarget::new(device, graph, color);
        let raw_copies = raw_copy_points(graph);

        encoder.push_debug_group(&graph.event_name());
        for index in graph.graph.execution_order() {
            let pass = &graph.graph.passes()[index];

            let Some((program, pipeline)) = &prepared[index] else {
                for binding in pass.bindings.iter().filter(|binding| binding.access.writes()) {
                    match lookup(&transients, binding.resource)? {
                        Transient::Buffer(buffer) => encoder.clear_buffer(buffer, 0, None),
                        Transient::Texture(_) => {
                            return Err(ExecuteError::MissingResource(binding.resource));
                        }
                    }
                }
                continue;
            };

            if let ColorTarget::Raw { buffer } = &color_target
                && let Some((first, _)) = raw_copies
                && index == first
            {
                copy_color_to_raw(encoder, color, buffer);
            }

            let mut entries = Vec::with_capacity(program.parameters().len());
            for parameter in program.parameters() {
                let Some(binding) = binding_slot(parameter.kind, parameter.access) else {
                    continue;
                };
                let resource = match parameter.kind {
                    ParameterKind::ColorSource => wgpu::BindingResource::TextureView(&color_source),
                    ParameterKind::ColorTarget => color_target.binding_resource(),
                    ParameterKind::PointClampSampler => {
                        wgpu::BindingResource::Sampler(&self.point_clamp_sampler)
                    }
                    kind => {
                        let Some(id) = graph.resources.for_parameter(kind) else {
                            continue;
                        };
                        match lookup(&transients, id)? {
                            Transient::Texture(view) => wgpu::BindingResource::TextureView(view),
                            Transient::Buffer(buffer) => buffer.as_entire_binding(),
                        }
                    }
                };
                entries.push(wgpu::BindGroupEntry { binding, resource });
            }

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &pipeline.bind_group_layout,
                entries: &entries,
                label: Some(&pass.label),
            });

            {
                let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&pass.label),
                    timestamp_writes: None,
                });
                compute_pass.set_pipeline(&pipeline.pipeline);
                compute_pass.set_bind_group(0, &bind_group, &[]);
                match pass.dispatch {
                    Dispatch::Direct(groups) => {
                        compute_pass.dispatch_workgroups(groups.x, groups.y, groups.z);
                    }
                    Dispatch::Indirect { args, offset } => match lookup(&transients, args)? {
                        Transient::Buffer(buffer) => {
                            compute_pass.dispatch_workgroups_indirect(buffer, offset);
                        }
                        Transient::Texture(_) => return Err(ExecuteError::MissingResource(args)),
                    },
                    Dispatch::Clear => {}
                }
            }

            if let ColorTarget::Raw { buffer } = &color_target
                && let Some((_, last)) = raw_copies
                && index == last
            {
                copy_raw_to_color(encoder, buffer, color);
            }
        }
        encoder.pop_debug_group();

        debug!("Recorded {} CMAA2 dispatches", graph.dispatch_count());
        Ok(())
    }
}

fn validate_color(graph: &Cmaa2Graph, color: &wgpu::Texture) -> Result<(), ExecuteError> {
    if color.format() != graph.color.format {
        return Err(ExecuteError::ColorFormatMismatch {
            expected: graph.color.format,
            actual: color.format(),
        });
    }
    let actual = Extent::new(color.width(), color.height());
    if actual != graph.color.extent {
        return Err(ExecuteError::ColorExtentMismatch {
            expected: graph.color.extent,
            actual,
        });
    }
    let required = required_color_usages(&graph.store);
    if !color.usage().contains(required) {
        return Err(ExecuteError::MissingColorUsage(required - color.usage()));
    }
    Ok(())
}

fn allocate_transients(device: &wgpu::Device, graph: &Cmaa2Graph) -> Vec<Transient> {
    graph
        .graph
        .resources()
        .iter()
        .map(|resource| match resource {
            ResourceDesc::Texture(desc) => {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(desc.label),
                    size: wgpu::Extent3d {
                        width: desc.extent.width.max(1),
                        height: desc.extent.height.max(1),
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: desc.format,
                    usage: TextureUsages::STORAGE_BINDING,
                    view_formats: &[],
                });
                Transient::Texture(texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
            ResourceDesc::Buffer(desc) => {
                let mut usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
                if desc.kind == BufferKind::Indirect {
                    usage |= wgpu::BufferUsages::INDIRECT;
                }
                Transient::Buffer(device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(desc.label),
                    size: buffer_allocation_size(desc.stride, desc.count),
                    usage,
                    mapped_at_creation: false,
                }))
            }
        })
        .collect()
}

fn lookup(transients: &[Transient], id: ResourceId) -> Result<&Transient, ExecuteError> {
    match id {
        ResourceId::Transient(index) => transients
            .get(index as usize)
            .ok_or(ExecuteError::MissingResource(id)),
        ResourceId::Color => Err(ExecuteError::MissingResource(id)),
    }
}

enum ColorTarget {
    Typed(wgpu::TextureView),
    Raw { buffer: wgpu::Buffer },
}

impl ColorTarget {
    fn new(device: &wgpu::Device, graph: &Cmaa2Graph, color: &wgpu::Texture) -> Self {
        match graph.store.typed_format() {
            Some(format) => ColorTarget::Typed(color.create_view(&wgpu::TextureViewDescriptor {
                label: Some("CMAA2 color target"),
                format: Some(format),
                ..Default::default()
            })),
            None => ColorTarget::Raw {
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("CMAA2.RawColor"),
                    size: u64::from(raw_row_pitch(color.width())) * u64::from(color.height()),
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_SRC
                        | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
            },
        }
    }

    fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        match self {
            ColorTarget::Typed(view) => wgpu::BindingResource::TextureView(view),
            ColorTarget::Raw { buffer } => buffer.as_entire_binding(),
        }
    }
}

fn raw_layout(color: &wgpu::Texture) -> wgpu::TexelCopyBufferLayout {
    wgpu::TexelCopyBufferLayout {
        offset: 0,
        bytes_per_row: Some(raw_row_pitch(color.width())),
        rows_per_image: Some(color.height()),
    }
}

fn copy_color_to_raw(encoder: &mut wgpu::CommandEncoder, color: &wgpu::Texture, raw: &wgpu::Buffer) {
    encoder.copy_texture_to_buffer(
        color.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: raw,
            layout: raw_layout(color),
        },
        color.size(),
    );
}

fn copy_raw_to_color(encoder: &mut wgpu::CommandEncoder, raw: &wgpu::Buffer, color: &wgpu::Texture) {
    encoder.copy_buffer_to_texture(
        wgpu::TexelCopyBufferInfo {
            buffer: raw,
            layout: raw_layout(color),
        },
        color.as_image_copy(),
        color.size(),
    );
}

#[cfg(test)]
mod tests {
    use cmaa2::{Cmaa2Config, ColorSurface, Stage, UntypedFormat, ViewRect, build_cmaa2_graph};

    use super::*;
    use crate::StaticFormatCapabilities;

    fn graph(format: TextureFormat, debug_visualize: bool) -> Cmaa2Graph {
        let extent = Extent::new(640, 360);
        build_cmaa2_graph(
            Some(&ColorSurface::new(format, extent)),
            ViewRect::from_extent(extent),
            &Cmaa2Config::default().with_debug_visualize(debug_visualize),
            &StaticFormatCapabilities::webgpu_core(),
        )
        .unwrap()
    }

    #[test]
    fn raw_color_is_staged_around_the_apply_pass() {
        let graph = graph(TextureFormat::Rgba8UnormSrgb, false);
        assert!(graph.store.is_untyped());
        let apply = graph.stage_index(Stage::DeferredColorApply).unwrap();
        assert_eq!(raw_copy_points(&graph), Some((apply, apply)));
    }

    #[test]
    fn debug_pass_delays_the_copy_back() {
        let graph = graph(TextureFormat::Bgra8Unorm, true);
        let apply = graph.stage_index(Stage::DeferredColorApply).unwrap();
        let debug = graph.stage_index(Stage::DebugVisualize).unwrap();
        assert_eq!(raw_copy_points(&graph), Some((apply, debug)));
        let order = graph.graph.execution_order();
        let position = |index| order.iter().position(|candidate| *candidate == index);
        assert!(position(apply) < position(debug));
    }

    #[test]
    fn typed_color_is_not_staged() {
        let graph = graph(TextureFormat::Rgba8Unorm, true);
        assert_eq!(raw_copy_points(&graph), None);
    }

    #[test]
    fn edge_map_storage_is_checked_before_recording() {
        let guaranteed = AdapterFormatCapabilities::guaranteed(wgpu::Features::empty());
        assert_eq!(
            check_working_formats(&guaranteed),
            Err(ExecuteError::UnsupportedWorkingFormat(TextureFormat::R8Uint))
        );
        assert_eq!(
            ExecuteError::UnsupportedWorkingFormat(TextureFormat::R8Uint).to_string(),
            "working format R8Uint does not support read-write storage"
        );
    }

    #[test]
    fn raw_rows_are_copy_aligned() {
        assert_eq!(raw_row_pitch(1), 256);
        assert_eq!(raw_row_pitch(64), 256);
        assert_eq!(raw_row_pitch(65), 512);
        assert_eq!(raw_row_pitch(1920), 7680);
        assert_eq!(
            raw_row_pitch(1920) / 4 % crate::shader::RAW_ROW_ALIGNMENT_WORDS,
            0
        );
    }

    #[test]
    fn empty_lists_still_allocate() {
        assert_eq!(buffer_allocation_size(8, 0), 8);
        assert_eq!(buffer_allocation_size(4, 518_400), 2_073_600);
        assert_eq!(buffer_allocation_size(4, 3) % wgpu::COPY_BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn color_usages_follow_store_mode() {
        let typed = required_color_usages(&StoreMode::Typed {
            format: TextureFormat::Rgba8Unorm,
        });
        assert!(typed.contains(TextureUsages::STORAGE_BINDING));
        assert!(!typed.contains(TextureUsages::COPY_DST));

        let untyped = required_color_usages(&StoreMode::Untyped {
            format: UntypedFormat::Rgba8,
            convert_to_srgb: true,
        });
        assert!(untyped.contains(TextureUsages::COPY_SRC | TextureUsages::COPY_DST));
        assert!(!untyped.contains(TextureUsages::STORAGE_BINDING));
    }

    #[test]
    fn errors_describe_the_mismatch() {
        let error = ExecuteError::ColorFormatMismatch {
            expected: TextureFormat::Rgba8Unorm,
            actual: TextureFormat::Bgra8Unorm,
        };
        assert_eq!(
            error.to_string(),
            "color texture format Bgra8Unorm does not match the graph's Rgba8Unorm"
        );
    }
}
