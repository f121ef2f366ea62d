//! The CMAA2 pass graph.
//!
//! ## Usage
//!
//! Call [`build_cmaa2_graph`] once per view with the frame's configuration
//! snapshot. The returned [`Cmaa2Graph`] declares every transient resource and
//! pass; a backend records it.

use smallvec::SmallVec;
use tracing::{debug_span, instrument};
use wgpu::TextureFormat;

use crate::{
    config::{Cmaa2Config, Quality},
    error::SkipReason,
    format::{FormatCapabilities, StoreMode, is_hdr_format, resolve_store_mode},
    graph::{
        Access, BufferDesc, BufferKind, Dispatch, GroupCount, PassBinding, PassGraph, ResourceId,
        TextureDesc,
    },
    permutation::{
        Cmaa2Program, EdgeDetectionPath, ParameterAccess, ParameterKind, PermutationKey, ProgramId,
    },
    resources::{
        BLEND_ITEM_STRIDE, BLEND_LOCATION_STRIDE, EDGES_FORMAT, Extent, LIST_HEADS_FORMAT,
        ResourcePlan, SHAPE_CANDIDATE_STRIDE, ViewRect,
    },
};

/// Edge detection covers 14x14 pixel tiles, each thread handling 2x2.
pub const EDGE_DETECTION_TILE: u32 = 14 * 2;
/// Edge visualization tile size.
pub const DEBUG_TILE: u32 = 16;

/// The view's color surface as seen by graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSurface {
    /// Texel format.
    pub format: TextureFormat,
    /// Full surface extent.
    pub extent: Extent,
}

impl ColorSurface {
    /// Creates a surface description.
    pub const fn new(format: TextureFormat, extent: Extent) -> Self {
        Self { format, extent }
    }
}

/// Which indirect pass a dispatch argument computation prepares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgsMode {
    /// Arguments for shape candidate processing.
    ProcessCandidates,
    /// Arguments for deferred color blending.
    DeferredColorApply,
}

impl ArgsMode {
    /// The group count the argument kernel is dispatched with.
    ///
    /// The kernel reads its own dispatch size to tell the two modes apart.
    pub fn signal_group_count(self) -> GroupCount {
        match self {
            ArgsMode::ProcessCandidates => GroupCount::new(2, 1, 1),
            ArgsMode::DeferredColorApply => GroupCount::new(1, 2, 1),
        }
    }
}

/// Stages of the pass sequence in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Zero the control buffer.
    Clear,
    /// Detect edges and collect shape candidates.
    EdgeDetection,
    /// Convert counters into indirect dispatch arguments.
    ComputeDispatchArgs(ArgsMode),
    /// Process shape candidates into deferred blends.
    ProcessCandidates,
    /// Resolve deferred blends into the color surface.
    DeferredColorApply,
    /// Draw the detected edges over the color surface.
    DebugVisualize,
}

impl Stage {
    /// Pass label.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Clear => "CMAA2 ClearControlBuffer",
            Stage::EdgeDetection => "CMAA2 EdgesColor2x2",
            Stage::ComputeDispatchArgs(ArgsMode::ProcessCandidates) => {
                "CMAA2 ComputeDispatchArgs (Process)"
            }
            Stage::ProcessCandidates => "CMAA2 ProcessCandidates",
            Stage::ComputeDispatchArgs(ArgsMode::DeferredColorApply) => {
                "CMAA2 ComputeDispatchArgs (Apply)"
            }
            Stage::DeferredColorApply => "CMAA2 DeferredColorApply",
            Stage::DebugVisualize => "CMAA2 DebugDrawEdges",
        }
    }

    /// Program run by the stage, `None` for the clear.
    pub fn program(self) -> Option<Cmaa2Program> {
        match self {
            Stage::Clear => None,
            Stage::EdgeDetection => Some(Cmaa2Program::EdgesColor2x2),
            Stage::ComputeDispatchArgs(_) => Some(Cmaa2Program::ComputeDispatchArgs),
            Stage::ProcessCandidates => Some(Cmaa2Program::ProcessCandidates),
            Stage::DeferredColorApply => Some(Cmaa2Program::DeferredColorApply2x2),
            Stage::DebugVisualize => Some(Cmaa2Program::DebugDrawEdges),
        }
    }
}

/// Transient resources of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cmaa2Resources {
    /// Edge map.
    pub edges: ResourceId,
    /// Linked-list heads.
    pub list_heads: ResourceId,
    /// Shape candidate list.
    pub shape_candidates: ResourceId,
    /// Deferred blend node pool.
    pub blend_items: ResourceId,
    /// Deferred blend location list.
    pub blend_locations: ResourceId,
    /// Counter block.
    pub control: ResourceId,
    /// Indirect dispatch arguments.
    pub indirect_args: ResourceId,
}

impl Cmaa2Resources {
    fn declare(graph: &mut PassGraph, plan: &ResourcePlan) -> Self {
        let edges = graph.create_texture(TextureDesc {
            label: "CMAA2.WorkingEdges",
            extent: plan.edges,
            format: EDGES_FORMAT,
        });
        let list_heads = graph.create_texture(TextureDesc {
            label: "CMAA2.WorkingDeferredBlendItemListHeads",
            extent: plan.list_heads,
            format: LIST_HEADS_FORMAT,
        });
        let shape_candidates = graph.create_buffer(BufferDesc {
            label: "CMAA2.WorkingShapeCandidates",
            stride: SHAPE_CANDIDATE_STRIDE,
            count: plan.shape_candidates,
            kind: BufferKind::Structured,
        });
        let blend_items = graph.create_buffer(BufferDesc {
            label: "CMAA2.WorkingDeferredBlendItemList",
            stride: BLEND_ITEM_STRIDE,
            count: plan.blend_items,
            kind: BufferKind::Structured,
        });
        let blend_locations = graph.create_buffer(BufferDesc {
            label: "CMAA2.WorkingDeferredBlendLocationList",
            stride: BLEND_LOCATION_STRIDE,
            count: plan.blend_locations,
            kind: BufferKind::Structured,
        });
        let control = graph.create_buffer(BufferDesc {
            label: "CMAA2.WorkingControlBuffer",
            stride: 4,
            count: u64::from(plan.control_words),
            kind: BufferKind::Structured,
        });
        let indirect_args = graph.create_buffer(BufferDesc {
            label: "CMAA2.WorkingExecuteIndirectBuffer",
            stride: 4,
            count: u64::from(plan.indirect_args_words),
            kind: BufferKind::Indirect,
        });

        Self {
            edges,
            list_heads,
            shape_candidates,
            blend_items,
            blend_locations,
            control,
            indirect_args,
        }
    }

    /// Resource bound to a program parameter, `None` for samplers.
    pub fn for_parameter(&self, kind: ParameterKind) -> Option<ResourceId> {
        match kind {
            ParameterKind::ColorSource | ParameterKind::ColorTarget => Some(ResourceId::Color),
            ParameterKind::PointClampSampler => None,
            ParameterKind::Edges => Some(self.edges),
            ParameterKind::ShapeCandidates => Some(self.shape_candidates),
            ParameterKind::BlendItemListHeads => Some(self.list_heads),
            ParameterKind::BlendItemList => Some(self.blend_items),
            ParameterKind::BlendLocationList => Some(self.blend_locations),
            ParameterKind::ControlBuffer => Some(self.control),
            ParameterKind::IndirectArgs => Some(self.indirect_args),
        }
    }

    fn bindings(&self, program: Cmaa2Program) -> SmallVec<[PassBinding; 8]> {
        program
            .parameters()
            .iter()
            .filter_map(|parameter| {
                let resource = self.for_parameter(parameter.kind)?;
                let access = match parameter.access {
                    ParameterAccess::Read => Access::Read,
                    ParameterAccess::Write => Access::Write,
                    ParameterAccess::ReadWrite => Access::ReadWrite,
                    ParameterAccess::IndirectRead => Access::IndirectArgs,
                };
                Some(PassBinding {
                    name: parameter.name,
                    resource,
                    access,
                })
            })
            .collect()
    }
}

/// A built CMAA2 invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmaa2Graph {
    /// The declarative pass graph.
    pub graph: PassGraph,
    /// Stage of each pass, parallel to [`PassGraph::passes`].
    pub stages: Vec<Stage>,
    /// Resource sizes.
    pub plan: ResourcePlan,
    /// How the color surface is written.
    pub store: StoreMode,
    /// Permutation key of the passes.
    pub key: PermutationKey,
    /// Transient resource handles.
    pub resources: Cmaa2Resources,
    /// The color surface the graph was built for.
    pub color: ColorSurface,
    /// Quality preset the graph was built with.
    pub quality: Quality,
}

impl Cmaa2Graph {
    /// Pass index of the first occurrence of `stage`.
    pub fn stage_index(&self, stage: Stage) -> Option<usize> {
        self.stages.iter().position(|candidate| *candidate == stage)
    }

    /// Number of GPU dispatches, clears excluded.
    pub fn dispatch_count(&self) -> usize {
        self.graph.dispatch_count()
    }

    /// Extent the passes operate on.
    pub fn render_extent(&self) -> Extent {
        self.plan.render_extent
    }

    /// Event scope name, e.g. `CMAA2 1920x1080 Quality: 2`.
    pub fn event_name(&self) -> String {
        let extent = self.render_extent();
        format!(
            "CMAA2 {}x{} Quality: {}",
            extent.width,
            extent.height,
            self.quality.level()
        )
    }
}

/// Builds the CMAA2 pass graph for one view.
///
/// Skips are checked before anything is declared, so a skipped view
/// allocates nothing and dispatches nothing.
#[instrument(level = "debug", skip(capabilities))]
pub fn build_cmaa2_graph(
    color: Option<&ColorSurface>,
    view_rect: ViewRect,
    config: &Cmaa2Config,
    capabilities: &dyn FormatCapabilities,
) -> Result<Cmaa2Graph, SkipReason> {
    if !config.enable {
        return Err(SkipReason::Disabled);
    }
    let color = *color.ok_or(SkipReason::InvalidInputSurface)?;
    let render_extent = view_rect.render_extent(color.extent);
    if color.extent.is_empty() || render_extent.is_empty() {
        return Err(SkipReason::InvalidInputSurface);
    }
    let store = resolve_store_mode(color.format, capabilities)
        .ok_or(SkipReason::UnsupportedFormat(color.format))?;

    let _span = debug_span!(
        "cmaa2",
        width = render_extent.width,
        height = render_extent.height,
        quality = config.quality.level()
    )
    .entered();

    let key = PermutationKey {
        quality: config.quality,
        extra_sharpness: config.extra_sharpness,
        store: store.permutation(),
        hdr: is_hdr_format(color.format),
        edge_path: EdgeDetectionPath::Luma,
    };
    let plan = ResourcePlan::new(render_extent);

    let mut graph = PassGraph::new();
    let resources = Cmaa2Resources::declare(&mut graph, &plan);
    let mut stages = Vec::with_capacity(7);

    let mut add = |graph: &mut PassGraph, stage: Stage, dispatch: Dispatch| {
        match stage.program() {
            Some(program) => {
                graph.add_compute_pass(
                    stage.label(),
                    ProgramId::new(program, key),
                    dispatch,
                    resources.bindings(program),
                );
            }
            None => {
                graph.add_clear_pass(stage.label(), resources.control);
            }
        }
        stages.push(stage);
    };

    let indirect = Dispatch::Indirect {
        args: resources.indirect_args,
        offset: 0,
    };

    add(&mut graph, Stage::Clear, Dispatch::Clear);
    add(
        &mut graph,
        Stage::EdgeDetection,
        Dispatch::Direct(GroupCount::for_extent(render_extent, EDGE_DETECTION_TILE)),
    );
    for (args, consumer) in [
        (ArgsMode::ProcessCandidates, Stage::ProcessCandidates),
        (ArgsMode::DeferredColorApply, Stage::DeferredColorApply),
    ] {
        add(
            &mut graph,
            Stage::ComputeDispatchArgs(args),
            Dispatch::Direct(args.signal_group_count()),
        );
        add(&mut graph, consumer, indirect);
    }
    if config.debug_visualize {
        add(
            &mut graph,
            Stage::DebugVisualize,
            Dispatch::Direct(GroupCount::for_extent(render_extent, DEBUG_TILE)),
        );
    }

    Ok(Cmaa2Graph {
        graph,
        stages,
        plan,
        store,
        key,
        resources,
        color,
        quality: config.quality,
    })
}
