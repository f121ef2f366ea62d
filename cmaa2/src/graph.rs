//! Declarative compute pass graph.
//!
//! ## Usage
//!
//! Declare transient resources, then add passes with explicit access
//! declarations. The graph derives ordering edges from those declarations and
//! a host backend records the passes in [`PassGraph::execution_order`].

use std::{cmp::Reverse, collections::BinaryHeap};

use smallvec::SmallVec;
use wgpu::TextureFormat;

use crate::{permutation::ProgramId, resources::Extent};

/// Resource identifier used by pass bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    /// The view's color surface, owned by the host.
    Color,
    /// A transient resource declared on the graph.
    Transient(u32),
}

/// Descriptor for a transient texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    /// Debug label.
    pub label: &'static str,
    /// Texel extent.
    pub extent: Extent,
    /// Texel format.
    pub format: TextureFormat,
}

/// How a buffer is viewed by the passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Structured storage with a fixed element stride.
    Structured,
    /// Indirect dispatch arguments, also writable as storage.
    Indirect,
}

/// Descriptor for a transient buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Debug label.
    pub label: &'static str,
    /// Element stride in bytes.
    pub stride: u32,
    /// Element count.
    pub count: u64,
    /// Buffer usage class.
    pub kind: BufferKind,
}

impl BufferDesc {
    /// Size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.count * u64::from(self.stride)
    }
}

/// Transient resource description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDesc {
    /// A texture.
    Texture(TextureDesc),
    /// A buffer.
    Buffer(BufferDesc),
}

impl ResourceDesc {
    /// Debug label of the resource.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceDesc::Texture(desc) => desc.label,
            ResourceDesc::Buffer(desc) => desc.label,
        }
    }
}

/// Access a pass performs on a bound resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Shader read.
    Read,
    /// Shader write.
    Write,
    /// Shader read and write, including atomics.
    ReadWrite,
    /// Consumed by the dispatch as indirect arguments.
    IndirectArgs,
}

impl Access {
    /// Whether the access observes previous contents.
    pub fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite | Access::IndirectArgs)
    }

    /// Whether the access modifies the resource.
    pub fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// A named resource binding of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassBinding {
    /// Parameter name in the program.
    pub name: &'static str,
    /// Bound resource.
    pub resource: ResourceId,
    /// Declared access.
    pub access: Access,
}

/// Workgroup counts of a direct dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupCount {
    /// Groups along x.
    pub x: u32,
    /// Groups along y.
    pub y: u32,
    /// Groups along z.
    pub z: u32,
}

impl GroupCount {
    /// Creates a group count.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Groups covering `extent` with square tiles of `tile` pixels.
    pub fn for_extent(extent: Extent, tile: u32) -> Self {
        Self::new(extent.width.div_ceil(tile), extent.height.div_ceil(tile), 1)
    }

    /// Total group count.
    pub fn total(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y) * u64::from(self.z)
    }
}

/// How a pass is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Zero-fill of the pass's single written resource. Not a dispatch.
    Clear,
    /// Direct dispatch with CPU-known group counts.
    Direct(GroupCount),
    /// Dispatch with group counts read from a GPU buffer.
    Indirect {
        /// Argument buffer.
        args: ResourceId,
        /// Byte offset of the three argument words.
        offset: u64,
    },
}

/// A single pass of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputePassNode {
    /// Debug label, also used as the compute pass label.
    pub label: String,
    /// Program to run, `None` for clears.
    pub program: Option<ProgramId>,
    /// Dispatch mode.
    pub dispatch: Dispatch,
    /// Resource bindings with their declared access.
    pub bindings: SmallVec<[PassBinding; 8]>,
    /// Sequence index used to preserve authoring order.
    pub sequence_index: usize,
}

impl ComputePassNode {
    /// Whether the pass declares a read of `resource`.
    pub fn reads(&self, resource: ResourceId) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.resource == resource && binding.access.reads())
    }

    /// Whether the pass declares a write of `resource`.
    pub fn writes(&self, resource: ResourceId) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.resource == resource && binding.access.writes())
    }

    /// Whether the pass issues a GPU dispatch.
    pub fn is_dispatch(&self) -> bool {
        !matches!(self.dispatch, Dispatch::Clear)
    }
}

/// An ordering edge between two passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    /// Pass that must run first.
    pub from: usize,
    /// Pass that must run after.
    pub to: usize,
    /// First resource found to conflict.
    pub resource: ResourceId,
}

/// A compute pass graph over transient resources and the color surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassGraph {
    passes: Vec<ComputePassNode>,
    resources: Vec<ResourceDesc>,
}

impl PassGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns passes in insertion order.
    #[must_use]
    pub fn passes(&self) -> &[ComputePassNode] {
        &self.passes
    }

    /// Returns transient resources in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceDesc] {
        &self.resources
    }

    /// Looks up a transient resource descriptor.
    pub fn resource(&self, id: ResourceId) -> Option<&ResourceDesc> {
        match id {
            ResourceId::Color => None,
            ResourceId::Transient(index) => self.resources.get(index as usize),
        }
    }

    /// Declares a transient texture.
    pub fn create_texture(&mut self, desc: TextureDesc) -> ResourceId {
        self.push_resource(ResourceDesc::Texture(desc))
    }

    /// Declares a transient buffer.
    pub fn create_buffer(&mut self, desc: BufferDesc) -> ResourceId {
        self.push_resource(ResourceDesc::Buffer(desc))
    }

    fn push_resource(&mut self, desc: ResourceDesc) -> ResourceId {
        let index = self.resources.len() as u32;
        self.resources.push(desc);
        ResourceId::Transient(index)
    }

    /// Adds a zero-fill of `resource`.
    pub fn add_clear_pass(&mut self, label: impl Into<String>, resource: ResourceId) -> usize {
        let mut bindings = SmallVec::new();
        bindings.push(PassBinding {
            name: "target",
            resource,
            access: Access::Write,
        });
        self.push_pass(label.into(), None, Dispatch::Clear, bindings)
    }

    /// Adds a compute pass.
    ///
    /// Indirect passes get an [`Access::IndirectArgs`] binding on their
    /// argument buffer when the caller did not declare one.
    pub fn add_compute_pass(
        &mut self,
        label: impl Into<String>,
        program: ProgramId,
        dispatch: Dispatch,
        mut bindings: SmallVec<[PassBinding; 8]>,
    ) -> usize {
        if let Dispatch::Indirect { args, .. } = dispatch {
            let declared = bindings
                .iter()
                .any(|binding| binding.resource == args && binding.access == Access::IndirectArgs);
            if !declared {
                bindings.push(PassBinding {
                    name: "indirect_args",
                    resource: args,
                    access: Access::IndirectArgs,
                });
            }
        }
        self.push_pass(label.into(), Some(program), dispatch, bindings)
    }

    fn push_pass(
        &mut self,
        label: String,
        program: Option<ProgramId>,
        dispatch: Dispatch,
        bindings: SmallVec<[PassBinding; 8]>,
    ) -> usize {
        let index = self.passes.len();
        self.passes.push(ComputePassNode {
            label,
            program,
            dispatch,
            bindings,
            sequence_index: index,
        });
        index
    }

    /// Number of GPU dispatches, clears excluded.
    pub fn dispatch_count(&self) -> usize {
        self.passes.iter().filter(|pass| pass.is_dispatch()).count()
    }

    /// Ordering edges implied by the declared accesses.
    ///
    /// A later pass depends on an earlier one when either writes a resource
    /// the other reads or writes.
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut edges = Vec::new();
        for (to, right) in self.passes.iter().enumerate() {
            for (from, left) in self.passes[..to].iter().enumerate() {
                if let Some(resource) = conflict(left, right) {
                    edges.push(Dependency { from, to, resource });
                }
            }
        }
        edges
    }

    /// Returns pass indices in a valid execution order.
    ///
    /// Ready passes run in authoring order. A cyclic graph falls back to plain
    /// sequence order.
    pub fn execution_order(&self) -> Vec<usize> {
        let count = self.passes.len();
        let mut outgoing: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); count];
        let mut in_degree = vec![0usize; count];
        for dependency in self.dependencies() {
            add_edge(&mut outgoing, &mut in_degree, dependency.from, dependency.to);
        }

        let mut ready = BinaryHeap::new();
        for (index, degree) in in_degree.iter().enumerate() {
            if *degree == 0 {
                ready.push(Reverse((self.passes[index].sequence_index, index)));
            }
        }

        let mut ordered = Vec::with_capacity(count);
        while let Some(Reverse((_, index))) = ready.pop() {
            ordered.push(index);
            for &next in &outgoing[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((self.passes[next].sequence_index, next)));
                }
            }
        }

        if ordered.len() != count {
            let mut fallback: Vec<usize> = (0..count).collect();
            fallback.sort_by_key(|index| self.passes[*index].sequence_index);
            return fallback;
        }
        ordered
    }

    /// Index of the last pass in execution order that writes `resource`.
    pub fn last_writer(&self, resource: ResourceId) -> Option<usize> {
        self.execution_order()
            .into_iter()
            .filter(|index| self.passes[*index].writes(resource))
            .last()
    }

    /// Index of the first pass in execution order that writes `resource`.
    pub fn first_writer(&self, resource: ResourceId) -> Option<usize> {
        self.execution_order()
            .into_iter()
            .find(|index| self.passes[*index].writes(resource))
    }
}

fn conflict(left: &ComputePassNode, right: &ComputePassNode) -> Option<ResourceId> {
    left.bindings.iter().find_map(|binding| {
        let resource = binding.resource;
        let hazard = (binding.access.writes() && (right.reads(resource) || right.writes(resource)))
            || (binding.access.reads() && right.writes(resource));
        hazard.then_some(resource)
    })
}

fn add_edge(
    outgoing: &mut [SmallVec<[usize; 4]>],
    in_degree: &mut [usize],
    from: usize,
    to: usize,
) {
    if from == to || outgoing[from].contains(&to) {
        return;
    }
    outgoing[from].push(to);
    in_degree[to] += 1;
}
