//! cmaa2 builds the Conservative Morphological Anti-Aliasing 2.0 post process
//! as a declarative graph of GPU compute passes.
//!
//! # Overview
//!
//! A frame runs up to six compute passes over the view's color surface:
//!
//! 1. edge detection, collecting shape candidates,
//! 2. dispatch argument computation for candidate processing,
//! 3. candidate processing into deferred blends (indirect),
//! 4. dispatch argument computation for color application,
//! 5. deferred color application (indirect),
//! 6. optional edge visualization.
//!
//! This crate decides everything that does not need a device: how the color
//! surface can be written, how large every working resource is, which shader
//! permutation each pass runs and in which order passes touch which resource.
//! The `cmaa2-wgpu` crate records the result on a `wgpu` device.
//!
//! # Usage
//!
//! ```
//! use cmaa2::{
//!     AntiAliasingMethod, Cmaa2Settings, Cmaa2ViewExtension, ColorSurface, Extent,
//!     SceneView, ViewExtensionHost, ViewRect, wgpu::TextureFormat,
//! };
//! use std::sync::Arc;
//!
//! let settings = Cmaa2Settings::default();
//! let mut host = ViewExtensionHost::new();
//! host.register(Arc::new(Cmaa2ViewExtension::new(settings.clone())));
//!
//! let extent = Extent::new(1920, 1080);
//! let supports_typed = |format: TextureFormat| format == TextureFormat::Rgba8Unorm;
//! let view = SceneView {
//!     anti_aliasing: AntiAliasingMethod::None,
//!     color: Some(ColorSurface::new(TextureFormat::Rgba8Unorm, extent)),
//!     view_rect: ViewRect::from_extent(extent),
//!     capabilities: &supports_typed,
//! };
//!
//! let queue = host.run(&view);
//! assert_eq!(queue.graphs()[0].dispatch_count(), 5);
//! ```
#![deny(missing_docs, clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod extension;
pub mod format;
pub mod graph;
pub mod permutation;
pub mod pipeline;
pub mod resources;

pub use wgpu;

pub use crate::{
    config::{Cmaa2Config, Cmaa2Settings, ConfigError, Quality},
    error::SkipReason,
    extension::{
        AntiAliasingMethod, Cmaa2ViewExtension, ExtensionResult, PassQueue, SceneView,
        ViewExtension, ViewExtensionHost, register_view_extension, run_view_extensions,
    },
    format::{FormatCapabilities, StoreMode, StorePermutation, UntypedFormat, resolve_store_mode},
    graph::{
        Access, BufferDesc, BufferKind, ComputePassNode, Dependency, Dispatch, GroupCount,
        PassBinding, PassGraph, ResourceDesc, ResourceId, TextureDesc,
    },
    permutation::{
        Cmaa2Program, CompileEnvironment, CompileEnvironmentError, EdgeDetectionPath,
        ParameterAccess, ParameterKind, PermutationKey, ProgramId, ShaderParameter,
    },
    pipeline::{ArgsMode, Cmaa2Graph, Cmaa2Resources, ColorSurface, Stage, build_cmaa2_graph},
    resources::{Extent, ResourcePlan, ViewRect},
};
