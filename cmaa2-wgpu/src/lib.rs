//! cmaa2-wgpu records [`cmaa2`] pass graphs on a `wgpu` device.
//!
//! # Usage
//!
//! ```no_run
//! # fn frame(
//! #     adapter: &wgpu::Adapter,
//! #     device: &wgpu::Device,
//! #     encoder: &mut wgpu::CommandEncoder,
//! #     color: &wgpu::Texture,
//! #     kernel: &'static str,
//! # ) -> Result<(), cmaa2_wgpu::ExecuteError> {
//! use cmaa2::{
//!     AntiAliasingMethod, Cmaa2ViewExtension, ColorSurface, Extent, SceneView,
//!     ViewExtensionHost, ViewRect,
//! };
//! use cmaa2_wgpu::{
//!     AdapterFormatCapabilities, Cmaa2PipelineCache, GraphExecutor, ShaderLibrary,
//! };
//! use std::sync::Arc;
//!
//! let capabilities = AdapterFormatCapabilities::new(adapter, device);
//! let pipelines = Cmaa2PipelineCache::new(ShaderLibrary::new(kernel), None);
//! let executor = GraphExecutor::new(device, capabilities.clone());
//!
//! let mut host = ViewExtensionHost::new();
//! host.register(Arc::new(Cmaa2ViewExtension::default()));
//!
//! let extent = Extent::new(color.width(), color.height());
//! let view = SceneView {
//!     anti_aliasing: AntiAliasingMethod::None,
//!     color: Some(ColorSurface::new(color.format(), extent)),
//!     view_rect: ViewRect::from_extent(extent),
//!     capabilities: &capabilities,
//! };
//! for graph in host.run(&view).graphs() {
//!     executor.record(device, encoder, &pipelines, graph, color)?;
//! }
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs, clippy::unwrap_used)]

pub mod capabilities;
pub mod executor;
pub mod pipeline_cache;
pub mod shader;

pub use cmaa2;
pub use wgpu;

pub use crate::{
    capabilities::{AdapterFormatCapabilities, StaticFormatCapabilities, effective_format_features},
    executor::{ExecuteError, GraphExecutor, check_working_formats, raw_copy_points},
    pipeline_cache::{
        Cmaa2Pipeline, Cmaa2PipelineCache, PipelineKey, initialize_cache, save_cache, warm_keys,
    },
    shader::{ChannelOrder, ColorBinding, ShaderLibrary},
};

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match tracing_subscriber::EnvFilter::try_new("error,cmaa2=debug,cmaa2_wgpu=debug")
        {
            Ok(filter) => filter,
            Err(_) => tracing_subscriber::EnvFilter::new("error"),
        },
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
