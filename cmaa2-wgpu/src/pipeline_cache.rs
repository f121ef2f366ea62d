//! Compute pipelines per CMAA2 program variant.
//!
//! ## Usage
//!
//! Create one [`Cmaa2PipelineCache`] per device, optionally backed by a
//! driver cache from [`initialize_cache`]. Call [`Cmaa2PipelineCache::warm`]
//! at load time to avoid creating pipelines mid-frame.

use std::{io, path::PathBuf};

use cmaa2::{
    Cmaa2Program, EdgeDetectionPath, FormatCapabilities, PermutationKey, ProgramId, Quality,
    StoreMode, format::is_hdr_format, resolve_store_mode,
};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};
use wgpu::TextureFormat;

use crate::shader::{ColorBinding, ShaderLibrary, layout_entries};

/// Identity of a compiled pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Program and permutation.
    pub program: ProgramId,
    /// Color target declaration.
    pub color: ColorBinding,
}

impl PipelineKey {
    /// Key of `program` for a surface format and its resolved store mode.
    pub fn new(program: ProgramId, store: &StoreMode, surface: TextureFormat) -> Self {
        Self {
            program,
            color: ColorBinding::for_program(program, store, surface),
        }
    }
}

/// A compute pipeline and the layout its bind groups are created against.
#[derive(Debug, Clone)]
pub struct Cmaa2Pipeline {
    /// The pipeline.
    pub pipeline: wgpu::ComputePipeline,
    /// Layout of bind group 0.
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Lazily populated pipeline cache shared across frames.
pub struct Cmaa2PipelineCache {
    library: ShaderLibrary,
    driver_cache: Option<wgpu::PipelineCache>,
    pipelines: RwLock<FxHashMap<PipelineKey, Cmaa2Pipeline>>,
}

impl Cmaa2PipelineCache {
    /// Creates an empty cache.
    pub fn new(library: ShaderLibrary, driver_cache: Option<wgpu::PipelineCache>) -> Self {
        Self {
            library,
            driver_cache,
            pipelines: RwLock::new(FxHashMap::default()),
        }
    }

    /// Shader library the pipelines are built from.
    pub fn library(&self) -> &ShaderLibrary {
        &self.library
    }

    /// Driver-level cache, if any.
    pub fn driver_cache(&self) -> Option<&wgpu::PipelineCache> {
        self.driver_cache.as_ref()
    }

    /// Number of created pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.read().len()
    }

    /// Returns `true` if no pipeline was created yet.
    pub fn is_empty(&self) -> bool {
        self.pipelines.read().is_empty()
    }

    /// Returns the pipeline for `key`, creating it on first use.
    ///
    /// Returns `None` when the color format cannot be declared in WGSL.
    pub fn get_or_create(&self, device: &wgpu::Device, key: PipelineKey) -> Option<Cmaa2Pipeline> {
        if let Some(pipeline) = self.pipelines.read().get(&key) {
            return Some(pipeline.clone());
        }

        let pipeline = self.create(device, key)?;
        self.pipelines.write().insert(key, pipeline.clone());
        Some(pipeline)
    }

    /// Creates every pipeline a color format can need.
    ///
    /// Returns the number of pipelines now available for the format.
    pub fn warm(
        &self,
        device: &wgpu::Device,
        format: TextureFormat,
        capabilities: &dyn FormatCapabilities,
    ) -> usize {
        let Some(store) = resolve_store_mode(format, capabilities) else {
            warn!("CMAA2 cannot write color format {:?}; nothing to warm", format);
            return 0;
        };
        warm_keys(&store, format)
            .into_iter()
            .filter(|key| self.get_or_create(device, *key).is_some())
            .count()
    }

    fn create(&self, device: &wgpu::Device, key: PipelineKey) -> Option<Cmaa2Pipeline> {
        let program = key.program.program;
        let source = self.library.source(key.program, key.color)?;
        debug!(
            "Creating CMAA2 pipeline {} for {:?}",
            program.entry_point(),
            key.color
        );

        let label = format!("CMAA2 {}", program.entry_point());
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &layout_entries(key.program, key.color),
            label: Some(&label),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(program.entry_point()),
            compilation_options: Default::default(),
            cache: self.driver_cache.as_ref(),
        });

        Some(Cmaa2Pipeline {
            pipeline,
            bind_group_layout,
        })
    }
}

/// Every pipeline the graph builder can request for a surface format.
pub fn warm_keys(store: &StoreMode, surface: TextureFormat) -> Vec<PipelineKey> {
    let hdr = is_hdr_format(surface);
    let mut seen = FxHashSet::default();
    let mut keys = Vec::new();
    for program in Cmaa2Program::ALL {
        for quality in Quality::ALL {
            for extra_sharpness in [false, true] {
                let key = PermutationKey {
                    quality,
                    extra_sharpness,
                    store: store.permutation(),
                    hdr,
                    edge_path: EdgeDetectionPath::Luma,
                };
                let key = PipelineKey::new(ProgramId::new(program, key), store, surface);
                if seen.insert(key) {
                    keys.push(key);
                }
            }
        }
    }
    keys
}

fn get_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("cmaa2"))
}

/// Initializes a driver pipeline cache from disk if the device supports it.
pub fn initialize_cache(
    device: &wgpu::Device,
    adapter_info: &wgpu::AdapterInfo,
) -> Option<wgpu::PipelineCache> {
    if !device.features().contains(wgpu::Features::PIPELINE_CACHE) {
        return None;
    }
    let cache_dir = get_cache_dir()?;
    let cache_path = cache_dir.join(wgpu::util::pipeline_cache_key(adapter_info)?);
    let cache_data = std::fs::read(&cache_path).ok();
    // SAFETY: the data was written by `save_cache` for the same adapter key,
    // and `fallback` discards it if the driver rejects it.
    unsafe {
        Some(
            device.create_pipeline_cache(&wgpu::PipelineCacheDescriptor {
                label: Some("cmaa2_pipeline_cache"),
                data: cache_data.as_deref(),
                fallback: true,
            }),
        )
    }
}

/// Saves the driver pipeline cache to disk.
pub fn save_cache(cache: &wgpu::PipelineCache, adapter_info: &wgpu::AdapterInfo) -> io::Result<()> {
    let cache_dir = get_cache_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Cache dir not found"))?;
    let cache_filename = wgpu::util::pipeline_cache_key(adapter_info)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "Cache not supported"))?;

    if let Some(data) = cache.get_data() {
        std::fs::create_dir_all(&cache_dir)?;
        std::fs::write(cache_dir.join(&cache_filename), &data)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use cmaa2::UntypedFormat;

    use super::*;
    use crate::shader::ChannelOrder;

    #[test]
    fn warm_set_covers_builder_permutations() {
        let store = StoreMode::Typed {
            format: TextureFormat::Rgba8Unorm,
        };
        let keys = warm_keys(&store, TextureFormat::Rgba8Unorm);
        // 4 qualities x 2 sharpness for three passes, one args and one debug variant.
        assert_eq!(keys.len(), 26);
        assert!(keys.iter().all(|key| key.program.key.is_valid()));
        let args = keys
            .iter()
            .filter(|key| key.program.program == Cmaa2Program::ComputeDispatchArgs)
            .count();
        assert_eq!(args, 1);
    }

    #[test]
    fn untyped_color_writers_bind_raw_buffers() {
        let store = StoreMode::Untyped {
            format: UntypedFormat::Rgb10a2,
            convert_to_srgb: false,
        };
        for key in warm_keys(&store, TextureFormat::Rgb10a2Unorm) {
            let expected = if key.program.program.writes_color() {
                ColorBinding::Untyped(ChannelOrder::Rgba)
            } else {
                ColorBinding::CANONICAL
            };
            assert_eq!(key.color, expected);
        }
    }

    #[test]
    fn built_graphs_only_request_warmed_pipelines() {
        crate::init_test_tracing();
        let capabilities = crate::StaticFormatCapabilities::webgpu_core();
        let extent = cmaa2::Extent::new(1280, 720);
        let config = cmaa2::Cmaa2Config::default()
            .with_quality(Quality::Ultra)
            .with_debug_visualize(true);

        for format in [
            TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float,
        ] {
            let color = cmaa2::ColorSurface::new(format, extent);
            let graph = cmaa2::build_cmaa2_graph(
                Some(&color),
                cmaa2::ViewRect::from_extent(extent),
                &config,
                &capabilities,
            )
            .unwrap();
            let warmed = warm_keys(&graph.store, format);
            for pass in graph.graph.passes() {
                if let Some(id) = pass.program {
                    assert!(
                        warmed.contains(&PipelineKey::new(id, &graph.store, format)),
                        "{format:?} {}",
                        pass.label
                    );
                }
            }
        }
    }
}
