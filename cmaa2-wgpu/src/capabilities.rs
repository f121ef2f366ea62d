//! Texture format capabilities of a `wgpu` device.

use cmaa2::FormatCapabilities;
use rustc_hash::FxHashSet;
use wgpu::{TextureFormat, TextureFormatFeatureFlags, TextureFormatFeatures, TextureUsages};

use crate::shader::wgsl_storage_format;

/// Format features the device can actually use.
///
/// Adapter-specific features only apply when the device was created with
/// [`wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES`].
pub fn effective_format_features(
    format: TextureFormat,
    device_features: wgpu::Features,
    adapter: Option<&wgpu::Adapter>,
) -> TextureFormatFeatures {
    if device_features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
        && let Some(adapter) = adapter
    {
        return adapter.get_texture_format_features(format);
    }
    format.guaranteed_format_features(device_features)
}

/// Capabilities queried from an adapter and the features of its device.
#[derive(Debug, Clone)]
pub struct AdapterFormatCapabilities {
    device_features: wgpu::Features,
    adapter: Option<wgpu::Adapter>,
}

impl AdapterFormatCapabilities {
    /// Queries `adapter` within the features enabled on `device`.
    pub fn new(adapter: &wgpu::Adapter, device: &wgpu::Device) -> Self {
        Self {
            device_features: device.features(),
            adapter: Some(adapter.clone()),
        }
    }

    /// Uses only the features every adapter guarantees.
    pub fn guaranteed(device_features: wgpu::Features) -> Self {
        Self {
            device_features,
            adapter: None,
        }
    }

    /// Features enabled on the device.
    pub fn device_features(&self) -> wgpu::Features {
        self.device_features
    }

    /// Effective features of `format`.
    pub fn format_features(&self, format: TextureFormat) -> TextureFormatFeatures {
        effective_format_features(format, self.device_features, self.adapter.as_ref())
    }

    /// Whether `format` can be bound as a read-write storage texture.
    pub fn supports_read_write_storage(&self, format: TextureFormat) -> bool {
        let features = self.format_features(format);
        features.allowed_usages.contains(TextureUsages::STORAGE_BINDING)
            && features
                .flags
                .contains(TextureFormatFeatureFlags::STORAGE_READ_WRITE)
    }
}

impl FormatCapabilities for AdapterFormatCapabilities {
    fn supports_typed_store(&self, format: TextureFormat) -> bool {
        wgsl_storage_format(format).is_some()
            && self
                .format_features(format)
                .allowed_usages
                .contains(TextureUsages::STORAGE_BINDING)
    }

    fn supports_srgb_sibling_store(&self, srgb_format: TextureFormat) -> bool {
        // The storage view is created from the sRGB texture, so the texture
        // itself needs the storage usage.
        self.supports_typed_store(srgb_format.remove_srgb_suffix())
            && self
                .format_features(srgb_format)
                .allowed_usages
                .contains(TextureUsages::STORAGE_BINDING)
    }
}

/// A fixed set of formats with typed storage support.
#[derive(Debug, Clone, Default)]
pub struct StaticFormatCapabilities {
    formats: FxHashSet<TextureFormat>,
}

impl StaticFormatCapabilities {
    /// Creates an empty table: every format falls back to untyped stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats WebGPU guarantees as write-only storage textures.
    pub fn webgpu_core() -> Self {
        [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8Snorm,
            TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float,
            TextureFormat::R32Float,
            TextureFormat::Rg32Float,
        ]
        .into_iter()
        .collect()
    }

    /// Whether the table lists `format`.
    pub fn contains(&self, format: TextureFormat) -> bool {
        self.formats.contains(&format)
    }
}

impl FromIterator<TextureFormat> for StaticFormatCapabilities {
    fn from_iter<I: IntoIterator<Item = TextureFormat>>(iter: I) -> Self {
        Self {
            formats: iter.into_iter().collect(),
        }
    }
}

impl FormatCapabilities for StaticFormatCapabilities {
    fn supports_typed_store(&self, format: TextureFormat) -> bool {
        self.contains(format)
    }

    /// The sibling route needs both the linear format and the sRGB surface
    /// format listed.
    fn supports_srgb_sibling_store(&self, srgb_format: TextureFormat) -> bool {
        self.contains(srgb_format.remove_srgb_suffix()) && self.contains(srgb_format)
    }
}

#[cfg(test)]
mod tests {
    use cmaa2::{StoreMode, UntypedFormat, resolve_store_mode};

    use super::*;

    #[test]
    fn core_table_resolves_common_surfaces() {
        let caps = StaticFormatCapabilities::webgpu_core();
        assert_eq!(
            resolve_store_mode(TextureFormat::Rgba8UnormSrgb, &caps),
            Some(StoreMode::Untyped {
                format: UntypedFormat::Rgba8,
                convert_to_srgb: true,
            })
        );
        assert_eq!(
            resolve_store_mode(TextureFormat::Bgra8UnormSrgb, &caps),
            Some(StoreMode::Untyped {
                format: UntypedFormat::Rgba8,
                convert_to_srgb: true,
            })
        );
        assert_eq!(
            resolve_store_mode(TextureFormat::Rgba16Float, &caps),
            Some(StoreMode::Typed {
                format: TextureFormat::Rgba16Float
            })
        );
    }

    #[test]
    fn guaranteed_features_never_store_srgb() {
        let caps = AdapterFormatCapabilities::guaranteed(wgpu::Features::empty());
        assert!(!caps.supports_typed_store(TextureFormat::Rgba8UnormSrgb));
        assert!(!caps.supports_typed_store(TextureFormat::Bgra8UnormSrgb));
        assert!(caps.supports_typed_store(TextureFormat::Rgba8Unorm));
    }

    #[test]
    fn bgra_storage_follows_device_feature() {
        let without = AdapterFormatCapabilities::guaranteed(wgpu::Features::empty());
        let with = AdapterFormatCapabilities::guaranteed(wgpu::Features::BGRA8UNORM_STORAGE);
        assert!(!without.supports_typed_store(TextureFormat::Bgra8Unorm));
        assert!(with.supports_typed_store(TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn table_sibling_route_needs_the_srgb_entry() {
        let caps: StaticFormatCapabilities =
            [TextureFormat::Rgba8Unorm, TextureFormat::Rgba8UnormSrgb]
                .into_iter()
                .collect();
        assert_eq!(
            resolve_store_mode(TextureFormat::Rgba8UnormSrgb, &caps),
            Some(StoreMode::TypedSrgbSibling {
                format: TextureFormat::Rgba8Unorm
            })
        );
        assert!(!StaticFormatCapabilities::new().contains(TextureFormat::Rgba8Unorm));
    }

    #[test]
    fn srgb_surfaces_fall_back_to_untyped_on_guaranteed_features() {
        for features in [wgpu::Features::empty(), wgpu::Features::BGRA8UNORM_STORAGE] {
            let caps = AdapterFormatCapabilities::guaranteed(features);
            assert!(!caps.supports_srgb_sibling_store(TextureFormat::Rgba8UnormSrgb));
            for format in [TextureFormat::Rgba8UnormSrgb, TextureFormat::Bgra8UnormSrgb] {
                assert_eq!(
                    resolve_store_mode(format, &caps),
                    Some(StoreMode::Untyped {
                        format: UntypedFormat::Rgba8,
                        convert_to_srgb: true,
                    }),
                    "{format:?} {features:?}"
                );
            }
        }
    }

    #[test]
    fn edge_map_needs_adapter_specific_features() {
        let caps = AdapterFormatCapabilities::guaranteed(wgpu::Features::empty());
        assert!(!caps.supports_read_write_storage(TextureFormat::R8Uint));
        assert!(caps.supports_read_write_storage(TextureFormat::R32Uint));
    }
}
