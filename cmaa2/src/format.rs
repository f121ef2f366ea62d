//! Color surface format resolution.
//!
//! Decides how the deferred color apply and debug passes write the color
//! surface: through a typed storage image, through the non-sRGB sibling of an
//! sRGB format with in-shader encoding, or through raw `u32` words packed by
//! the shader itself.

use wgpu::TextureFormat;

/// Queries the host GPU for typed storage support.
pub trait FormatCapabilities {
    /// Returns `true` when `format` can be bound as a typed storage image the
    /// shader writes to.
    fn supports_typed_store(&self, format: TextureFormat) -> bool;

    /// Returns `true` when an sRGB surface can be written through a typed
    /// storage view of its linear sibling.
    ///
    /// The surface itself must then carry a storage usage, which some hosts
    /// never allow on sRGB formats.
    fn supports_srgb_sibling_store(&self, srgb_format: TextureFormat) -> bool {
        self.supports_typed_store(srgb_format.remove_srgb_suffix())
    }
}

impl<F> FormatCapabilities for F
where
    F: Fn(TextureFormat) -> bool,
{
    fn supports_typed_store(&self, format: TextureFormat) -> bool {
        self(format)
    }
}

/// Bit-packing scheme used when the color surface is written untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum UntypedFormat {
    /// Typed store, no packing.
    #[default]
    None = 0,
    /// 8-bit RGBA (also used for BGRA surfaces).
    Rgba8 = 1,
    /// 10-10-10-2 RGBA.
    Rgb10a2 = 2,
}

impl UntypedFormat {
    /// Every axis value in define order.
    pub const ALL: [UntypedFormat; 3] = [
        UntypedFormat::None,
        UntypedFormat::Rgba8,
        UntypedFormat::Rgb10a2,
    ];

    /// Classifies a base (non-sRGB) format into a packing family.
    ///
    /// Only the 8-bit RGBA and 10-10-10-2 families are recognized; anything
    /// else yields [`UntypedFormat::None`].
    pub fn for_base_format(format: TextureFormat) -> Self {
        match format.remove_srgb_suffix() {
            TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm => UntypedFormat::Rgba8,
            TextureFormat::Rgb10a2Unorm => UntypedFormat::Rgb10a2,
            _ => UntypedFormat::None,
        }
    }

    /// Returns the shader define value.
    pub fn define_value(self) -> u32 {
        self as u32
    }
}

/// How the color surface is bound for writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreMode {
    /// The surface format itself supports typed stores.
    Typed {
        /// Storage view format, equal to the surface format.
        format: TextureFormat,
    },
    /// The sRGB surface is written through its linear sibling and the shader
    /// encodes to sRGB.
    TypedSrgbSibling {
        /// Storage view format, the non-sRGB sibling of the surface format.
        format: TextureFormat,
    },
    /// The surface is written as raw `u32` words.
    Untyped {
        /// Packing family, never [`UntypedFormat::None`].
        format: UntypedFormat,
        /// Whether the shader encodes to sRGB before packing.
        convert_to_srgb: bool,
    },
}

/// Format-dependent permutation axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePermutation {
    /// Typed storage write.
    pub store_typed: bool,
    /// Typed write to a non-float (normalized) format.
    pub typed_unorm_float: bool,
    /// sRGB encoding happens in the shader.
    pub convert_to_srgb: bool,
    /// Packing family for untyped writes.
    pub untyped_format: UntypedFormat,
}

impl StoreMode {
    /// Returns the storage view format for typed modes.
    pub fn typed_format(&self) -> Option<TextureFormat> {
        match *self {
            StoreMode::Typed { format } | StoreMode::TypedSrgbSibling { format } => Some(format),
            StoreMode::Untyped { .. } => None,
        }
    }

    /// Returns `true` for the raw `u32` path.
    pub fn is_untyped(&self) -> bool {
        matches!(self, StoreMode::Untyped { .. })
    }

    /// Projects the mode onto the shader permutation axes.
    pub fn permutation(&self) -> StorePermutation {
        match *self {
            StoreMode::Typed { format } => StorePermutation {
                store_typed: true,
                typed_unorm_float: !is_hdr_format(format),
                convert_to_srgb: false,
                untyped_format: UntypedFormat::None,
            },
            StoreMode::TypedSrgbSibling { format } => StorePermutation {
                store_typed: true,
                typed_unorm_float: !is_hdr_format(format),
                convert_to_srgb: true,
                untyped_format: UntypedFormat::None,
            },
            StoreMode::Untyped {
                format,
                convert_to_srgb,
            } => StorePermutation {
                store_typed: false,
                typed_unorm_float: false,
                convert_to_srgb,
                untyped_format: format,
            },
        }
    }
}

/// Resolves the store mode for a color surface format.
///
/// Returns `None` when the format has no typed path and belongs to neither
/// untyped packing family; the pass sequence must then be skipped.
pub fn resolve_store_mode(
    format: TextureFormat,
    capabilities: &dyn FormatCapabilities,
) -> Option<StoreMode> {
    if capabilities.supports_typed_store(format) {
        return Some(StoreMode::Typed { format });
    }

    let is_srgb = format.is_srgb();
    let sibling = format.remove_srgb_suffix();
    if is_srgb && capabilities.supports_srgb_sibling_store(format) {
        return Some(StoreMode::TypedSrgbSibling { format: sibling });
    }

    match UntypedFormat::for_base_format(sibling) {
        UntypedFormat::None => None,
        untyped => Some(StoreMode::Untyped {
            format: untyped,
            convert_to_srgb: is_srgb,
        }),
    }
}

/// Returns `true` for float and wide normalized formats that carry values
/// outside the 8-bit display range.
pub fn is_hdr_format(format: TextureFormat) -> bool {
    matches!(
        format,
        TextureFormat::Rgba32Float
            | TextureFormat::Rg11b10Ufloat
            | TextureFormat::Rgba16Float
            | TextureFormat::Rg16Float
            | TextureFormat::Rg32Float
            | TextureFormat::R16Float
            | TextureFormat::R32Float
            | TextureFormat::Rgba16Snorm
            | TextureFormat::Rgba16Unorm
            | TextureFormat::Rgba8Snorm
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed_none(_: TextureFormat) -> bool {
        false
    }

    fn typed_linear_rgba8(format: TextureFormat) -> bool {
        format == TextureFormat::Rgba8Unorm
    }

    #[test]
    fn linear_rgba8_uses_typed_store() {
        let mode = resolve_store_mode(TextureFormat::Rgba8Unorm, &typed_linear_rgba8);
        assert_eq!(
            mode,
            Some(StoreMode::Typed {
                format: TextureFormat::Rgba8Unorm
            })
        );
        let permutation = mode.map(|mode| mode.permutation());
        assert_eq!(
            permutation,
            Some(StorePermutation {
                store_typed: true,
                typed_unorm_float: true,
                convert_to_srgb: false,
                untyped_format: UntypedFormat::None,
            })
        );
    }

    #[test]
    fn srgb_surface_binds_linear_sibling() {
        let mode = resolve_store_mode(TextureFormat::Rgba8UnormSrgb, &typed_linear_rgba8);
        assert_eq!(
            mode,
            Some(StoreMode::TypedSrgbSibling {
                format: TextureFormat::Rgba8Unorm
            })
        );
        assert!(mode.is_some_and(|mode| mode.permutation().convert_to_srgb));
    }

    #[test]
    fn srgb_surface_without_typed_sibling_falls_back_to_untyped() {
        let mode = resolve_store_mode(TextureFormat::Rgba8UnormSrgb, &typed_none);
        assert_eq!(
            mode,
            Some(StoreMode::Untyped {
                format: UntypedFormat::Rgba8,
                convert_to_srgb: true,
            })
        );
    }

    struct NoSrgbStorage;

    impl FormatCapabilities for NoSrgbStorage {
        fn supports_typed_store(&self, format: TextureFormat) -> bool {
            format == TextureFormat::Rgba8Unorm
        }

        fn supports_srgb_sibling_store(&self, _: TextureFormat) -> bool {
            false
        }
    }

    #[test]
    fn srgb_surface_without_storage_usage_skips_sibling() {
        assert_eq!(
            resolve_store_mode(TextureFormat::Rgba8UnormSrgb, &NoSrgbStorage),
            Some(StoreMode::Untyped {
                format: UntypedFormat::Rgba8,
                convert_to_srgb: true,
            })
        );
        assert_eq!(
            resolve_store_mode(TextureFormat::Rgba8Unorm, &NoSrgbStorage),
            Some(StoreMode::Typed {
                format: TextureFormat::Rgba8Unorm
            })
        );
    }

    #[test]
    fn bgra_and_rgb10a2_pick_their_packing_family() {
        assert_eq!(
            resolve_store_mode(TextureFormat::Bgra8Unorm, &typed_none),
            Some(StoreMode::Untyped {
                format: UntypedFormat::Rgba8,
                convert_to_srgb: false,
            })
        );
        assert_eq!(
            resolve_store_mode(TextureFormat::Rgb10a2Unorm, &typed_none),
            Some(StoreMode::Untyped {
                format: UntypedFormat::Rgb10a2,
                convert_to_srgb: false,
            })
        );
    }

    #[test]
    fn unknown_families_are_unsupported() {
        assert_eq!(resolve_store_mode(TextureFormat::Rgba16Float, &typed_none), None);
        assert_eq!(resolve_store_mode(TextureFormat::R8Unorm, &typed_none), None);
    }

    #[test]
    fn hdr_typed_store_is_not_unorm() {
        let all = |_: TextureFormat| true;
        let mode = resolve_store_mode(TextureFormat::Rgba16Float, &all);
        assert!(mode.is_some_and(|mode| !mode.permutation().typed_unorm_float));
        assert!(is_hdr_format(TextureFormat::Rgba16Float));
        assert!(!is_hdr_format(TextureFormat::Bgra8UnormSrgb));
    }

    #[test]
    fn resolution_is_idempotent() {
        let formats = [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgb10a2Unorm,
            TextureFormat::Rgba16Float,
        ];
        for format in formats {
            let first = resolve_store_mode(format, &typed_linear_rgba8);
            let second = resolve_store_mode(format, &typed_linear_rgba8);
            assert_eq!(first, second, "{format:?}");
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Outcome {
        Typed,
        TypedSibling,
        UntypedRgba8,
        UntypedRgb10a2,
        Unsupported,
    }

    #[test]
    fn every_combination_selects_exactly_one_outcome() {
        // (base family representative, linear, srgb)
        let families = [
            (TextureFormat::Rgba8Unorm, Some(TextureFormat::Rgba8UnormSrgb)),
            (TextureFormat::Bgra8Unorm, Some(TextureFormat::Bgra8UnormSrgb)),
            (TextureFormat::Rgb10a2Unorm, None),
            (TextureFormat::Rgba16Float, None),
        ];

        for (linear, srgb) in families {
            for typed_supported in [false, true] {
                for use_srgb in [false, true] {
                    let Some(format) = (if use_srgb { srgb } else { Some(linear) }) else {
                        continue;
                    };
                    let caps = |candidate: TextureFormat| typed_supported && candidate == linear;
                    let outcome = match resolve_store_mode(format, &caps) {
                        Some(StoreMode::Typed { .. }) => Outcome::Typed,
                        Some(StoreMode::TypedSrgbSibling { .. }) => Outcome::TypedSibling,
                        Some(StoreMode::Untyped {
                            format: UntypedFormat::Rgba8,
                            ..
                        }) => Outcome::UntypedRgba8,
                        Some(StoreMode::Untyped {
                            format: UntypedFormat::Rgb10a2,
                            ..
                        }) => Outcome::UntypedRgb10a2,
                        Some(StoreMode::Untyped {
                            format: UntypedFormat::None,
                            ..
                        }) => panic!("untyped mode without a packing family for {format:?}"),
                        None => Outcome::Unsupported,
                    };

                    let expected = match (typed_supported, use_srgb, linear) {
                        (true, false, _) => Outcome::Typed,
                        (true, true, _) => Outcome::TypedSibling,
                        (false, _, TextureFormat::Rgb10a2Unorm) => Outcome::UntypedRgb10a2,
                        (false, _, TextureFormat::Rgba16Float) => Outcome::Unsupported,
                        (false, _, _) => Outcome::UntypedRgba8,
                    };
                    assert_eq!(outcome, expected, "{format:?} typed={typed_supported}");
                }
            }
        }
    }
}
