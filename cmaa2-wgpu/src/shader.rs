//! WGSL assembly for CMAA2 program variants.
//!
//! ## Usage
//!
//! Hand the kernel source to a [`ShaderLibrary`]. For each program variant the
//! library prepends a generated prelude: one `const` per permutation and
//! environment define, followed by the resource declarations at the fixed
//! binding slots. The kernel provides the entry points and must not declare
//! those resources itself.
//!
//! Raw color words keep the surface's byte order. For BGRA surfaces the
//! prelude sets `CMAA2_UNTYPED_SWIZZLE_BGRA` to 1 and the kernel swaps red and
//! blue when unpacking and packing them.

use std::{borrow::Cow, fmt::Write as _};

use cmaa2::{CompileEnvironment, ParameterAccess, ParameterKind, ProgramId, StoreMode};
use wgpu::TextureFormat;

/// Rows of the raw color buffer are padded to this many `u32` words.
pub const RAW_ROW_ALIGNMENT_WORDS: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT / 4;

/// Byte order of the texels in raw color words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    /// Red in the lowest byte.
    Rgba,
    /// Blue in the lowest byte.
    Bgra,
}

impl ChannelOrder {
    /// Byte order of a surface format copied into a raw buffer.
    pub fn of(format: TextureFormat) -> Self {
        match format.remove_srgb_suffix() {
            TextureFormat::Bgra8Unorm => ChannelOrder::Bgra,
            _ => ChannelOrder::Rgba,
        }
    }
}

/// How the color target is declared in a program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorBinding {
    /// A write-only storage texture of the given view format.
    Typed(TextureFormat),
    /// A storage buffer of packed `u32` texels.
    Untyped(ChannelOrder),
}

impl ColorBinding {
    /// Declaration used by programs that never write color.
    pub const CANONICAL: ColorBinding = ColorBinding::Typed(TextureFormat::Rgba8Unorm);

    /// Selects the color declaration of `id` for a surface format and its
    /// resolved store mode.
    pub fn for_program(id: ProgramId, store: &StoreMode, surface: TextureFormat) -> Self {
        if !id.program.writes_color() {
            return Self::CANONICAL;
        }
        match store.typed_format() {
            Some(format) => ColorBinding::Typed(format),
            None => ColorBinding::Untyped(ChannelOrder::of(surface)),
        }
    }

    fn swizzle_define(self) -> u32 {
        u32::from(self == ColorBinding::Untyped(ChannelOrder::Bgra))
    }
}

/// Binding slot of a parameter kind in group 0.
///
/// Every program shares the same slots, so one set of declarations serves
/// all entry points. Indirect argument reads are not shader bindings.
pub fn binding_slot(kind: ParameterKind, access: ParameterAccess) -> Option<u32> {
    if access == ParameterAccess::IndirectRead {
        return None;
    }
    Some(match kind {
        ParameterKind::ColorSource => 0,
        ParameterKind::PointClampSampler => 1,
        ParameterKind::Edges => 2,
        ParameterKind::ShapeCandidates => 3,
        ParameterKind::BlendItemListHeads => 4,
        ParameterKind::ControlBuffer => 5,
        ParameterKind::BlendItemList => 6,
        ParameterKind::BlendLocationList => 7,
        ParameterKind::IndirectArgs => 8,
        ParameterKind::ColorTarget => 9,
    })
}

/// WGSL texel format name of a storage texture format.
pub fn wgsl_storage_format(format: TextureFormat) -> Option<&'static str> {
    Some(match format {
        TextureFormat::Rgba8Unorm => "rgba8unorm",
        TextureFormat::Rgba8Snorm => "rgba8snorm",
        TextureFormat::Bgra8Unorm => "bgra8unorm",
        TextureFormat::Rgba16Float => "rgba16float",
        TextureFormat::Rgba16Unorm => "rgba16unorm",
        TextureFormat::Rgba16Snorm => "rgba16snorm",
        TextureFormat::Rgba32Float => "rgba32float",
        TextureFormat::Rg32Float => "rg32float",
        TextureFormat::R32Float => "r32float",
        TextureFormat::R32Uint => "r32uint",
        TextureFormat::R8Uint => "r8uint",
        _ => return None,
    })
}

/// The kernel source plus the defines every variant shares.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    kernel: Cow<'static, str>,
    environment: CompileEnvironment,
}

impl ShaderLibrary {
    /// Creates a library over the WGSL kernel source.
    pub fn new(kernel: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kernel: kernel.into(),
            environment: CompileEnvironment::default(),
        }
    }

    /// Replaces the compile environment.
    #[must_use]
    pub fn with_environment(mut self, environment: CompileEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Shared compile environment.
    pub fn environment(&self) -> &CompileEnvironment {
        &self.environment
    }

    /// Generated declarations for a program variant.
    ///
    /// Returns `None` when a typed color format has no WGSL storage name.
    pub fn prelude(&self, id: ProgramId, color: ColorBinding) -> Option<String> {
        let color_declaration = match color {
            ColorBinding::Typed(format) => format!(
                "var g_inoutColorWriteonly: texture_storage_2d<{}, write>;",
                wgsl_storage_format(format)?
            ),
            ColorBinding::Untyped(_) => {
                "var<storage, read_write> g_inoutColorWriteonly: array<u32>;".to_owned()
            }
        };

        let mut out = String::new();
        let _ = writeln!(out, "// {} variant", id.program.entry_point());
        for (name, value) in id.key.defines().iter().chain(self.environment.defines().iter()) {
            let _ = writeln!(out, "const {name}: u32 = {value}u;");
        }
        let _ = writeln!(
            out,
            "const CMAA2_RAW_ROW_ALIGNMENT_WORDS: u32 = {RAW_ROW_ALIGNMENT_WORDS}u;"
        );
        let _ = writeln!(
            out,
            "const CMAA2_UNTYPED_SWIZZLE_BGRA: u32 = {}u;",
            color.swizzle_define()
        );
        out.push('\n');

        let declarations = [
            (ParameterKind::ColorSource, "var g_inoutColorReadonly: texture_2d<f32>;".to_owned()),
            (ParameterKind::PointClampSampler, "var g_gather_point_clamp_Sampler: sampler;".to_owned()),
            (
                ParameterKind::Edges,
                "var g_workingEdges: texture_storage_2d<r8uint, read_write>;".to_owned(),
            ),
            (
                ParameterKind::ShapeCandidates,
                "var<storage, read_write> g_workingShapeCandidates: array<u32>;".to_owned(),
            ),
            (
                ParameterKind::BlendItemListHeads,
                "var g_workingDeferredBlendItemListHeads: texture_storage_2d<r32uint, read_write>;"
                    .to_owned(),
            ),
            (
                ParameterKind::ControlBuffer,
                "var<storage, read_write> g_workingControlBuffer: array<atomic<u32>>;".to_owned(),
            ),
            (
                ParameterKind::BlendItemList,
                "var<storage, read_write> g_workingDeferredBlendItemList: array<vec2<u32>>;"
                    .to_owned(),
            ),
            (
                ParameterKind::BlendLocationList,
                "var<storage, read_write> g_workingDeferredBlendLocationList: array<u32>;"
                    .to_owned(),
            ),
            (
                ParameterKind::IndirectArgs,
                "var<storage, read_write> g_workingExecuteIndirectBuffer: array<u32>;".to_owned(),
            ),
            (ParameterKind::ColorTarget, color_declaration),
        ];
        for (kind, declaration) in declarations {
            if let Some(slot) = binding_slot(kind, ParameterAccess::ReadWrite) {
                let _ = writeln!(out, "@group(0) @binding({slot}) {declaration}");
            }
        }
        out.push('\n');
        Some(out)
    }

    /// Complete WGSL source for a program variant.
    pub fn source(&self, id: ProgramId, color: ColorBinding) -> Option<String> {
        let mut source = self.prelude(id, color)?;
        source.push_str(&self.kernel);
        Some(source)
    }
}

/// Bind group layout entries for a program variant, in slot order.
pub fn layout_entries(id: ProgramId, color: ColorBinding) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries: Vec<wgpu::BindGroupLayoutEntry> = id
        .program
        .parameters()
        .iter()
        .filter_map(|parameter| {
            let binding = binding_slot(parameter.kind, parameter.access)?;
            Some(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: binding_type(parameter.kind, color),
                count: None,
            })
        })
        .collect();
    entries.sort_by_key(|entry| entry.binding);
    entries
}

fn binding_type(kind: ParameterKind, color: ColorBinding) -> wgpu::BindingType {
    let storage_buffer = wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Storage { read_only: false },
        has_dynamic_offset: false,
        min_binding_size: None,
    };
    let read_write_texture = |format| wgpu::BindingType::StorageTexture {
        access: wgpu::StorageTextureAccess::ReadWrite,
        format,
        view_dimension: wgpu::TextureViewDimension::D2,
    };

    match kind {
        ParameterKind::ColorSource => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        ParameterKind::PointClampSampler => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
        }
        ParameterKind::Edges => read_write_texture(cmaa2::resources::EDGES_FORMAT),
        ParameterKind::BlendItemListHeads => {
            read_write_texture(cmaa2::resources::LIST_HEADS_FORMAT)
        }
        ParameterKind::ColorTarget => match color {
            ColorBinding::Typed(format) => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            ColorBinding::Untyped(_) => storage_buffer,
        },
        ParameterKind::ShapeCandidates
        | ParameterKind::BlendItemList
        | ParameterKind::BlendLocationList
        | ParameterKind::ControlBuffer
        | ParameterKind::IndirectArgs => storage_buffer,
    }
}

#[cfg(test)]
mod tests {
    use cmaa2::{Cmaa2Program, PermutationKey, UntypedFormat};
    use wgpu::TextureFormat::{Bgra8UnormSrgb, Rgba8UnormSrgb};

    use super::*;

    fn id(program: Cmaa2Program) -> ProgramId {
        ProgramId::new(program, PermutationKey::CANONICAL)
    }

    #[test]
    fn prelude_declares_every_define() {
        let library = ShaderLibrary::new("");
        let prelude = library
            .prelude(
                id(Cmaa2Program::EdgesColor2x2),
                ColorBinding::Typed(TextureFormat::Rgba8Unorm),
            )
            .unwrap();

        assert!(prelude.contains("const CMAA2_STATIC_QUALITY_PRESET: u32 = 2u;"));
        assert!(prelude.contains("const CMAA2_EDGE_DETECTION_LUMA_PATH: u32 = 1u;"));
        assert!(prelude.contains("const CMAA_MSAA_SAMPLE_COUNT: u32 = 1u;"));
        assert!(prelude.contains("const CMAA2_MAX_LINE_LENGTH: u32 = 86u;"));
        assert!(prelude.contains("const CMAA2_RAW_ROW_ALIGNMENT_WORDS: u32 = 64u;"));
        assert!(prelude.contains("const CMAA2_UNTYPED_SWIZZLE_BGRA: u32 = 0u;"));
        assert!(prelude.contains(
            "@group(0) @binding(9) var g_inoutColorWriteonly: texture_storage_2d<rgba8unorm, write>;"
        ));
    }

    #[test]
    fn untyped_variants_write_a_raw_buffer() {
        let library = ShaderLibrary::new("@compute @workgroup_size(1) fn main() {}");
        let source = library
            .source(
                id(Cmaa2Program::DeferredColorApply2x2),
                ColorBinding::Untyped(ChannelOrder::Rgba),
            )
            .unwrap();
        assert!(
            source.contains("var<storage, read_write> g_inoutColorWriteonly: array<u32>;")
        );
        assert!(source.contains("const CMAA2_UNTYPED_SWIZZLE_BGRA: u32 = 0u;"));
        assert!(source.ends_with("fn main() {}"));
    }

    #[test]
    fn bgra_raw_words_request_a_swizzle() {
        assert_eq!(ChannelOrder::of(Bgra8UnormSrgb), ChannelOrder::Bgra);
        assert_eq!(ChannelOrder::of(TextureFormat::Bgra8Unorm), ChannelOrder::Bgra);
        assert_eq!(ChannelOrder::of(Rgba8UnormSrgb), ChannelOrder::Rgba);

        let library = ShaderLibrary::new("");
        let prelude = library
            .prelude(
                id(Cmaa2Program::DeferredColorApply2x2),
                ColorBinding::Untyped(ChannelOrder::Bgra),
            )
            .unwrap();
        assert!(prelude.contains("const CMAA2_UNTYPED_SWIZZLE_BGRA: u32 = 1u;"));
    }

    #[test]
    fn unknown_storage_formats_have_no_prelude() {
        let library = ShaderLibrary::new("");
        assert_eq!(
            library.prelude(
                id(Cmaa2Program::DebugDrawEdges),
                ColorBinding::Typed(TextureFormat::Rgb10a2Unorm)
            ),
            None
        );
    }

    #[test]
    fn line_length_reaches_the_prelude() {
        let environment = CompileEnvironment::with_max_line_length(64).unwrap();
        let library = ShaderLibrary::new("").with_environment(environment);
        let prelude = library
            .prelude(id(Cmaa2Program::ProcessCandidates), ColorBinding::CANONICAL)
            .unwrap();
        assert!(prelude.contains("const CMAA2_MAX_LINE_LENGTH: u32 = 64u;"));
    }

    #[test]
    fn layouts_follow_declared_parameters() {
        let slots = |program| {
            layout_entries(id(program), ColorBinding::CANONICAL)
                .iter()
                .map(|entry| entry.binding)
                .collect::<Vec<_>>()
        };
        assert_eq!(slots(Cmaa2Program::EdgesColor2x2), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            slots(Cmaa2Program::ProcessCandidates),
            vec![0, 2, 3, 4, 5, 6, 7]
        );
        assert_eq!(
            slots(Cmaa2Program::DeferredColorApply2x2),
            vec![4, 5, 6, 7, 9]
        );
        assert_eq!(slots(Cmaa2Program::ComputeDispatchArgs), vec![3, 5, 7, 8]);
        assert_eq!(slots(Cmaa2Program::DebugDrawEdges), vec![2, 9]);
    }

    #[test]
    fn color_binding_selection() {
        let typed = StoreMode::TypedSrgbSibling {
            format: TextureFormat::Rgba8Unorm,
        };
        let untyped = StoreMode::Untyped {
            format: UntypedFormat::Rgba8,
            convert_to_srgb: true,
        };
        assert_eq!(
            ColorBinding::for_program(
                id(Cmaa2Program::DeferredColorApply2x2),
                &typed,
                Rgba8UnormSrgb
            ),
            ColorBinding::Typed(TextureFormat::Rgba8Unorm)
        );
        assert_eq!(
            ColorBinding::for_program(id(Cmaa2Program::DebugDrawEdges), &untyped, Bgra8UnormSrgb),
            ColorBinding::Untyped(ChannelOrder::Bgra)
        );
        assert_eq!(
            ColorBinding::for_program(id(Cmaa2Program::EdgesColor2x2), &untyped, Bgra8UnormSrgb),
            ColorBinding::CANONICAL
        );
    }

    #[test]
    fn untyped_color_target_is_a_storage_buffer() {
        let entries = layout_entries(
            id(Cmaa2Program::DebugDrawEdges),
            ColorBinding::Untyped(ChannelOrder::Rgba),
        );
        assert!(matches!(
            entries.last().map(|entry| entry.ty),
            Some(wgpu::BindingType::Buffer { .. })
        ));
    }
}
