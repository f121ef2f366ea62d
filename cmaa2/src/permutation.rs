//! Shader programs and their permutation space.
//!
//! Every pass binds one [`ProgramId`]: a logical program plus the
//! [`PermutationKey`] it was compiled with. Keys are validated against the
//! same rules that filter the compiled set, so a contradictory key can never
//! reach a backend.

use thiserror::Error;

use crate::{
    config::Quality,
    format::{StorePermutation, UntypedFormat},
};

/// Edge detection input path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum EdgeDetectionPath {
    /// Edges from the full color difference.
    FullColor = 0,
    /// Edges from luma computed from color.
    #[default]
    Luma = 1,
}

impl EdgeDetectionPath {
    /// Every axis value in define order.
    pub const ALL: [EdgeDetectionPath; 2] = [EdgeDetectionPath::FullColor, EdgeDetectionPath::Luma];
}

/// Logical CMAA2 shader programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cmaa2Program {
    /// Edge detection over 2x2 blocks.
    EdgesColor2x2,
    /// Shape candidate processing.
    ProcessCandidates,
    /// Deferred color blending.
    DeferredColorApply2x2,
    /// Indirect dispatch argument computation.
    ComputeDispatchArgs,
    /// Edge visualization.
    DebugDrawEdges,
}

impl Cmaa2Program {
    /// Every program.
    pub const ALL: [Cmaa2Program; 5] = [
        Cmaa2Program::EdgesColor2x2,
        Cmaa2Program::ProcessCandidates,
        Cmaa2Program::DeferredColorApply2x2,
        Cmaa2Program::ComputeDispatchArgs,
        Cmaa2Program::DebugDrawEdges,
    ];

    /// Kernel entry point name.
    pub fn entry_point(self) -> &'static str {
        match self {
            Cmaa2Program::EdgesColor2x2 => "EdgesColor2x2CS",
            Cmaa2Program::ProcessCandidates => "ProcessCandidatesCS",
            Cmaa2Program::DeferredColorApply2x2 => "DeferredColorApply2x2CS",
            Cmaa2Program::ComputeDispatchArgs => "ComputeDispatchArgsCS",
            Cmaa2Program::DebugDrawEdges => "DebugDrawEdgesCS",
        }
    }

    /// Parameters the program binds, in declaration order.
    pub fn parameters(self) -> &'static [ShaderParameter] {
        match self {
            Cmaa2Program::EdgesColor2x2 => EDGES_COLOR_2X2_PARAMETERS,
            Cmaa2Program::ProcessCandidates => PROCESS_CANDIDATES_PARAMETERS,
            Cmaa2Program::DeferredColorApply2x2 => DEFERRED_COLOR_APPLY_PARAMETERS,
            Cmaa2Program::ComputeDispatchArgs => COMPUTE_DISPATCH_ARGS_PARAMETERS,
            Cmaa2Program::DebugDrawEdges => DEBUG_DRAW_EDGES_PARAMETERS,
        }
    }

    /// Whether the program writes the color surface.
    pub fn writes_color(self) -> bool {
        self.parameters()
            .iter()
            .any(|parameter| parameter.kind == ParameterKind::ColorTarget)
    }
}

use ParameterAccess::{IndirectRead, Read, ReadWrite, Write};
use ParameterKind::{
    BlendItemList, BlendItemListHeads, BlendLocationList, ColorSource, ColorTarget, ControlBuffer,
    Edges, IndirectArgs, PointClampSampler, ShapeCandidates,
};

const EDGES_COLOR_2X2_PARAMETERS: &[ShaderParameter] = &[
    ShaderParameter::new("g_inoutColorReadonly", ColorSource, Read),
    ShaderParameter::new("g_gather_point_clamp_Sampler", PointClampSampler, Read),
    ShaderParameter::new("g_workingEdges", Edges, ReadWrite),
    ShaderParameter::new("g_workingShapeCandidates", ShapeCandidates, ReadWrite),
    ShaderParameter::new("g_workingDeferredBlendItemListHeads", BlendItemListHeads, ReadWrite),
    ShaderParameter::new("g_workingControlBuffer", ControlBuffer, ReadWrite),
];

const PROCESS_CANDIDATES_PARAMETERS: &[ShaderParameter] = &[
    ShaderParameter::new("g_inoutColorReadonly", ColorSource, Read),
    ShaderParameter::new("g_workingEdges", Edges, ReadWrite),
    ShaderParameter::new("g_workingShapeCandidates", ShapeCandidates, Read),
    ShaderParameter::new("g_workingControlBuffer", ControlBuffer, ReadWrite),
    ShaderParameter::new("g_workingDeferredBlendItemListHeads", BlendItemListHeads, ReadWrite),
    ShaderParameter::new("g_workingDeferredBlendItemList", BlendItemList, ReadWrite),
    ShaderParameter::new("g_workingDeferredBlendLocationList", BlendLocationList, ReadWrite),
    ShaderParameter::new("IndirectDispatchArgsBuffer", IndirectArgs, IndirectRead),
];

const DEFERRED_COLOR_APPLY_PARAMETERS: &[ShaderParameter] = &[
    ShaderParameter::new("g_workingDeferredBlendLocationList", BlendLocationList, ReadWrite),
    ShaderParameter::new("g_workingDeferredBlendItemListHeads", BlendItemListHeads, ReadWrite),
    ShaderParameter::new("g_workingDeferredBlendItemList", BlendItemList, ReadWrite),
    ShaderParameter::new("g_workingControlBuffer", ControlBuffer, ReadWrite),
    ShaderParameter::new("g_inoutColorWriteonly", ColorTarget, Write),
    ShaderParameter::new("IndirectDispatchArgsBuffer", IndirectArgs, IndirectRead),
];

const COMPUTE_DISPATCH_ARGS_PARAMETERS: &[ShaderParameter] = &[
    ShaderParameter::new("g_workingControlBuffer", ControlBuffer, ReadWrite),
    ShaderParameter::new("g_workingExecuteIndirectBuffer", IndirectArgs, ReadWrite),
    ShaderParameter::new("g_workingShapeCandidates", ShapeCandidates, ReadWrite),
    ShaderParameter::new("g_workingDeferredBlendLocationList", BlendLocationList, ReadWrite),
];

const DEBUG_DRAW_EDGES_PARAMETERS: &[ShaderParameter] = &[
    ShaderParameter::new("g_workingEdges", Edges, Read),
    ShaderParameter::new("g_inoutColorWriteonly", ColorTarget, Write),
];

/// What a shader parameter refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// Color surface sampled read-only.
    ColorSource,
    /// Color surface written through the resolved store mode.
    ColorTarget,
    /// Point-filtered, clamp-addressed sampler.
    PointClampSampler,
    /// Edge map image.
    Edges,
    /// Shape candidate list.
    ShapeCandidates,
    /// Linked-list head image.
    BlendItemListHeads,
    /// Linked-list node pool.
    BlendItemList,
    /// Compacted blend location list.
    BlendLocationList,
    /// Counter block.
    ControlBuffer,
    /// Indirect dispatch arguments.
    IndirectArgs,
}

/// How a shader parameter is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterAccess {
    /// Read only.
    Read,
    /// Written only.
    Write,
    /// Read and written, including atomics.
    ReadWrite,
    /// Consumed by the dispatch itself as indirect arguments.
    IndirectRead,
}

/// One entry of a program's parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderParameter {
    /// Name in the kernel source.
    pub name: &'static str,
    /// Resource the parameter refers to.
    pub kind: ParameterKind,
    /// Access performed by the program.
    pub access: ParameterAccess,
}

impl ShaderParameter {
    const fn new(name: &'static str, kind: ParameterKind, access: ParameterAccess) -> Self {
        Self { name, kind, access }
    }
}

/// The eight-axis permutation key shared by all CMAA2 programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermutationKey {
    /// Quality preset.
    pub quality: Quality,
    /// Extra sharpness.
    pub extra_sharpness: bool,
    /// Format-dependent store axes.
    pub store: StorePermutation,
    /// HDR color range support.
    pub hdr: bool,
    /// Edge detection input path.
    pub edge_path: EdgeDetectionPath,
}

impl PermutationKey {
    /// The key used for axes a program ignores.
    pub const CANONICAL: PermutationKey = PermutationKey {
        quality: Quality::High,
        extra_sharpness: false,
        store: StorePermutation {
            store_typed: true,
            typed_unorm_float: true,
            convert_to_srgb: false,
            untyped_format: UntypedFormat::None,
        },
        hdr: false,
        edge_path: EdgeDetectionPath::Luma,
    };

    /// Returns `false` for combinations excluded from the compiled set.
    pub fn is_valid(&self) -> bool {
        let store = &self.store;
        if store.store_typed {
            store.untyped_format == UntypedFormat::None
        } else {
            !store.typed_unorm_float && store.untyped_format != UntypedFormat::None
        }
    }

    /// Enumerates every valid key.
    pub fn all_valid() -> Vec<PermutationKey> {
        let mut keys = Vec::new();
        for quality in Quality::ALL {
            for extra_sharpness in [false, true] {
                for store_typed in [false, true] {
                    for typed_unorm_float in [false, true] {
                        for convert_to_srgb in [false, true] {
                            for untyped_format in UntypedFormat::ALL {
                                for hdr in [false, true] {
                                    for edge_path in EdgeDetectionPath::ALL {
                                        let key = PermutationKey {
                                            quality,
                                            extra_sharpness,
                                            store: StorePermutation {
                                                store_typed,
                                                typed_unorm_float,
                                                convert_to_srgb,
                                                untyped_format,
                                            },
                                            hdr,
                                            edge_path,
                                        };
                                        if key.is_valid() {
                                            keys.push(key);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        keys
    }

    /// Shader defines for this key, in axis order.
    pub fn defines(&self) -> [(&'static str, u32); 8] {
        [
            ("CMAA2_STATIC_QUALITY_PRESET", self.quality.level()),
            ("CMAA2_EXTRA_SHARPNESS", u32::from(self.extra_sharpness)),
            ("CMAA2_UAV_STORE_TYPED", u32::from(self.store.store_typed)),
            (
                "CMAA2_UAV_STORE_TYPED_UNORM_FLOAT",
                u32::from(self.store.typed_unorm_float),
            ),
            (
                "CMAA2_UAV_STORE_CONVERT_TO_SRGB",
                u32::from(self.store.convert_to_srgb),
            ),
            (
                "CMAA2_UAV_STORE_UNTYPED_FORMAT",
                self.store.untyped_format.define_value(),
            ),
            ("CMAA2_SUPPORT_HDR_COLOR_RANGE", u32::from(self.hdr)),
            ("CMAA2_EDGE_DETECTION_LUMA_PATH", self.edge_path as u32),
        ]
    }
}

/// A compiled program identity: program plus the axes it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId {
    /// Logical program.
    pub program: Cmaa2Program,
    /// Permutation key with ignored axes canonicalized.
    pub key: PermutationKey,
}

impl ProgramId {
    /// Selects the variant of `program` for `key`.
    ///
    /// The dispatch argument program reads only counters and ignores every
    /// axis. The edge visualization program only writes color, so it keeps
    /// the store and HDR axes.
    pub fn new(program: Cmaa2Program, key: PermutationKey) -> Self {
        let key = match program {
            Cmaa2Program::ComputeDispatchArgs => PermutationKey::CANONICAL,
            Cmaa2Program::DebugDrawEdges => PermutationKey {
                store: key.store,
                hdr: key.hdr,
                ..PermutationKey::CANONICAL
            },
            Cmaa2Program::EdgesColor2x2
            | Cmaa2Program::ProcessCandidates
            | Cmaa2Program::DeferredColorApply2x2 => key,
        };
        Self { program, key }
    }

    /// Every distinct program variant of the compiled set.
    pub fn all_valid() -> Vec<ProgramId> {
        let keys = PermutationKey::all_valid();
        let mut ids: Vec<ProgramId> = Cmaa2Program::ALL
            .iter()
            .flat_map(|&program| keys.iter().map(move |&key| ProgramId::new(program, key)))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Default longest line search distance.
pub const DEFAULT_MAX_LINE_LENGTH: u32 = 86;
/// Upper bound on the line search distance.
pub const MAX_SUPPORTED_LINE_LENGTH: u32 = 128;

/// Rejected compile environment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompileEnvironmentError {
    /// The line length must be even and at most 128.
    #[error("max line length {0} must be an even number no greater than 128")]
    InvalidMaxLineLength(u32),
}

/// Defines shared by every permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompileEnvironment {
    max_line_length: u32,
}

impl Default for CompileEnvironment {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl CompileEnvironment {
    /// Sets the longest line search distance.
    ///
    /// Longer searches give nicer gradients at a higher cost.
    pub fn with_max_line_length(max_line_length: u32) -> Result<Self, CompileEnvironmentError> {
        if max_line_length % 2 != 0 || max_line_length > MAX_SUPPORTED_LINE_LENGTH {
            return Err(CompileEnvironmentError::InvalidMaxLineLength(
                max_line_length,
            ));
        }
        Ok(Self { max_line_length })
    }

    /// Longest line search distance.
    pub fn max_line_length(&self) -> u32 {
        self.max_line_length
    }

    /// Environment defines.
    pub fn defines(&self) -> [(&'static str, u32); 2] {
        [
            ("CMAA_MSAA_SAMPLE_COUNT", 1),
            ("CMAA2_MAX_LINE_LENGTH", self.max_line_length),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with(store: StorePermutation) -> PermutationKey {
        PermutationKey {
            store,
            ..PermutationKey::CANONICAL
        }
    }

    #[test]
    fn contradictory_store_axes_are_rejected() {
        let typed_with_untyped = key_with(StorePermutation {
            store_typed: true,
            typed_unorm_float: true,
            convert_to_srgb: false,
            untyped_format: UntypedFormat::Rgba8,
        });
        assert!(!typed_with_untyped.is_valid());

        let untyped_with_unorm = key_with(StorePermutation {
            store_typed: false,
            typed_unorm_float: true,
            convert_to_srgb: false,
            untyped_format: UntypedFormat::Rgba8,
        });
        assert!(!untyped_with_unorm.is_valid());

        let untyped_without_format = key_with(StorePermutation {
            store_typed: false,
            typed_unorm_float: false,
            convert_to_srgb: true,
            untyped_format: UntypedFormat::None,
        });
        assert!(!untyped_without_format.is_valid());

        assert!(PermutationKey::CANONICAL.is_valid());
    }

    #[test]
    fn compiled_set_size() {
        // 8 store combinations x 4 quality x 2 sharpness x 2 hdr x 2 luma.
        let keys = PermutationKey::all_valid();
        assert_eq!(keys.len(), 256);
        assert!(keys.iter().all(PermutationKey::is_valid));
    }

    #[test]
    fn ignored_axes_collapse_program_variants() {
        let ids = ProgramId::all_valid();
        let count = |program| ids.iter().filter(|id| id.program == program).count();
        assert_eq!(count(Cmaa2Program::EdgesColor2x2), 256);
        assert_eq!(count(Cmaa2Program::ComputeDispatchArgs), 1);
        assert_eq!(count(Cmaa2Program::DebugDrawEdges), 16);
    }

    #[test]
    fn defines_follow_key() {
        let key = PermutationKey {
            quality: Quality::Ultra,
            extra_sharpness: true,
            store: StorePermutation {
                store_typed: false,
                typed_unorm_float: false,
                convert_to_srgb: true,
                untyped_format: UntypedFormat::Rgb10a2,
            },
            hdr: false,
            edge_path: EdgeDetectionPath::Luma,
        };
        let defines = key.defines();
        assert_eq!(defines[0], ("CMAA2_STATIC_QUALITY_PRESET", 3));
        assert_eq!(defines[1], ("CMAA2_EXTRA_SHARPNESS", 1));
        assert_eq!(defines[2], ("CMAA2_UAV_STORE_TYPED", 0));
        assert_eq!(defines[4], ("CMAA2_UAV_STORE_CONVERT_TO_SRGB", 1));
        assert_eq!(defines[5], ("CMAA2_UAV_STORE_UNTYPED_FORMAT", 2));
        assert_eq!(defines[7], ("CMAA2_EDGE_DETECTION_LUMA_PATH", 1));
    }

    #[test]
    fn color_writers() {
        assert!(Cmaa2Program::DeferredColorApply2x2.writes_color());
        assert!(Cmaa2Program::DebugDrawEdges.writes_color());
        assert!(!Cmaa2Program::EdgesColor2x2.writes_color());
        assert!(!Cmaa2Program::ComputeDispatchArgs.writes_color());
    }

    #[test]
    fn line_length_validation() {
        assert_eq!(CompileEnvironment::default().max_line_length(), 86);
        assert!(CompileEnvironment::with_max_line_length(32).is_ok());
        assert_eq!(
            CompileEnvironment::with_max_line_length(33),
            Err(CompileEnvironmentError::InvalidMaxLineLength(33))
        );
        assert!(CompileEnvironment::with_max_line_length(130).is_err());
    }
}
