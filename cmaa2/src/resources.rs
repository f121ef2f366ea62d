//! Working resource sizing.
//!
//! Every size here is an upper bound the shaders rely on without checking:
//! the lists hold one entry per candidate in the worst case where every pixel
//! qualifies. Changing a formula is a GPU memory-safety change.

use wgpu::TextureFormat;

/// Words in the control (counter) buffer.
pub const CONTROL_BUFFER_WORDS: u32 = 16;
/// Words in the indirect dispatch argument buffer.
pub const INDIRECT_ARGS_WORDS: u32 = 128;

/// Edge map texel format, one texel per 2x1 pixel pair.
pub const EDGES_FORMAT: TextureFormat = TextureFormat::R8Uint;
/// Linked-list head texel format.
pub const LIST_HEADS_FORMAT: TextureFormat = TextureFormat::R32Uint;

/// Bytes per shape candidate (packed coordinates).
pub const SHAPE_CANDIDATE_STRIDE: u32 = 4;
/// Bytes per deferred blend node (location + packed color).
pub const BLEND_ITEM_STRIDE: u32 = 8;
/// Bytes per deferred blend location.
pub const BLEND_LOCATION_STRIDE: u32 = 4;

/// Two-dimensional pixel extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent {
    /// Creates an extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel count without overflow.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Component-wise minimum.
    #[must_use]
    pub fn min(self, other: Extent) -> Extent {
        Extent::new(self.width.min(other.width), self.height.min(other.height))
    }
}

/// Half-open pixel rectangle of the view inside the color surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewRect {
    /// Left edge.
    pub min_x: u32,
    /// Top edge.
    pub min_y: u32,
    /// Right edge (exclusive).
    pub max_x: u32,
    /// Bottom edge (exclusive).
    pub max_y: u32,
}

impl ViewRect {
    /// Creates a rectangle from its corners.
    pub const fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A rectangle covering a whole extent.
    pub const fn from_extent(extent: Extent) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }

    /// Size of the rectangle, zero for inverted corners.
    pub fn size(&self) -> Extent {
        Extent::new(
            self.max_x.saturating_sub(self.min_x),
            self.max_y.saturating_sub(self.min_y),
        )
    }

    /// Render extent: the view size clamped to the surface.
    pub fn render_extent(&self, surface: Extent) -> Extent {
        self.size().min(surface)
    }
}

/// Allocation sizes for one CMAA2 invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePlan {
    /// Extent the passes operate on.
    pub render_extent: Extent,
    /// Edge map extent.
    pub edges: Extent,
    /// Linked-list head image extent.
    pub list_heads: Extent,
    /// Shape candidate list capacity in elements.
    pub shape_candidates: u64,
    /// Deferred blend node pool capacity in elements.
    pub blend_items: u64,
    /// Deferred blend location list capacity in elements.
    pub blend_locations: u64,
    /// Control buffer size in words.
    pub control_words: u32,
    /// Indirect argument buffer size in words.
    pub indirect_args_words: u32,
}

impl ResourcePlan {
    /// Plans every working resource for a render extent.
    pub fn new(render_extent: Extent) -> Self {
        let Extent { width, height } = render_extent;
        let area = render_extent.area();
        Self {
            render_extent,
            edges: Extent::new(width.div_ceil(2), height),
            list_heads: Extent::new(width.div_ceil(2), height.div_ceil(2)),
            shape_candidates: area / 4,
            blend_items: area / 2,
            blend_locations: (area + 3) / 6,
            control_words: CONTROL_BUFFER_WORDS,
            indirect_args_words: INDIRECT_ARGS_WORDS,
        }
    }

    /// Shape candidate list size in bytes.
    pub fn shape_candidates_bytes(&self) -> u64 {
        self.shape_candidates * u64::from(SHAPE_CANDIDATE_STRIDE)
    }

    /// Deferred blend node pool size in bytes.
    pub fn blend_items_bytes(&self) -> u64 {
        self.blend_items * u64::from(BLEND_ITEM_STRIDE)
    }

    /// Deferred blend location list size in bytes.
    pub fn blend_locations_bytes(&self) -> u64 {
        self.blend_locations * u64::from(BLEND_LOCATION_STRIDE)
    }
}
