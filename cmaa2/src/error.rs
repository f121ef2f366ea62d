//! Reasons the pass sequence is skipped for a view.

use thiserror::Error;
use wgpu::TextureFormat;

/// Why no CMAA2 graph was produced for a view.
///
/// Every variant is a normal outcome: the frame continues with the color
/// surface untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// The master switch is off.
    #[error("CMAA2 is disabled")]
    Disabled,
    /// The view selected a different antialiasing method.
    #[error("the view uses another antialiasing method")]
    AntiAliasingClaimed,
    /// No color surface, or a zero-area surface or view rectangle.
    #[error("the view has no usable color surface")]
    InvalidInputSurface,
    /// The color format has neither a typed nor an untyped store path.
    #[error("color format {0:?} cannot be written by CMAA2")]
    UnsupportedFormat(TextureFormat),
}
