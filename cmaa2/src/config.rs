//! Runtime configuration for the CMAA2 pass.
//!
//! ## Usage
//!
//! Share a [`Cmaa2Settings`] handle between the application and the view
//! extension. The extension takes one [`Cmaa2Config`] snapshot per frame and
//! threads it explicitly into graph construction.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Console name of the master switch.
pub const CVAR_ENABLE: &str = "r.CMAA2.Enable";
/// Console name of the quality preset.
pub const CVAR_QUALITY: &str = "r.CMAA2.Quality";
/// Console name of the extra sharpness toggle.
pub const CVAR_EXTRA_SHARPNESS: &str = "r.CMAA2.ExtraSharpness";
/// Console name of the edge visualization toggle.
pub const CVAR_DEBUG: &str = "r.CMAA2.Debug";

/// Algorithm quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Quality {
    /// Cheapest preset.
    Low = 0,
    /// Balanced preset.
    Medium = 1,
    /// Default preset.
    #[default]
    High = 2,
    /// Most expensive preset.
    Ultra = 3,
}

impl Quality {
    /// Every preset in ascending order.
    pub const ALL: [Quality; 4] = [Quality::Low, Quality::Medium, Quality::High, Quality::Ultra];

    /// Maps an integer level onto a preset, clamping to `0..=3`.
    pub fn from_level(level: i32) -> Self {
        match level.clamp(0, 3) {
            0 => Quality::Low,
            1 => Quality::Medium,
            2 => Quality::High,
            _ => Quality::Ultra,
        }
    }

    /// Returns the numeric level used as the shader define value.
    pub fn level(self) -> u32 {
        self as u32
    }
}

/// Per-frame CMAA2 configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cmaa2Config {
    /// Master switch.
    pub enable: bool,
    /// Quality preset.
    pub quality: Quality,
    /// Preserves text and shape clarity at the expense of less antialiasing.
    pub extra_sharpness: bool,
    /// Replaces the final output with the detected edges.
    pub debug_visualize: bool,
}

impl Default for Cmaa2Config {
    fn default() -> Self {
        Self {
            enable: true,
            quality: Quality::High,
            extra_sharpness: false,
            debug_visualize: false,
        }
    }
}

impl Cmaa2Config {
    /// Sets the master switch.
    #[must_use]
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// Sets the quality preset.
    #[must_use]
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Sets the extra sharpness toggle.
    #[must_use]
    pub fn with_extra_sharpness(mut self, extra_sharpness: bool) -> Self {
        self.extra_sharpness = extra_sharpness;
        self
    }

    /// Sets the edge visualization toggle.
    #[must_use]
    pub fn with_debug_visualize(mut self, debug_visualize: bool) -> Self {
        self.debug_visualize = debug_visualize;
        self
    }
}

/// Errors raised by console-style assignments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The name is not one of the CMAA2 console variables.
    #[error("unknown CMAA2 console variable `{0}`")]
    UnknownVariable(String),
    /// The value could not be parsed as an integer.
    #[error("invalid value `{value}` for `{name}`: expected an integer")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Rejected value.
        value: String,
    },
}

/// Shared, mutable CMAA2 settings.
///
/// Cloning the handle shares the underlying configuration.
#[derive(Debug, Clone, Default)]
pub struct Cmaa2Settings {
    inner: Arc<RwLock<Cmaa2Config>>,
}

impl Cmaa2Settings {
    /// Creates a settings handle with an initial configuration.
    pub fn new(config: Cmaa2Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Returns a copy of the current configuration.
    pub fn snapshot(&self) -> Cmaa2Config {
        *self.inner.read()
    }

    /// Replaces the current configuration.
    pub fn replace(&self, config: Cmaa2Config) {
        *self.inner.write() = config;
    }

    /// Mutates the configuration in place.
    pub fn update(&self, f: impl FnOnce(&mut Cmaa2Config)) {
        f(&mut self.inner.write());
    }

    /// Assigns a console variable by name.
    ///
    /// Values are integers; booleans treat any non-zero value as on and the
    /// quality level is clamped to `0..=3`.
    pub fn set_by_name(&self, name: &str, value: &str) -> Result<(), ConfigError> {
        let parsed: i32 = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_owned(),
                value: value.to_owned(),
            })?;

        let mut config = self.inner.write();
        match_variable(name, |variable| match variable {
            Variable::Enable => config.enable = parsed != 0,
            Variable::Quality => config.quality = Quality::from_level(parsed),
            Variable::ExtraSharpness => config.extra_sharpness = parsed != 0,
            Variable::Debug => config.debug_visualize = parsed != 0,
        })
    }

    /// Reads a console variable by name as its integer value.
    pub fn get_by_name(&self, name: &str) -> Result<i32, ConfigError> {
        let config = self.snapshot();
        let mut value = 0;
        match_variable(name, |variable| {
            value = match variable {
                Variable::Enable => i32::from(config.enable),
                Variable::Quality => config.quality.level() as i32,
                Variable::ExtraSharpness => i32::from(config.extra_sharpness),
                Variable::Debug => i32::from(config.debug_visualize),
            }
        })?;
        Ok(value)
    }
}

enum Variable {
    Enable,
    Quality,
    ExtraSharpness,
    Debug,
}

fn match_variable(name: &str, f: impl FnOnce(Variable)) -> Result<(), ConfigError> {
    let variable = if name.eq_ignore_ascii_case(CVAR_ENABLE) {
        Variable::Enable
    } else if name.eq_ignore_ascii_case(CVAR_QUALITY) {
        Variable::Quality
    } else if name.eq_ignore_ascii_case(CVAR_EXTRA_SHARPNESS) {
        Variable::ExtraSharpness
    } else if name.eq_ignore_ascii_case(CVAR_DEBUG) {
        Variable::Debug
    } else {
        return Err(ConfigError::UnknownVariable(name.to_owned()));
    };
    f(variable);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_console_defaults() {
        let config = Cmaa2Config::default();
        assert!(config.enable);
        assert_eq!(config.quality, Quality::High);
        assert!(!config.extra_sharpness);
        assert!(!config.debug_visualize);
    }

    #[test]
    fn quality_level_is_clamped() {
        assert_eq!(Quality::from_level(-4), Quality::Low);
        assert_eq!(Quality::from_level(1), Quality::Medium);
        assert_eq!(Quality::from_level(3), Quality::Ultra);
        assert_eq!(Quality::from_level(42), Quality::Ultra);
    }

    #[test]
    fn settings_handles_share_state() {
        let settings = Cmaa2Settings::default();
        let other = settings.clone();
        other.update(|config| config.debug_visualize = true);
        assert!(settings.snapshot().debug_visualize);
    }

    #[test]
    fn console_assignment_round_trips() {
        let settings = Cmaa2Settings::default();
        settings.set_by_name(CVAR_QUALITY, "7").unwrap();
        settings.set_by_name("r.cmaa2.enable", "0").unwrap();
        settings.set_by_name(CVAR_DEBUG, " 1 ").unwrap();

        let config = settings.snapshot();
        assert_eq!(config.quality, Quality::Ultra);
        assert!(!config.enable);
        assert!(config.debug_visualize);
        assert_eq!(settings.get_by_name(CVAR_QUALITY), Ok(3));
        assert_eq!(settings.get_by_name(CVAR_EXTRA_SHARPNESS), Ok(0));
    }

    #[test]
    fn console_assignment_rejects_bad_input() {
        let settings = Cmaa2Settings::default();
        assert_eq!(
            settings.set_by_name("r.CMAA2.Placement", "1"),
            Err(ConfigError::UnknownVariable("r.CMAA2.Placement".to_owned()))
        );
        assert!(matches!(
            settings.set_by_name(CVAR_ENABLE, "yes"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(settings.snapshot(), Cmaa2Config::default());
    }
}
