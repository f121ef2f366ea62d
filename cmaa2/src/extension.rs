//! Per-view extension hooks.
//!
//! ## Usage
//!
//! Register a [`Cmaa2ViewExtension`] once at startup, then call
//! [`run_view_extensions`] for every view before post processing. Each view
//! yields at most one [`Cmaa2Graph`] for the backend to record.

use std::{
    error::Error,
    sync::{Arc, OnceLock},
};

use parking_lot::RwLock;
use tracing::error;

use crate::{
    config::Cmaa2Settings,
    error::SkipReason,
    format::FormatCapabilities,
    pipeline::{Cmaa2Graph, ColorSurface, build_cmaa2_graph},
    resources::ViewRect,
};

/// The result type used by view extension hooks.
pub type ExtensionResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Antialiasing method the host selected for a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AntiAliasingMethod {
    /// No built-in method; post-process extensions may claim the view.
    #[default]
    None,
    /// Fast approximate antialiasing.
    Fxaa,
    /// Temporal antialiasing.
    TemporalAa,
    /// Hardware multisampling.
    Msaa,
    /// Temporal super resolution.
    TemporalSuperResolution,
}

/// What an extension sees of a view.
#[derive(Clone, Copy)]
pub struct SceneView<'a> {
    /// Host antialiasing selection.
    pub anti_aliasing: AntiAliasingMethod,
    /// Color surface, absent when the view renders nothing.
    pub color: Option<ColorSurface>,
    /// View rectangle inside the color surface.
    pub view_rect: ViewRect,
    /// Typed storage support of the device.
    pub capabilities: &'a dyn FormatCapabilities,
}

/// Graphs queued by extensions for one view.
#[derive(Debug, Default)]
pub struct PassQueue {
    graphs: Vec<Cmaa2Graph>,
}

impl PassQueue {
    /// Queues a graph.
    pub fn push(&mut self, graph: Cmaa2Graph) {
        self.graphs.push(graph);
    }

    /// Returns queued graphs in submission order.
    #[must_use]
    pub fn graphs(&self) -> &[Cmaa2Graph] {
        &self.graphs
    }

    /// Consumes the queue.
    #[must_use]
    pub fn into_graphs(self) -> Vec<Cmaa2Graph> {
        self.graphs
    }

    /// Returns `true` if nothing was queued.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

/// A per-view hook run before post processing.
pub trait ViewExtension: Send + Sync + 'static {
    /// Returns the extension name for logging and diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Adds passes for `view` to `queue`.
    fn pre_post_process(&self, view: &SceneView<'_>, queue: &mut PassQueue) -> ExtensionResult;
}

/// Runs CMAA2 on views without another antialiasing method.
#[derive(Debug, Clone, Default)]
pub struct Cmaa2ViewExtension {
    settings: Cmaa2Settings,
}

impl Cmaa2ViewExtension {
    /// Creates the extension over a shared settings handle.
    pub fn new(settings: Cmaa2Settings) -> Self {
        Self { settings }
    }

    /// Returns the settings handle.
    pub fn settings(&self) -> &Cmaa2Settings {
        &self.settings
    }

    /// Builds the graph for `view`, or the reason it is skipped.
    ///
    /// Takes exactly one settings snapshot.
    pub fn prepare(&self, view: &SceneView<'_>) -> Result<Cmaa2Graph, SkipReason> {
        let config = self.settings.snapshot();
        if !config.enable {
            return Err(SkipReason::Disabled);
        }
        if view.anti_aliasing != AntiAliasingMethod::None {
            return Err(SkipReason::AntiAliasingClaimed);
        }
        build_cmaa2_graph(
            view.color.as_ref(),
            view.view_rect,
            &config,
            view.capabilities,
        )
    }
}

impl ViewExtension for Cmaa2ViewExtension {
    fn name(&self) -> &'static str {
        "cmaa2"
    }

    fn pre_post_process(&self, view: &SceneView<'_>, queue: &mut PassQueue) -> ExtensionResult {
        if let Ok(graph) = self.prepare(view) {
            queue.push(graph);
        }
        Ok(())
    }
}

/// Runs a fixed set of view extensions.
#[derive(Default)]
pub struct ViewExtensionHost {
    extensions: Vec<Arc<dyn ViewExtension>>,
}

impl ViewExtensionHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host over every extension registered for the process.
    pub fn from_registry() -> Self {
        Self {
            extensions: extension_registry().read().clone(),
        }
    }

    /// Adds an extension.
    pub fn register(&mut self, extension: Arc<dyn ViewExtension>) {
        self.extensions.push(extension);
    }

    /// Number of extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns `true` if no extension is registered.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Runs every extension for `view` and collects their graphs.
    ///
    /// A failing hook is logged and the remaining extensions still run.
    pub fn run(&self, view: &SceneView<'_>) -> PassQueue {
        let mut queue = PassQueue::default();
        for extension in &self.extensions {
            if let Err(err) = extension.pre_post_process(view, &mut queue) {
                error!(
                    "View extension '{}' pre_post_process hook failed: {}",
                    extension.name(),
                    err
                );
            }
        }
        queue
    }
}

/// Registers a view extension for the current process.
pub fn register_view_extension<E: ViewExtension>(extension: E) {
    extension_registry().write().push(Arc::new(extension));
}

/// Runs every registered view extension for `view`.
pub fn run_view_extensions(view: &SceneView<'_>) -> PassQueue {
    ViewExtensionHost::from_registry().run(view)
}

fn extension_registry() -> &'static RwLock<Vec<Arc<dyn ViewExtension>>> {
    static REGISTRY: OnceLock<RwLock<Vec<Arc<dyn ViewExtension>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}
