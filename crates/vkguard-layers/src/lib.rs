//! vkguard validation layers.
//!
//! A [`LayerChain`] stacks the enabled layers over a terminal driver:
//!
//! ```text
//! application
//!   -> thread_safety
//!   -> parameter_validation
//!   -> object_tracker
//!   -> unique_objects        (wrapped handles above, driver handles below)
//!   -> core_validation       (+ shader interface checks)
//!   -> driver
//! ```
//!
//! Every layer is a [`LayerShim`] around an [`Intercept`] implementation and
//! resolves the layer below it through [`GetProcAddr`], so disabled layers
//! simply drop out of the chain.

use std::sync::Arc;

use vkguard_api::{VulkanCommand, VulkanResponse};
use vkguard_core::{DebugReport, LayerError, LayerSettings, MessengerCreateInfo, MessengerId};

pub mod core_validation;
pub mod dispatch;
pub mod null_driver;
pub mod object_tracker;
pub mod parameter_validation;
pub mod shader_validation;
pub mod thread_safety;
pub mod unique_objects;

pub use core_validation::command_buffer::CommandBufferStatus;
pub use core_validation::CoreValidation;
pub use dispatch::{validation_failed, CallContext, DispatchTable, GetProcAddr, Intercept, LayerShim, PfnVkCall};
pub use null_driver::NullDriver;
pub use object_tracker::{ObjectStatus, ObjectTracker};
pub use parameter_validation::ParameterValidation;
pub use shader_validation::{NagaReflector, ShaderReflection, ShaderReflector};
pub use thread_safety::ThreadSafety;
pub use unique_objects::UniqueObjects;

/// The application-facing end of the chain. Owns the dispatch tables the
/// application's handles resolve through and forwards everything.
pub struct Loader;

impl Intercept for Loader {
    const NAME: &'static str = "loader";

    fn intercept(&self, cmd: VulkanCommand, ctx: &CallContext<'_>) -> VulkanResponse {
        ctx.forward(cmd)
    }
}

pub struct LayerChainBuilder {
    driver: Arc<dyn GetProcAddr>,
    settings: LayerSettings,
    reflector: Option<Arc<dyn ShaderReflector>>,
}

impl LayerChainBuilder {
    pub fn settings(mut self, settings: LayerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the default `naga` based shader reflector.
    pub fn reflector(mut self, reflector: Arc<dyn ShaderReflector>) -> Self {
        self.reflector = Some(reflector);
        self
    }

    pub fn build(self) -> Result<LayerChain, LayerError> {
        let settings = self.settings;
        let enabled = &settings.validation;
        let report = Arc::new(DebugReport::new(settings.report.clone()));
        let mut next = self.driver;
        let mut names = Vec::new();

        let core = if enabled.core {
            let reflector = enabled.shaders.then(|| {
                self.reflector
                    .clone()
                    .unwrap_or_else(|| Arc::new(NagaReflector) as Arc<dyn ShaderReflector>)
            });
            let layer = CoreValidation::new(report.clone(), &settings, reflector);
            Some(stack(layer, &mut next, &report, &mut names)?)
        } else {
            None
        };
        let unique_objects = if enabled.unique_objects {
            Some(stack(UniqueObjects::new(report.clone()), &mut next, &report, &mut names)?)
        } else {
            None
        };
        let object_tracker = if enabled.object_lifetimes {
            Some(stack(ObjectTracker::new(report.clone()), &mut next, &report, &mut names)?)
        } else {
            None
        };
        let parameters = if enabled.parameters {
            Some(stack(ParameterValidation::new(report.clone()), &mut next, &report, &mut names)?)
        } else {
            None
        };
        let thread_safety = if enabled.thread_safety {
            Some(stack(ThreadSafety::new(report.clone()), &mut next, &report, &mut names)?)
        } else {
            None
        };
        let loader = LayerShim::new(Loader, next, report.clone())?;

        names.reverse();
        tracing::info!(layers = ?names, "layer chain built");
        Ok(LayerChain {
            loader,
            report,
            settings,
            core,
            unique_objects,
            object_tracker,
            parameters,
            thread_safety,
        })
    }
}

/// Put `layer` on top of `next` and make it the new top.
fn stack<I: Intercept>(
    layer: I,
    next: &mut Arc<dyn GetProcAddr>,
    report: &Arc<DebugReport>,
    names: &mut Vec<&'static str>,
) -> Result<Arc<LayerShim<I>>, LayerError> {
    let shim = LayerShim::new(layer, next.clone(), report.clone())?;
    *next = shim.clone() as Arc<dyn GetProcAddr>;
    names.push(I::NAME);
    Ok(shim)
}

/// An assembled layer chain.
pub struct LayerChain {
    loader: Arc<LayerShim<Loader>>,
    report: Arc<DebugReport>,
    settings: LayerSettings,
    core: Option<Arc<LayerShim<CoreValidation>>>,
    unique_objects: Option<Arc<LayerShim<UniqueObjects>>>,
    object_tracker: Option<Arc<LayerShim<ObjectTracker>>>,
    parameters: Option<Arc<LayerShim<ParameterValidation>>>,
    thread_safety: Option<Arc<LayerShim<ThreadSafety>>>,
}

impl LayerChain {
    pub fn builder(driver: Arc<dyn GetProcAddr>) -> LayerChainBuilder {
        LayerChainBuilder {
            driver,
            settings: LayerSettings::default(),
            reflector: None,
        }
    }

    /// Every layer enabled, default settings.
    pub fn new(driver: Arc<dyn GetProcAddr>) -> Result<Self, LayerError> {
        Self::builder(driver).build()
    }

    /// Settings from the settings search path and `VKGUARD_DISABLE`, with
    /// logging initialized unless the host already did.
    pub fn from_environment(driver: Arc<dyn GetProcAddr>) -> Result<Self, LayerError> {
        vkguard_common::try_init_logging();
        Self::builder(driver)
            .settings(LayerSettings::from_environment())
            .build()
    }

    /// Make one API call through the chain.
    pub fn call(&self, cmd: VulkanCommand) -> VulkanResponse {
        self.loader.call(cmd)
    }

    /// Physical devices, queues and command buffers the loader can route.
    pub fn routed_objects(&self) -> usize {
        self.loader.routed_objects()
    }

    pub fn create_debug_messenger(&self, info: MessengerCreateInfo) -> MessengerId {
        self.report.create_messenger(info)
    }

    pub fn destroy_debug_messenger(&self, id: MessengerId) -> bool {
        self.report.destroy_messenger(id)
    }

    pub fn report(&self) -> &Arc<DebugReport> {
        &self.report
    }

    pub fn settings(&self) -> &LayerSettings {
        &self.settings
    }

    pub fn core_validation(&self) -> Option<&CoreValidation> {
        self.core.as_ref().map(|shim| shim.inner())
    }

    pub fn unique_objects(&self) -> Option<&UniqueObjects> {
        self.unique_objects.as_ref().map(|shim| shim.inner())
    }

    pub fn object_tracker(&self) -> Option<&ObjectTracker> {
        self.object_tracker.as_ref().map(|shim| shim.inner())
    }

    pub fn parameter_validation(&self) -> Option<&ParameterValidation> {
        self.parameters.as_ref().map(|shim| shim.inner())
    }

    pub fn thread_safety(&self) -> Option<&ThreadSafety> {
        self.thread_safety.as_ref().map(|shim| shim.inner())
    }
}
