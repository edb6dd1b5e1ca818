//! Component framework: kinds, lifecycle hooks, and bindings.
//!
//! Every algorithm taking part in a stage is a [`Component`]. The stage holds
//! each one in a [`Slot`], which couples the algorithm object with the
//! [`ComponentBinding`] naming it in the configuration. Hooks are invoked on
//! the slot, and the slot hands the component a [`HookContext`] resolved for
//! its own label.

pub mod registry;

pub use registry::{ComponentInstance, ComponentModule, ComponentRegistry, Factory};

use crate::config::{Configuration, FromParameter};
use crate::sink::LogSink;
use crate::util::MultiRegResult;
use std::fmt;

/// The capability family a component belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentKind {
    Registration,
    Metric,
    Transform,
    Optimizer,
    Interpolator,
    Pyramid,
    Sampler,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::Registration,
        ComponentKind::Metric,
        ComponentKind::Transform,
        ComponentKind::Optimizer,
        ComponentKind::Interpolator,
        ComponentKind::Pyramid,
        ComponentKind::Sampler,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Registration => "Registration",
            ComponentKind::Metric => "Metric",
            ComponentKind::Transform => "Transform",
            ComponentKind::Optimizer => "Optimizer",
            ComponentKind::Interpolator => "Interpolator",
            ComponentKind::Pyramid => "ImagePyramid",
            ComponentKind::Sampler => "ImageSampler",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle hooks, in the order a stage reaches them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hook {
    BeforeRegistration,
    BeforeEachResolution,
    AfterEachIteration,
    AfterEachResolution,
    AfterRegistration,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::BeforeRegistration => "BeforeRegistration",
            Hook::BeforeEachResolution => "BeforeEachResolution",
            Hook::AfterEachIteration => "AfterEachIteration",
            Hook::AfterEachResolution => "AfterEachResolution",
            Hook::AfterRegistration => "AfterRegistration",
        }
    }

    /// Calls the matching method of `component`.
    pub fn invoke<C: Component + ?Sized>(
        self,
        component: &mut C,
        ctx: &HookContext<'_>,
    ) -> MultiRegResult<()> {
        match self {
            Hook::BeforeRegistration => component.before_registration(ctx),
            Hook::BeforeEachResolution => component.before_each_resolution(ctx),
            Hook::AfterEachIteration => component.after_each_iteration(ctx),
            Hook::AfterEachResolution => component.after_each_resolution(ctx),
            Hook::AfterRegistration => component.after_registration(ctx),
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook sees: the stage configuration, the log sink, and where in the
/// stage it is called from.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    pub config: &'a Configuration,
    pub sink: &'a LogSink,
    /// Label of the component being called (`Metric0`, `FixedImagePyramid0`).
    pub label: &'a str,
    /// Ordinal of the stage within the run.
    pub stage: usize,
    /// Current resolution level (0 before the first level starts).
    pub level: usize,
}

impl<'a> HookContext<'a> {
    pub fn new(config: &'a Configuration, sink: &'a LogSink, stage: usize) -> Self {
        Self {
            config,
            sink,
            label: "",
            stage,
            level: 0,
        }
    }

    pub fn at_level(self, level: usize) -> Self {
        Self { level, ..self }
    }

    pub fn for_label(self, label: &'a str) -> Self {
        Self { label, ..self }
    }

    /// Reads `key` for this label and level, falling back to `default`.
    pub fn read_or<T: FromParameter>(&self, key: &str, default: T) -> MultiRegResult<T> {
        self.config.read_or(key, self.label, self.level, 0, default)
    }

    /// Per-resolution lookup for this label and level.
    pub fn read_for_level<T: FromParameter>(&self, key: &str, default: T) -> MultiRegResult<T> {
        self.config
            .read_for_level(key, self.label, self.level, default)
    }
}

/// Common lifecycle protocol of every component.
///
/// All hooks default to doing nothing.
pub trait Component: Send {
    /// Registered name (`AdvancedMeanSquares`).
    fn name(&self) -> &'static str;

    fn before_registration(&mut self, _ctx: &HookContext<'_>) -> MultiRegResult<()> {
        Ok(())
    }

    fn before_each_resolution(&mut self, _ctx: &HookContext<'_>) -> MultiRegResult<()> {
        Ok(())
    }

    fn after_each_iteration(&mut self, _ctx: &HookContext<'_>) -> MultiRegResult<()> {
        Ok(())
    }

    fn after_each_resolution(&mut self, _ctx: &HookContext<'_>) -> MultiRegResult<()> {
        Ok(())
    }

    fn after_registration(&mut self, _ctx: &HookContext<'_>) -> MultiRegResult<()> {
        Ok(())
    }
}

/// How a component is known to the configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentBinding {
    pub kind: ComponentKind,
    /// Registered factory name.
    pub name: String,
    /// Prefix for per-component parameter keys.
    pub label: String,
}

impl ComponentBinding {
    pub fn new(kind: ComponentKind, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            label: label.into(),
        }
    }
}

/// A live component together with its binding.
pub struct Slot<T: ?Sized> {
    pub binding: ComponentBinding,
    pub component: Box<T>,
}

impl<T: ?Sized> Slot<T> {
    pub fn new(binding: ComponentBinding, component: Box<T>) -> Self {
        Self { binding, component }
    }

    pub fn label(&self) -> &str {
        &self.binding.label
    }
}

impl<T: Component + ?Sized> Slot<T> {
    /// Runs `hook` on the component with the context relabelled for it.
    pub fn run_hook(&mut self, hook: Hook, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        let ctx = ctx.for_label(&self.binding.label);
        hook.invoke(&mut *self.component, &ctx)
    }
}

impl<T: ?Sized> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("binding", &self.binding).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Component, ComponentBinding, ComponentKind, Hook, HookContext, Slot};
    use crate::config::{Configuration, ParameterMap};
    use crate::sink::LogSink;
    use crate::util::MultiRegResult;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(Hook, String, usize)>,
    }

    impl Component for Recorder {
        fn name(&self) -> &'static str {
            "Recorder"
        }

        fn before_each_resolution(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
            self.calls
                .push((Hook::BeforeEachResolution, ctx.label.to_string(), ctx.level));
            Ok(())
        }
    }

    #[test]
    fn slot_relabels_context() {
        let config = Configuration::from_parameters(ParameterMap::new());
        let sink = LogSink::in_memory();
        let ctx = HookContext::new(&config, &sink, 0).at_level(2);
        let mut slot = Slot::new(
            ComponentBinding::new(ComponentKind::Metric, "Recorder", "Metric0"),
            Box::new(Recorder::default()),
        );
        slot.run_hook(Hook::BeforeEachResolution, &ctx).unwrap();
        slot.run_hook(Hook::AfterEachResolution, &ctx).unwrap();
        assert_eq!(
            slot.component.calls,
            vec![(Hook::BeforeEachResolution, "Metric0".to_string(), 2)]
        );
    }

    #[test]
    fn kind_names() {
        assert_eq!(ComponentKind::Pyramid.to_string(), "ImagePyramid");
        assert_eq!(ComponentKind::ALL.len(), 7);
    }
}
