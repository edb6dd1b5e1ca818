//! Name to factory mapping for every component kind.

use crate::component::ComponentKind;
use crate::interpolator::Interpolator;
use crate::metric::Metric;
use crate::optimizer::Optimizer;
use crate::pyramid::ImagePyramid;
use crate::registration::RegistrationMethod;
use crate::sampler::ImageSampler;
use crate::trace::trace_event;
use crate::transform::TransformComponent;
use crate::util::{MultiRegError, MultiRegResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type Make<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// A constructor for one kind's capability interface.
#[derive(Clone)]
pub enum Factory {
    Registration(Make<dyn RegistrationMethod>),
    Metric(Make<dyn Metric>),
    Transform(Make<dyn TransformComponent>),
    Optimizer(Make<dyn Optimizer>),
    Interpolator(Make<dyn Interpolator>),
    Pyramid(Make<dyn ImagePyramid>),
    Sampler(Make<dyn ImageSampler>),
}

impl Factory {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Factory::Registration(_) => ComponentKind::Registration,
            Factory::Metric(_) => ComponentKind::Metric,
            Factory::Transform(_) => ComponentKind::Transform,
            Factory::Optimizer(_) => ComponentKind::Optimizer,
            Factory::Interpolator(_) => ComponentKind::Interpolator,
            Factory::Pyramid(_) => ComponentKind::Pyramid,
            Factory::Sampler(_) => ComponentKind::Sampler,
        }
    }

    fn make(&self) -> ComponentInstance {
        match self {
            Factory::Registration(f) => ComponentInstance::Registration(f()),
            Factory::Metric(f) => ComponentInstance::Metric(f()),
            Factory::Transform(f) => ComponentInstance::Transform(f()),
            Factory::Optimizer(f) => ComponentInstance::Optimizer(f()),
            Factory::Interpolator(f) => ComponentInstance::Interpolator(f()),
            Factory::Pyramid(f) => ComponentInstance::Pyramid(f()),
            Factory::Sampler(f) => ComponentInstance::Sampler(f()),
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factory({})", self.kind())
    }
}

/// A freshly constructed component of any kind.
pub enum ComponentInstance {
    Registration(Box<dyn RegistrationMethod>),
    Metric(Box<dyn Metric>),
    Transform(Box<dyn TransformComponent>),
    Optimizer(Box<dyn Optimizer>),
    Interpolator(Box<dyn Interpolator>),
    Pyramid(Box<dyn ImagePyramid>),
    Sampler(Box<dyn ImageSampler>),
}

impl ComponentInstance {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentInstance::Registration(_) => ComponentKind::Registration,
            ComponentInstance::Metric(_) => ComponentKind::Metric,
            ComponentInstance::Transform(_) => ComponentKind::Transform,
            ComponentInstance::Optimizer(_) => ComponentKind::Optimizer,
            ComponentInstance::Interpolator(_) => ComponentKind::Interpolator,
            ComponentInstance::Pyramid(_) => ComponentKind::Pyramid,
            ComponentInstance::Sampler(_) => ComponentKind::Sampler,
        }
    }

    /// Registered name of the instance.
    pub fn name(&self) -> &'static str {
        match self {
            ComponentInstance::Registration(c) => c.name(),
            ComponentInstance::Metric(c) => c.name(),
            ComponentInstance::Transform(c) => c.name(),
            ComponentInstance::Optimizer(c) => c.name(),
            ComponentInstance::Interpolator(c) => c.name(),
            ComponentInstance::Pyramid(c) => c.name(),
            ComponentInstance::Sampler(c) => c.name(),
        }
    }
}

/// A unit of component registration, loaded at startup and unloaded once at
/// the end of the run.
pub trait ComponentModule: Send {
    fn name(&self) -> &str;

    /// Adds this module's factories to `registry`.
    fn register(&self, registry: &mut ComponentRegistry) -> MultiRegResult<()>;

    /// Releases module resources. Called at most once.
    fn unload(&self) {}
}

/// Registry of component factories keyed by kind and name.
#[derive(Default)]
pub struct ComponentRegistry {
    factories: BTreeMap<(ComponentKind, String), Factory>,
    modules: Vec<Box<dyn ComponentModule>>,
    unloaded: bool,
}

macro_rules! typed_access {
    ($($register:ident, $create:ident, $variant:ident, $trait:ty;)+) => {
        $(
            /// Registers a factory for this kind.
            pub fn $register<F>(&mut self, name: &str, make: F) -> MultiRegResult<()>
            where
                F: Fn() -> Box<$trait> + Send + Sync + 'static,
            {
                self.register(ComponentKind::$variant, name, Factory::$variant(Arc::new(make)))
            }

            /// Creates a new instance of the named component of this kind.
            pub fn $create(&self, name: &str) -> MultiRegResult<Box<$trait>> {
                match self.create(ComponentKind::$variant, name)? {
                    ComponentInstance::$variant(c) => Ok(c),
                    _ => Err(MultiRegError::InvalidInput("factory produced the wrong kind")),
                }
            }
        )+
    };
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in modules loaded.
    pub fn with_builtins() -> MultiRegResult<Self> {
        let mut registry = Self::new();
        for module in crate::builtin::modules() {
            registry.load_module(module)?;
        }
        Ok(registry)
    }

    /// Adds `factory` under `kind` and `name`. A name may be registered once
    /// per kind.
    pub fn register(
        &mut self,
        kind: ComponentKind,
        name: &str,
        factory: Factory,
    ) -> MultiRegResult<()> {
        if factory.kind() != kind {
            return Err(MultiRegError::InvalidInput(
                "factory kind does not match registration kind",
            ));
        }
        let key = (kind, name.to_string());
        if self.factories.contains_key(&key) {
            return Err(MultiRegError::DuplicateComponent {
                kind,
                name: name.to_string(),
            });
        }
        trace_event!("component_registered", kind = kind.as_str(), name = name);
        self.factories.insert(key, factory);
        Ok(())
    }

    /// Constructs a fresh instance. Instances are never shared.
    pub fn create(&self, kind: ComponentKind, name: &str) -> MultiRegResult<ComponentInstance> {
        self.factories
            .get(&(kind, name.to_string()))
            .map(Factory::make)
            .ok_or_else(|| MultiRegError::UnknownComponent {
                kind,
                name: name.to_string(),
            })
    }

    typed_access! {
        register_registration, create_registration, Registration, dyn RegistrationMethod;
        register_metric, create_metric, Metric, dyn Metric;
        register_transform, create_transform, Transform, dyn TransformComponent;
        register_optimizer, create_optimizer, Optimizer, dyn Optimizer;
        register_interpolator, create_interpolator, Interpolator, dyn Interpolator;
        register_pyramid, create_pyramid, Pyramid, dyn ImagePyramid;
        register_sampler, create_sampler, Sampler, dyn ImageSampler;
    }

    pub fn contains(&self, kind: ComponentKind, name: &str) -> bool {
        self.factories.contains_key(&(kind, name.to_string()))
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: ComponentKind) -> Vec<&str> {
        self.factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Runs the module's registration and keeps it for unloading.
    pub fn load_module(&mut self, module: Box<dyn ComponentModule>) -> MultiRegResult<()> {
        module.register(self)?;
        trace_event!("module_loaded", module = module.name());
        self.modules.push(module);
        self.unloaded = false;
        Ok(())
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Unloads every module in reverse load order and drops all factories.
    ///
    /// Calling it again is a no-op.
    pub fn unload_all(&mut self) {
        if self.unloaded {
            return;
        }
        while let Some(module) = self.modules.pop() {
            module.unload();
        }
        self.factories.clear();
        self.unloaded = true;
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("modules", &self.module_names())
            .field("unloaded", &self.unloaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ComponentModule, ComponentRegistry};
    use crate::component::ComponentKind;
    use crate::interpolator::NearestNeighborInterpolator;
    use crate::util::{MultiRegError, MultiRegResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingModule {
        unloads: Arc<AtomicUsize>,
    }

    impl ComponentModule for CountingModule {
        fn name(&self) -> &str {
            "counting"
        }

        fn register(&self, registry: &mut ComponentRegistry) -> MultiRegResult<()> {
            registry.register_interpolator("Nearest", || {
                Box::new(NearestNeighborInterpolator::default())
            })
        }

        fn unload(&self) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn duplicate_names_are_rejected_per_kind() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_interpolator("Nearest", || Box::new(NearestNeighborInterpolator::default()))
            .unwrap();
        let err = registry
            .register_interpolator("Nearest", || Box::new(NearestNeighborInterpolator::default()))
            .unwrap_err();
        assert_eq!(
            err,
            MultiRegError::DuplicateComponent {
                kind: ComponentKind::Interpolator,
                name: "Nearest".into(),
            }
        );
    }

    #[test]
    fn unknown_names_fail_and_instances_are_fresh() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_interpolator("Nearest", || Box::new(NearestNeighborInterpolator::default()))
            .unwrap();
        assert!(matches!(
            registry.create_metric("Nearest"),
            Err(MultiRegError::UnknownComponent { kind: ComponentKind::Metric, .. })
        ));
        let made = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&made);
        registry
            .register_interpolator("Counted", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(NearestNeighborInterpolator::default())
            })
            .unwrap();
        registry.create_interpolator("Counted").unwrap();
        registry.create_interpolator("Counted").unwrap();
        assert_eq!(made.load(Ordering::SeqCst), 2);
        assert_eq!(registry.names(ComponentKind::Interpolator), vec!["Counted", "Nearest"]);
    }

    #[test]
    fn unload_all_is_idempotent() {
        let unloads = Arc::new(AtomicUsize::new(0));
        let mut registry = ComponentRegistry::new();
        registry
            .load_module(Box::new(CountingModule {
                unloads: Arc::clone(&unloads),
            }))
            .unwrap();
        assert!(registry.contains(ComponentKind::Interpolator, "Nearest"));
        registry.unload_all();
        registry.unload_all();
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert!(registry.is_unloaded());
    }
}
