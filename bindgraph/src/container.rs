//! The composition surface: a [Container] owns one resolver, tracks the
//! entry points declared by its modules, and serves instances, property
//! injection and whole-graph validation. Containers can be layered -
//! [Container::add] creates a child resolving against the parent's
//! already-resolved graph without ever mutating it.

use crate::binding::BindingPtr;
use crate::error::{ContainerError, ProvisionError, ValidationError};
use crate::factory::{BindingStrategy, BindingStrategyPtr, FallbackChain, StaticStrategy};
use crate::graph::GraphVerifier;
use crate::instance::{
    downcast_instance, lock, Injectable, InstanceAnyPtr, InstancePtr, Lazy, Provider,
};
use crate::key::Key;
use crate::module::RuntimeModule;
use crate::resolver::{ParentLookup, ParentLookupPtr, Resolver};
use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use std::collections::VecDeque;
#[cfg(not(feature = "threadsafe"))]
use std::rc::Rc;
#[cfg(feature = "threadsafe")]
use std::sync::Arc;
use std::sync::Mutex;
use tracing::info;

#[cfg(feature = "threadsafe")]
pub type ContainerPtr = Arc<Container>;
#[cfg(not(feature = "threadsafe"))]
pub type ContainerPtr = Rc<Container>;

/// Builder for [Container]s with sensible defaults, for easy construction.
pub struct ContainerBuilder {
    strategies: Vec<BindingStrategyPtr>,
    modules: Vec<RuntimeModule>,
}

impl ContainerBuilder {
    /// Creates a new builder seeded with the standard strategy chain: the
    /// static registrations collected at link time.
    pub fn new() -> Self {
        let static_strategy: BindingStrategyPtr =
            InstancePtr::new(StaticStrategy::from_registrations());
        Self {
            strategies: vec![static_strategy],
            modules: Vec::new(),
        }
    }

    /// Appends a lookup strategy to the fallback chain.
    pub fn with_strategy(mut self, strategy: BindingStrategyPtr) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_module(mut self, module: RuntimeModule) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_modules<I: IntoIterator<Item = RuntimeModule>>(mut self, modules: I) -> Self {
        self.modules.extend(modules);
        self
    }

    /// Builds the container, expanding included modules and installing all
    /// eagerly-known bindings.
    pub fn build(self) -> Result<ContainerPtr, ContainerError> {
        let strategy: BindingStrategyPtr = InstancePtr::new(FallbackChain::new(self.strategies));
        Container::assemble(strategy, self.modules, None)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved object graph serving instances for its declared entry points.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Container {
    #[derivative(Debug = "ignore")]
    strategy: BindingStrategyPtr,
    #[derivative(Debug = "ignore")]
    resolver: Mutex<Resolver>,
    entry_points: FxHashMap<Key, String>,
    parent: Option<ContainerPtr>,
}

impl Container {
    /// Creates a container from the given modules using the standard
    /// strategy chain. See [ContainerBuilder] for custom configurations.
    pub fn create<I: IntoIterator<Item = RuntimeModule>>(
        modules: I,
    ) -> Result<ContainerPtr, ContainerError> {
        ContainerBuilder::new().with_modules(modules).build()
    }

    /// Creates a child container layering the given modules on top of this
    /// container's already-resolved graph. The parent is shared, not owned,
    /// and is never mutated through the child.
    #[cfg(feature = "threadsafe")]
    pub fn add<I: IntoIterator<Item = RuntimeModule>>(
        self: &Arc<Self>,
        modules: I,
    ) -> Result<ContainerPtr, ContainerError> {
        lock(&self.resolver).resolve_enqueued()?;
        Self::assemble(
            self.strategy.clone(),
            modules.into_iter().collect(),
            Some(self.clone()),
        )
    }

    /// Creates a child container layering the given modules on top of this
    /// container's already-resolved graph. The parent is shared, not owned,
    /// and is never mutated through the child.
    #[cfg(not(feature = "threadsafe"))]
    pub fn add<I: IntoIterator<Item = RuntimeModule>>(
        self: &Rc<Self>,
        modules: I,
    ) -> Result<ContainerPtr, ContainerError> {
        lock(&self.resolver).resolve_enqueued()?;
        Self::assemble(
            self.strategy.clone(),
            modules.into_iter().collect(),
            Some(self.clone()),
        )
    }

    fn assemble(
        strategy: BindingStrategyPtr,
        seed_modules: Vec<RuntimeModule>,
        parent: Option<ContainerPtr>,
    ) -> Result<ContainerPtr, ContainerError> {
        let modules = expand_modules(strategy.as_ref(), seed_modules)?;
        info!("assembling container from {} modules", modules.len());

        let mut entry_points = FxHashMap::default();
        for module in &modules {
            for key in module.entry_points() {
                entry_points
                    .entry(key.clone())
                    .or_insert_with(|| module.identity().to_string());
            }
        }

        let parent_lookup = parent.clone().map(|parent| -> ParentLookupPtr { parent });
        let mut resolver = Resolver::new(strategy.clone(), parent_lookup);
        resolver.install_bindings(&modules)?;

        Ok(InstancePtr::new(Self {
            strategy,
            resolver: Mutex::new(resolver),
            entry_points,
            parent,
        }))
    }

    /// Returns an instance for an entry-point type.
    pub fn get<T: Injectable>(&self) -> Result<InstancePtr<T>, ContainerError> {
        self.get_typed(Key::of::<T>())
    }

    /// Returns an instance for a qualified entry-point type.
    pub fn get_qualified<T: Injectable>(
        &self,
        qualifier: &str,
    ) -> Result<InstancePtr<T>, ContainerError> {
        self.get_typed(Key::qualified::<T>(qualifier))
    }

    fn get_typed<T: Injectable>(&self, key: Key) -> Result<InstancePtr<T>, ContainerError> {
        let instance = self.get_by_key(&key)?;
        downcast_instance::<T>(instance)
            .map_err(|_| ProvisionError::IncompatibleInstance { key }.into())
    }

    /// Returns a [Lazy] handle for an entry-point key registered with lazy
    /// wrapping.
    pub fn get_lazy<T: Injectable>(&self) -> Result<InstancePtr<Lazy>, ContainerError> {
        let key = Key::of::<T>().wrap_lazy();
        let instance = self.get_by_key(&key)?;
        downcast_instance::<Lazy>(instance)
            .map_err(|_| ProvisionError::IncompatibleInstance { key }.into())
    }

    /// Returns a [Provider] handle for an entry-point key registered with
    /// provider wrapping.
    pub fn get_provider<T: Injectable>(&self) -> Result<InstancePtr<Provider>, ContainerError> {
        let key = Key::of::<T>().wrap_provider();
        let instance = self.get_by_key(&key)?;
        downcast_instance::<Provider>(instance)
            .map_err(|_| ProvisionError::IncompatibleInstance { key }.into())
    }

    /// Returns all contributions to the multibinding collection for an
    /// entry-point element type.
    pub fn get_set<T: Injectable>(&self) -> Result<Vec<InstancePtr<T>>, ContainerError> {
        let key = Key::of::<T>().wrap_set();
        let instance = self.get_by_key(&key)?;
        let values = downcast_instance::<Vec<InstanceAnyPtr>>(instance)
            .map_err(|_| ProvisionError::IncompatibleInstance { key: key.clone() })?;

        values
            .iter()
            .cloned()
            .map(|value| {
                downcast_instance::<T>(value).map_err(|_| {
                    ProvisionError::IncompatibleInstance { key: key.clone() }.into()
                })
            })
            .collect()
    }

    /// Returns a type-erased instance for an entry-point key, walking up
    /// through parent containers if the key is not registered locally.
    pub fn get_by_key(&self, key: &Key) -> Result<InstanceAnyPtr, ContainerError> {
        let binding = self.entry_point_binding(key)?;
        Ok(binding.get()?)
    }

    /// Injects properties into an existing instance, using the
    /// member-injection entry point registered for its type.
    pub fn inject<T: Injectable>(&self, target: &InstancePtr<T>) -> Result<(), ContainerError> {
        let key = Key::for_members_of::<T>();
        let binding = self.entry_point_binding(&key)?;
        let target = target.clone() as InstanceAnyPtr;
        Ok(binding.inject_properties(&target)?)
    }

    /// Forces full resolution of every entry point, then statically
    /// validates the resolved graph. All violations are reported together
    /// in one aggregate failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        info!("validating dependency graph");

        let mut violations = Vec::new();
        let mut resolver = lock(&self.resolver);

        let mut roots = Vec::new();
        let mut root_ids = FxHashSet::default();
        for (key, module) in self
            .entry_points
            .iter()
            .sorted_by_cached_key(|(key, _)| key.to_string())
        {
            match resolver.request_binding(key, module, !key.is_members()) {
                Ok(binding) => {
                    if root_ids.insert(binding.key().clone()) {
                        roots.push(binding);
                    }
                }
                Err(error) => violations.push(error),
            }
        }

        violations.extend(resolver.resolve_all());
        violations.extend(GraphVerifier::new(resolver.bindings(), &roots).verify());

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    fn entry_point_binding(&self, key: &Key) -> Result<BindingPtr, ContainerError> {
        if let Some(module) = self.entry_points.get(key) {
            let mut resolver = lock(&self.resolver);
            let binding = resolver.request_binding(key, module, !key.is_members())?;
            resolver.resolve_enqueued()?;
            return Ok(binding);
        }

        if let Some(parent) = &self.parent {
            return parent.entry_point_binding(key);
        }

        Err(ContainerError::NoSuchEntryPoint { key: key.clone() })
    }
}

impl ParentLookup for Container {
    fn resolved_binding(&self, key: &Key) -> Option<BindingPtr> {
        let local = lock(&self.resolver).bindings().get(key).cloned();
        local.or_else(|| {
            self.parent
                .as_ref()
                .and_then(|parent| parent.resolved_binding(key))
        })
    }
}

fn expand_modules(
    strategy: &dyn BindingStrategy,
    seed_modules: Vec<RuntimeModule>,
) -> Result<Vec<RuntimeModule>, ContainerError> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<RuntimeModule> = seed_modules.into();
    let mut modules = Vec::new();

    while let Some(module) = queue.pop_front() {
        if !seen.insert(module.identity().to_string()) {
            continue;
        }

        for include in module.includes() {
            if seen.contains(include) {
                continue;
            }

            let included =
                strategy
                    .module(include)
                    .ok_or_else(|| ContainerError::MissingModule {
                        identity: include.clone(),
                    })?;
            queue.push_back(included);
        }

        modules.push(module);
    }

    Ok(modules)
}

#[cfg(test)]
mod tests {
    use crate::container::{expand_modules, Container};
    use crate::error::{ContainerError, ProvisionError};
    use crate::factory::{FallbackChain, RegistryStrategy};
    use crate::instance::{InstanceAnyPtr, InstancePtr};
    use crate::key::Key;
    use crate::module::{ModuleBuilder, ProviderSpec};

    fn unit_value(_values: &[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError> {
        Ok(InstancePtr::new(()) as InstanceAnyPtr)
    }

    #[test]
    fn should_expand_included_modules_breadth_first() {
        let mut registry = RegistryStrategy::default();
        registry.register_module(ModuleBuilder::new("tests.Inner").build());
        registry.register_module(
            ModuleBuilder::new("tests.Middle")
                .include("tests.Inner")
                .build(),
        );

        let seed = ModuleBuilder::new("tests.Outer")
            .include("tests.Middle")
            .include("tests.Inner")
            .build();

        let modules = expand_modules(&registry, vec![seed]).unwrap();
        let identities: Vec<_> = modules
            .iter()
            .map(|module| module.identity().to_string())
            .collect();

        assert_eq!(identities, ["tests.Outer", "tests.Middle", "tests.Inner"]);
    }

    #[test]
    fn should_fail_on_unknown_included_modules() {
        let chain = FallbackChain::new(vec![]);
        let seed = ModuleBuilder::new("tests.Outer")
            .include("tests.Missing")
            .build();

        assert!(matches!(
            expand_modules(&chain, vec![seed]).unwrap_err(),
            ContainerError::MissingModule { identity } if identity == "tests.Missing"
        ));
    }

    #[test]
    fn should_refuse_keys_which_are_not_entry_points() {
        let key = Key::for_type("tests.Hidden", None);
        let module = ModuleBuilder::new("tests.HiddenModule")
            .library(true)
            .provides(ProviderSpec::new(key.clone(), vec![], unit_value))
            .build();

        let container = Container::create([module]).unwrap();
        assert_eq!(
            container.get_by_key(&key).unwrap_err(),
            ContainerError::NoSuchEntryPoint { key }
        );
    }
}
