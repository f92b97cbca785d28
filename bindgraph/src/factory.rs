//! The single seam between the graph core and whatever produces declaration
//! metadata. A [BindingStrategy] materializes bindings for plain-type keys,
//! resolves module identities, and synthesizes wrapper bindings; strategies
//! are composed into an ordered [FallbackChain], with exactly one strategy
//! satisfying any given lookup.
//!
//! Two strategies ship with the crate: [StaticStrategy], answering from
//! [inventory]-collected registrations (the fast, pre-generated path), and
//! [RegistryStrategy], answering from a programmatically populated registry.

use crate::binding::{BindingPtr, DirectBinding, LazyBinding, ProviderWrapperBinding};
use crate::descriptor::TypeDescriptor;
use crate::key::{Key, WrapKind};
use crate::module::RuntimeModule;
use fxhash::FxHashMap;
pub use inventory::submit;
#[cfg(test)]
use mockall::automock;
#[cfg(not(feature = "threadsafe"))]
use std::rc::Rc;
#[cfg(feature = "threadsafe")]
use std::sync::Arc;

/// Statically registered descriptor, collected via [inventory].
pub struct DescriptorRegistration {
    pub descriptor: fn() -> TypeDescriptor,
}

/// Statically registered module, collected via [inventory].
pub struct ModuleRegistration {
    pub module: fn() -> RuntimeModule,
}

inventory::collect!(DescriptorRegistration);
inventory::collect!(ModuleRegistration);

/// One concrete lookup strategy for declaration metadata.
#[cfg_attr(test, automock)]
pub trait BindingStrategy {
    /// Materializes a binding for a plain-type key, or signals "not found".
    /// `type_hint` is the innermost base type name of the key. When
    /// `must_be_injectable` is set, types without a constructor are not
    /// considered found.
    fn plain_binding(
        &self,
        key: &Key,
        type_hint: &str,
        must_be_injectable: bool,
    ) -> Option<BindingPtr>;

    /// Returns the module declared under the given identity.
    fn module(&self, identity: &str) -> Option<RuntimeModule>;

    /// Synthesizes a wrapper binding around an already-requested delegate.
    fn wrapper_binding(
        &self,
        key: &Key,
        delegate: BindingPtr,
        kind: WrapKind,
    ) -> Option<BindingPtr> {
        match kind {
            WrapKind::Lazy => Some(LazyBinding::create(key.clone(), delegate)),
            WrapKind::Provider => Some(ProviderWrapperBinding::create(key.clone(), delegate)),
            _ => None,
        }
    }
}

#[cfg(feature = "threadsafe")]
pub type BindingStrategyPtr = Arc<dyn BindingStrategy + Send + Sync>;
#[cfg(not(feature = "threadsafe"))]
pub type BindingStrategyPtr = Rc<dyn BindingStrategy>;

/// Ordered composition of strategies; the first one producing a value wins.
pub struct FallbackChain {
    strategies: Vec<BindingStrategyPtr>,
}

impl FallbackChain {
    pub fn new(strategies: Vec<BindingStrategyPtr>) -> Self {
        Self { strategies }
    }
}

impl BindingStrategy for FallbackChain {
    fn plain_binding(
        &self,
        key: &Key,
        type_hint: &str,
        must_be_injectable: bool,
    ) -> Option<BindingPtr> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.plain_binding(key, type_hint, must_be_injectable))
    }

    fn module(&self, identity: &str) -> Option<RuntimeModule> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.module(identity))
    }

    fn wrapper_binding(
        &self,
        key: &Key,
        delegate: BindingPtr,
        kind: WrapKind,
    ) -> Option<BindingPtr> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.wrapper_binding(key, delegate.clone(), kind))
    }
}

fn descriptor_binding(
    descriptor: &TypeDescriptor,
    key: &Key,
    must_be_injectable: bool,
) -> Option<BindingPtr> {
    if must_be_injectable && descriptor.construct.is_none() {
        return None;
    }

    Some(DirectBinding::create(key.clone(), descriptor.clone()))
}

/// Strategy answering from statically registered descriptors and modules.
pub struct StaticStrategy {
    descriptors: FxHashMap<&'static str, TypeDescriptor>,
    modules: FxHashMap<String, RuntimeModule>,
}

impl StaticStrategy {
    /// Gathers all registrations submitted to [inventory].
    pub fn from_registrations() -> Self {
        let descriptors = inventory::iter::<DescriptorRegistration>
            .into_iter()
            .map(|registration| {
                let descriptor = (registration.descriptor)();
                (descriptor.type_name, descriptor)
            })
            .collect();

        let modules = inventory::iter::<ModuleRegistration>
            .into_iter()
            .map(|registration| {
                let module = (registration.module)();
                (module.identity().to_string(), module)
            })
            .collect();

        Self {
            descriptors,
            modules,
        }
    }
}

impl BindingStrategy for StaticStrategy {
    fn plain_binding(
        &self,
        key: &Key,
        type_hint: &str,
        must_be_injectable: bool,
    ) -> Option<BindingPtr> {
        // Qualified keys are only satisfiable by provider declarations.
        if key.is_qualified() {
            return None;
        }

        self.descriptors
            .get(type_hint)
            .and_then(|descriptor| descriptor_binding(descriptor, key, must_be_injectable))
    }

    fn module(&self, identity: &str) -> Option<RuntimeModule> {
        self.modules.get(identity).cloned()
    }
}

/// Strategy answering from a programmatically populated registry; the
/// runtime fallback for metadata not known at link time.
#[derive(Default)]
pub struct RegistryStrategy {
    descriptors: FxHashMap<String, TypeDescriptor>,
    modules: FxHashMap<String, RuntimeModule>,
}

impl RegistryStrategy {
    pub fn register_descriptor(&mut self, descriptor: TypeDescriptor) {
        self.descriptors
            .insert(descriptor.type_name.to_string(), descriptor);
    }

    pub fn register_module(&mut self, module: RuntimeModule) {
        self.modules.insert(module.identity().to_string(), module);
    }
}

impl BindingStrategy for RegistryStrategy {
    fn plain_binding(
        &self,
        key: &Key,
        type_hint: &str,
        must_be_injectable: bool,
    ) -> Option<BindingPtr> {
        if key.is_qualified() {
            return None;
        }

        self.descriptors
            .get(type_hint)
            .and_then(|descriptor| descriptor_binding(descriptor, key, must_be_injectable))
    }

    fn module(&self, identity: &str) -> Option<RuntimeModule> {
        self.modules.get(identity).cloned()
    }
}
