//! Declared sources of bindings. A [RuntimeModule] lists the entry points it
//! serves, the modules it includes, and the provider bindings it contributes
//! to a container.

use crate::error::ProvisionError;
use crate::instance::InstanceAnyPtr;
use crate::key::Key;
use derivative::Derivative;
#[cfg(not(feature = "threadsafe"))]
use std::rc::Rc;
#[cfg(feature = "threadsafe")]
use std::sync::Arc;

#[cfg(feature = "threadsafe")]
pub type ProviderFn =
    Arc<dyn Fn(&[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError> + Send + Sync>;
#[cfg(not(feature = "threadsafe"))]
pub type ProviderFn = Rc<dyn Fn(&[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError>>;

/// Declaration of a single provider operation: the key it produces, its
/// parameter keys, and the producing closure. Qualifiers live in the key.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ProviderSpec {
    pub key: Key,
    pub singleton: bool,
    pub into_set: bool,
    pub parameters: Vec<Key>,
    #[derivative(Debug = "ignore")]
    pub produce: ProviderFn,
}

impl ProviderSpec {
    /// Creates a non-singleton provider declaration.
    #[cfg(feature = "threadsafe")]
    pub fn new<F>(key: Key, parameters: Vec<Key>, produce: F) -> Self
    where
        F: Fn(&[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError> + Send + Sync + 'static,
    {
        Self {
            key,
            singleton: false,
            into_set: false,
            parameters,
            produce: Arc::new(produce),
        }
    }

    /// Creates a non-singleton provider declaration.
    #[cfg(not(feature = "threadsafe"))]
    pub fn new<F>(key: Key, parameters: Vec<Key>, produce: F) -> Self
    where
        F: Fn(&[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError> + 'static,
    {
        Self {
            key,
            singleton: false,
            into_set: false,
            parameters,
            produce: Rc::new(produce),
        }
    }

    /// Marks the produced value as shared after first construction.
    pub fn as_singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Marks this provider as a contribution to the multibinding collection
    /// for its key, rather than a standalone binding.
    pub fn in_set(mut self) -> Self {
        self.into_set = true;
        self
    }
}

/// A declared source of bindings, created once per module instance supplied
/// to a container.
#[derive(Clone, Debug)]
pub struct RuntimeModule {
    identity: String,
    entry_points: Vec<Key>,
    includes: Vec<String>,
    complete: bool,
    library: bool,
    providers: Vec<ProviderSpec>,
}

impl RuntimeModule {
    #[inline]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Keys whose full object graph must be satisfiable through this module's
    /// container.
    #[inline]
    pub fn entry_points(&self) -> &[Key] {
        &self.entry_points
    }

    /// Identities of modules this one includes.
    #[inline]
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Whether all of this module's bindings must be satisfiable without
    /// external help.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether this module tolerates declaring bindings no entry point uses.
    #[inline]
    pub fn is_library(&self) -> bool {
        self.library
    }

    /// Yields the provider bindings declared by this module.
    #[inline]
    pub fn bindings(&self) -> &[ProviderSpec] {
        &self.providers
    }
}

/// Fluent construction of [RuntimeModule]s.
pub struct ModuleBuilder {
    module: RuntimeModule,
}

impl ModuleBuilder {
    /// Creates a builder for a module with the given identity. Modules start
    /// complete and non-library.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            module: RuntimeModule {
                identity: identity.into(),
                entry_points: Vec::new(),
                includes: Vec::new(),
                complete: true,
                library: false,
                providers: Vec::new(),
            },
        }
    }

    /// Registers an entry point key.
    pub fn entry_point(mut self, key: Key) -> Self {
        self.module.entry_points.push(key);
        self
    }

    /// Includes another module by identity; resolved through the binding
    /// factory when the container assembles its module set.
    pub fn include(mut self, identity: impl Into<String>) -> Self {
        self.module.includes.push(identity.into());
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.module.complete = complete;
        self
    }

    pub fn library(mut self, library: bool) -> Self {
        self.module.library = library;
        self
    }

    /// Declares a provider binding.
    pub fn provides(mut self, spec: ProviderSpec) -> Self {
        self.module.providers.push(spec);
        self
    }

    pub fn build(self) -> RuntimeModule {
        self.module
    }
}
