//! Graph nodes of the dependency graph. A [Binding] produces and injects
//! values for exactly one [Key], knows which other bindings it depends on,
//! and moves through a small resolution state machine driven by the
//! [Resolver](crate::resolver::Resolver).
//!
//! Dependencies come in two flavors: hard edges (constructor/parameter
//! values, needed before an instance can exist - these must be acyclic) and
//! soft edges (properties wired after construction, and wrapper delegates
//! whose production is deferred - these may close cycles).

use crate::descriptor::TypeDescriptor;
use crate::error::{GraphError, ProvisionError};
use crate::instance::{lock, InstanceAnyPtr, InstancePtr, Lazy, Provider};
use crate::key::Key;
use crate::module::{ProviderFn, ProviderSpec, RuntimeModule};
use crate::resolver::Resolver;
use derivative::Derivative;
#[cfg(not(feature = "threadsafe"))]
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
#[cfg(feature = "threadsafe")]
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};

#[cfg(feature = "threadsafe")]
pub type BindingPtr = Arc<dyn Binding + Send + Sync>;
#[cfg(not(feature = "threadsafe"))]
pub type BindingPtr = Rc<dyn Binding>;

#[cfg(feature = "threadsafe")]
pub(crate) type SetBindingPtr = Arc<SetBinding>;
#[cfg(not(feature = "threadsafe"))]
pub(crate) type SetBindingPtr = Rc<SetBinding>;

/// Resolution lifecycle of a binding. Bindings are created unresolved, move
/// to resolving while their dependencies are being discovered, and end up
/// resolved once every dependency binding exists in the graph.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Resolved,
}

const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 1;
const RESOLVED: u8 = 2;

/// State common to all binding variants.
#[derive(Debug)]
pub struct BindingCore {
    key: Key,
    member_key: Option<Key>,
    required_by: OnceLock<String>,
    singleton: bool,
    library: bool,
    state: AtomicU8,
}

impl BindingCore {
    pub fn new(key: Key, singleton: bool, library: bool) -> Self {
        Self {
            key,
            member_key: None,
            required_by: OnceLock::new(),
            singleton,
            library,
            state: AtomicU8::new(UNRESOLVED),
        }
    }

    pub fn with_member_key(mut self, member_key: Key) -> Self {
        self.member_key = Some(member_key);
        self
    }

    #[inline]
    pub fn key(&self) -> &Key {
        &self.key
    }

    #[inline]
    pub fn member_key(&self) -> Option<&Key> {
        self.member_key.as_ref()
    }

    /// The dependent which first requested this binding; diagnostics only.
    pub fn required_by(&self) -> &str {
        self.required_by.get().map_or("unknown", String::as_str)
    }

    pub(crate) fn note_required_by(&self, requestor: &str) {
        let _ = self.required_by.set(requestor.to_string());
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    #[inline]
    pub fn is_library(&self) -> bool {
        self.library
    }

    pub fn state(&self) -> ResolutionState {
        match self.state.load(Ordering::Acquire) {
            RESOLVING => ResolutionState::Resolving,
            RESOLVED => ResolutionState::Resolved,
            _ => ResolutionState::Unresolved,
        }
    }

    pub(crate) fn set_state(&self, state: ResolutionState) {
        let value = match state {
            ResolutionState::Unresolved => UNRESOLVED,
            ResolutionState::Resolving => RESOLVING,
            ResolutionState::Resolved => RESOLVED,
        };
        self.state.store(value, Ordering::Release);
    }
}

/// A node of the dependency graph, capable of producing or injecting values
/// for its key.
pub trait Binding: std::fmt::Debug {
    fn core(&self) -> &BindingCore;

    /// The key this binding produces values for.
    #[inline]
    fn key(&self) -> &Key {
        self.core().key()
    }

    /// The key under which this binding's member-injection variant is
    /// registered, if any.
    #[inline]
    fn member_key(&self) -> Option<&Key> {
        self.core().member_key()
    }

    /// The dependent which first requested this binding; diagnostics only.
    #[inline]
    fn required_by(&self) -> &str {
        self.core().required_by()
    }

    #[inline]
    fn is_singleton(&self) -> bool {
        self.core().is_singleton()
    }

    /// Whether absence of use is tolerated for this binding.
    #[inline]
    fn is_library(&self) -> bool {
        self.core().is_library()
    }

    /// Identity of the module which declared this binding, if any.
    fn declaring_module(&self) -> Option<&str> {
        None
    }

    #[inline]
    fn state(&self) -> ResolutionState {
        self.core().state()
    }

    /// Looks up or creates the bindings this one depends on by requesting
    /// them from the resolver. Idempotent - repeated calls after the first
    /// are no-ops.
    fn resolve(&self, resolver: &mut Resolver) -> Result<(), GraphError>;

    /// Reports previously-resolved dependency bindings, split into hard
    /// (constructor/parameter) and soft (property/deferred) edges. Used only
    /// by the graph verifier, never by value production.
    fn dependencies(&self, hard: &mut Vec<BindingPtr>, soft: &mut Vec<BindingPtr>);

    /// Produces or returns the cached value for this binding's key.
    fn get(&self) -> Result<InstanceAnyPtr, ProvisionError>;

    /// Injects previously resolved property dependencies into an existing
    /// instance. Variants which structurally cannot support this fail with
    /// [ProvisionError::UnsupportedOperation].
    fn inject_properties(&self, target: &InstanceAnyPtr) -> Result<(), ProvisionError>;
}

struct DirectDeps {
    constructor: Vec<BindingPtr>,
    properties: Vec<BindingPtr>,
}

/// Builds values by invoking a descriptor's constructor with resolved
/// dependency values, then injecting declared properties. Descriptors
/// without a constructor yield validation-only bindings which let the
/// verifier walk the graph without ever constructing real objects.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DirectBinding {
    core: BindingCore,
    descriptor: TypeDescriptor,
    #[derivative(Debug = "ignore")]
    deps: Mutex<Option<DirectDeps>>,
    #[derivative(Debug = "ignore")]
    instance: Mutex<Option<InstanceAnyPtr>>,
}

impl DirectBinding {
    pub fn create(key: Key, descriptor: TypeDescriptor) -> BindingPtr {
        let member_key = Key::for_members(descriptor.type_name);
        InstancePtr::new(Self {
            // Bindings materialized on request are required by definition, so
            // absence of use is tolerated.
            core: BindingCore::new(key, descriptor.singleton, true).with_member_key(member_key),
            descriptor,
            deps: Mutex::new(None),
            instance: Mutex::new(None),
        })
    }

    fn construct_now(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        let Some(construct) = self.descriptor.construct else {
            return Err(ProvisionError::UnsupportedOperation {
                key: self.core.key().clone(),
            });
        };

        let constructor_bindings = {
            let deps = lock(&self.deps);
            deps.as_ref()
                .map(|deps| deps.constructor.clone())
                .ok_or_else(|| ProvisionError::UnresolvedBinding {
                    key: self.core.key().clone(),
                })?
        };

        let values = constructor_bindings
            .iter()
            .map(|binding| binding.get())
            .collect::<Result<Vec<_>, _>>()?;

        (construct)(&values)
    }
}

impl Binding for DirectBinding {
    fn core(&self) -> &BindingCore {
        &self.core
    }

    fn resolve(&self, resolver: &mut Resolver) -> Result<(), GraphError> {
        if lock(&self.deps).is_some() {
            return Ok(());
        }

        let requestor = self.core.key().to_string();
        let constructor = self
            .descriptor
            .constructor_keys
            .iter()
            .map(|key| resolver.request_binding(key, &requestor, true))
            .collect::<Result<Vec<_>, _>>()?;
        let properties = self
            .descriptor
            .property_keys
            .iter()
            .map(|key| resolver.request_binding(key, &requestor, true))
            .collect::<Result<Vec<_>, _>>()?;

        *lock(&self.deps) = Some(DirectDeps {
            constructor,
            properties,
        });
        Ok(())
    }

    fn dependencies(&self, hard: &mut Vec<BindingPtr>, soft: &mut Vec<BindingPtr>) {
        if let Some(deps) = &*lock(&self.deps) {
            hard.extend(deps.constructor.iter().cloned());
            soft.extend(deps.properties.iter().cloned());
        }
    }

    fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        if self.core.is_singleton() {
            // The instance is cached before property injection runs, so
            // mutually-referencing singletons wired through properties
            // terminate instead of recursing.
            let created = {
                let mut cached = lock(&self.instance);
                if let Some(existing) = &*cached {
                    return Ok(existing.clone());
                }

                let created = self.construct_now()?;
                *cached = Some(created.clone());
                created
            };

            self.inject_properties(&created)?;
            Ok(created)
        } else {
            let created = self.construct_now()?;
            self.inject_properties(&created)?;
            Ok(created)
        }
    }

    fn inject_properties(&self, target: &InstanceAnyPtr) -> Result<(), ProvisionError> {
        let Some(inject) = self.descriptor.inject else {
            return if self.descriptor.property_keys.is_empty() {
                Ok(())
            } else {
                Err(ProvisionError::UnsupportedOperation {
                    key: self.core.key().clone(),
                })
            };
        };

        let property_bindings = {
            let deps = lock(&self.deps);
            deps.as_ref()
                .map(|deps| deps.properties.clone())
                .ok_or_else(|| ProvisionError::UnresolvedBinding {
                    key: self.core.key().clone(),
                })?
        };

        let values = property_bindings
            .iter()
            .map(|binding| binding.get())
            .collect::<Result<Vec<_>, _>>()?;

        (inject)(target, &values)
    }
}

/// Invokes a module-declared provider operation with resolved parameter
/// values, honoring its own singleton flag.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ProviderMethodBinding {
    core: BindingCore,
    module: String,
    parameters: Vec<Key>,
    #[derivative(Debug = "ignore")]
    produce: ProviderFn,
    #[derivative(Debug = "ignore")]
    deps: Mutex<Option<Vec<BindingPtr>>>,
    #[derivative(Debug = "ignore")]
    instance: Mutex<Option<InstanceAnyPtr>>,
}

impl ProviderMethodBinding {
    pub fn create(spec: ProviderSpec, module: &RuntimeModule) -> BindingPtr {
        let core = BindingCore::new(spec.key, spec.singleton, module.is_library());
        core.note_required_by(module.identity());
        InstancePtr::new(Self {
            core,
            module: module.identity().to_string(),
            parameters: spec.parameters,
            produce: spec.produce,
            deps: Mutex::new(None),
            instance: Mutex::new(None),
        })
    }

    fn produce_now(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        let parameter_bindings = {
            let deps = lock(&self.deps);
            deps.clone().ok_or_else(|| ProvisionError::UnresolvedBinding {
                key: self.core.key().clone(),
            })?
        };

        let values = parameter_bindings
            .iter()
            .map(|binding| binding.get())
            .collect::<Result<Vec<_>, _>>()?;

        (self.produce)(&values)
    }
}

impl Binding for ProviderMethodBinding {
    fn core(&self) -> &BindingCore {
        &self.core
    }

    fn declaring_module(&self) -> Option<&str> {
        Some(&self.module)
    }

    fn resolve(&self, resolver: &mut Resolver) -> Result<(), GraphError> {
        if lock(&self.deps).is_some() {
            return Ok(());
        }

        let requestor = self.core.key().to_string();
        let parameters = self
            .parameters
            .iter()
            .map(|key| resolver.request_binding(key, &requestor, true))
            .collect::<Result<Vec<_>, _>>()?;

        *lock(&self.deps) = Some(parameters);
        Ok(())
    }

    fn dependencies(&self, hard: &mut Vec<BindingPtr>, _soft: &mut Vec<BindingPtr>) {
        if let Some(deps) = &*lock(&self.deps) {
            hard.extend(deps.iter().cloned());
        }
    }

    fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        if self.core.is_singleton() {
            let mut cached = lock(&self.instance);
            if let Some(existing) = &*cached {
                return Ok(existing.clone());
            }

            let created = self.produce_now()?;
            *cached = Some(created.clone());
            Ok(created)
        } else {
            self.produce_now()
        }
    }

    fn inject_properties(&self, _target: &InstanceAnyPtr) -> Result<(), ProvisionError> {
        Err(ProvisionError::UnsupportedOperation {
            key: self.core.key().clone(),
        })
    }
}

/// Wraps a delegate binding behind a [Lazy] handle. The delegate is reported
/// as a soft edge: its production is deferred past construction, which is
/// what makes lazy wrapping the sanctioned way of breaking construction
/// cycles.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct LazyBinding {
    core: BindingCore,
    #[derivative(Debug = "ignore")]
    delegate: BindingPtr,
}

impl LazyBinding {
    pub fn create(key: Key, delegate: BindingPtr) -> BindingPtr {
        InstancePtr::new(Self {
            core: BindingCore::new(key, false, true),
            delegate,
        })
    }
}

impl Binding for LazyBinding {
    fn core(&self) -> &BindingCore {
        &self.core
    }

    fn resolve(&self, _resolver: &mut Resolver) -> Result<(), GraphError> {
        // The delegate was requested when this wrapper was synthesized.
        Ok(())
    }

    fn dependencies(&self, _hard: &mut Vec<BindingPtr>, soft: &mut Vec<BindingPtr>) {
        soft.push(self.delegate.clone());
    }

    fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        Ok(InstancePtr::new(Lazy::new(self.delegate.clone())) as InstanceAnyPtr)
    }

    fn inject_properties(&self, _target: &InstanceAnyPtr) -> Result<(), ProvisionError> {
        Err(ProvisionError::UnsupportedOperation {
            key: self.core.key().clone(),
        })
    }
}

/// Wraps a delegate binding behind a [Provider] handle. Every invocation of
/// the handle re-invokes the delegate; any caching is the delegate's own
/// singleton behavior.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ProviderWrapperBinding {
    core: BindingCore,
    #[derivative(Debug = "ignore")]
    delegate: BindingPtr,
}

impl ProviderWrapperBinding {
    pub fn create(key: Key, delegate: BindingPtr) -> BindingPtr {
        InstancePtr::new(Self {
            core: BindingCore::new(key, false, true),
            delegate,
        })
    }
}

impl Binding for ProviderWrapperBinding {
    fn core(&self) -> &BindingCore {
        &self.core
    }

    fn resolve(&self, _resolver: &mut Resolver) -> Result<(), GraphError> {
        Ok(())
    }

    fn dependencies(&self, _hard: &mut Vec<BindingPtr>, soft: &mut Vec<BindingPtr>) {
        soft.push(self.delegate.clone());
    }

    fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        Ok(InstancePtr::new(Provider::new(self.delegate.clone())) as InstanceAnyPtr)
    }

    fn inject_properties(&self, _target: &InstanceAnyPtr) -> Result<(), ProvisionError> {
        Err(ProvisionError::UnsupportedOperation {
            key: self.core.key().clone(),
        })
    }
}

/// Serves a member-injection key by delegating to the plain binding for the
/// same type. Cannot produce values.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct MembersBinding {
    core: BindingCore,
    #[derivative(Debug = "ignore")]
    delegate: BindingPtr,
}

impl MembersBinding {
    pub fn create(key: Key, delegate: BindingPtr) -> BindingPtr {
        InstancePtr::new(Self {
            core: BindingCore::new(key, false, true),
            delegate,
        })
    }
}

impl Binding for MembersBinding {
    fn core(&self) -> &BindingCore {
        &self.core
    }

    fn resolve(&self, _resolver: &mut Resolver) -> Result<(), GraphError> {
        Ok(())
    }

    fn dependencies(&self, _hard: &mut Vec<BindingPtr>, soft: &mut Vec<BindingPtr>) {
        soft.push(self.delegate.clone());
    }

    fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        Err(ProvisionError::UnsupportedOperation {
            key: self.core.key().clone(),
        })
    }

    fn inject_properties(&self, target: &InstanceAnyPtr) -> Result<(), ProvisionError> {
        self.delegate.inject_properties(target)
    }
}

/// Aggregates provider contributions declared across possibly many modules
/// into one immutable collection value. Contributors live inside the set
/// binding, not in the binding table; registering another contributor
/// appends rather than replaces.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SetBinding {
    core: BindingCore,
    library_only: AtomicBool,
    #[derivative(Debug = "ignore")]
    contributors: Mutex<Vec<BindingPtr>>,
}

impl SetBinding {
    pub(crate) fn create(key: Key, required_by: &str) -> SetBindingPtr {
        let core = BindingCore::new(key, false, false);
        core.note_required_by(required_by);
        InstancePtr::new(Self {
            core,
            library_only: AtomicBool::new(true),
            contributors: Mutex::new(Vec::new()),
        })
    }

    /// Appends a contributor. The collection stays library-tolerated only
    /// while every contributor comes from a library module.
    pub(crate) fn add(&self, contributor: BindingPtr, from_library: bool) {
        if !from_library {
            self.library_only.store(false, Ordering::Release);
        }
        lock(&self.contributors).push(contributor);
    }
}

impl Binding for SetBinding {
    fn core(&self) -> &BindingCore {
        &self.core
    }

    fn is_library(&self) -> bool {
        self.library_only.load(Ordering::Acquire)
    }

    fn resolve(&self, resolver: &mut Resolver) -> Result<(), GraphError> {
        for contributor in lock(&self.contributors).iter() {
            resolver.enqueue(contributor.clone());
        }
        Ok(())
    }

    fn dependencies(&self, hard: &mut Vec<BindingPtr>, _soft: &mut Vec<BindingPtr>) {
        hard.extend(lock(&self.contributors).iter().cloned());
    }

    fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        let contributors = lock(&self.contributors).clone();
        let values = contributors
            .iter()
            .map(|binding| binding.get())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InstancePtr::new(values) as InstanceAnyPtr)
    }

    fn inject_properties(&self, _target: &InstanceAnyPtr) -> Result<(), ProvisionError> {
        Err(ProvisionError::UnsupportedOperation {
            key: self.core.key().clone(),
        })
    }
}
