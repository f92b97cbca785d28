//! The worklist engine turning a set of seed requests into a fully resolved
//! binding graph. Bindings are discovered breadth-first: requesting a key
//! inserts an unresolved binding into the table and enqueues it; draining
//! the queue resolves each binding exactly once, which may enqueue further
//! dependencies, until no work remains.

use crate::binding::{
    BindingPtr, MembersBinding, ProviderMethodBinding, ResolutionState, SetBinding, SetBindingPtr,
};
use crate::error::GraphError;
use crate::factory::{BindingStrategy, BindingStrategyPtr};
use crate::key::{Key, WrapKind};
use crate::module::{ProviderSpec, RuntimeModule};
use fxhash::FxHashMap;
use std::collections::VecDeque;
#[cfg(not(feature = "threadsafe"))]
use std::rc::Rc;
#[cfg(feature = "threadsafe")]
use std::sync::Arc;
use tracing::debug;

/// Read path into an enclosing container's already-resolved bindings.
/// Lookups never mutate resolution state on the parent side.
pub trait ParentLookup {
    fn resolved_binding(&self, key: &Key) -> Option<BindingPtr>;
}

#[cfg(feature = "threadsafe")]
pub type ParentLookupPtr = Arc<dyn ParentLookup + Send + Sync>;
#[cfg(not(feature = "threadsafe"))]
pub type ParentLookupPtr = Rc<dyn ParentLookup>;

#[derive(Clone, Copy, Debug)]
struct ModuleMeta {
    complete: bool,
}

/// The worklist resolver for one container layer.
pub struct Resolver {
    strategy: BindingStrategyPtr,
    parent: Option<ParentLookupPtr>,
    bindings: FxHashMap<Key, BindingPtr>,
    sets: FxHashMap<Key, SetBindingPtr>,
    queue: VecDeque<BindingPtr>,
    modules: FxHashMap<String, ModuleMeta>,
    failures: Vec<GraphError>,
}

impl Resolver {
    pub fn new(strategy: BindingStrategyPtr, parent: Option<ParentLookupPtr>) -> Self {
        Self {
            strategy,
            parent,
            bindings: FxHashMap::default(),
            sets: FxHashMap::default(),
            queue: VecDeque::new(),
            modules: FxHashMap::default(),
            failures: Vec::new(),
        }
    }

    /// Seeds the table with all eagerly-known bindings: provider operations
    /// and pre-declared multibinding contributions. Installing two
    /// standalone bindings for one key, or mixing a standalone binding with
    /// set contributions, fails immediately.
    pub fn install_bindings(&mut self, modules: &[RuntimeModule]) -> Result<(), GraphError> {
        for module in modules {
            debug!("installing bindings from module {}", module.identity());
            self.modules.insert(
                module.identity().to_string(),
                ModuleMeta {
                    complete: module.is_complete(),
                },
            );

            for spec in module.bindings() {
                if spec.into_set {
                    self.install_set_contribution(spec.clone(), module)?;
                } else {
                    if self.bindings.contains_key(&spec.key) {
                        return Err(GraphError::DuplicateBinding {
                            key: spec.key.clone(),
                        });
                    }

                    let binding = ProviderMethodBinding::create(spec.clone(), module);
                    self.bindings.insert(binding.key().clone(), binding.clone());
                    self.queue.push_back(binding);
                }
            }
        }

        Ok(())
    }

    fn install_set_contribution(
        &mut self,
        spec: ProviderSpec,
        module: &RuntimeModule,
    ) -> Result<(), GraphError> {
        let set_key = spec.key.clone().wrap_set();
        if !self.sets.contains_key(&set_key) {
            if self.bindings.contains_key(&set_key) {
                return Err(GraphError::DuplicateBinding { key: set_key });
            }

            let set = SetBinding::create(set_key.clone(), module.identity());
            let as_binding: BindingPtr = set.clone();
            self.bindings.insert(set_key.clone(), as_binding.clone());
            self.queue.push_back(as_binding);
            self.sets.insert(set_key.clone(), set);
        }

        let contributor = ProviderMethodBinding::create(spec, module);
        if let Some(set) = self.sets.get(&set_key) {
            set.add(contributor, module.is_library());
        }

        Ok(())
    }

    /// Looks up or creates the binding for a key. Idempotent: repeated
    /// requests return the identical binding. New bindings are returned
    /// unresolved and enqueued; callers needing the dependency graph, not
    /// just the value, must drain the queue afterwards.
    pub fn request_binding(
        &mut self,
        key: &Key,
        required_by: &str,
        must_be_injectable: bool,
    ) -> Result<BindingPtr, GraphError> {
        if let Some(existing) = self.bindings.get(key) {
            return Ok(existing.clone());
        }
        if let Some(parent) = &self.parent {
            if let Some(existing) = parent.resolved_binding(key) {
                return Ok(existing);
            }
        }

        let binding = match key.unwrap() {
            Some((inner, WrapKind::Members)) => {
                let delegate = self.request_binding(&inner, required_by, false)?;
                // Plain bindings register their own member-injection variant;
                // requesting the inner key may have satisfied us already.
                if let Some(existing) = self.bindings.get(key) {
                    return Ok(existing.clone());
                }
                MembersBinding::create(key.clone(), delegate)
            }
            Some((inner, WrapKind::Lazy)) => {
                let delegate = self.request_binding(&inner, required_by, true)?;
                self.strategy
                    .wrapper_binding(key, delegate, WrapKind::Lazy)
                    .ok_or_else(|| missing(key, required_by))?
            }
            Some((inner, WrapKind::Provider)) => {
                let delegate = self.request_binding(&inner, required_by, true)?;
                self.strategy
                    .wrapper_binding(key, delegate, WrapKind::Provider)
                    .ok_or_else(|| missing(key, required_by))?
            }
            _ => self
                .strategy
                .plain_binding(key, key.type_name(), must_be_injectable)
                .ok_or_else(|| missing(key, required_by))?,
        };

        debug!("created binding for {key}, required by {required_by}");
        binding.core().note_required_by(required_by);
        self.insert_new(binding.clone());
        Ok(binding)
    }

    fn insert_new(&mut self, binding: BindingPtr) {
        if let Some(member_key) = binding.member_key() {
            self.bindings
                .entry(member_key.clone())
                .or_insert_with(|| binding.clone());
        }
        self.bindings.insert(binding.key().clone(), binding.clone());
        self.queue.push_back(binding);
    }

    pub(crate) fn enqueue(&mut self, binding: BindingPtr) {
        self.queue.push_back(binding);
    }

    /// Drains the work queue, failing fast on the first resolution error.
    /// The failed binding is re-enqueued unresolved, so a later validation
    /// pass still reports it.
    pub fn resolve_enqueued(&mut self) -> Result<(), GraphError> {
        while let Some(binding) = self.queue.pop_front() {
            if binding.state() != ResolutionState::Unresolved {
                continue;
            }

            binding.core().set_state(ResolutionState::Resolving);
            debug!("resolving {}", binding.key());
            if let Err(error) = binding.resolve(self) {
                binding.core().set_state(ResolutionState::Unresolved);
                self.queue.push_back(binding);
                return Err(error);
            }
            binding.core().set_state(ResolutionState::Resolved);
        }

        Ok(())
    }

    /// Drains the work queue, accumulating errors instead of stopping at the
    /// first, and returns every failure recorded so far. A missing
    /// dependency requested by a binding declared in a complete module is
    /// reported as [GraphError::IncompleteModule].
    pub fn resolve_all(&mut self) -> Vec<GraphError> {
        while let Some(binding) = self.queue.pop_front() {
            if binding.state() != ResolutionState::Unresolved {
                continue;
            }

            binding.core().set_state(ResolutionState::Resolving);
            debug!("resolving {}", binding.key());
            if let Err(error) = binding.resolve(self) {
                let classified = self.classify(error, &binding);
                self.failures.push(classified);
            }
            binding.core().set_state(ResolutionState::Resolved);
        }

        self.failures.clone()
    }

    fn classify(&self, error: GraphError, binding: &BindingPtr) -> GraphError {
        if let GraphError::MissingBinding { key, .. } = &error {
            if let Some(module) = binding.declaring_module() {
                let complete = self
                    .modules
                    .get(module)
                    .map(|meta| meta.complete)
                    .unwrap_or(false);
                if complete {
                    return GraphError::IncompleteModule {
                        module: module.to_string(),
                        key: key.clone(),
                    };
                }
            }
        }

        error
    }

    /// The accumulated binding table for this layer.
    #[inline]
    pub fn bindings(&self) -> &FxHashMap<Key, BindingPtr> {
        &self.bindings
    }
}

fn missing(key: &Key, required_by: &str) -> GraphError {
    GraphError::MissingBinding {
        key: key.clone(),
        required_by: required_by.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::TypeDescriptor;
    use crate::error::{GraphError, ProvisionError};
    use crate::factory::{
        BindingStrategyPtr, FallbackChain, MockBindingStrategy, RegistryStrategy,
    };
    use crate::instance::{InstanceAnyPtr, InstancePtr};
    use crate::key::Key;
    use crate::module::{ModuleBuilder, ProviderSpec};
    use crate::resolver::Resolver;
    use mockall::predicate::*;

    fn unit_value(_values: &[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError> {
        Ok(InstancePtr::new(()) as InstanceAnyPtr)
    }

    fn gadget_descriptor() -> TypeDescriptor {
        TypeDescriptor {
            type_name: "tests.Gadget",
            singleton: false,
            constructor_keys: vec![],
            property_keys: vec![],
            construct: Some(unit_value),
            inject: None,
        }
    }

    fn registry_resolver() -> Resolver {
        let mut registry = RegistryStrategy::default();
        registry.register_descriptor(gadget_descriptor());

        let registry: BindingStrategyPtr = InstancePtr::new(registry);
        let chain: BindingStrategyPtr = InstancePtr::new(FallbackChain::new(vec![registry]));
        Resolver::new(chain, None)
    }

    #[test]
    fn should_return_identical_bindings_for_repeated_requests() {
        let mut resolver = registry_resolver();
        let key = Key::for_type("tests.Gadget", None);

        let first = resolver.request_binding(&key, "test", true).unwrap();
        let second = resolver.request_binding(&key, "test", true).unwrap();

        assert!(InstancePtr::ptr_eq(&first, &second));
    }

    #[test]
    fn should_report_missing_bindings_at_the_call_site() {
        let chain: BindingStrategyPtr = InstancePtr::new(FallbackChain::new(vec![]));
        let mut resolver = Resolver::new(chain, None);
        let key = Key::for_type("tests.Unknown", None);

        assert_eq!(
            resolver.request_binding(&key, "test", true).unwrap_err(),
            GraphError::MissingBinding {
                key,
                required_by: "test".to_string(),
            }
        );
    }

    #[test]
    fn should_reject_duplicate_installs() {
        let mut resolver = registry_resolver();
        let key = Key::for_type("tests.Part", None);

        let modules = [
            ModuleBuilder::new("tests.PartModule")
                .provides(ProviderSpec::new(key.clone(), vec![], unit_value))
                .build(),
            ModuleBuilder::new("tests.OtherPartModule")
                .provides(ProviderSpec::new(key.clone(), vec![], unit_value))
                .build(),
        ];

        assert_eq!(
            resolver.install_bindings(&modules).unwrap_err(),
            GraphError::DuplicateBinding { key }
        );
    }

    #[test]
    fn should_append_set_contributions() {
        let mut resolver = registry_resolver();
        let key = Key::for_type("tests.Part", None);

        let modules = [
            ModuleBuilder::new("tests.PartModule")
                .provides(ProviderSpec::new(key.clone(), vec![], unit_value).in_set())
                .build(),
            ModuleBuilder::new("tests.OtherPartModule")
                .provides(ProviderSpec::new(key.clone(), vec![], unit_value).in_set())
                .build(),
        ];

        resolver.install_bindings(&modules).unwrap();
        assert!(resolver.bindings().contains_key(&key.wrap_set()));
    }

    #[test]
    fn should_reject_mixing_set_and_standalone_bindings() {
        let mut resolver = registry_resolver();
        let key = Key::for_type("tests.Part", None);

        let modules = [
            ModuleBuilder::new("tests.StandaloneModule")
                .provides(ProviderSpec::new(
                    key.clone().wrap_set(),
                    vec![],
                    unit_value,
                ))
                .build(),
            ModuleBuilder::new("tests.ContributingModule")
                .provides(ProviderSpec::new(key.clone(), vec![], unit_value).in_set())
                .build(),
        ];

        assert_eq!(
            resolver.install_bindings(&modules).unwrap_err(),
            GraphError::DuplicateBinding {
                key: key.wrap_set(),
            }
        );
    }

    #[test]
    fn should_consult_strategies_in_order() {
        let key = Key::for_type("tests.Gadget", None);

        let mut declining = MockBindingStrategy::new();
        declining
            .expect_plain_binding()
            .with(eq(key.clone()), eq("tests.Gadget"), eq(true))
            .times(1)
            .returning(|_, _, _| None);

        let mut answering = MockBindingStrategy::new();
        answering
            .expect_plain_binding()
            .with(eq(key.clone()), eq("tests.Gadget"), eq(true))
            .times(1)
            .returning(|key, _, _| {
                Some(crate::binding::DirectBinding::create(
                    key.clone(),
                    gadget_descriptor(),
                ))
            });

        let declining: BindingStrategyPtr = InstancePtr::new(declining);
        let answering: BindingStrategyPtr = InstancePtr::new(answering);
        let chain: BindingStrategyPtr =
            InstancePtr::new(FallbackChain::new(vec![declining, answering]));

        let mut resolver = Resolver::new(chain, None);
        assert!(resolver.request_binding(&key, "test", true).is_ok());
    }
}
