//! Static validation of a fully resolved binding table: proves the hard-edge
//! subgraph is acyclic and that every declared binding is actually required.
//! Soft edges (properties, deferred wrappers) are excluded from cycle
//! detection, since they are wired after construction and may legitimately
//! close a cycle.

use crate::binding::BindingPtr;
use crate::error::GraphError;
use crate::key::Key;
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use std::collections::VecDeque;
#[cfg(not(feature = "threadsafe"))]
use std::rc::Rc;
#[cfg(feature = "threadsafe")]
use std::sync::Arc;

#[cfg(feature = "threadsafe")]
fn binding_id(binding: &BindingPtr) -> usize {
    Arc::as_ptr(binding) as *const () as usize
}

#[cfg(not(feature = "threadsafe"))]
fn binding_id(binding: &BindingPtr) -> usize {
    Rc::as_ptr(binding) as *const () as usize
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

/// Post-resolution validator. All violations found during one [verify]
/// invocation are accumulated and reported together, never one at a time.
///
/// [verify]: GraphVerifier::verify
pub struct GraphVerifier<'g> {
    bindings: &'g FxHashMap<Key, BindingPtr>,
    entry_points: &'g [BindingPtr],
}

impl<'g> GraphVerifier<'g> {
    pub fn new(bindings: &'g FxHashMap<Key, BindingPtr>, entry_points: &'g [BindingPtr]) -> Self {
        Self {
            bindings,
            entry_points,
        }
    }

    pub fn verify(&self) -> Vec<GraphError> {
        let mut violations = self.detect_cycles();
        violations.extend(self.detect_unused());
        violations
    }

    fn detect_cycles(&self) -> Vec<GraphError> {
        let mut colors = FxHashMap::default();
        let mut violations = Vec::new();

        for binding in self
            .bindings
            .values()
            .sorted_by_cached_key(|binding| binding.key().to_string())
        {
            let mut path = Vec::new();
            Self::visit(binding, &mut colors, &mut path, &mut violations);
        }

        violations
    }

    fn visit(
        binding: &BindingPtr,
        colors: &mut FxHashMap<usize, Color>,
        path: &mut Vec<(usize, Key)>,
        violations: &mut Vec<GraphError>,
    ) {
        let id = binding_id(binding);
        match colors.get(&id) {
            Some(Color::Black) => return,
            Some(Color::Gray) => {
                let start = path
                    .iter()
                    .position(|(visited, _)| *visited == id)
                    .unwrap_or(0);
                let mut cycle: Vec<Key> =
                    path[start..].iter().map(|(_, key)| key.clone()).collect();
                cycle.push(binding.key().clone());
                violations.push(GraphError::CircularDependency { path: cycle });
                return;
            }
            None => {}
        }

        colors.insert(id, Color::Gray);
        path.push((id, binding.key().clone()));

        let mut hard = Vec::new();
        let mut soft = Vec::new();
        binding.dependencies(&mut hard, &mut soft);
        for dependency in &hard {
            Self::visit(dependency, colors, path, violations);
        }

        path.pop();
        colors.insert(id, Color::Black);
    }

    fn detect_unused(&self) -> Vec<GraphError> {
        let mut reached = FxHashSet::default();
        let mut queue: VecDeque<BindingPtr> = VecDeque::new();
        for entry_point in self.entry_points {
            if reached.insert(binding_id(entry_point)) {
                queue.push_back(entry_point.clone());
            }
        }

        // Reachability follows both edge kinds; a binding consumed only
        // through a property or a deferred wrapper is still used.
        while let Some(binding) = queue.pop_front() {
            let mut hard = Vec::new();
            let mut soft = Vec::new();
            binding.dependencies(&mut hard, &mut soft);
            for dependency in hard.into_iter().chain(soft) {
                if reached.insert(binding_id(&dependency)) {
                    queue.push_back(dependency);
                }
            }
        }

        let mut flagged = FxHashSet::default();
        let mut violations = Vec::new();
        for (_, binding) in self
            .bindings
            .iter()
            .sorted_by_cached_key(|(key, _)| key.to_string())
        {
            let id = binding_id(binding);
            if reached.contains(&id) || binding.is_library() || !flagged.insert(id) {
                continue;
            }

            violations.push(GraphError::UnusedBinding {
                key: binding.key().clone(),
                module: binding
                    .declaring_module()
                    .unwrap_or_else(|| binding.required_by())
                    .to_string(),
            });
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{GraphError, ProvisionError};
    use crate::factory::{BindingStrategyPtr, FallbackChain, RegistryStrategy};
    use crate::graph::GraphVerifier;
    use crate::instance::{InstanceAnyPtr, InstancePtr};
    use crate::key::Key;
    use crate::module::{ModuleBuilder, ProviderSpec, RuntimeModule};
    use crate::resolver::Resolver;

    fn unit_value(_values: &[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError> {
        Ok(InstancePtr::new(()) as InstanceAnyPtr)
    }

    fn resolver_for(modules: &[RuntimeModule]) -> Resolver {
        let registry: BindingStrategyPtr = InstancePtr::new(RegistryStrategy::default());
        let chain: BindingStrategyPtr = InstancePtr::new(FallbackChain::new(vec![registry]));
        let mut resolver = Resolver::new(chain, None);
        resolver.install_bindings(modules).unwrap();
        resolver
    }

    #[test]
    fn should_detect_hard_cycles() {
        let first = Key::for_type("tests.First", None);
        let second = Key::for_type("tests.Second", None);

        let module = ModuleBuilder::new("tests.CycleModule")
            .entry_point(first.clone())
            .provides(ProviderSpec::new(
                first.clone(),
                vec![second.clone()],
                unit_value,
            ))
            .provides(ProviderSpec::new(
                second.clone(),
                vec![first.clone()],
                unit_value,
            ))
            .build();

        let mut resolver = resolver_for(&[module]);
        let entry = resolver.request_binding(&first, "tests", true).unwrap();
        assert!(resolver.resolve_all().is_empty());

        let entry_points = [entry];
        let violations = GraphVerifier::new(resolver.bindings(), &entry_points).verify();
        assert!(violations
            .iter()
            .any(|violation| matches!(violation, GraphError::CircularDependency { .. })));
    }

    #[test]
    fn should_allow_cycles_through_deferred_wrappers() {
        let first = Key::for_type("tests.First", None);
        let second = Key::for_type("tests.Second", None);

        let module = ModuleBuilder::new("tests.LazyCycleModule")
            .entry_point(first.clone())
            .provides(ProviderSpec::new(
                first.clone(),
                vec![second.clone().wrap_lazy()],
                unit_value,
            ))
            .provides(ProviderSpec::new(
                second.clone(),
                vec![first.clone()],
                unit_value,
            ))
            .build();

        let mut resolver = resolver_for(&[module]);
        let entry = resolver.request_binding(&first, "tests", true).unwrap();
        assert!(resolver.resolve_all().is_empty());

        let entry_points = [entry];
        let violations = GraphVerifier::new(resolver.bindings(), &entry_points).verify();
        assert!(violations.is_empty());
    }

    #[test]
    fn should_report_unused_bindings() {
        let used = Key::for_type("tests.Used", None);
        let orphan = Key::for_type("tests.Orphan", None);

        let module = ModuleBuilder::new("tests.OrphanModule")
            .entry_point(used.clone())
            .provides(ProviderSpec::new(used.clone(), vec![], unit_value))
            .provides(ProviderSpec::new(orphan.clone(), vec![], unit_value))
            .build();

        let mut resolver = resolver_for(&[module]);
        let entry = resolver.request_binding(&used, "tests", true).unwrap();
        assert!(resolver.resolve_all().is_empty());

        let entry_points = [entry];
        let violations = GraphVerifier::new(resolver.bindings(), &entry_points).verify();
        assert_eq!(
            violations,
            vec![GraphError::UnusedBinding {
                key: orphan,
                module: "tests.OrphanModule".to_string(),
            }]
        );
    }

    #[test]
    fn should_tolerate_unused_bindings_in_library_modules() {
        let used = Key::for_type("tests.Used", None);
        let orphan = Key::for_type("tests.Orphan", None);

        let module = ModuleBuilder::new("tests.OrphanModule")
            .library(true)
            .entry_point(used.clone())
            .provides(ProviderSpec::new(used.clone(), vec![], unit_value))
            .provides(ProviderSpec::new(orphan, vec![], unit_value))
            .build();

        let mut resolver = resolver_for(&[module]);
        let entry = resolver.request_binding(&used, "tests", true).unwrap();
        assert!(resolver.resolve_all().is_empty());

        let entry_points = [entry];
        let violations = GraphVerifier::new(resolver.bindings(), &entry_points).verify();
        assert!(violations.is_empty());
    }
}
