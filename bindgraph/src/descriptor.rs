//! Statically-declared type descriptors. A [TypeDescriptor] carries the
//! declaration metadata a binding factory needs to materialize a binding for
//! a plain type: constructor parameter keys, injectable property keys, and
//! type-erased construction/injection functions produced ahead of time. This
//! replaces any form of runtime reflection.

use crate::error::ProvisionError;
use crate::instance::{downcast_instance, Injectable, InstanceAnyPtr, InstancePtr};
use crate::key::Key;
use derivative::Derivative;

/// Constructor for type-erased instances; receives resolved dependency values
/// in the order of [TypeDescriptor::constructor_keys].
pub type ConstructorFn = fn(&[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError>;

/// Property injector for type-erased instances; receives the target and
/// resolved property values in the order of [TypeDescriptor::property_keys].
pub type PropertyInjectorFn =
    fn(&InstanceAnyPtr, &[InstanceAnyPtr]) -> Result<(), ProvisionError>;

/// Declaration metadata for a single type, registered ahead of time.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct TypeDescriptor {
    /// Stable, globally unique name of the described type.
    pub type_name: &'static str,

    /// Whether instances are shared after first construction.
    pub singleton: bool,

    /// Keys of constructor parameters, in declaration order. These are hard
    /// dependencies and must form an acyclic graph.
    pub constructor_keys: Vec<Key>,

    /// Keys of injectable properties. These are soft dependencies, wired
    /// after construction, and may close cycles.
    pub property_keys: Vec<Key>,

    /// Constructor, or `None` for types that only participate in static
    /// validation and cannot produce instances at runtime.
    #[derivative(Debug = "ignore")]
    pub construct: Option<ConstructorFn>,

    /// Property injector, or `None` when the type declares no injectable
    /// properties.
    #[derivative(Debug = "ignore")]
    pub inject: Option<PropertyInjectorFn>,
}

/// Downcasts the resolved dependency value at `index`. Intended for use
/// inside [ConstructorFn]/[PropertyInjectorFn] implementations.
pub fn instance_at<T: Injectable>(
    values: &[InstanceAnyPtr],
    index: usize,
) -> Result<InstancePtr<T>, ProvisionError> {
    values
        .get(index)
        .cloned()
        .ok_or_else(|| ProvisionError::UnresolvedBinding { key: Key::of::<T>() })
        .and_then(|value| {
            downcast_instance::<T>(value)
                .map_err(|_| ProvisionError::IncompatibleInstance { key: Key::of::<T>() })
        })
}
