//! Instance pointers and deferred handles. Produced values are type-erased
//! behind [InstanceAnyPtr] and downcast at the container surface; to make the
//! system work, instances must be wrapped in an [InstancePtr].

use crate::binding::BindingPtr;
use crate::error::ProvisionError;
use std::any::Any;
#[cfg(not(feature = "threadsafe"))]
use std::rc::Rc;
#[cfg(feature = "threadsafe")]
use std::sync::Arc;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "threadsafe")]
pub type InstancePtr<T> = Arc<T>;
#[cfg(not(feature = "threadsafe"))]
pub type InstancePtr<T> = Rc<T>;

#[cfg(feature = "threadsafe")]
pub type InstanceAnyPtr = InstancePtr<dyn Any + Send + Sync + 'static>;
#[cfg(not(feature = "threadsafe"))]
pub type InstanceAnyPtr = InstancePtr<dyn Any + 'static>;

/// Identity of an injectable type. Implemented once per declared type, ahead
/// of time - the core never inspects a live type system, only this name and
/// the descriptors registered for it.
#[cfg(feature = "threadsafe")]
pub trait Injectable: Send + Sync + 'static {
    /// Stable, globally unique name of this type, as used in binding keys.
    fn type_name() -> &'static str;
}

/// Identity of an injectable type. Implemented once per declared type, ahead
/// of time - the core never inspects a live type system, only this name and
/// the descriptors registered for it.
#[cfg(not(feature = "threadsafe"))]
pub trait Injectable: 'static {
    /// Stable, globally unique name of this type, as used in binding keys.
    fn type_name() -> &'static str;
}

/// Recovers a concrete instance from a type-erased one, returning the
/// original pointer on mismatch.
#[cfg(feature = "threadsafe")]
pub fn downcast_instance<T: Any + Send + Sync>(
    instance: InstanceAnyPtr,
) -> Result<InstancePtr<T>, InstanceAnyPtr> {
    instance.downcast()
}

/// Recovers a concrete instance from a type-erased one, returning the
/// original pointer on mismatch.
#[cfg(not(feature = "threadsafe"))]
pub fn downcast_instance<T: Any>(
    instance: InstanceAnyPtr,
) -> Result<InstancePtr<T>, InstanceAnyPtr> {
    instance.downcast()
}

// A poisoned lock only marks a panic on another thread; the guarded state
// itself remains consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deferred handle to a value, produced by lazy-wrapper bindings. The first
/// [get](Lazy::get) triggers the underlying binding exactly once and caches
/// the result; further calls return the cached value, no matter how many
/// times the handle is dereferenced or from how many threads.
pub struct Lazy {
    delegate: BindingPtr,
    value: Mutex<Option<InstanceAnyPtr>>,
}

impl Lazy {
    pub(crate) fn new(delegate: BindingPtr) -> Self {
        Self {
            delegate,
            value: Mutex::new(None),
        }
    }

    /// Forces the value, producing it on first use.
    pub fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        let mut value = lock(&self.value);
        if let Some(existing) = &*value {
            return Ok(existing.clone());
        }

        let produced = self.delegate.get()?;
        *value = Some(produced.clone());
        Ok(produced)
    }

    /// Typesafe version of [Lazy::get].
    #[cfg(feature = "threadsafe")]
    pub fn get_typed<T: Any + Send + Sync>(&self) -> Result<InstancePtr<T>, ProvisionError> {
        downcast_instance(self.get()?).map_err(|_| ProvisionError::IncompatibleInstance {
            key: self.delegate.key().clone(),
        })
    }

    /// Typesafe version of [Lazy::get].
    #[cfg(not(feature = "threadsafe"))]
    pub fn get_typed<T: Any>(&self) -> Result<InstancePtr<T>, ProvisionError> {
        downcast_instance(self.get()?).map_err(|_| ProvisionError::IncompatibleInstance {
            key: self.delegate.key().clone(),
        })
    }
}

/// Handle re-invoking its underlying binding on every call, produced by
/// provider-wrapper bindings. No caching happens at this layer - any reuse is
/// the underlying binding's own singleton behavior.
pub struct Provider {
    delegate: BindingPtr,
}

impl Provider {
    pub(crate) fn new(delegate: BindingPtr) -> Self {
        Self { delegate }
    }

    /// Produces a value from the underlying binding.
    pub fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
        self.delegate.get()
    }

    /// Typesafe version of [Provider::get].
    #[cfg(feature = "threadsafe")]
    pub fn get_typed<T: Any + Send + Sync>(&self) -> Result<InstancePtr<T>, ProvisionError> {
        downcast_instance(self.get()?).map_err(|_| ProvisionError::IncompatibleInstance {
            key: self.delegate.key().clone(),
        })
    }

    /// Typesafe version of [Provider::get].
    #[cfg(not(feature = "threadsafe"))]
    pub fn get_typed<T: Any>(&self) -> Result<InstancePtr<T>, ProvisionError> {
        downcast_instance(self.get()?).map_err(|_| ProvisionError::IncompatibleInstance {
            key: self.delegate.key().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::binding::{Binding, BindingCore, BindingPtr};
    use crate::error::{GraphError, ProvisionError};
    use crate::instance::{InstanceAnyPtr, InstancePtr, Lazy, Provider};
    use crate::key::Key;
    use crate::resolver::Resolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct CountingBinding {
        core: BindingCore,
        invocations: AtomicUsize,
    }

    impl CountingBinding {
        fn create() -> BindingPtr {
            InstancePtr::new(Self {
                core: BindingCore::new(Key::for_type("tests.Counted", None), false, true),
                invocations: AtomicUsize::new(0),
            })
        }
    }

    impl Binding for CountingBinding {
        fn core(&self) -> &BindingCore {
            &self.core
        }

        fn resolve(&self, _resolver: &mut Resolver) -> Result<(), GraphError> {
            Ok(())
        }

        fn dependencies(&self, _hard: &mut Vec<BindingPtr>, _soft: &mut Vec<BindingPtr>) {}

        fn get(&self) -> Result<InstanceAnyPtr, ProvisionError> {
            let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(InstancePtr::new(invocation) as InstanceAnyPtr)
        }

        fn inject_properties(&self, _target: &InstanceAnyPtr) -> Result<(), ProvisionError> {
            Err(ProvisionError::UnsupportedOperation {
                key: self.core.key().clone(),
            })
        }
    }

    #[test]
    fn should_force_lazy_values_exactly_once() {
        let lazy = Lazy::new(CountingBinding::create());

        let first = lazy.get_typed::<usize>().unwrap();
        let second = lazy.get_typed::<usize>().unwrap();

        assert_eq!(*first, 1);
        assert_eq!(*second, 1);
    }

    #[test]
    fn should_not_cache_provided_values() {
        let provider = Provider::new(CountingBinding::create());

        assert_eq!(*provider.get_typed::<usize>().unwrap(), 1);
        assert_eq!(*provider.get_typed::<usize>().unwrap(), 2);
    }
}
