use bindgraph::container::Container;
use bindgraph::instance::{Injectable, InstanceAnyPtr, InstancePtr};
use bindgraph::key::Key;
use bindgraph::module::{ModuleBuilder, ProviderSpec};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Connection {
    serial: usize,
}

impl Injectable for Connection {
    fn type_name() -> &'static str {
        "examples.Connection"
    }
}

static OPENED: AtomicUsize = AtomicUsize::new(0);

fn main() {
    let module = ModuleBuilder::new("examples.ConnectionModule")
        .entry_point(Key::of::<Connection>().wrap_lazy())
        .entry_point(Key::of::<Connection>().wrap_provider())
        .provides(ProviderSpec::new(Key::of::<Connection>(), vec![], |_| {
            let serial = OPENED.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(InstancePtr::new(Connection { serial }) as InstanceAnyPtr)
        }))
        .build();

    let container = Container::create([module]).expect("invalid module set");
    container.validate().expect("invalid dependency graph");

    // A lazy handle opens the connection on first use and then reuses it.
    let lazy = container.get_lazy::<Connection>().expect("no lazy entry point");
    let first = lazy.get_typed::<Connection>().expect("connection failed");
    let again = lazy.get_typed::<Connection>().expect("connection failed");
    println!(
        "lazy connection #{}, reused: {}",
        first.serial,
        InstancePtr::ptr_eq(&first, &again)
    );

    // A provider handle opens a fresh connection on every call.
    let provider = container
        .get_provider::<Connection>()
        .expect("no provider entry point");
    for _ in 0..2 {
        let connection = provider.get_typed::<Connection>().expect("connection failed");
        println!("fresh connection #{}", connection.serial);
    }
}
