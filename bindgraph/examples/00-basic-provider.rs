use bindgraph::container::Container;
use bindgraph::instance::{Injectable, InstanceAnyPtr, InstancePtr};
use bindgraph::key::Key;
use bindgraph::module::{ModuleBuilder, ProviderSpec};

struct Greeting(String);

impl Injectable for Greeting {
    fn type_name() -> &'static str {
        "examples.Greeting"
    }
}

fn main() {
    let module = ModuleBuilder::new("examples.GreetingModule")
        .entry_point(Key::of::<Greeting>())
        .provides(ProviderSpec::new(Key::of::<Greeting>(), vec![], |_| {
            Ok(InstancePtr::new(Greeting("Hello, World!".to_string())) as InstanceAnyPtr)
        }))
        .build();

    let container = Container::create([module]).expect("invalid module set");
    container.validate().expect("invalid dependency graph");

    let greeting = container.get::<Greeting>().expect("no greeting bound");
    println!("{}", greeting.0);
}
