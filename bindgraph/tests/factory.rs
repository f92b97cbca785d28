use bindgraph::container::ContainerBuilder;
use bindgraph::descriptor::TypeDescriptor;
use bindgraph::factory::{self, DescriptorRegistration, ModuleRegistration};
use bindgraph::instance::{Injectable, InstanceAnyPtr, InstancePtr};
use bindgraph::key::Key;
use bindgraph::module::{ModuleBuilder, RuntimeModule};
use bindgraph::ProvisionError;

struct Beacon {
    frequency: u32,
}

impl Injectable for Beacon {
    fn type_name() -> &'static str {
        "statics.Beacon"
    }
}

fn make_beacon(_values: &[InstanceAnyPtr]) -> Result<InstanceAnyPtr, ProvisionError> {
    Ok(InstancePtr::new(Beacon { frequency: 433 }) as InstanceAnyPtr)
}

fn beacon_descriptor() -> TypeDescriptor {
    TypeDescriptor {
        type_name: "statics.Beacon",
        singleton: false,
        constructor_keys: vec![],
        property_keys: vec![],
        construct: Some(make_beacon),
        inject: None,
    }
}

fn beacon_module() -> RuntimeModule {
    ModuleBuilder::new("statics.BeaconModule")
        .entry_point(Key::of::<Beacon>())
        .build()
}

factory::submit! {
    DescriptorRegistration {
        descriptor: beacon_descriptor,
    }
}

factory::submit! {
    ModuleRegistration {
        module: beacon_module,
    }
}

#[test]
fn should_resolve_statically_registered_descriptors_and_modules() {
    let seed = ModuleBuilder::new("statics.App")
        .include("statics.BeaconModule")
        .build();

    let container = ContainerBuilder::new().with_module(seed).build().unwrap();
    container.validate().unwrap();

    let beacon = container.get::<Beacon>().unwrap();
    assert_eq!(beacon.frequency, 433);
}
