use crate::key::Key;
use itertools::Itertools;
use thiserror::Error;

/// Structural errors found while building or validating the binding graph.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum GraphError {
    #[error("no binding found for {key}, required by {required_by}")]
    MissingBinding { key: Key, required_by: String },
    #[error("duplicate binding registered for {key}")]
    DuplicateBinding { key: Key },
    #[error("hard dependency cycle: {}", .path.iter().join(" -> "))]
    CircularDependency { path: Vec<Key> },
    #[error("binding for {key} declared by module {module} is never used by an entry point")]
    UnusedBinding { key: Key, module: String },
    #[error("module {module} is marked complete, but cannot satisfy {key}")]
    IncompleteModule { module: String, key: Key },
}

/// Errors related to producing instances and injecting properties from already
/// resolved bindings.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum ProvisionError {
    #[error("binding for {key} cannot produce instances or inject properties")]
    UnsupportedOperation { key: Key },
    #[error("tried to downcast instance of {key} to an incompatible type")]
    IncompatibleInstance { key: Key },
    #[error("binding for {key} was asked for an instance before being resolved")]
    UnresolvedBinding { key: Key },
}

/// Aggregate failure of a whole-graph validation pass. Every violation found
/// during a single pass is listed, so all problems can be fixed from one
/// report.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
#[error("dependency graph validation failed:\n{}", .violations.iter().map(ToString::to_string).join("\n"))]
pub struct ValidationError {
    pub violations: Vec<GraphError>,
}

/// Errors related to container-level operations.
#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum ContainerError {
    #[error("no entry point registered for {key} in this container or its parents")]
    NoSuchEntryPoint { key: Key },
    #[error("no module found for included identity: {identity}")]
    MissingModule { identity: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}
