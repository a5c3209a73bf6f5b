pub mod graph;
pub mod output;
pub mod stack;

pub use graph::{
    Attribute, LogicalId, NodeMode, PropertyValue, RefToken, ResourceGraph, ResourceKind,
    ResourceNode,
};
pub use output::{OutputEntry, OutputValue};
pub use stack::{
    AgentSpec, GatewaySpec, IdentitySpec, NetworkSpec, ObservabilitySpec, Protocol, SecretsSpec,
    StackDocument, StackSpec, TeardownPolicy,
};
