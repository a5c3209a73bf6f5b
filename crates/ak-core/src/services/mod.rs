pub mod aws;
pub mod cdk;
pub mod config_loader;
pub mod deployer;
pub mod graph_builder;
pub mod include;
pub mod network_layout;
pub mod outputs;
pub mod secrets;
pub mod settings;
pub mod stack_builder;
pub mod template;
pub mod validation;
