mod configuration;
mod device;
mod device_driver;
mod device_model;
mod errors;
mod node;
mod resource_repository;
mod secret;

pub mod equality;
pub mod merge;
pub mod resource;
pub mod shadow;
pub mod version;

pub use configuration::Configuration;
pub use device::Device;
pub use device_driver::DeviceDriver;
pub use device_model::{DeviceModel, DeviceModelProperty};
pub use equality::SpecEq;
pub use errors::DomainError;
pub use node::Node;
pub use resource::{ObjectMeta, Resource, UpdatePlan};
pub use resource_repository::{InMemoryResourceRepository, ResourceRepository};
pub use secret::Secret;
pub use shadow::{Desire, Meta, Report, Shadow, StoredShadow};
pub use version::gen_resource_version;
