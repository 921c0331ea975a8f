//! Built-in identity augmentors.

pub mod roles_mapping;

pub use roles_mapping::RolesMappingAugmentor;
