//! Engine data structures: configuration trees, live properties, textures and
//! instances.
//!
//! - `config_node` is the ordered, named tree effect and material descriptions
//!   are written in
//! - `property_root` holds live simulation values with change listeners
//! - `texture` contains images plus the sampling state bound with them
//! - `instance` holds per-instance transformation data for batched drawing

pub mod config_node;
pub mod instance;
pub mod property_root;
pub mod texture;
