pub mod group;
pub mod registry;
pub mod service;
pub mod signal;
