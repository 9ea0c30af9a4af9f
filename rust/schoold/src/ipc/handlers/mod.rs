pub mod class_mappings;
pub mod core;
pub mod reports;
pub mod setup;
pub mod students;
