pub mod broadcaster;
pub mod coordinator;
pub mod registry;
pub mod sessions;
pub mod tracker;
