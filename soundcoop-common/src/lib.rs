pub mod station;
pub mod store;
