pub mod distance;
pub mod loader;
pub mod sink;
