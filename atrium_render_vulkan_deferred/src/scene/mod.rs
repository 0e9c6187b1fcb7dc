pub mod geometry;
pub mod import;
pub mod material;
pub mod store;
