pub mod agent;
pub mod ingredient;
pub mod models;
pub mod nutrition;
pub mod openfoodfacts;
pub mod plan;
pub mod remote;
pub mod scheduler;
pub mod store;
pub mod surface;
