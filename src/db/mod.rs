mod repository;
mod schema;
mod seed;

pub use repository::Repository;
