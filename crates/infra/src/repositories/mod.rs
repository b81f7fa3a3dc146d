mod memory;
mod surreal;

pub use memory::InMemoryForumStore;
pub use surreal::SurrealForumStore;
