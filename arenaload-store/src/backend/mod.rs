pub mod common;
pub mod in_memory;
pub mod redis_store;
