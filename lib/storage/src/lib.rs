pub mod index_store;

pub use index_store::{load, save, IndexStore};
