// Hyperlayer State Module
// Persisted variable storage shared by every state machine in a profile

pub mod store;

pub use store::{MemoryStore, SharedStore, VariableStore};
