mod drain;

pub use drain::{DrainEngine, DrainState};
