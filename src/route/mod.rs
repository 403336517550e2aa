// Re-export types from submodules
pub use self::diff::*;
pub use self::types::*;

mod diff;
mod types;
