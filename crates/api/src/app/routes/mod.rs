pub mod migrate;
pub mod system;
