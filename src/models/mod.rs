pub mod object;
pub mod storage_config;

pub use object::*;
pub use storage_config::*;
