mod coordinator;
mod train;
mod validate;

pub use coordinator::*;
pub use train::*;
pub use validate::*;
