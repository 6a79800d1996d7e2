pub mod snapshot;
pub mod status;

pub use snapshot::*;
pub use status::*;
