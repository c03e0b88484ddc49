pub mod builder;
pub mod cast;
pub mod changes;
pub mod format;
pub mod return_variant;
pub mod save;

pub use builder::*;
pub use cast::*;
pub use changes::*;
pub use format::*;
pub use return_variant::*;
pub use save::*;
