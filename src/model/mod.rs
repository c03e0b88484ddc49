pub mod common;
pub mod constraint;
pub mod flag;
pub mod operation;
pub mod segment;
pub mod wire;

pub use common::*;
pub use constraint::*;
pub use flag::*;
pub use operation::*;
pub use segment::*;
pub use wire::*;
