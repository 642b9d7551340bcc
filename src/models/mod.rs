pub mod enums;
pub mod filters;
pub mod medication;
pub mod record;
pub mod schedule;

pub use filters::*;
pub use medication::*;
pub use record::*;
pub use schedule::*;
