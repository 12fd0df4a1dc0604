pub mod enums;
pub mod patient;
pub mod variant;

pub use patient::*;
pub use variant::*;
