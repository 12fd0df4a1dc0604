pub mod import;
pub mod normalize;
