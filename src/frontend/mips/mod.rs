pub mod types;
pub mod decoder;
pub mod fold;
pub mod translate;
