pub mod boundaries;
pub mod crop;
pub mod quiz;
