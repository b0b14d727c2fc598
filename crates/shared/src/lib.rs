pub mod domain;
pub mod error;
pub mod investigation;
pub mod protocol;
