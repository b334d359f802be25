pub mod audit;
pub mod certification;
pub mod error;
pub mod template;
