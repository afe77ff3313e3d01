pub mod package;
pub mod repository;
