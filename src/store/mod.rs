pub mod db;
pub mod lock;
pub mod repo;
