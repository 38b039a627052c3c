pub mod connection;
pub mod file_service;
