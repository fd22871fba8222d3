pub mod capture_loop;
pub mod capture_service;
pub mod consumer;
pub mod registry;
