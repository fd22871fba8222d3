pub mod analyzer;
pub mod capture_delegate;
pub mod capture_provider;
pub mod packet_source;
