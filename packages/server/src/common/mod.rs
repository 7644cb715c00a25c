// Common types and utilities shared across the application

pub mod token;

pub use token::generate_api_key;
