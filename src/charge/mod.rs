pub mod request_builder;
pub mod strategy;
