pub mod config;
pub mod error;
pub mod gesture;
pub mod pipeline;
pub mod pose;
pub mod replay;
