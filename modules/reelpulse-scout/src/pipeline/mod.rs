pub mod boundary;
pub mod collector;
pub mod engine;
pub mod session;
pub mod stats;
