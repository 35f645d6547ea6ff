pub mod infra;
pub mod pipeline;
pub mod report;
pub mod sentiment;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod transports;
