pub mod backend;
pub mod metrics;
pub mod storage;
