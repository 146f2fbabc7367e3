pub mod aggregate;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod sync;
pub mod trip;
