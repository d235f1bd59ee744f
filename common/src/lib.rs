pub mod buffer2;
pub mod cpu_features;
pub mod log_setup;
pub mod parallel;

pub use buffer2::Buffer2;
