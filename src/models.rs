pub mod error;
pub mod file_asset;
pub mod frame_range;
pub mod job;
pub mod settings;
