// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod hwaccel;

// Re-export adapters
pub use exec_ffmpeg::FfmpegRunner;
pub use hwaccel::{detect_hardware_accels, FfmpegEncoderProbe};
