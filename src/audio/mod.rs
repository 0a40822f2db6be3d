/// 空间音频引擎 (Spatial audio engine)
///
/// - signature: 每类对象的循环音
/// - spatial:   对象位置/大小 → 声源参数, 威胁压低
/// - mixer:     多声源混音 (双耳 / 等功率声像)
/// - engine:    更新线程 + 输出设备 (失败时静音)
#[cfg(feature = "device")]
mod device;
pub mod engine;
pub mod mixer;
pub mod signature;
pub mod spatial;

pub use engine::{AudioEngine, AudioMode};
pub use mixer::{MixCommand, Mixer, SourceParams};
pub use signature::{SignatureBank, SignatureSpec, Waveform};
pub use spatial::{build_scene, spatial_cue, SpatialCue};
