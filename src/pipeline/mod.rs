/// 运行流水线 (Runtime pipeline)
///
/// 三线程架构, 通过共享状态通信:
/// - Capture:  读取帧 → 发布到共享状态 (主线程)
/// - Tracking: 跟踪 + 检测合并 + 命令处理 (独立线程)
/// - Audio:    读取快照 → 空间音频 (见 audio 模块)
pub mod capture;
pub mod tracking_loop;

pub use capture::{CaptureLoop, FrameSource, FrameTransform, ImageSequenceSource, SyntheticSource};
pub use tracking_loop::{TickReport, TrackingLoop};
