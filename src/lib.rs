#![allow(clippy::type_complexity)]
//! Nova 辅助导航核心 (Nova Assistive Navigation Core)
//!
//! 三线程架构:
//! - 采集/界面线程: 读取摄像头帧 → 发布到共享状态 → 读取跟踪快照显示
//! - 跟踪线程:     本地跟踪 + 异步检测合并 + 威胁评估 (~20Hz)
//! - 音频线程:     读取快照 → 空间音频混音 (≥20Hz)
pub mod audio; // 空间音频引擎
pub mod config; // 配置参数
pub mod learning; // 学习记忆存储
pub mod mode; // 模式控制器
pub mod pipeline; // 采集循环 + 跟踪循环
pub mod state; // 共享状态总线
pub mod tables; // 静态查找表
pub mod tracking; // 多目标跟踪
pub mod vision; // 外部视觉服务
pub mod voice; // 语音交互

pub use crate::audio::{AudioEngine, AudioMode, Mixer, SignatureBank};
pub use crate::config::AppConfig;
pub use crate::mode::{FocusStrategy, ModeController, NavigationMode, PrimaryFocus};
pub use crate::pipeline::{CaptureLoop, FrameSource, TrackingLoop};
pub use crate::state::{Command, SharedState, TrackingStatus};
pub use crate::tracking::{BBox, Frame, FrameDims, ObjectManager, ObjectSnapshot, TrackedObject};
pub use crate::vision::{AsyncDetector, RawDetection, VisionService};

