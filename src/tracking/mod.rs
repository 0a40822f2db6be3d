/// 多目标跟踪 (Multi-object tracking)
///
/// - types:    边界框 / 帧 / 原始检测
/// - geometry: IOU / 速度 / 运动预测
/// - tracker:  单目标视觉跟踪器 (卡尔曼 + 相关匹配)
/// - recovery: 模板匹配本地找回
/// - object:   跟踪对象记录 + 只读快照
/// - threat:   威胁评分 / 接近区域
/// - manager:  对象管理器 (检测合并 / 生命周期)
pub mod geometry;
pub mod manager;
pub mod object;
pub mod recovery;
pub mod threat;
pub mod tracker;
pub mod types;

pub use geometry::iou;
pub use manager::ObjectManager;
pub use object::{ObjectSnapshot, TrackedObject};
pub use recovery::{LocalRecovery, MatchResult};
pub use threat::{ProximityZone, ThreatFormula};
pub use tracker::{default_tracker_factory, CorrelationTracker, TrackerFactory, VisualTracker};
pub use types::{BBox, Frame, FrameDims};
