//! 跟踪对象 (可变记录) 与只读快照

use super::geometry;
use super::tracker::VisualTracker;
use super::types::BBox;
use crate::tables::{palette_color, signature_for};
use image::GrayImage;
use std::time::Instant;

/// 跟踪对象
///
/// 由对象管理器独占;其他线程只能看到 [`ObjectSnapshot`]。
pub struct TrackedObject {
    /// 唯一ID (单调递增)
    pub id: u32,
    pub label: String,
    /// 附加上下文 ("Label [context]" 中的 context)
    pub context: Option<String>,
    pub bbox: BBox,
    pub confidence: f32,
    /// 中心点位移 (像素/tick)
    pub velocity: Option<(f32, f32)>,
    pub predicted_bbox: Option<BBox>,
    pub threat_score: f32,
    pub is_lost: bool,
    pub lost_time: Option<Instant>,
    /// 灰度外观模板 (用于找回)
    pub template: Option<GrayImage>,
    pub last_template_update: Option<Instant>,
    /// 最后一次被检测确认的时间
    pub last_verified: Instant,
    pub last_update: Instant,
    pub color: (u8, u8, u8),
    /// 音频签名名称
    pub signature: &'static str,
    pub(crate) tracker: Option<Box<dyn VisualTracker>>,
}

impl TrackedObject {
    pub fn new(id: u32, label: &str, bbox: BBox, confidence: f32, context: Option<String>, now: Instant) -> Self {
        let (signature, _) = signature_for(label);
        Self {
            id,
            label: label.to_string(),
            context,
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            velocity: None,
            predicted_bbox: None,
            threat_score: 0.0,
            is_lost: false,
            lost_time: None,
            template: None,
            last_template_update: None,
            last_verified: now,
            last_update: now,
            color: palette_color(id),
            signature,
            tracker: None,
        }
    }

    pub fn has_tracker(&self) -> bool {
        self.tracker.is_some()
    }

    /// 接受新位置: 更新速度和时间戳
    pub fn move_to(&mut self, bbox: BBox, now: Instant) {
        self.velocity = Some(geometry::velocity(&self.bbox, &bbox));
        self.bbox = bbox;
        self.last_update = now;
    }

    /// 标记丢失 (丢失时间只记录一次)
    pub fn mark_lost(&mut self, now: Instant) {
        if !self.is_lost {
            self.is_lost = true;
            self.lost_time = Some(now);
        }
    }

    pub fn clear_lost(&mut self) {
        self.is_lost = false;
        self.lost_time = None;
    }

    /// 丢失持续时间
    pub fn lost_for(&self, now: Instant) -> Option<std::time::Duration> {
        if !self.is_lost {
            return None;
        }
        self.lost_time.map(|t| now.saturating_duration_since(t))
    }

    pub fn display_label(&self) -> String {
        match &self.context {
            Some(ctx) => format!("{} [{}]", self.label, ctx),
            None => self.label.clone(),
        }
    }

    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            label: self.label.clone(),
            context: self.context.clone(),
            bbox: self.bbox,
            confidence: self.confidence,
            velocity: self.velocity,
            predicted_bbox: self.predicted_bbox,
            threat_score: self.threat_score,
            is_lost: self.is_lost,
            lost_time: self.lost_time,
            color: self.color,
            signature: self.signature,
        }
    }
}

impl std::fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedObject")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("bbox", &self.bbox)
            .field("threat_score", &self.threat_score)
            .field("is_lost", &self.is_lost)
            .field("has_tracker", &self.tracker.is_some())
            .finish()
    }
}

/// 只读快照 (跟踪线程 → 音频/界面线程)
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSnapshot {
    pub id: u32,
    pub label: String,
    pub context: Option<String>,
    pub bbox: BBox,
    pub confidence: f32,
    pub velocity: Option<(f32, f32)>,
    pub predicted_bbox: Option<BBox>,
    pub threat_score: f32,
    pub is_lost: bool,
    pub lost_time: Option<Instant>,
    pub color: (u8, u8, u8),
    pub signature: &'static str,
}
