//! 威胁评分 / 接近区域

use super::types::{BBox, FrameDims};
use crate::tables::semantic_priority;
use serde::{Deserialize, Serialize};

/// 威胁评分公式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatFormula {
    /// 0.7·尺寸 + 0.3·居中度
    #[default]
    Tick,
    /// 0.4·尺寸 + 0.4·语义 + 0.1·居中度 + 0.1·轨迹
    Semantic,
}

/// 尺寸因子: 占画面一半即为满分
pub fn size_factor(bbox: &BBox, dims: FrameDims) -> f32 {
    let half_frame = dims.area() * 0.5;
    if half_frame <= 0.0 {
        return 0.0;
    }
    (bbox.area() / half_frame).min(1.0)
}

/// 水平居中度: 中心线为 1,边缘为 0
pub fn centrality(bbox: &BBox, dims: FrameDims) -> f32 {
    let half_w = dims.width as f32 / 2.0;
    if half_w <= 0.0 {
        return 0.0;
    }
    let (cx, _) = bbox.center();
    1.0 - ((cx - half_w).abs() / half_w).min(1.0)
}

/// 轨迹因子: 水平方向朝画面中心移动为 1.0,否则 0.5
pub fn trajectory_factor(bbox: &BBox, velocity: Option<(f32, f32)>, dims: FrameDims) -> f32 {
    let Some((vx, _)) = velocity else {
        return 0.5;
    };
    let (cx, _) = bbox.center();
    let to_center = dims.width as f32 / 2.0 - cx;
    if vx * to_center > 0.0 {
        1.0
    } else {
        0.5
    }
}

pub fn tick_threat(bbox: &BBox, dims: FrameDims) -> f32 {
    0.7 * size_factor(bbox, dims) + 0.3 * centrality(bbox, dims)
}

pub fn semantic_threat(label: &str, bbox: &BBox, velocity: Option<(f32, f32)>, dims: FrameDims) -> f32 {
    0.4 * size_factor(bbox, dims)
        + 0.4 * semantic_priority(label)
        + 0.1 * centrality(bbox, dims)
        + 0.1 * trajectory_factor(bbox, velocity, dims)
}

impl ThreatFormula {
    pub fn score(&self, label: &str, bbox: &BBox, velocity: Option<(f32, f32)>, dims: FrameDims) -> f32 {
        match self {
            ThreatFormula::Tick => tick_threat(bbox, dims),
            ThreatFormula::Semantic => semantic_threat(label, bbox, velocity, dims),
        }
        .clamp(0.0, 1.0)
    }
}

/// 接近区域 (按面积占比)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProximityZone {
    Safe,
    Caution,
    Warning,
}

pub fn proximity_zone(bbox: &BBox, dims: FrameDims, caution: f32, warning: f32) -> ProximityZone {
    let ratio = if dims.area() > 0.0 {
        bbox.area() / dims.area()
    } else {
        0.0
    };
    if ratio >= warning {
        ProximityZone::Warning
    } else if ratio >= caution {
        ProximityZone::Caution
    } else {
        ProximityZone::Safe
    }
}
