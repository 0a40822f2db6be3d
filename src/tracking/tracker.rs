//! 单目标视觉跟踪器
//! Per-object visual trackers

use super::recovery::exhaustive_match;
use super::types::{BBox, Frame};
use anyhow::{bail, Result};
use image::imageops;
use image::GrayImage;
use std::sync::Arc;

// ========== 跟踪器统一接口 ==========

/// 单目标跟踪器 Trait
///
/// `init` 以给定框作为初始外观; `update` 返回新一帧中的位置,失败返回 None。
pub trait VisualTracker: Send {
    fn init(&mut self, frame: &Frame, bbox: BBox) -> Result<()>;

    fn update(&mut self, frame: &Frame) -> Option<BBox>;
}

/// 跟踪器工厂 (每个对象一个实例)
pub type TrackerFactory = Arc<dyn Fn() -> Box<dyn VisualTracker> + Send + Sync>;

/// 默认工厂: 相关匹配跟踪器
pub fn default_tracker_factory(search_margin: f32, min_score: f32) -> TrackerFactory {
    Arc::new(move || Box::new(CorrelationTracker::new(search_margin, min_score)) as Box<dyn VisualTracker>)
}

// ========== 卡尔曼滤波器 ==========

/// 简化卡尔曼滤波器 (预测搜索中心)
/// 状态向量: [cx, cy, w, h, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],

    /// 估计误差协方差 (对角)
    p: [f32; 8],

    /// 过程噪声
    q: f32,

    /// 观测噪声
    r: f32,

    /// 速度衰减因子
    velocity_decay: f32,

    /// 静止阈值 (像素/帧)
    stationary_threshold: f32,

    stationary_count: u32,
}

impl KalmanBoxFilter {
    pub fn new(bbox: &BBox, q: f32, r: f32) -> Self {
        let (cx, cy) = bbox.center();
        Self {
            state: [cx, cy, bbox.w, bbox.h, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
            stationary_threshold: 2.0,
            stationary_count: 0,
        }
    }

    /// 匀速模型预测 (静止时加速衰减)
    pub fn predict(&mut self) {
        let speed = (self.state[4] * self.state[4] + self.state[5] * self.state[5]).sqrt();
        let is_stationary = speed < self.stationary_threshold;

        let decay = if is_stationary {
            self.stationary_count += 1;
            if self.stationary_count > 3 {
                0.7
            } else {
                self.velocity_decay
            }
        } else {
            self.stationary_count = 0;
            self.velocity_decay
        };
        for v in &mut self.state[4..6] {
            *v *= decay;
        }
        // 尺寸变化不参与预测
        self.state[6] = 0.0;
        self.state[7] = 0.0;

        self.state[0] += self.state[4];
        self.state[1] += self.state[5];

        let q_factor = if is_stationary { 0.5 } else { 1.0 };
        for p in &mut self.p {
            *p += self.q * q_factor;
        }
    }

    /// 融合观测 (残差自适应观测噪声)
    pub fn update(&mut self, bbox: &BBox) {
        let (cx, cy) = bbox.center();
        let y = [
            cx - self.state[0],
            cy - self.state[1],
            bbox.w - self.state[2],
            bbox.h - self.state[3],
        ];

        let residual = (y[0] * y[0] + y[1] * y[1]).sqrt();
        let r = if residual < self.stationary_threshold {
            self.r * 0.3
        } else if residual < 10.0 {
            self.r
        } else {
            self.r * 3.0
        };

        let mut k = [0.0f32; 8];
        for i in 0..8 {
            let noise = if i < 4 { r } else { r * 10.0 };
            k[i] = self.p[i] / (self.p[i] + noise);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
        }
        let velocity_gain = if residual < self.stationary_threshold { 0.3 } else { 1.0 };
        self.state[4] += k[4] * y[0] * velocity_gain;
        self.state[5] += k[5] * y[1] * velocity_gain;

        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }
        if residual >= self.stationary_threshold {
            self.stationary_count = 0;
        }
    }

    /// 当前状态框
    pub fn state_bbox(&self) -> BBox {
        BBox::from_center(
            self.state[0],
            self.state[1],
            self.state[2].max(1.0),
            self.state[3].max(1.0),
        )
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

// ========== 相关匹配跟踪器 ==========

/// 卡尔曼预测 + 局部窗口 ZNCC 搜索
///
/// 外观模板在 init 时固定;对象被重新检测或找回时由管理器重新 init。
pub struct CorrelationTracker {
    template: Option<GrayImage>,
    kalman: Option<KalmanBoxFilter>,
    /// 搜索窗口扩展比例 (相对框的长边)
    search_margin: f32,
    min_score: f32,
    last_score: f32,
}

/// 初始化所需的最小模板边长
const MIN_TRACK_SIDE: u32 = 4;

impl CorrelationTracker {
    pub fn new(search_margin: f32, min_score: f32) -> Self {
        Self {
            template: None,
            kalman: None,
            search_margin,
            min_score,
            last_score: 0.0,
        }
    }

    /// 上一次匹配得分
    pub fn last_score(&self) -> f32 {
        self.last_score
    }
}

impl VisualTracker for CorrelationTracker {
    fn init(&mut self, frame: &Frame, bbox: BBox) -> Result<()> {
        let r = bbox.clamp_to(frame.dims());
        if r.w < MIN_TRACK_SIDE || r.h < MIN_TRACK_SIDE {
            bail!("跟踪框太小: {}x{}", r.w, r.h);
        }
        self.template = Some(imageops::crop_imm(frame.gray(), r.x, r.y, r.w, r.h).to_image());
        self.kalman = Some(KalmanBoxFilter::new(&r.into(), 0.1, 1.0));
        self.last_score = 1.0;
        Ok(())
    }

    fn update(&mut self, frame: &Frame) -> Option<BBox> {
        let template = self.template.as_ref()?;
        let kalman = self.kalman.as_mut()?;
        let (tw, th) = template.dimensions();

        kalman.predict();
        let (pcx, pcy) = kalman.state_bbox().center();
        let predicted = BBox::from_center(pcx, pcy, tw as f32, th as f32);

        // 搜索窗口
        let margin = self.search_margin * tw.max(th) as f32 + 8.0;
        let window = predicted.expanded(margin).clamp_to(frame.dims());
        if window.w < tw || window.h < th {
            self.last_score = 0.0;
            return None;
        }

        let region = imageops::crop_imm(frame.gray(), window.x, window.y, window.w, window.h).to_image();
        let found = exhaustive_match(&region, template)?;
        self.last_score = found.score;
        if found.score < self.min_score {
            return None;
        }

        let bbox = BBox::new(
            (window.x + found.x) as f32,
            (window.y + found.y) as f32,
            tw as f32,
            th as f32,
        );
        kalman.update(&bbox);
        Some(bbox)
    }
}
