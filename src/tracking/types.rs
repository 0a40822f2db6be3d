//! 跟踪数据结构定义

use image::{GrayImage, RgbImage};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

// ========== 边界框 ==========

/// 像素坐标边界框 (左上角 + 宽高)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// 由中心点和尺寸构造
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn x2(&self) -> f32 {
        self.x + self.w
    }

    pub fn y2(&self) -> f32 {
        self.y + self.h
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.w, self.h)
    }

    /// 以 margin 向四周扩展
    pub fn expanded(&self, margin: f32) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.w + 2.0 * margin,
            self.h + 2.0 * margin,
        )
    }

    /// 裁剪到帧范围内的整数像素区域: x∈[0,W-1], w∈[1,W-x]
    pub fn clamp_to(&self, dims: FrameDims) -> PixelRect {
        let max_x = dims.width.saturating_sub(1) as f32;
        let max_y = dims.height.saturating_sub(1) as f32;
        let x = self.x.max(0.0).min(max_x).trunc() as u32;
        let y = self.y.max(0.0).min(max_y).trunc() as u32;
        let w = (self.w.trunc() as i64).clamp(1, (dims.width - x).max(1) as i64) as u32;
        let h = (self.h.trunc() as i64).clamp(1, (dims.height - y).max(1) as i64) as u32;
        PixelRect { x, y, w, h }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

/// 整数像素区域 (用于裁剪)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl From<PixelRect> for BBox {
    fn from(r: PixelRect) -> Self {
        BBox::new(r.x as f32, r.y as f32, r.w as f32, r.h as f32)
    }
}

// ========== 帧 ==========

/// 帧尺寸
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }
}

/// 采集帧 (采集线程 → 跟踪线程)
///
/// 图像通过 Arc 共享,克隆只增加引用计数。灰度图在第一次使用时计算并缓存,
/// 同一帧上的多个跟踪器共享同一份灰度图。
#[derive(Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    pub frame_id: u64,
    pub timestamp: Instant,
    gray: Arc<OnceCell<GrayImage>>,
}

impl Frame {
    pub fn new(image: RgbImage, frame_id: u64) -> Self {
        Self::with_timestamp(image, frame_id, Instant::now())
    }

    pub fn with_timestamp(image: RgbImage, frame_id: u64, timestamp: Instant) -> Self {
        Self {
            image: Arc::new(image),
            frame_id,
            timestamp,
            gray: Arc::new(OnceCell::new()),
        }
    }

    pub fn dims(&self) -> FrameDims {
        FrameDims::new(self.image.width(), self.image.height())
    }

    /// 灰度图 (惰性计算)
    pub fn gray(&self) -> &GrayImage {
        self.gray
            .get_or_init(|| image::imageops::grayscale(self.image.as_ref()))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_id", &self.frame_id)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}
