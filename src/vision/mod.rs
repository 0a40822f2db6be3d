/// 外部视觉服务 (External vision service)
///
/// - client:       服务接口 + Gemini HTTP 客户端
/// - parse:        响应文本解析
/// - async_detect: 后台检测 (同时最多一个请求)
pub mod async_detect;
pub mod client;
pub mod parse;

pub use async_detect::AsyncDetector;
pub use client::{GeminiClient, VisionService};

use serde::{Deserialize, Serialize};

/// 原始检测记录 (box_2d = [y_min, x_min, y_max, x_max], 0..1000)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub box_2d: Vec<f32>,
    #[serde(default = "unknown_label")]
    pub label: String,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn unknown_label() -> String {
    "unknown".to_string()
}

fn full_confidence() -> f32 {
    1.0
}
