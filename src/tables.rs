//! 静态查找表 (编译期完美哈希)

use crate::audio::signature::{SignatureSpec, Waveform};
use phf::phf_map;

/// 语义威胁优先级 (标签 → 0..1)
pub static THREAT_PRIORITIES: phf::Map<&'static str, f32> = phf_map! {
    // 高优先级: 移动 / 危险
    "person" => 1.0,
    "car" => 1.0,
    "truck" => 1.0,
    "bus" => 1.0,
    "stairs" => 0.9,
    "obstacle" => 0.9,
    // 导航相关
    "door" => 0.8,
    "tree" => 0.8,
    "pole" => 0.8,
    "wall" => 0.7,
    // 家具
    "chair" => 0.4,
    "table" => 0.4,
    "couch" => 0.4,
    "bed" => 0.4,
    // 小物品
    "tv" => 0.3,
    "laptop" => 0.2,
    "phone" => 0.1,
    "cup" => 0.1,
    "bottle" => 0.1,
    "book" => 0.1,
    "pen" => 0.05,
};

/// 未知标签的默认优先级
pub const DEFAULT_THREAT_PRIORITY: f32 = 0.3;

/// 音频签名 (标签 → 波形 + 基频)
pub static AUDIO_SIGNATURES: phf::Map<&'static str, SignatureSpec> = phf_map! {
    "person" => SignatureSpec { waveform: Waveform::Pulse, freq: 80.0 },
    "phone" => SignatureSpec { waveform: Waveform::Sine, freq: 440.0 },
    "door" => SignatureSpec { waveform: Waveform::Sine, freq: 120.0 },
    "chair" => SignatureSpec { waveform: Waveform::Square, freq: 800.0 },
    "table" => SignatureSpec { waveform: Waveform::Square, freq: 600.0 },
    "cup" => SignatureSpec { waveform: Waveform::Sine, freq: 660.0 },
    "obstacle" => SignatureSpec { waveform: Waveform::Sawtooth, freq: 1000.0 },
};

pub const DEFAULT_SIGNATURE_NAME: &str = "default";
pub const DEFAULT_SIGNATURE: SignatureSpec = SignatureSpec {
    waveform: Waveform::Sine,
    freq: 330.0,
};

/// 标签查找键: 最后一个单词,小写 ("Red Cup" → "cup")
pub fn label_key(label: &str) -> String {
    label
        .split_whitespace()
        .last()
        .unwrap_or("")
        .to_lowercase()
}

/// 语义优先级查找
pub fn semantic_priority(label: &str) -> f32 {
    THREAT_PRIORITIES
        .get(label_key(label).as_str())
        .copied()
        .unwrap_or(DEFAULT_THREAT_PRIORITY)
}

/// 音频签名查找,返回 (签名名称, 参数)
pub fn signature_for(label: &str) -> (&'static str, SignatureSpec) {
    let key = label_key(label);
    match AUDIO_SIGNATURES.get_entry(key.as_str()) {
        Some((name, spec)) => (*name, *spec),
        None => (DEFAULT_SIGNATURE_NAME, DEFAULT_SIGNATURE),
    }
}

/// 显示调色板 (按 id 轮换)
pub const PALETTE: [(u8, u8, u8); 6] = [
    (0, 255, 0),
    (0, 0, 255),
    (255, 0, 0),
    (255, 255, 0),
    (255, 0, 255),
    (0, 255, 255),
];

pub fn palette_color(id: u32) -> (u8, u8, u8) {
    PALETTE[id as usize % PALETTE.len()]
}
