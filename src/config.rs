//! 系统配置 - 通过JSON文件调整参数

use crate::mode::NavigationMode;
use crate::tracking::ThreatFormula;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// 跟踪参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub max_age_secs: f32,           // 未被检测确认的最长保留时间
    pub tick_hz: f32,                // 跟踪循环频率
    pub match_iou_lost: f32,         // 丢失对象合并阈值
    pub match_iou_active: f32,       // 正常对象替换阈值
    pub motion_prediction: bool,     // 运动预测开关
    pub prediction_horizon_secs: f32, // 预测时间
    pub min_velocity: f32,           // 静止判定 (像素/tick)
    pub template_refresh_secs: f32,  // 模板刷新间隔
    pub min_template_side: u32,      // 模板最小边长
    pub recovery_threshold: f32,     // 本地找回得分阈值
    pub lost_threat_timeout_secs: f32, // 主威胁丢失超时
    pub lost_threat_min_score: f32,  // 主威胁丢失最低威胁分
    pub tracker_search_margin: f32,  // 跟踪搜索窗口扩展比例
    pub tracker_min_score: f32,      // 跟踪匹配最低得分
    pub min_detection_side: u32,     // 检测框最小边长
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 30.0,
            tick_hz: 20.0,
            match_iou_lost: 0.1,
            match_iou_active: 0.6,
            motion_prediction: true,
            prediction_horizon_secs: 0.5,
            min_velocity: 5.0,
            template_refresh_secs: 1.0,
            min_template_side: 10,
            recovery_threshold: 0.7,
            lost_threat_timeout_secs: 2.0,
            lost_threat_min_score: 0.3,
            tracker_search_margin: 0.5,
            tracker_min_score: 0.5,
            min_detection_side: 5,
        }
    }
}

/// 秒数 → Duration: 负数和 NaN 视为 0, 超出范围视为 Duration::MAX
pub fn secs_to_duration(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs.max(0.0)).unwrap_or(Duration::MAX)
}

impl TrackingConfig {
    pub fn max_age(&self) -> Duration {
        secs_to_duration(self.max_age_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        secs_to_duration(1.0 / self.tick_hz.max(1.0))
    }

    pub fn lost_threat_timeout(&self) -> Duration {
        secs_to_duration(self.lost_threat_timeout_secs)
    }

    pub fn template_refresh_interval(&self) -> Duration {
        secs_to_duration(self.template_refresh_secs)
    }
}

/// 威胁评分参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    pub formula: ThreatFormula,
    pub caution: f32, // 面积占比 ≥ caution → 注意
    pub warning: f32, // 面积占比 ≥ warning → 警告
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            formula: ThreatFormula::Tick,
            caution: 0.3,
            warning: 0.6,
        }
    }
}

/// 音频参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_frames: u32,
    pub update_hz: f32,
    pub reference_width: u32, // 空间映射参考帧尺寸
    pub reference_height: u32,
    pub duck_ratio: f32, // 威胁 < ratio × 最大威胁 → 压低
    pub duck_gain: f32,
    pub signature_secs: f32,
    pub envelope_samples: usize,
    pub binaural: bool, // 双耳渲染 (否则等功率声像)
    pub master_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_frames: 2048,
            update_hz: 20.0,
            reference_width: 1280,
            reference_height: 720,
            duck_ratio: 0.8,
            duck_gain: 0.3,
            signature_secs: 0.5,
            envelope_samples: 1000,
            binaural: true,
            master_gain: 1.0,
        }
    }
}

/// 视觉服务参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub downscale: f32, // 上传前缩放比例
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 20,
            downscale: 0.5,
        }
    }
}

/// 学习记忆参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub image_cache_dir: Option<PathBuf>, // 检测截图缓存 (None 不缓存)
    pub grid_width: u32,
    pub grid_height: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: data_dir().join("learning.json"),
            image_cache_dir: None,
            grid_width: 10,
            grid_height: 8,
        }
    }
}

/// 语音参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub tts_program: String,
    pub tts_args: Vec<String>,
    pub history_path: PathBuf,
    pub history_max_turns: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            tts_program: "espeak-ng".to_string(),
            tts_args: Vec::new(),
            history_path: data_dir().join("conversation_history.json"),
            history_max_turns: 20,
        }
    }
}

/// 系统配置 (所有参数)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tracking: TrackingConfig,
    pub threat: ThreatConfig,
    pub audio: AudioConfig,
    pub vision: VisionConfig,
    pub learning: LearningConfig,
    pub voice: VoiceConfig,
    pub default_mode: NavigationMode,
    pub default_target: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tracking: TrackingConfig::default(),
            threat: ThreatConfig::default(),
            audio: AudioConfig::default(),
            vision: VisionConfig::default(),
            learning: LearningConfig::default(),
            voice: VoiceConfig::default(),
            default_mode: NavigationMode::Exploration,
            default_target: "phone".to_string(),
        }
    }
}

/// 数据目录 (~/.local/share/nova 或当前目录)
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nova")
}

/// 默认配置文件路径
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nova")
        .join("config.json")
}

impl AppConfig {
    /// 从JSON文件加载配置: 不存在时写入默认值, 解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("创建目录失败: {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入失败: {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前配置:");
        info!(
            "  跟踪: {:.0}Hz, 最长保留 {:.0}s, 合并IoU 丢失>{:.2} / 正常>{:.2}",
            self.tracking.tick_hz,
            self.tracking.max_age_secs,
            self.tracking.match_iou_lost,
            self.tracking.match_iou_active
        );
        info!(
            "  找回阈值: {:.2}, 威胁公式: {:?}",
            self.tracking.recovery_threshold, self.threat.formula
        );
        info!(
            "  音频: {}Hz, 缓冲 {} 帧, 双耳: {}",
            self.audio.sample_rate, self.audio.buffer_frames, self.audio.binaural
        );
        info!(
            "  默认模式: {:?}, 默认目标: {}",
            self.default_mode, self.default_target
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig::load(&path);
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
        assert_eq!(AppConfig::load(&path), config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"tracking": {"max_age_secs": 10.0}, "threat": {"formula": "semantic"}, "default_mode": "social"}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.tracking.max_age_secs, 10.0);
        assert_eq!(config.tracking.match_iou_active, 0.6);
        assert_eq!(config.threat.formula, ThreatFormula::Semantic);
        assert_eq!(config.default_mode, NavigationMode::Social);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_out_of_range_durations_do_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"tracking": {"max_age_secs": 1e30, "lost_threat_timeout_secs": -5.0, "template_refresh_secs": 1e38}}"#,
        )
        .unwrap();

        let tracking = AppConfig::load(&path).tracking;
        assert_eq!(tracking.max_age(), Duration::MAX);
        assert_eq!(tracking.lost_threat_timeout(), Duration::ZERO);
        assert_eq!(tracking.template_refresh_interval(), Duration::MAX);
        assert_eq!(secs_to_duration(f32::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(0.5), Duration::from_millis(500));
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load(&path), AppConfig::default());
    }
}
