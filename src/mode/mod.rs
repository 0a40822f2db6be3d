/// 模式控制器 (Mode Controller)
///
/// 每种模式决定: 检测提示词 / 最大对象数 / 音频焦点策略 / 标签过滤
pub mod prompts;

use crate::config::TrackingConfig;
use crate::tracking::{FrameDims, ObjectManager, TrackedObject};
use crate::vision::RawDetection;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

// ========== 模式定义 ==========

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    /// 跟踪指定目标
    Navigation,
    /// 避障
    Obstacle,
    /// 只跟踪人
    Social,
    /// 探索环境
    #[default]
    Exploration,
}

/// 音频焦点策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusStrategy {
    Target,
    Closest,
    People,
    All,
}

/// 模式参数
#[derive(Debug)]
pub struct ModeConfig {
    pub prompt: &'static str,
    pub max_objects: usize,
    pub focus: FocusStrategy,
    pub filter: Option<&'static [&'static str]>,
    pub description: &'static str,
}

static NAVIGATION: ModeConfig = ModeConfig {
    prompt: prompts::DETECTION_NAVIGATION,
    max_objects: 1,
    focus: FocusStrategy::Target,
    filter: None,
    description: "Track a specific object",
};

static OBSTACLE: ModeConfig = ModeConfig {
    prompt: prompts::DETECTION_OBSTACLE,
    max_objects: 5,
    focus: FocusStrategy::Closest,
    filter: None,
    description: "Avoid obstacles in your path",
};

const PEOPLE_ONLY: &[&str] = &["person"];

static SOCIAL: ModeConfig = ModeConfig {
    prompt: prompts::DETECTION_MULTI_OBJECT,
    max_objects: 5,
    focus: FocusStrategy::People,
    filter: Some(PEOPLE_ONLY),
    description: "Detect people around you",
};

static EXPLORATION: ModeConfig = ModeConfig {
    prompt: prompts::DETECTION_MULTI_OBJECT,
    max_objects: 5,
    focus: FocusStrategy::All,
    filter: None,
    description: "Explore your environment",
};

impl NavigationMode {
    pub const ALL: [NavigationMode; 4] = [
        NavigationMode::Navigation,
        NavigationMode::Obstacle,
        NavigationMode::Social,
        NavigationMode::Exploration,
    ];

    pub fn config(&self) -> &'static ModeConfig {
        match self {
            NavigationMode::Navigation => &NAVIGATION,
            NavigationMode::Obstacle => &OBSTACLE,
            NavigationMode::Social => &SOCIAL,
            NavigationMode::Exploration => &EXPLORATION,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NavigationMode::Navigation => "navigation",
            NavigationMode::Obstacle => "obstacle",
            NavigationMode::Social => "social",
            NavigationMode::Exploration => "exploration",
        }
    }

    /// 下一个模式 (循环)
    pub fn next(&self) -> NavigationMode {
        let idx = Self::ALL.iter().position(|m| m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NavigationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "navigation" | "navigate" | "nav" => Ok(NavigationMode::Navigation),
            "obstacle" | "obstacles" => Ok(NavigationMode::Obstacle),
            "social" | "people" => Ok(NavigationMode::Social),
            "exploration" | "explore" => Ok(NavigationMode::Exploration),
            other => bail!("unknown mode: {}", other),
        }
    }
}

/// 主要关注对象
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimaryFocus {
    None,
    One(u32),
    All(Vec<u32>),
}

// ========== 控制器 ==========

/// 模式控制器, 独占对象管理器
pub struct ModeController {
    mode: NavigationMode,
    target_object: String,
    manager: ObjectManager,
    frame_dims: FrameDims,
    lost_timeout: std::time::Duration,
    lost_min_score: f32,
}

impl ModeController {
    pub fn new(manager: ObjectManager, mode: NavigationMode, target_object: &str, tracking: &TrackingConfig) -> Self {
        info!("🎮 模式控制器初始化 | 模式: {}", mode);
        Self {
            mode,
            target_object: target_object.to_string(),
            manager,
            frame_dims: FrameDims::new(640, 480),
            lost_timeout: tracking.lost_threat_timeout(),
            lost_min_score: tracking.lost_threat_min_score,
        }
    }

    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    pub fn mode_config(&self) -> &'static ModeConfig {
        self.mode.config()
    }

    pub fn target_object(&self) -> &str {
        &self.target_object
    }

    pub fn manager(&self) -> &ObjectManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ObjectManager {
        &mut self.manager
    }

    /// 切换模式, 切换时清空对象; 相同模式为空操作
    pub fn set_mode(&mut self, mode: NavigationMode) -> bool {
        if mode == self.mode {
            info!("ℹ️ 已经处于 {} 模式", mode);
            return false;
        }
        let old = self.mode;
        self.mode = mode;
        self.manager.clear();
        info!("🔄 模式切换: {} → {} ({})", old, mode, mode.config().description);
        true
    }

    pub fn cycle_mode(&mut self) -> NavigationMode {
        self.set_mode(self.mode.next());
        self.mode
    }

    /// 设置导航目标; 导航模式下清空对象以触发重新检测
    pub fn set_target_object(&mut self, label: &str) {
        self.target_object = label.trim().to_string();
        info!("🎯 目标设置为: {}", self.target_object);
        if self.mode == NavigationMode::Navigation {
            self.manager.clear();
        }
    }

    pub fn detection_prompt(&self) -> String {
        self.mode_config()
            .prompt
            .replace("{target_object}", &self.target_object)
    }

    /// 合并检测结果, 再按模式过滤和限制数量, 返回新建对象数量
    pub fn reconcile(&mut self, detections: &[RawDetection], dims: FrameDims, now: Instant) -> usize {
        self.frame_dims = dims;
        let created = self.manager.process_detections(detections, dims, now);
        let cfg = self.mode_config();
        if let Some(filter) = cfg.filter {
            self.manager.filter_by_labels(filter);
        }
        self.manager.limit(cfg.max_objects);
        created
    }

    fn matches_target(&self, obj: &TrackedObject) -> bool {
        let target = self.target_object.to_lowercase();
        obj.label.to_lowercase() == target || crate::tables::label_key(&obj.label) == target
    }

    /// 按当前焦点策略选出主要对象
    pub fn primary_object(&self) -> PrimaryFocus {
        let objects = self.manager.objects();
        if objects.is_empty() {
            return PrimaryFocus::None;
        }
        match self.mode_config().focus {
            FocusStrategy::Target => {
                let obj = objects
                    .iter()
                    .find(|o| self.matches_target(o))
                    .unwrap_or(&objects[0]);
                PrimaryFocus::One(obj.id)
            }
            FocusStrategy::Closest => match self.manager.closest() {
                Some(obj) => PrimaryFocus::One(obj.id),
                None => PrimaryFocus::None,
            },
            FocusStrategy::People => match objects
                .iter()
                .find(|o| crate::tables::label_key(&o.label) == "person")
            {
                Some(obj) => PrimaryFocus::One(obj.id),
                None => PrimaryFocus::None,
            },
            FocusStrategy::All => PrimaryFocus::All(objects.iter().map(|o| o.id).collect()),
        }
    }

    /// 威胁分最高的对象
    pub fn main_threat(&self) -> Option<&TrackedObject> {
        self.manager.highest_threat()
    }

    /// 主威胁丢失超时检查: 超时且威胁分足够高时移除并返回 true
    pub fn check_lost_threats(&mut self, now: Instant) -> bool {
        let Some(threat) = self.main_threat() else {
            return false;
        };
        let Some(lost_for) = threat.lost_for(now) else {
            return false;
        };
        if threat.threat_score > self.lost_min_score && lost_for > self.lost_timeout {
            let (id, label, score) = (threat.id, threat.label.clone(), threat.threat_score);
            warn!(
                "⚠️ 主威胁 '{}' (score {:.2}) 已丢失 {:.1}s, 重新扫描",
                label,
                score,
                lost_for.as_secs_f32()
            );
            self.manager.remove(id);
            return true;
        }
        false
    }

    pub fn frame_dims(&self) -> FrameDims {
        self.frame_dims
    }
}
