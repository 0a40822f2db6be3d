//! 跟踪循环 (~20Hz)
//!
//! 每个 tick 的顺序:
//! 1. 取后台检测结果 → 合并 → 初始化缺少跟踪器的对象 → 写入学习记忆
//! 2. 处理一条命令
//! 3. 更新所有跟踪器 → 发布快照
//! 4. 本地找回丢失对象 / 刷新模板
//! 5. 过期清理, 主威胁丢失检查 (都会触发重新检测)

use crate::config::AppConfig;
use crate::learning::LearningStore;
use crate::mode::{prompts, ModeController, NavigationMode};
use crate::state::{Command, SharedState, TrackingStatus};
use crate::tracking::Frame;
use crate::vision::{AsyncDetector, VisionService};
use crate::voice::VoiceAssistant;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 对话上下文轮数
const HISTORY_CONTEXT: usize = 5;

/// 单个 tick 的结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub created: usize,
    pub command: Option<Command>,
    pub tracked: Vec<u32>,
    pub recovered: Vec<u32>,
    pub stale_evicted: bool,
    pub lost_threat: bool,
    pub status: TrackingStatus,
}

pub struct TrackingLoop {
    shared: Arc<SharedState>,
    controller: ModeController,
    detector: AsyncDetector,
    vision: Arc<dyn VisionService>,
    voice: Option<Arc<VoiceAssistant>>,
    learning: Option<Box<dyn LearningStore>>,
    downscale: f32,
    max_age: Duration,
    tick_interval: Duration,

    // 统计
    count: u64,
    last: Instant,
}

impl TrackingLoop {
    pub fn new(
        shared: Arc<SharedState>,
        controller: ModeController,
        vision: Arc<dyn VisionService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            shared,
            controller,
            detector: AsyncDetector::new(vision.clone()),
            vision,
            voice: None,
            learning: None,
            downscale: config.vision.downscale,
            max_age: config.tracking.max_age(),
            tick_interval: config.tracking.tick_interval(),
            count: 0,
            last: Instant::now(),
        }
    }

    pub fn with_voice(mut self, voice: Arc<VoiceAssistant>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_learning(mut self, store: Box<dyn LearningStore>) -> Self {
        self.learning = Some(store);
        self
    }

    pub fn controller(&self) -> &ModeController {
        &self.controller
    }

    pub fn is_searching(&self) -> bool {
        self.detector.is_searching()
    }

    /// 循环直到共享状态要求退出
    pub fn run(&mut self) {
        info!("👀 跟踪线程启动 | 模式: {}", self.controller.mode());
        while self.shared.is_running() {
            let started = Instant::now();
            match self.shared.latest_frame() {
                Some((frame, _)) => {
                    self.tick(&frame, started);
                }
                None => {
                    thread::sleep(Duration::from_millis(10));
                    continue;
                }
            }
            self.log_stats();
            if let Some(rest) = self.tick_interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        info!("👁️ 跟踪线程退出");
    }

    fn log_stats(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let hz = self.count as f64 / elapsed.as_secs_f64();
            info!(
                "📊 跟踪统计: {:.1} Hz | 对象 {} | 模式 {}",
                hz,
                self.controller.manager().len(),
                self.controller.mode()
            );
            self.count = 0;
            self.last = Instant::now();
        }
    }

    /// 执行一个 tick
    pub fn tick(&mut self, frame: &Frame, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        // 1. 后台检测结果
        if let Some(detections) = self.detector.poll() {
            info!("✅ 检测完成, 合并 {} 条记录", detections.len());
            report.created = self.controller.reconcile(&detections, frame.dims(), now);
            // 新对象和被替换位置的对象
            self.controller.manager_mut().init_all_trackers(frame);
            if report.created > 0 {
                self.remember_objects(frame);
                self.say(&format!("Found {} objects", report.created));
            }
        }

        // 2. 一条命令
        if let Some(command) = self.shared.next_command() {
            self.handle_command(&command, frame);
            report.command = Some(command);
        }

        // 3. 跟踪 + 发布
        let manager = self.controller.manager_mut();
        report.tracked = manager.update_trackers(frame, now);
        report.status = self.current_status();
        self.shared
            .update_tracking(self.controller.manager().snapshot(), report.status);

        // 4. 本地找回 / 模板刷新
        let manager = self.controller.manager_mut();
        report.recovered = manager.attempt_recoveries(frame, now);
        manager.refresh_templates(frame, now);

        // 5. 过期 / 主威胁丢失
        if manager.cleanup_stale(self.max_age, now) {
            info!("🔄 过期对象已移除, 重新扫描");
            report.stale_evicted = true;
            self.shared.push_command(Command::Detect);
        }
        if self.controller.check_lost_threats(now) {
            report.lost_threat = true;
            self.shared.push_command(Command::Detect);
            self.say("Lost track. Rescanning.");
        }

        report
    }

    fn current_status(&self) -> TrackingStatus {
        let objects = self.controller.manager().objects();
        if objects.iter().any(|o| !o.is_lost) {
            TrackingStatus::Tracking
        } else if !objects.is_empty() {
            TrackingStatus::Lost
        } else if self.detector.is_searching() {
            TrackingStatus::Searching
        } else {
            TrackingStatus::Ready
        }
    }

    fn remember_objects(&mut self, frame: &Frame) {
        let Some(store) = self.learning.as_mut() else {
            return;
        };
        for obj in self.controller.manager().objects() {
            if let Err(e) =
                store.save_detection(frame, &obj.label, &obj.bbox, obj.confidence, obj.context.as_deref())
            {
                warn!("❌ 学习记录保存失败: {:#}", e);
            }
        }
    }

    fn say(&self, text: &str) {
        match &self.voice {
            Some(voice) => voice.say(text),
            None => info!("🗣️ {}", text),
        }
    }

    fn handle_command(&mut self, command: &Command, frame: &Frame) {
        debug!("命令: {:?}", command);
        match command {
            Command::Detect => self.start_detection(frame),
            Command::SetMode(mode) => {
                if self.controller.set_mode(*mode) {
                    self.say(&format!("{} mode activated", mode));
                    self.shared.push_command(Command::Detect);
                }
            }
            Command::CycleMode => {
                let mode = self.controller.cycle_mode();
                self.say(&format!("{} mode", mode));
                self.shared.push_command(Command::Detect);
            }
            Command::Track(label) => {
                self.controller.set_target_object(label);
                self.controller.set_mode(NavigationMode::Navigation);
                self.say(&format!("Tracking {}", label));
                self.shared.push_command(Command::Detect);
            }
            Command::StopTracking => {
                self.controller.manager_mut().clear();
                self.say("Tracking stopped");
            }
            Command::DescribeScene => {
                self.ask_vision(frame.image.as_ref().clone(), prompts::SCENE_DESCRIPTION.to_string());
            }
            Command::Ask(question) => {
                let prompt = format!("{}{}", prompts::VISUAL_QUESTION, question);
                self.ask_vision(frame.image.as_ref().clone(), prompt);
            }
            Command::Recall(label) => self.recall(label),
            Command::Say(text) => self.say(text),
            Command::Quit => {
                self.say("Goodbye");
                self.shared.request_shutdown();
            }
        }
    }

    fn start_detection(&mut self, frame: &Frame) {
        let image = downscale(frame.image.as_ref(), self.downscale);
        let prompt = self.controller.detection_prompt();
        if self.detector.start(image, prompt) {
            info!("🧠 开始后台检测 ({} 模式)", self.controller.mode());
        } else {
            warn!("⚠️ 检测进行中, 忽略本次请求");
        }
    }

    fn recall(&self, label: &str) {
        let answer = match &self.learning {
            Some(store) => match store.recall_object(label) {
                Some(recall) => {
                    let mut sentence = recall.sentence();
                    if let Some((gx, gy, p)) = store.likely_location(label) {
                        if (gx, gy) != (recall.grid_x, recall.grid_y) && p >= 0.5 {
                            sentence.push_str(&format!(
                                " #PAUSE(0.3) It is usually at the {}.",
                                store.describe_location(gx, gy)
                            ));
                        }
                    }
                    sentence
                }
                None => format!("I haven't seen {} yet", label),
            },
            None => "Learning system not enabled".to_string(),
        };
        self.say(&answer);
    }

    /// 场景描述 / 视觉问答在独立线程执行, 完成后朗读
    fn ask_vision(&self, image: RgbImage, prompt: String) {
        let vision = self.vision.clone();
        let voice = self.voice.clone();
        let history = voice
            .as_ref()
            .map(|v| v.context(HISTORY_CONTEXT))
            .unwrap_or_default();

        let spawned = thread::Builder::new()
            .name("nova-describe".into())
            .spawn(move || {
                let answer = match vision.describe(&image, &prompt, &history) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("❌ 场景描述失败: {:#}", e);
                        "Sorry, I couldn't see that clearly.".to_string()
                    }
                };
                match voice {
                    Some(voice) => voice.say(&answer),
                    None => info!("🤖 Nova: {}", answer),
                }
            });
        if let Err(e) = spawned {
            warn!("❌ 无法启动描述线程: {}", e);
        }
    }
}

/// 上传前缩小图像
fn downscale(image: &RgbImage, scale: f32) -> RgbImage {
    if !(scale > 0.0 && scale < 1.0) {
        return image.clone();
    }
    let w = ((image.width() as f32 * scale) as u32).max(1);
    let h = ((image.height() as f32 * scale) as u32).max(1);
    imageops::resize(image, w, h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downscale() {
        let image = RgbImage::new(640, 480);
        let small = downscale(&image, 0.5);
        assert_eq!(small.dimensions(), (320, 240));
        assert_eq!(downscale(&image, 1.0).dimensions(), (640, 480));
        assert_eq!(downscale(&image, 0.0).dimensions(), (640, 480));
    }
}
