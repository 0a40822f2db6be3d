//! 音频引擎: 更新线程 + 输出设备
//!
//! 更新线程按 update_hz 读取共享快照, 生成场景后通过有界通道发给渲染端;
//! 渲染端 (设备回调) 用 try_recv 取最新场景, 从不阻塞。
//! 设备不可用时进入静音模式, 整个音频子系统变为空操作。

use super::mixer::{MixCommand, Mixer};
use super::signature::SignatureBank;
use super::spatial::build_scene;
use crate::config::{secs_to_duration, AudioConfig};
use crate::state::SharedState;
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// 场景通道容量
const SCENE_QUEUE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioMode {
    Device,
    Silent,
}

/// 输出设备句柄 (停止标志 + 设备线程)
pub struct OutputHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OutputHandle {
    pub fn new(stop: Arc<AtomicBool>, thread: JoinHandle<()>) -> Self {
        Self {
            stop,
            thread: Some(thread),
        }
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

pub struct AudioEngine {
    mode: AudioMode,
    output: Option<OutputHandle>,
    update_thread: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// 静音引擎 (--no-audio 或设备失败)
    pub fn silent() -> Self {
        Self {
            mode: AudioMode::Silent,
            output: None,
            update_thread: None,
        }
    }

    /// 打开输出设备并启动更新线程; 任何失败都降级为静音模式
    pub fn start(config: &AudioConfig, shared: Arc<SharedState>) -> Self {
        let bank = Arc::new(SignatureBank::build(config));
        info!("🔊 已生成 {} 个音频签名", bank.len());

        let (tx, rx) = bounded::<MixCommand>(SCENE_QUEUE);
        let mixer = Mixer::new(bank, config);

        let output = match open_output(config, mixer, rx) {
            Ok(output) => output,
            Err(e) => {
                warn!("⚠️ 音频设备不可用, 进入静音模式: {:#}", e);
                return Self::silent();
            }
        };

        let update_config = config.clone();
        let update_thread = thread::Builder::new()
            .name("nova-audio-update".into())
            .spawn(move || update_loop(shared, tx, update_config));

        match update_thread {
            Ok(handle) => {
                info!("✅ 空间音频已启动");
                Self {
                    mode: AudioMode::Device,
                    output: Some(output),
                    update_thread: Some(handle),
                }
            }
            Err(e) => {
                warn!("⚠️ 无法启动音频更新线程: {}", e);
                let mut output = output;
                output.shutdown();
                Self::silent()
            }
        }
    }

    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    /// 等待更新线程结束 (由共享状态 running 标志控制) 并关闭设备
    pub fn stop(mut self) {
        if let Some(handle) = self.update_thread.take() {
            let _ = handle.join();
        }
        if let Some(mut output) = self.output.take() {
            output.shutdown();
        }
    }
}

/// 音频更新循环
pub fn update_loop(shared: Arc<SharedState>, tx: Sender<MixCommand>, config: AudioConfig) {
    let interval = secs_to_duration(1.0 / config.update_hz.max(1.0));
    while shared.is_running() {
        let snapshot = shared.display_state().objects;
        let scene = build_scene(&snapshot, &config);
        match tx.try_send(MixCommand::Scene(scene)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("音频场景队列已满, 跳过本次更新"),
            Err(TrySendError::Disconnected(_)) => break,
        }
        thread::sleep(interval);
    }
    let _ = tx.try_send(MixCommand::Clear);
    debug!("音频更新线程退出");
}

/// 渲染回调主体: 取最新场景后混音
pub fn render_block(mixer: &mut Mixer, rx: &Receiver<MixCommand>, out: &mut [f32]) {
    let mut latest = None;
    while let Ok(cmd) = rx.try_recv() {
        latest = Some(cmd);
    }
    if let Some(cmd) = latest {
        mixer.apply(cmd);
    }
    mixer.render(out);
}

#[cfg(feature = "device")]
fn open_output(config: &AudioConfig, mixer: Mixer, rx: Receiver<MixCommand>) -> Result<OutputHandle> {
    super::device::open(config, mixer, rx)
}

#[cfg(not(feature = "device"))]
fn open_output(_config: &AudioConfig, _mixer: Mixer, _rx: Receiver<MixCommand>) -> Result<OutputHandle> {
    anyhow::bail!("未启用 `device` 功能, 没有音频输出设备")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mixer::SourceParams;
    use crate::state::TrackingStatus;
    use crate::tracking::{BBox, ObjectSnapshot};
    use std::time::Duration;

    fn snapshot(id: u32) -> ObjectSnapshot {
        ObjectSnapshot {
            id,
            label: "door".into(),
            context: None,
            bbox: BBox::new(100.0, 100.0, 300.0, 300.0),
            confidence: 1.0,
            velocity: None,
            predicted_bbox: None,
            threat_score: 0.5,
            is_lost: false,
            lost_time: None,
            color: (0, 0, 0),
            signature: "door",
        }
    }

    #[test]
    fn test_render_block_uses_latest_scene() {
        let config = AudioConfig::default();
        let mut mixer = Mixer::new(Arc::new(SignatureBank::build(&config)), &config);
        let (tx, rx) = bounded(4);
        let p = |id| SourceParams {
            id,
            signature: "door",
            gain: 1.0,
            position: [0.0, 0.0, -1.0],
        };
        tx.send(MixCommand::Scene(vec![p(1), p(2)])).unwrap();
        tx.send(MixCommand::Scene(vec![p(3)])).unwrap();

        let mut buf = vec![0.0; 256];
        render_block(&mut mixer, &rx, &mut buf);
        assert_eq!(mixer.active_sources(), 1);
        assert!(mixer.has_source(3));
    }

    #[test]
    fn test_update_loop_publishes_scenes_until_shutdown() {
        let shared = Arc::new(SharedState::new());
        shared.update_tracking(vec![snapshot(7)], TrackingStatus::Tracking);

        let (tx, rx) = bounded(SCENE_QUEUE);
        let config = AudioConfig {
            update_hz: 200.0,
            ..AudioConfig::default()
        };
        let s = shared.clone();
        let handle = thread::spawn(move || update_loop(s, tx, config));

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        match first {
            MixCommand::Scene(scene) => {
                assert_eq!(scene.len(), 1);
                assert_eq!(scene[0].id, 7);
            }
            MixCommand::Clear => panic!("expected a scene"),
        }

        shared.request_shutdown();
        // 排空队列, 保证退出前的 Clear 能发送
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            while rx.try_recv().is_ok() {}
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        handle.join().unwrap();
    }

    #[cfg(not(feature = "device"))]
    #[test]
    fn test_without_device_engine_is_silent() {
        let shared = Arc::new(SharedState::new());
        let engine = AudioEngine::start(&AudioConfig::default(), shared);
        assert_eq!(engine.mode(), AudioMode::Silent);
        engine.stop();
    }
}
