//! 共享状态总线 (采集 / 跟踪 / 音频 三个循环之间)
//!
//! 所有访问都是一次短临界区, 取出的数据是拷贝或 Arc 共享的不可变快照。

use crate::mode::NavigationMode;
use crate::tracking::{Frame, ObjectSnapshot};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 跟踪状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrackingStatus {
    #[default]
    Ready,
    Searching,
    Tracking,
    Lost,
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackingStatus::Ready => "READY",
            TrackingStatus::Searching => "SEARCHING",
            TrackingStatus::Tracking => "TRACKING",
            TrackingStatus::Lost => "LOST",
        };
        f.write_str(s)
    }
}

/// 控制命令 (按键 / 语音 / 内部触发)
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// 发起一次检测
    Detect,
    SetMode(NavigationMode),
    CycleMode,
    /// 导航到指定目标
    Track(String),
    StopTracking,
    DescribeScene,
    /// 视觉问答
    Ask(String),
    /// 查询学习记忆
    Recall(String),
    Say(String),
    Quit,
}

/// 界面读取的状态 (快照拷贝)
#[derive(Clone, Debug, Default)]
pub struct DisplayState {
    pub frame: Option<Frame>,
    pub frame_id: u64,
    pub objects: Arc<Vec<ObjectSnapshot>>,
    pub status: TrackingStatus,
    pub fps: f32,
}

#[derive(Default)]
struct Inner {
    frame: Option<Frame>,
    frame_id: u64,
    objects: Arc<Vec<ObjectSnapshot>>,
    status: TrackingStatus,
    commands: VecDeque<Command>,
    fps: f32,
}

pub struct SharedState {
    inner: Mutex<Inner>,
    running: AtomicBool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            running: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 发布最新帧 (帧号递增)
    pub fn update_frame(&self, frame: Frame) {
        let mut inner = self.lock();
        inner.frame_id += 1;
        inner.frame = Some(frame);
    }

    /// 最新帧及其帧号
    pub fn latest_frame(&self) -> Option<(Frame, u64)> {
        let inner = self.lock();
        inner.frame.clone().map(|f| (f, inner.frame_id))
    }

    pub fn update_tracking(&self, objects: Vec<ObjectSnapshot>, status: TrackingStatus) {
        let objects = Arc::new(objects);
        let mut inner = self.lock();
        inner.objects = objects;
        inner.status = status;
    }

    pub fn set_status(&self, status: TrackingStatus) {
        self.lock().status = status;
    }

    pub fn display_state(&self) -> DisplayState {
        let inner = self.lock();
        DisplayState {
            frame: inner.frame.clone(),
            frame_id: inner.frame_id,
            objects: inner.objects.clone(),
            status: inner.status,
            fps: inner.fps,
        }
    }

    pub fn push_command(&self, command: Command) {
        self.lock().commands.push_back(command);
    }

    pub fn next_command(&self) -> Option<Command> {
        self.lock().commands.pop_front()
    }

    pub fn set_fps(&self, fps: f32) {
        self.lock().fps = fps;
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
