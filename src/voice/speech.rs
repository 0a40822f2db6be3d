//! 语音输出 / 输入
//!
//! 语音合成与识别本身是外部服务, 这里只负责:
//! `#PAUSE(秒)` 拆分, 逐段调用合成程序, 新的话语打断正在播放的话语。

use super::commands::parse_command;
use super::conversation::{ConversationHistory, Role};
use crate::config::secs_to_duration;
use crate::state::Command;
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Sender};
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static PAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#PAUSE\(([\d\.]+)\)").expect("static regex"));

/// 取消检查间隔
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 语音识别 (外部服务)
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// 播放一段文本, 被取消时应尽快返回
pub trait Speaker: Send + Sync {
    fn play(&self, text: &str, cancel: &CancelToken) -> Result<()>;
}

/// 取消令牌: 发出后有新的话语 (或 stop) 即视为取消
#[derive(Clone)]
pub struct CancelToken {
    generation: Arc<AtomicU64>,
    id: u64,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.generation.load(Ordering::Acquire) != self.id
    }

    /// 可被打断的等待, 返回 false 表示被取消
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if self.is_cancelled() {
                return false;
            }
            thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }
        !self.is_cancelled()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SpeechSegment {
    Text(String),
    Pause(Duration),
}

/// 按 `#PAUSE(秒)` 拆分文本, 空白段被丢弃
pub fn split_pauses(text: &str) -> Vec<SpeechSegment> {
    fn push_text(s: &str, segments: &mut Vec<SpeechSegment>) {
        let s = s.trim();
        if !s.is_empty() {
            segments.push(SpeechSegment::Text(s.to_string()));
        }
    }

    let mut segments = Vec::new();
    let mut last = 0;
    for caps in PAUSE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_text(&text[last..whole.start()], &mut segments);
        match caps[1].parse::<f32>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => {
                segments.push(SpeechSegment::Pause(secs_to_duration(secs)))
            }
            _ => debug!("忽略无效停顿: {}", whole.as_str()),
        }
        last = whole.end();
    }
    push_text(&text[last..], &mut segments);
    segments
}

/// 去掉基本多文种平面以外的字符 (emoji)
pub fn strip_emoji(text: &str) -> String {
    text.chars().filter(|c| (*c as u32) < 0x10000).collect()
}

// ========== 外部合成程序 ==========

/// 每段文本启动一次合成程序 (如 espeak-ng), 取消时结束子进程
pub struct ProcessSpeaker {
    program: String,
    args: Vec<String>,
}

impl ProcessSpeaker {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    /// 合成程序能否启动 (以 --version 试运行, 不关心退出码)
    pub fn is_available(&self) -> bool {
        let spawned = std::process::Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                let _ = child.wait();
                true
            }
            Err(e) => {
                debug!("语音合成程序 {} 不可用: {}", self.program, e);
                false
            }
        }
    }

    fn spawn(&self, text: &str) -> Result<Child> {
        std::process::Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("无法启动语音合成程序: {}", self.program))
    }
}

impl Speaker for ProcessSpeaker {
    fn play(&self, text: &str, cancel: &CancelToken) -> Result<()> {
        let mut child = self.spawn(text)?;
        loop {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

// ========== 语音助手 ==========

struct Utterance {
    text: String,
    cancel: CancelToken,
}

/// 语音输出线程 + 对话历史
///
/// `say` 立即返回; 新的话语会打断当前正在播放的话语。
/// 播放失败一次后本次会话不再发声 (只记录日志和对话历史)。
pub struct VoiceAssistant {
    tx: Mutex<Option<Sender<Utterance>>>,
    generation: Arc<AtomicU64>,
    disabled: Arc<AtomicBool>,
    history: Option<Mutex<ConversationHistory>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceAssistant {
    pub fn new(speaker: Arc<dyn Speaker>, history: Option<ConversationHistory>) -> Result<Self> {
        let (tx, rx) = unbounded::<Utterance>();
        let disabled = Arc::new(AtomicBool::new(false));
        let worker_disabled = disabled.clone();
        let worker = thread::Builder::new()
            .name("nova-voice".into())
            .spawn(move || {
                for utterance in rx {
                    if worker_disabled.load(Ordering::Acquire) {
                        continue;
                    }
                    if let Err(e) = speak_segments(speaker.as_ref(), &utterance.text, &utterance.cancel) {
                        warn!("🔇 语音输出不可用, 本次会话禁用: {:#}", e);
                        worker_disabled.store(true, Ordering::Release);
                    }
                }
                debug!("语音线程退出");
            })
            .context("无法启动语音线程")?;
        info!("🗣️ 语音输出已启动");

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            generation: Arc::new(AtomicU64::new(0)),
            disabled,
            history: history.map(Mutex::new),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// 播放一段话 (打断当前播放), 并记录到对话历史
    pub fn say(&self, text: &str) {
        let text = strip_emoji(text);
        if text.trim().is_empty() {
            return;
        }
        self.record(Role::Assistant, &text);
        if self.is_disabled() {
            info!("🗣️ {}", text);
            return;
        }

        let id = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let utterance = Utterance {
            text,
            cancel: CancelToken {
                generation: self.generation.clone(),
                id,
            },
        };
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            let _ = tx.send(utterance);
        }
    }

    /// 语音输出是否已因播放失败而禁用
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// 停止当前播放
    pub fn stop_speaking(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record(&self, role: Role, text: &str) {
        if let Some(history) = &self.history {
            let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = history.add_turn(role, text) {
                warn!("❌ {:#}", e);
            }
        }
    }

    /// 最近的对话 (视觉问答的上下文)
    pub fn context(&self, limit: usize) -> String {
        match &self.history {
            Some(history) => history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .context_string(limit),
            None => String::new(),
        }
    }

    /// 识别一段录音并转换为命令
    pub fn transcribe_and_route(
        &self,
        stt: &dyn SpeechToText,
        samples: &[f32],
        sample_rate: u32,
    ) -> Option<Command> {
        let text = match stt.transcribe(samples, sample_rate) {
            Ok(text) => text,
            Err(e) => {
                warn!("❌ 语音识别失败: {:#}", e);
                return None;
            }
        };
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        info!("🎤 Voice: {}", text);
        self.record(Role::User, text);
        parse_command(text)
    }

    /// 停止播放并等待语音线程退出
    pub fn shutdown(&self) {
        self.stop_speaking();
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = worker {
            let _ = handle.join();
        }
    }
}

impl Drop for VoiceAssistant {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 逐段播放; 被打断时提前返回 Ok, 播放失败返回错误
fn speak_segments(speaker: &dyn Speaker, text: &str, cancel: &CancelToken) -> Result<()> {
    for segment in split_pauses(text) {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match segment {
            SpeechSegment::Text(s) => speaker.play(&s, cancel)?,
            SpeechSegment::Pause(d) => {
                if !cancel.sleep(d) {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 记录播放内容; 以 "long" 开头的文本一直播放到被取消
    #[derive(Default)]
    struct RecordingSpeaker {
        started: Mutex<Vec<String>>,
        played: Mutex<Vec<(String, bool)>>,
    }

    impl Speaker for RecordingSpeaker {
        fn play(&self, text: &str, cancel: &CancelToken) -> Result<()> {
            self.started.lock().unwrap().push(text.to_string());
            let mut completed = true;
            if text.starts_with("long") {
                completed = cancel.sleep(Duration::from_secs(5));
            }
            self.played.lock().unwrap().push((text.to_string(), completed));
            Ok(())
        }
    }

    fn wait_for(speaker: &RecordingSpeaker, n: usize) -> Vec<(String, bool)> {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let played = speaker.played.lock().unwrap().clone();
            if played.len() >= n || Instant::now() > deadline {
                return played;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_split_pauses() {
        let segments = split_pauses("Hello #PAUSE(0.5) world#PAUSE(1)");
        assert_eq!(
            segments,
            vec![
                SpeechSegment::Text("Hello".into()),
                SpeechSegment::Pause(Duration::from_millis(500)),
                SpeechSegment::Text("world".into()),
                SpeechSegment::Pause(Duration::from_secs(1)),
            ]
        );
        assert!(split_pauses("   ").is_empty());
    }

    #[test]
    fn test_strip_emoji() {
        assert_eq!(strip_emoji("Found 2 objects ✅🚪"), "Found 2 objects ✅");
    }

    #[test]
    fn test_new_utterance_interrupts_current() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let voice = VoiceAssistant::new(speaker.clone(), None).unwrap();

        voice.say("long story");
        let deadline = Instant::now() + Duration::from_secs(3);
        while speaker.started.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        voice.say("Lost track. Rescanning.");

        let played = wait_for(&speaker, 2);
        assert_eq!(played.len(), 2);
        assert_eq!(played[0], ("long story".to_string(), false));
        assert_eq!(played[1], ("Lost track. Rescanning.".to_string(), true));
        voice.shutdown();
    }

    #[test]
    fn test_missing_program_disables_voice() {
        let speaker = ProcessSpeaker::new("nova-no-such-tts-program", &[]);
        assert!(!speaker.is_available());

        let voice = VoiceAssistant::new(Arc::new(speaker), None).unwrap();
        voice.say("Found 2 objects");
        let deadline = Instant::now() + Duration::from_secs(3);
        while !voice.is_disabled() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(voice.is_disabled());
        voice.shutdown();
    }

    #[test]
    fn test_failed_playback_stops_later_utterances() {
        #[derive(Default)]
        struct BrokenSpeaker {
            calls: Mutex<usize>,
        }
        impl Speaker for BrokenSpeaker {
            fn play(&self, _text: &str, _cancel: &CancelToken) -> Result<()> {
                *self.calls.lock().unwrap() += 1;
                anyhow::bail!("device busy")
            }
        }

        let speaker = Arc::new(BrokenSpeaker::default());
        let voice = VoiceAssistant::new(speaker.clone(), None).unwrap();
        voice.say("first");
        let deadline = Instant::now() + Duration::from_secs(3);
        while !voice.is_disabled() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(voice.is_disabled());

        voice.say("second");
        voice.say("third");
        voice.shutdown();
        assert_eq!(*speaker.calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_history_and_routing() {
        struct FixedStt(&'static str);
        impl SpeechToText for FixedStt {
            fn transcribe(&self, _: &[f32], _: u32) -> Result<String> {
                Ok(self.0.to_string())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let history = ConversationHistory::load(&dir.path().join("h.json"), 20);
        let voice = VoiceAssistant::new(Arc::new(RecordingSpeaker::default()), Some(history)).unwrap();

        let cmd = voice.transcribe_and_route(&FixedStt("track my keys"), &[], 16000);
        assert_eq!(cmd, Some(Command::Track("keys".into())));
        voice.say("Tracking keys");
        assert_eq!(voice.context(5), "User: track my keys\nNova: Tracking keys");

        assert_eq!(voice.transcribe_and_route(&FixedStt("  "), &[], 16000), None);
    }
}
