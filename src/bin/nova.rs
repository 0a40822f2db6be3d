/// Nova 辅助导航 (Nova Assistive Navigation)
///
/// 系统架构:
/// 1. 主线程:   读取帧 → 发布到共享状态, 转发终端命令
/// 2. 跟踪线程: 跟踪 + 后台检测 + 命令处理 (~20Hz)
/// 3. 音频线程: 快照 → 空间音频 (设备不可用时静音)
use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{unbounded, Sender};
use mimalloc::MiMalloc;
use nova_nav::config::{default_config_path, AppConfig};
use nova_nav::learning::{JsonLearningStore, LearningStore};
use nova_nav::pipeline::{CaptureLoop, FrameSource, FrameTransform, ImageSequenceSource, SyntheticSource, TrackingLoop};
use nova_nav::tracking::{default_tracker_factory, ObjectManager};
use nova_nav::vision::{GeminiClient, VisionService};
use nova_nav::voice::{parse_input, ConversationHistory, ProcessSpeaker, VoiceAssistant};
use nova_nav::{AudioEngine, Command, ModeController, NavigationMode, SharedState};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 退出时等待各线程的最长时间
const JOIN_GRACE: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(author, version, about = "Nova - 辅助导航", long_about = None)]
struct Args {
    /// 配置文件 (默认在数据目录下)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 图像序列目录 (代替摄像头)
    #[arg(long)]
    frames: Option<PathBuf>,

    /// 使用内置合成场景
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// 采集帧率上限
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// 初始模式 (navigation/obstacle/social/exploration)
    #[arg(short, long)]
    mode: Option<NavigationMode>,

    /// 导航目标
    #[arg(short, long)]
    target: Option<String>,

    /// 关闭空间音频
    #[arg(long, default_value_t = false)]
    no_audio: bool,

    /// 关闭语音输出
    #[arg(long, default_value_t = false)]
    no_voice: bool,

    /// 眼镜摄像头: 取右半幅并顺时针旋转 90°
    #[arg(long, default_value_t = false)]
    rotate_glasses: bool,

    /// 日志过滤 (同 RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nova_nav=info,nova=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Nova 辅助导航启动");
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load(&config_path);
    config.print_summary();

    let shared = Arc::new(SharedState::new());

    // ========== 对象管理 + 模式控制 ==========
    let factory = default_tracker_factory(config.tracking.tracker_search_margin, config.tracking.tracker_min_score);
    let manager = ObjectManager::new(config.tracking.clone(), config.threat.clone(), factory);
    let mode = args.mode.unwrap_or(config.default_mode);
    let target = args.target.clone().unwrap_or_else(|| config.default_target.clone());
    let controller = ModeController::new(manager, mode, &target, &config.tracking);

    // ========== 外部服务 ==========
    let vision: Arc<dyn VisionService> = Arc::new(GeminiClient::new(&config.vision));

    let speaker = ProcessSpeaker::new(&config.voice.tts_program, &config.voice.tts_args);
    let voice = if args.no_voice {
        None
    } else if !speaker.is_available() {
        warn!("🔇 语音合成程序 {} 不可用, 语音已禁用", config.voice.tts_program);
        None
    } else {
        let speaker = Arc::new(speaker);
        let history = ConversationHistory::load(&config.voice.history_path, config.voice.history_max_turns);
        match VoiceAssistant::new(speaker, Some(history)) {
            Ok(v) => Some(Arc::new(v)),
            Err(e) => {
                warn!("⚠️ 语音不可用: {:#}", e);
                None
            }
        }
    };

    let learning: Option<Box<dyn LearningStore>> = if config.learning.enabled {
        match JsonLearningStore::open(&config.learning) {
            Ok(store) => Some(Box::new(store)),
            Err(e) => {
                warn!("⚠️ 学习记忆不可用: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    // ========== 启动跟踪线程 ==========
    let mut tracking = TrackingLoop::new(shared.clone(), controller, vision, &config);
    if let Some(v) = &voice {
        tracking = tracking.with_voice(v.clone());
    }
    if let Some(store) = learning {
        tracking = tracking.with_learning(store);
    }
    let tracking_thread = thread::Builder::new()
        .name("nova-tracking".into())
        .spawn(move || tracking.run())?;

    // ========== 启动音频 ==========
    let audio = if args.no_audio {
        AudioEngine::silent()
    } else {
        AudioEngine::start(&config.audio, shared.clone())
    };
    info!("🔊 音频模式: {:?}", audio.mode());

    // ========== 终端输入 ==========
    let (tx, rx) = unbounded::<Command>();
    spawn_stdin_reader(tx);
    print_help();

    // ========== 主线程: 采集 ==========
    let source: Box<dyn FrameSource> = match &args.frames {
        Some(dir) if !args.synthetic => Box::new(ImageSequenceSource::open(dir)?),
        _ => {
            info!("🎲 使用合成场景");
            Box::new(SyntheticSource::new(640, 480, 3, 42))
        }
    };
    let transform = if args.rotate_glasses {
        FrameTransform::GlassesRight
    } else {
        FrameTransform::None
    };

    shared.push_command(Command::Detect);
    let mut capture = CaptureLoop::new(shared.clone(), source, transform, rx, Some(args.fps));
    capture.run();

    // ========== 退出 ==========
    shared.request_shutdown();
    join_with_grace("跟踪", tracking_thread);
    audio.stop();
    if let Some(v) = voice {
        v.shutdown();
    }
    info!("👋 Nova 已退出");
    Ok(())
}

/// 终端读取线程 (阻塞读取, 不等待退出)
fn spawn_stdin_reader(tx: Sender<Command>) {
    let spawned = thread::Builder::new().name("nova-stdin".into()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_input(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if !line.trim().is_empty() => warn!("⚠️ 未知输入: {}", line.trim()),
                None => {}
            }
        }
    });
    if let Err(e) = spawned {
        warn!("⚠️ 无法启动终端输入线程: {}", e);
    }
}

fn join_with_grace(name: &str, handle: JoinHandle<()>) {
    let deadline = Instant::now() + JOIN_GRACE;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        warn!("⚠️ {}线程未在 {:?} 内退出", name, JOIN_GRACE);
    }
}

fn print_help() {
    info!("⌨️  按键: f/r=检测 m=切换模式 n=普通模式 d=描述场景 x=停止跟踪 h=帮助 q=退出");
    info!("⌨️  或输入一句话, 例如 'track my keys', 'where is my phone', 'obstacle mode'");
}
