//! 帧采集: 帧源 + 采集循环 (主线程)

use crate::config::secs_to_duration;
use crate::state::{Command, SharedState};
use crate::tracking::Frame;
use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use image::imageops;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 帧源; None 表示流结束
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Option<Frame>;
}

// ========== 图像序列 ==========

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// 目录中的图像按文件名顺序作为摄像头帧
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    index: usize,
    frame_id: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("无法读取目录: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        if paths.is_empty() {
            bail!("目录中没有图像: {}", dir.display());
        }
        paths.sort();
        info!("📂 图像序列: {} 帧 ({})", paths.len(), dir.display());
        Ok(Self {
            paths,
            index: 0,
            frame_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Option<Frame> {
        while self.index < self.paths.len() {
            let path = &self.paths[self.index];
            self.index += 1;
            match image::open(path) {
                Ok(img) => {
                    self.frame_id += 1;
                    return Some(Frame::new(img.to_rgb8(), self.frame_id));
                }
                Err(e) => warn!("⚠️ 跳过无法解码的图像 {}: {}", path.display(), e),
            }
        }
        None
    }
}

// ========== 合成场景 ==========

struct Block {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    size: u32,
    colors: [Rgb<u8>; 2],
}

/// 内置测试场景: 带纹理的方块在画面中反弹移动
pub struct SyntheticSource {
    width: u32,
    height: u32,
    blocks: Vec<Block>,
    frame_id: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let blocks = (0..count)
            .map(|_| {
                let size = rng.gen_range(40..=96).min(width.min(height) / 2).max(8);
                Block {
                    x: rng.gen_range(0.0..(width - size) as f32),
                    y: rng.gen_range(0.0..(height - size) as f32),
                    vx: rng.gen_range(-4.0..4.0),
                    vy: rng.gen_range(-3.0..3.0),
                    size,
                    colors: [
                        Rgb([rng.gen(), rng.gen(), rng.gen()]),
                        Rgb([rng.gen(), rng.gen(), rng.gen()]),
                    ],
                }
            })
            .collect();
        Self {
            width,
            height,
            blocks,
            frame_id: 0,
            limit: None,
        }
    }

    /// 只生成 n 帧
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    fn render(&self) -> RgbImage {
        let mut img = RgbImage::from_fn(self.width, self.height, |x, y| {
            let v = (40 + (x / 16 + y / 16) % 2 * 10) as u8;
            Rgb([v, v, v + 5])
        });
        for b in &self.blocks {
            let (x, y) = (b.x as i32, b.y as i32);
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(b.size, b.size), b.colors[0]);
            // 棋盘纹理, 便于相关匹配
            let cell = (b.size / 4).max(2);
            for cy in 0..4 {
                for cx in 0..4 {
                    if (cx + cy) % 2 == 0 {
                        let rect = Rect::at(x + (cx * cell) as i32, y + (cy * cell) as i32).of_size(cell, cell);
                        draw_filled_rect_mut(&mut img, rect, b.colors[1]);
                    }
                }
            }
        }
        img
    }

    fn step(&mut self) {
        let (w, h) = (self.width as f32, self.height as f32);
        for b in &mut self.blocks {
            let s = b.size as f32;
            b.x += b.vx;
            b.y += b.vy;
            if b.x < 0.0 || b.x + s > w {
                b.vx = -b.vx;
                b.x = b.x.clamp(0.0, w - s);
            }
            if b.y < 0.0 || b.y + s > h {
                b.vy = -b.vy;
                b.y = b.y.clamp(0.0, h - s);
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Option<Frame> {
        if self.limit.is_some_and(|n| self.frame_id >= n) {
            return None;
        }
        let img = self.render();
        self.step();
        self.frame_id += 1;
        Some(Frame::new(img, self.frame_id))
    }
}

// ========== 帧变换 ==========

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameTransform {
    #[default]
    None,
    /// 眼镜右侧摄像头: 取右半幅后顺时针旋转 90°
    GlassesRight,
}

impl FrameTransform {
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        match self {
            FrameTransform::None => image.clone(),
            FrameTransform::GlassesRight => {
                let (w, h) = image.dimensions();
                let half = imageops::crop_imm(image, w / 2, 0, w - w / 2, h).to_image();
                imageops::rotate90(&half)
            }
        }
    }
}

// ========== 采集循环 ==========

pub struct CaptureLoop {
    shared: Arc<SharedState>,
    source: Box<dyn FrameSource>,
    transform: FrameTransform,
    commands: Receiver<Command>,
    frame_interval: Option<Duration>,

    // 统计
    frames: u64,
    count: u64,
    last: Instant,
}

impl CaptureLoop {
    pub fn new(
        shared: Arc<SharedState>,
        source: Box<dyn FrameSource>,
        transform: FrameTransform,
        commands: Receiver<Command>,
        fps: Option<f32>,
    ) -> Self {
        Self {
            shared,
            source,
            transform,
            commands,
            frame_interval: fps.filter(|f| *f > 0.0).map(|f| secs_to_duration(1.0 / f)),
            frames: 0,
            count: 0,
            last: Instant::now(),
        }
    }

    /// 读取并发布帧, 直到流结束或收到退出; 返回发布的帧数
    pub fn run(&mut self) -> u64 {
        info!("📷 采集循环启动");
        while self.shared.is_running() {
            let started = Instant::now();
            self.forward_commands();
            if !self.shared.is_running() {
                break;
            }

            let Some(frame) = self.source.read_frame() else {
                info!("🏁 帧源结束");
                self.shared.request_shutdown();
                break;
            };
            let frame = match self.transform {
                FrameTransform::None => frame,
                t => Frame::with_timestamp(t.apply(frame.image.as_ref()), frame.frame_id, frame.timestamp),
            };
            self.shared.update_frame(frame);
            self.frames += 1;
            self.log_stats();

            if let Some(rest) = self
                .frame_interval
                .and_then(|i| i.checked_sub(started.elapsed()))
            {
                thread::sleep(rest);
            }
        }
        info!("📷 采集循环退出, 共 {} 帧", self.frames);
        self.frames
    }

    /// 界面命令转发到共享队列; 退出命令直接生效
    fn forward_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            debug!("输入命令: {:?}", command);
            if command == Command::Quit {
                info!("👋 收到退出命令");
                self.shared.request_shutdown();
                return;
            }
            self.shared.push_command(command);
        }
    }

    fn log_stats(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.count as f32 / elapsed.as_secs_f32();
            self.shared.set_fps(fps);
            let state = self.shared.display_state();
            info!(
                "📊 采集 {:.1} FPS | 状态 {} | 对象 {}",
                fps,
                state.status,
                state.objects.len()
            );
            self.count = 0;
            self.last = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_glasses_transform() {
        let mut image = RgbImage::new(8, 4);
        // 右半幅左上角
        image.put_pixel(4, 0, Rgb([255, 0, 0]));
        let out = FrameTransform::GlassesRight.apply(&image);
        assert_eq!(out.dimensions(), (4, 4));
        // 顺时针旋转后左上角 → 右上角
        assert_eq!(out.get_pixel(3, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_synthetic_source_moves_and_ends() {
        let mut source = SyntheticSource::new(320, 240, 2, 7).with_limit(3);
        let a = source.read_frame().unwrap();
        let b = source.read_frame().unwrap();
        assert_eq!(a.dims().width, 320);
        assert_eq!((a.frame_id, b.frame_id), (1, 2));
        assert_ne!(a.image.as_raw(), b.image.as_raw());
        assert!(source.read_frame().is_some());
        assert!(source.read_frame().is_none());
    }

    #[test]
    fn test_image_sequence_order_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("b.png")).unwrap();
        RgbImage::new(6, 6).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("c.png"), b"not an image").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.read_frame().unwrap().dims().width, 6);
        assert_eq!(source.read_frame().unwrap().dims().width, 4);
        assert!(source.read_frame().is_none());

        let empty = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::open(empty.path()).is_err());
    }

    #[test]
    fn test_capture_loop_forwards_commands_and_stops_at_end() {
        let shared = Arc::new(SharedState::new());
        let (tx, rx) = unbounded();
        tx.send(Command::Detect).unwrap();
        let source = SyntheticSource::new(64, 48, 1, 1).with_limit(5);
        let mut capture = CaptureLoop::new(shared.clone(), Box::new(source), FrameTransform::None, rx, None);

        assert_eq!(capture.run(), 5);
        assert!(!shared.is_running());
        assert_eq!(shared.next_command(), Some(Command::Detect));
        assert_eq!(shared.latest_frame().unwrap().1, 5);
    }

    #[test]
    fn test_quit_command_stops_capture() {
        let shared = Arc::new(SharedState::new());
        let (tx, rx) = unbounded();
        tx.send(Command::Quit).unwrap();
        let source = SyntheticSource::new(64, 48, 1, 1);
        let mut capture = CaptureLoop::new(shared.clone(), Box::new(source), FrameTransform::None, rx, None);
        assert_eq!(capture.run(), 0);
        assert!(!shared.is_running());
    }
}
