//! 学习记忆: 记录对象出现的位置, 回答 "我的X在哪里"
//!
//! 画面划分为 grid_width × grid_height 网格, 每次检测记录所在网格,
//! 并累计 (网格, 标签) 出现频率。数据保存为 JSON 文件。

use crate::config::LearningConfig;
use crate::tables::label_key;
use crate::tracking::{BBox, Frame, FrameDims};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 最多保留的检测记录
const MAX_RECORDS: usize = 5000;
/// 缓存截图尺寸 / JPEG 质量
const CACHE_SIZE: (u32, u32) = (320, 240);
const CACHE_QUALITY: u8 = 50;

/// 学习存储接口
pub trait LearningStore: Send {
    fn save_detection(
        &mut self,
        frame: &Frame,
        label: &str,
        bbox: &BBox,
        confidence: f32,
        context: Option<&str>,
    ) -> Result<()>;

    /// 最近一次见到该对象的位置
    fn recall_object(&self, label: &str) -> Option<Recall>;

    /// 历史上最常出现的网格及其概率
    fn likely_location(&self, label: &str) -> Option<(u32, u32, f32)>;

    /// 网格坐标的自然语言描述
    fn describe_location(&self, grid_x: u32, grid_y: u32) -> String;

    fn stats(&self) -> LearningStats;
}

/// 检测记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub label: String,
    pub context: Option<String>,
    pub grid_x: u32,
    pub grid_y: u32,
    pub confidence: f32,
    pub timestamp: String,
    pub image_path: Option<PathBuf>,
}

/// 网格频率
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub grid_x: u32,
    pub grid_y: u32,
    pub label: String,
    pub frequency: u32,
    pub last_seen: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreData {
    detections: Vec<DetectionRecord>,
    room_grid: Vec<GridCell>,
}

/// 回忆结果
#[derive(Clone, Debug, PartialEq)]
pub struct Recall {
    pub label: String,
    pub context: Option<String>,
    pub grid_x: u32,
    pub grid_y: u32,
    pub location_desc: String,
    pub time_ago: String,
    pub confidence: f32,
}

impl Recall {
    /// 朗读用句子
    pub fn sentence(&self) -> String {
        format!(
            "I last saw the {} at the {}, {}.",
            self.label, self.location_desc, self.time_ago
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LearningStats {
    pub total_detections: usize,
    pub unique_labels: usize,
    pub grid_cells_mapped: usize,
}

// ========== 工具函数 ==========

/// 框中心 → 网格坐标 (裁剪到网格内)
pub fn bbox_to_grid(bbox: &BBox, dims: FrameDims, grid_w: u32, grid_h: u32) -> (u32, u32) {
    let (cx, cy) = bbox.center();
    let gx = ((cx / dims.width.max(1) as f32) * grid_w as f32).floor() as i64;
    let gy = ((cy / dims.height.max(1) as f32) * grid_h as f32).floor() as i64;
    (
        gx.clamp(0, grid_w.saturating_sub(1) as i64) as u32,
        gy.clamp(0, grid_h.saturating_sub(1) as i64) as u32,
    )
}

/// 网格 → 自然语言位置
pub fn grid_to_description(gx: u32, gy: u32, grid_w: u32, grid_h: u32) -> String {
    let (x, y) = (gx as f32, gy as f32);
    let h_pos = if x < grid_w as f32 / 3.0 {
        "left side"
    } else if x > 2.0 * grid_w as f32 / 3.0 {
        "right side"
    } else {
        "center"
    };
    let v_pos = if y < grid_h as f32 / 3.0 {
        "top"
    } else if y > 2.0 * grid_h as f32 / 3.0 {
        "bottom"
    } else {
        "middle"
    };

    match (h_pos, v_pos) {
        ("center", "middle") => "center of view".to_string(),
        ("center", v) => format!("{} center", v),
        (h, "middle") => h.to_string(),
        (h, v) => format!("{} {}", v, h),
    }
}

/// 时间差 → "N seconds/minutes/hours/days ago"
pub fn time_ago(seconds: i64) -> String {
    let s = seconds.max(0);
    if s < 60 {
        format!("{} seconds ago", s)
    } else if s < 3600 {
        format!("{} minutes ago", s / 60)
    } else if s < 86400 {
        format!("{} hours ago", s / 3600)
    } else {
        format!("{} days ago", s / 86400)
    }
}

/// 标签匹配: 忽略大小写的全等, 或最后一个单词相同
fn label_matches(stored: &str, query: &str) -> bool {
    stored.eq_ignore_ascii_case(query.trim()) || label_key(stored) == label_key(query)
}

/// 8x8 均值哈希 (截图去重)
fn average_hash(image: &image::RgbImage) -> u64 {
    let small = imageops::resize(&imageops::grayscale(image), 8, 8, FilterType::Triangle);
    let mean = small.pixels().map(|p| p[0] as u32).sum::<u32>() / 64;
    small
        .pixels()
        .enumerate()
        .fold(0u64, |acc, (i, p)| if p[0] as u32 > mean { acc | (1 << i) } else { acc })
}

// ========== JSON 存储 ==========

pub struct JsonLearningStore {
    path: PathBuf,
    image_cache_dir: Option<PathBuf>,
    grid_width: u32,
    grid_height: u32,
    data: StoreData,
}

impl JsonLearningStore {
    /// 打开存储; 文件不存在时为空, 损坏时警告后从空开始
    pub fn open(config: &LearningConfig) -> Result<Self> {
        let data = match fs::read_to_string(&config.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("⚠️ 学习记录解析失败, 重新开始: {}", e);
                StoreData::default()
            }),
            Err(_) => StoreData::default(),
        };
        if let Some(dir) = &config.image_cache_dir {
            fs::create_dir_all(dir).with_context(|| format!("创建缓存目录失败: {}", dir.display()))?;
        }
        info!(
            "🧠 学习记忆: {} 条记录, 网格 {}x{}",
            data.detections.len(),
            config.grid_width,
            config.grid_height
        );
        Ok(Self {
            path: config.path.clone(),
            image_cache_dir: config.image_cache_dir.clone(),
            grid_width: config.grid_width.max(1),
            grid_height: config.grid_height.max(1),
            data,
        })
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, json).with_context(|| format!("写入失败: {}", self.path.display()))
    }

    /// 截图缓存 (同内容只保存一次)
    fn cache_image(&self, dir: &Path, frame: &Frame, bbox: &BBox) -> Result<PathBuf> {
        let r = bbox.clamp_to(frame.dims());
        let crop = imageops::crop_imm(frame.image.as_ref(), r.x, r.y, r.w, r.h).to_image();
        let resized = imageops::resize(&crop, CACHE_SIZE.0, CACHE_SIZE.1, FilterType::Triangle);
        let path = dir.join(format!("{:016x}.jpg", average_hash(&resized)));
        if path.exists() {
            return Ok(path);
        }
        let file = File::create(&path).with_context(|| format!("创建失败: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, CACHE_QUALITY)
            .encode_image(&resized)
            .context("JPEG编码失败")?;
        Ok(path)
    }

    fn bump_grid(&mut self, label: &str, gx: u32, gy: u32, now: &str) {
        match self
            .data
            .room_grid
            .iter_mut()
            .find(|c| c.grid_x == gx && c.grid_y == gy && c.label == label)
        {
            Some(cell) => {
                cell.frequency += 1;
                cell.last_seen = now.to_string();
            }
            None => self.data.room_grid.push(GridCell {
                grid_x: gx,
                grid_y: gy,
                label: label.to_string(),
                frequency: 1,
                last_seen: now.to_string(),
            }),
        }
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.data.detections
    }
}

impl LearningStore for JsonLearningStore {
    fn save_detection(
        &mut self,
        frame: &Frame,
        label: &str,
        bbox: &BBox,
        confidence: f32,
        context: Option<&str>,
    ) -> Result<()> {
        let (gx, gy) = bbox_to_grid(bbox, frame.dims(), self.grid_width, self.grid_height);
        let now = Local::now().to_rfc3339();

        let image_path = match &self.image_cache_dir {
            Some(dir) => match self.cache_image(dir, frame, bbox) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("❌ 截图缓存失败: {:#}", e);
                    None
                }
            },
            None => None,
        };

        self.data.detections.push(DetectionRecord {
            label: label.to_string(),
            context: context.map(str::to_string),
            grid_x: gx,
            grid_y: gy,
            confidence,
            timestamp: now.clone(),
            image_path,
        });
        if self.data.detections.len() > MAX_RECORDS {
            let excess = self.data.detections.len() - MAX_RECORDS;
            self.data.detections.drain(..excess);
        }
        self.bump_grid(label, gx, gy, &now);
        debug!("💾 记录: {} 位于网格({},{}) conf={:.2}", label, gx, gy, confidence);
        self.persist()
    }

    fn recall_object(&self, label: &str) -> Option<Recall> {
        let record = self
            .data
            .detections
            .iter()
            .rev()
            .find(|r| label_matches(&r.label, label))?;

        let seconds = DateTime::parse_from_rfc3339(&record.timestamp)
            .map(|t| (Local::now() - t.with_timezone(&Local)).num_seconds())
            .unwrap_or(0);

        let mut location_desc = grid_to_description(record.grid_x, record.grid_y, self.grid_width, self.grid_height);
        if let Some(ctx) = &record.context {
            location_desc.push_str(&format!(" ({})", ctx));
        }

        Some(Recall {
            label: record.label.clone(),
            context: record.context.clone(),
            grid_x: record.grid_x,
            grid_y: record.grid_y,
            location_desc,
            time_ago: time_ago(seconds),
            confidence: record.confidence,
        })
    }

    fn likely_location(&self, label: &str) -> Option<(u32, u32, f32)> {
        let cells: Vec<&GridCell> = self
            .data
            .room_grid
            .iter()
            .filter(|c| label_matches(&c.label, label))
            .collect();
        let total: u32 = cells.iter().map(|c| c.frequency).sum();
        if total == 0 {
            return None;
        }
        // 频率相同时取最近一次出现的
        let best = cells
            .iter()
            .max_by(|a, b| a.frequency.cmp(&b.frequency).then_with(|| a.last_seen.cmp(&b.last_seen)))?;
        Some((best.grid_x, best.grid_y, best.frequency as f32 / total as f32))
    }

    fn describe_location(&self, grid_x: u32, grid_y: u32) -> String {
        grid_to_description(grid_x, grid_y, self.grid_width, self.grid_height)
    }

    fn stats(&self) -> LearningStats {
        let labels: HashSet<&str> = self.data.detections.iter().map(|r| r.label.as_str()).collect();
        LearningStats {
            total_detections: self.data.detections.len(),
            unique_labels: labels.len(),
            grid_cells_mapped: self.data.room_grid.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn store(dir: &Path, cache: bool) -> JsonLearningStore {
        let config = LearningConfig {
            enabled: true,
            path: dir.join("learning.json"),
            image_cache_dir: cache.then(|| dir.join("cache")),
            grid_width: 10,
            grid_height: 8,
        };
        JsonLearningStore::open(&config).unwrap()
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::from_fn(640, 480, |x, y| Rgb([x as u8, y as u8, 7])), 0)
    }

    #[test]
    fn test_grid_mapping_and_description() {
        let dims = FrameDims::new(640, 480);
        assert_eq!(bbox_to_grid(&BBox::new(0.0, 0.0, 10.0, 10.0), dims, 10, 8), (0, 0));
        assert_eq!(bbox_to_grid(&BBox::new(630.0, 470.0, 40.0, 40.0), dims, 10, 8), (9, 7));

        assert_eq!(grid_to_description(5, 4, 10, 8), "center of view");
        assert_eq!(grid_to_description(0, 0, 10, 8), "top left side");
        assert_eq!(grid_to_description(9, 4, 10, 8), "right side");
        assert_eq!(grid_to_description(5, 7, 10, 8), "bottom center");
    }

    #[test]
    fn test_time_ago() {
        assert_eq!(time_ago(5), "5 seconds ago");
        assert_eq!(time_ago(125), "2 minutes ago");
        assert_eq!(time_ago(7200), "2 hours ago");
        assert_eq!(time_ago(3 * 86400 + 5), "3 days ago");
    }

    #[test]
    fn test_save_recall_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let f = frame();
        {
            let mut s = store(dir.path(), false);
            s.save_detection(&f, "Black Phone", &BBox::new(10.0, 10.0, 40.0, 40.0), 0.9, Some("on desk"))
                .unwrap();
            s.save_detection(&f, "Black Phone", &BBox::new(300.0, 220.0, 40.0, 40.0), 0.8, None)
                .unwrap();
        }

        // 重新打开后仍然可以回忆
        let s = store(dir.path(), false);
        let recall = s.recall_object("phone").unwrap();
        assert_eq!(recall.label, "Black Phone");
        assert_eq!((recall.grid_x, recall.grid_y), (5, 4));
        assert_eq!(recall.location_desc, "center of view");
        assert!(recall.time_ago.ends_with("seconds ago"));
        assert!(recall.sentence().contains("Black Phone"));
        assert!(s.recall_object("keys").is_none());

        let stats = s.stats();
        assert_eq!(stats.total_detections, 2);
        assert_eq!(stats.unique_labels, 1);
        assert_eq!(stats.grid_cells_mapped, 2);
    }

    #[test]
    fn test_likely_location_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let f = frame();
        let mut s = store(dir.path(), false);
        let left = BBox::new(10.0, 10.0, 40.0, 40.0);
        let right = BBox::new(600.0, 10.0, 30.0, 30.0);
        for _ in 0..3 {
            s.save_detection(&f, "cup", &left, 1.0, None).unwrap();
        }
        s.save_detection(&f, "cup", &right, 1.0, None).unwrap();

        let (gx, gy, p) = s.likely_location("cup").unwrap();
        assert_eq!((gx, gy), (0, 0));
        assert!((p - 0.75).abs() < 1e-6);
        assert!(s.likely_location("door").is_none());
        assert_eq!(s.describe_location(gx, gy), "top left side");
    }

    #[test]
    fn test_image_cache_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let f = frame();
        let mut s = store(dir.path(), true);
        let b = BBox::new(100.0, 100.0, 80.0, 60.0);
        s.save_detection(&f, "cup", &b, 1.0, None).unwrap();
        s.save_detection(&f, "cup", &b, 1.0, None).unwrap();

        let paths: Vec<_> = s.records().iter().filter_map(|r| r.image_path.clone()).collect();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], paths[1]);
        assert!(paths[0].exists());
        assert_eq!(fs::read_dir(dir.path().join("cache")).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("learning.json"), "][").unwrap();
        let s = store(dir.path(), false);
        assert_eq!(s.stats(), LearningStats::default());
    }
}
