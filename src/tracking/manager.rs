//! 对象管理器 (Object Manager)
//!
//! 状态机: Active ⇄ Lost
//! - Active → Lost:   跟踪器更新失败 / 没有跟踪器
//! - Lost → Active:   跟踪器重新成功 / 本地找回 / 检测合并 (IoU > 0.1)
//! - 任意 → 删除:      超过 max_age 未被检测确认 / 清空 / 模式切换 / 主威胁丢失

use super::geometry::{self, detection_to_bbox, iou};
use super::object::{ObjectSnapshot, TrackedObject};
use super::recovery::{capture_template, LocalRecovery};
use super::threat::{proximity_zone, ProximityZone};
use super::tracker::TrackerFactory;
use super::types::{BBox, Frame, FrameDims};
use crate::config::{ThreatConfig, TrackingConfig};
use crate::vision::parse::split_label_context;
use crate::vision::RawDetection;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct ObjectManager {
    objects: Vec<TrackedObject>,
    next_id: u32,
    tracker_factory: TrackerFactory,
    recovery: LocalRecovery,
    tracking: TrackingConfig,
    threat: ThreatConfig,
}

impl ObjectManager {
    pub fn new(tracking: TrackingConfig, threat: ThreatConfig, tracker_factory: TrackerFactory) -> Self {
        Self {
            objects: Vec::new(),
            next_id: 1,
            tracker_factory,
            recovery: LocalRecovery::new(tracking.recovery_threshold),
            tracking,
            threat,
        }
    }

    // ========== 查询 ==========

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut TrackedObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn objects_by_label(&self, label: &str) -> Vec<&TrackedObject> {
        self.objects.iter().filter(|o| o.label == label).collect()
    }

    /// 面积最大的对象 (最近)
    pub fn closest(&self) -> Option<&TrackedObject> {
        self.objects
            .iter()
            .max_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
    }

    /// 中心离画面中心最近的对象
    pub fn centered(&self, dims: FrameDims) -> Option<&TrackedObject> {
        let (fx, fy) = (dims.width as f32 / 2.0, dims.height as f32 / 2.0);
        let dist = |o: &TrackedObject| {
            let (cx, cy) = o.bbox.center();
            (cx - fx).powi(2) + (cy - fy).powi(2)
        };
        self.objects.iter().min_by(|a, b| dist(a).total_cmp(&dist(b)))
    }

    /// 最高威胁对象
    pub fn highest_threat(&self) -> Option<&TrackedObject> {
        self.objects
            .iter()
            .max_by(|a, b| a.threat_score.total_cmp(&b.threat_score))
    }

    pub fn proximity_zone(&self, obj: &TrackedObject, dims: FrameDims) -> ProximityZone {
        proximity_zone(&obj.bbox, dims, self.threat.caution, self.threat.warning)
    }

    /// 只读快照 (深拷贝)
    pub fn snapshot(&self) -> Vec<ObjectSnapshot> {
        self.objects.iter().map(TrackedObject::snapshot).collect()
    }

    // ========== 增删 ==========

    pub fn add_object(
        &mut self,
        label: &str,
        bbox: BBox,
        confidence: f32,
        context: Option<String>,
        now: Instant,
    ) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.objects
            .push(TrackedObject::new(id, label, bbox, confidence, context, now));
        id
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| o.id != id);
        self.objects.len() != before
    }

    pub fn clear(&mut self) {
        if !self.objects.is_empty() {
            debug!("🧹 清空 {} 个跟踪对象", self.objects.len());
        }
        self.objects.clear();
    }

    /// 只保留给定标签的对象 (标签或其最后一个单词匹配, 忽略大小写)
    pub fn filter_by_labels(&mut self, labels: &[&str]) {
        self.objects.retain(|o| {
            let lower = o.label.to_lowercase();
            let key = crate::tables::label_key(&o.label);
            labels
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&lower) || l.eq_ignore_ascii_case(&key))
        });
    }

    /// 按置信度保留前 N 个
    pub fn limit(&mut self, max: usize) {
        if self.objects.len() <= max {
            return;
        }
        self.objects
            .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        self.objects.truncate(max);
    }

    /// 删除超过 max_age 未被检测确认的对象, 有删除时返回 true
    pub fn cleanup_stale(&mut self, max_age: Duration, now: Instant) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| {
            let keep = now.saturating_duration_since(o.last_verified) <= max_age;
            if !keep {
                info!("🗑️ 对象 #{} {} 过期移除", o.id, o.label);
            }
            keep
        });
        self.objects.len() != before
    }

    // ========== 每帧跟踪 ==========

    /// 逐个更新跟踪器, 返回成功跟踪的对象ID
    pub fn update_trackers(&mut self, frame: &Frame, now: Instant) -> Vec<u32> {
        let dims = frame.dims();
        let mut tracked = Vec::new();

        for obj in self.objects.iter_mut() {
            let result = match obj.tracker.as_mut() {
                Some(tracker) => tracker.update(frame),
                None => {
                    obj.mark_lost(now);
                    continue;
                }
            };

            match result {
                Some(bbox) => {
                    obj.move_to(bbox, now);
                    obj.clear_lost();
                    obj.predicted_bbox = self.tracking.motion_prediction.then(|| {
                        geometry::predict(
                            &obj.bbox,
                            obj.velocity,
                            self.tracking.prediction_horizon_secs,
                            self.tracking.min_velocity,
                        )
                    });
                    obj.threat_score = self
                        .threat
                        .formula
                        .score(&obj.label, &obj.bbox, obj.velocity, dims);
                    tracked.push(obj.id);
                }
                None => {
                    if !obj.is_lost {
                        debug!("⚠️ 对象 #{} {} 跟踪失败", obj.id, obj.label);
                    }
                    obj.mark_lost(now);
                }
            }
        }
        tracked
    }

    // ========== 检测合并 ==========

    /// 合并一批检测结果, 返回新建对象数量
    ///
    /// 同标签已有对象: 丢失状态 IoU > 0.1 即替换位置, 正常跟踪状态仅 IoU > 0.6 替换;
    /// IoU > 0.1 视为同一对象 (刷新确认时间 / 上下文 / 清除丢失)。否则新建对象。
    pub fn process_detections(&mut self, detections: &[RawDetection], dims: FrameDims, now: Instant) -> usize {
        let mut created = 0;

        for det in detections {
            let Some(bbox) = detection_to_bbox(&det.box_2d, dims, self.tracking.min_detection_side) else {
                debug!("跳过无效检测框: {:?}", det.box_2d);
                continue;
            };
            let (label, context) = split_label_context(&det.label);
            if label.is_empty() {
                continue;
            }

            let mut matched = false;
            for obj in self.objects.iter_mut().filter(|o| o.label == label) {
                let overlap = iou(&obj.bbox, &bbox);
                let replace = if obj.is_lost {
                    overlap > self.tracking.match_iou_lost
                } else {
                    overlap > self.tracking.match_iou_active
                };

                if replace {
                    obj.bbox = bbox;
                    obj.velocity = None;
                    obj.predicted_bbox = None;
                    obj.confidence = det.confidence.clamp(0.0, 1.0);
                    // 以新位置重新初始化跟踪器
                    obj.tracker = None;
                }

                if overlap > self.tracking.match_iou_lost {
                    obj.last_verified = now;
                    obj.context = context.clone();
                    obj.clear_lost();
                    matched = true;
                    break;
                }
            }

            if !matched {
                let id = self.add_object(&label, bbox, det.confidence, context.clone(), now);
                info!(
                    "➕ 新对象 #{}: {} ({:.0},{:.0},{:.0}x{:.0}) 上下文: {:?}",
                    id, label, bbox.x, bbox.y, bbox.w, bbox.h, context
                );
                created += 1;
            }
        }
        created
    }

    // ========== 跟踪器生命周期 ==========

    /// 为指定对象(重新)创建跟踪器; 失败时对象保留但没有跟踪器
    pub fn init_tracker(&mut self, id: u32, frame: &Frame) -> bool {
        let factory = self.tracker_factory.clone();
        let min_side = self.tracking.min_template_side;
        let Some(obj) = self.get_mut(id) else {
            return false;
        };

        let mut tracker = factory();
        match tracker.init(frame, obj.bbox) {
            Ok(()) => {
                obj.tracker = Some(tracker);
                if let Some(template) = capture_template(frame, &obj.bbox, min_side) {
                    obj.template = Some(template);
                    obj.last_template_update = Some(frame.timestamp);
                }
                true
            }
            Err(e) => {
                warn!("⚠️ 对象 #{} 跟踪器初始化失败: {}", id, e);
                obj.tracker = None;
                false
            }
        }
    }

    /// 为所有缺少跟踪器的对象初始化, 返回成功数量
    pub fn init_all_trackers(&mut self, frame: &Frame) -> usize {
        let pending: Vec<u32> = self
            .objects
            .iter()
            .filter(|o| o.tracker.is_none())
            .map(|o| o.id)
            .collect();
        pending
            .into_iter()
            .filter(|&id| self.init_tracker(id, frame))
            .count()
    }

    // ========== 模板 / 本地找回 ==========

    /// 截取外观模板 (框太小时跳过)
    pub fn update_template(&mut self, id: u32, frame: &Frame, now: Instant) -> bool {
        let min_side = self.tracking.min_template_side;
        let Some(obj) = self.get_mut(id) else {
            return false;
        };
        match capture_template(frame, &obj.bbox, min_side) {
            Some(template) => {
                obj.template = Some(template);
                obj.last_template_update = Some(now);
                true
            }
            None => false,
        }
    }

    /// 对所有带模板的丢失对象尝试本地找回, 返回找回的对象ID
    pub fn attempt_recoveries(&mut self, frame: &Frame, now: Instant) -> Vec<u32> {
        let mut found = Vec::new();
        for obj in self.objects.iter_mut().filter(|o| o.is_lost) {
            if let Some((bbox, score)) = self.recovery.recover(frame, obj.template.as_ref()) {
                info!("🔍 对象 #{} {} 本地找回 (score={:.2})", obj.id, obj.label, score);
                obj.bbox = bbox;
                obj.velocity = None;
                found.push(obj.id);
            }
        }
        for &id in &found {
            if self.init_tracker(id, frame) {
                if let Some(obj) = self.get_mut(id) {
                    obj.clear_lost();
                }
            }
            self.update_template(id, frame, now);
        }
        found
    }

    /// 正常跟踪对象按间隔刷新模板, 返回刷新数量
    pub fn refresh_templates(&mut self, frame: &Frame, now: Instant) -> usize {
        let interval = self.tracking.template_refresh_interval();
        let due: Vec<u32> = self
            .objects
            .iter()
            .filter(|o| !o.is_lost && o.has_tracker())
            .filter(|o| match o.last_template_update {
                Some(t) => now.saturating_duration_since(t) > interval,
                None => true,
            })
            .map(|o| o.id)
            .collect();
        due.into_iter()
            .filter(|&id| self.update_template(id, frame, now))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::tracker::VisualTracker;
    use crate::tracking::ThreatFormula;
    use anyhow::{bail, Result};
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// 按脚本返回结果的跟踪器
    struct ScriptedTracker {
        script: Arc<Mutex<VecDeque<Option<BBox>>>>,
        fail_init: bool,
    }

    impl VisualTracker for ScriptedTracker {
        fn init(&mut self, _frame: &Frame, _bbox: BBox) -> Result<()> {
            if self.fail_init {
                bail!("scripted init failure");
            }
            Ok(())
        }

        fn update(&mut self, _frame: &Frame) -> Option<BBox> {
            self.script.lock().unwrap().pop_front().flatten()
        }
    }

    fn scripted(results: Vec<Option<BBox>>) -> TrackerFactory {
        let script = Arc::new(Mutex::new(VecDeque::from(results)));
        Arc::new(move || {
            Box::new(ScriptedTracker {
                script: script.clone(),
                fail_init: false,
            }) as Box<dyn VisualTracker>
        })
    }

    fn manager(factory: TrackerFactory) -> ObjectManager {
        ObjectManager::new(TrackingConfig::default(), ThreatConfig::default(), factory)
    }

    fn frame(w: u32, h: u32) -> Frame {
        Frame::new(RgbImage::from_pixel(w, h, Rgb([40, 40, 40])), 0)
    }

    /// 1000x1000 帧中 box_2d 坐标即像素坐标
    fn det(label: &str, x: f32, y: f32, w: f32, h: f32) -> RawDetection {
        RawDetection {
            box_2d: vec![y, x, y + h, x + w],
            label: label.to_string(),
            confidence: 1.0,
        }
    }

    const DIMS: FrameDims = FrameDims {
        width: 1000,
        height: 1000,
    };

    #[test]
    fn test_active_object_keeps_bbox_at_moderate_iou() {
        let t0 = Instant::now();
        let mut m = manager(scripted(vec![]));
        let id = m.add_object("cup", BBox::new(0.0, 0.0, 100.0, 100.0), 1.0, None, t0);

        // IoU = 50*100 / (2*10000 - 5000) = 1/3
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(m.process_detections(&[det("cup", 50.0, 0.0, 100.0, 100.0)], DIMS, t1), 0);
        let obj = m.get(id).unwrap();
        assert_eq!(obj.bbox, BBox::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(obj.last_verified, t1);
    }

    #[test]
    fn test_active_object_iou_half_kept_high_replaced() {
        let t0 = Instant::now();
        let mut m = manager(scripted(vec![]));
        let id = m.add_object("chair", BBox::new(0.0, 0.0, 150.0, 100.0), 1.0, None, t0);

        // IoU = 0.5: 相同高度, 水平偏移 50 (交集 100x100 / 并集 200x100)
        m.process_detections(&[det("chair", 50.0, 0.0, 150.0, 100.0)], DIMS, t0);
        assert_eq!(m.get(id).unwrap().bbox, BBox::new(0.0, 0.0, 150.0, 100.0));

        // IoU ≈ 0.8: 100x100 框水平偏移 11 (交集 8900 / 并集 11100)
        let id2 = m.add_object("table", BBox::new(300.0, 300.0, 100.0, 100.0), 1.0, None, t0);
        m.process_detections(&[det("table", 311.0, 300.0, 100.0, 100.0)], DIMS, t0);
        assert_eq!(m.get(id2).unwrap().bbox, BBox::new(311.0, 300.0, 100.0, 100.0));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_replaced_confidence_is_clamped() {
        let t0 = Instant::now();
        let mut m = manager(scripted(vec![]));
        let id = m.add_object("door", BBox::new(0.0, 0.0, 100.0, 100.0), 0.5, None, t0);

        let mut loud = det("door", 5.0, 0.0, 100.0, 100.0);
        loud.confidence = 1.7;
        m.process_detections(&[loud], DIMS, t0);
        let obj = m.get(id).unwrap();
        assert_eq!(obj.bbox, BBox::new(5.0, 0.0, 100.0, 100.0));
        assert_eq!(obj.confidence, 1.0);

        let mut negative = det("door", 0.0, 0.0, 100.0, 100.0);
        negative.confidence = -0.2;
        m.process_detections(&[negative], DIMS, t0);
        assert_eq!(m.get(id).unwrap().confidence, 0.0);
    }

    #[test]
    fn test_lost_object_accepts_low_iou() {
        let t0 = Instant::now();
        let mut m = manager(scripted(vec![]));
        let id = m.add_object("person", BBox::new(0.0, 0.0, 100.0, 100.0), 1.0, None, t0);
        m.get_mut(id).unwrap().mark_lost(t0);

        // IoU ≈ 0.2: 水平偏移 66 (交集 3400 / 并集 16600)
        let t1 = t0 + Duration::from_millis(500);
        let created = m.process_detections(&[det("person [waving]", 66.0, 0.0, 100.0, 100.0)], DIMS, t1);
        assert_eq!(created, 0);

        let obj = m.get(id).unwrap();
        assert_eq!(obj.bbox, BBox::new(66.0, 0.0, 100.0, 100.0));
        assert!(!obj.is_lost);
        assert!(obj.lost_time.is_none());
        assert_eq!(obj.context.as_deref(), Some("waving"));
        assert_eq!(obj.last_verified, t1);
    }

    #[test]
    fn test_unmatched_and_malformed_detections() {
        let t0 = Instant::now();
        let mut m = manager(scripted(vec![]));
        m.add_object("cup", BBox::new(0.0, 0.0, 100.0, 100.0), 1.0, None, t0);

        let batch = vec![
            det("phone", 0.0, 0.0, 100.0, 100.0), // 标签不同 → 新建
            det("cup", 500.0, 500.0, 100.0, 100.0), // 不重叠 → 新建
            RawDetection {
                box_2d: vec![1.0, 2.0],
                label: "cup".into(),
                confidence: 1.0,
            },
            det("cup", 0.0, 0.0, 3.0, 3.0), // 太小
        ];
        assert_eq!(m.process_detections(&batch, DIMS, t0), 2);
        assert_eq!(m.len(), 3);

        let ids: Vec<u32> = m.objects().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_update_trackers_state_machine() {
        let t0 = Instant::now();
        let f = frame(1000, 1000);
        let mut m = manager(scripted(vec![Some(BBox::new(10.0, 0.0, 100.0, 100.0)), None, None]));
        let a = m.add_object("door", BBox::new(0.0, 0.0, 100.0, 100.0), 1.0, None, t0);
        let b = m.add_object("door", BBox::new(500.0, 0.0, 100.0, 100.0), 1.0, None, t0);
        assert_eq!(m.init_tracker(a, &f), true);

        // a 成功, b 没有跟踪器 → 丢失
        let tracked = m.update_trackers(&f, t0);
        assert_eq!(tracked, vec![a]);
        let obj = m.get(a).unwrap();
        assert_eq!(obj.velocity, Some((10.0, 0.0)));
        assert!(obj.threat_score > 0.0);
        assert!(obj.predicted_bbox.is_some());
        assert!(m.get(b).unwrap().is_lost);

        // a 失败两次: 丢失时间只记录第一次, 威胁分保持不变
        let score = m.get(a).unwrap().threat_score;
        let t1 = t0 + Duration::from_secs(1);
        m.update_trackers(&f, t1);
        m.update_trackers(&f, t1 + Duration::from_secs(1));
        let obj = m.get(a).unwrap();
        assert!(obj.is_lost);
        assert_eq!(obj.lost_time, Some(t1));
        assert_eq!(obj.threat_score, score);
    }

    #[test]
    fn test_tracker_init_failure_keeps_object() {
        let t0 = Instant::now();
        let factory: TrackerFactory = Arc::new(|| {
            Box::new(ScriptedTracker {
                script: Arc::new(Mutex::new(VecDeque::new())),
                fail_init: true,
            }) as Box<dyn VisualTracker>
        });
        let mut m = manager(factory);
        let id = m.add_object("cup", BBox::new(0.0, 0.0, 50.0, 50.0), 1.0, None, t0);
        assert_eq!(m.init_all_trackers(&frame(200, 200)), 0);
        assert!(m.get(id).is_some());
        assert!(!m.get(id).unwrap().has_tracker());
    }

    #[test]
    fn test_cleanup_stale() {
        let t0 = Instant::now();
        let mut m = manager(scripted(vec![]));
        let old = m.add_object("cup", BBox::new(0.0, 0.0, 50.0, 50.0), 1.0, None, t0);
        let fresh = m.add_object("cup", BBox::new(500.0, 0.0, 50.0, 50.0), 1.0, None, t0 + Duration::from_secs(20));

        let max_age = Duration::from_secs(30);
        assert!(!m.cleanup_stale(max_age, t0 + Duration::from_secs(30)));
        assert!(m.cleanup_stale(max_age, t0 + Duration::from_secs(31)));
        assert!(m.get(old).is_none());
        assert!(m.get(fresh).is_some());
    }

    #[test]
    fn test_filter_limit_closest_centered() {
        let t0 = Instant::now();
        let mut m = manager(scripted(vec![]));
        m.add_object("Person", BBox::new(0.0, 0.0, 50.0, 50.0), 0.5, None, t0);
        let big = m.add_object("tall person", BBox::new(600.0, 0.0, 300.0, 300.0), 0.9, None, t0);
        let mid = m.add_object("cup", BBox::new(450.0, 450.0, 100.0, 100.0), 0.7, None, t0);

        assert_eq!(m.closest().unwrap().id, big);
        assert_eq!(m.centered(DIMS).unwrap().id, mid);

        m.limit(2);
        let ids: Vec<u32> = m.objects().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![big, mid]);

        m.filter_by_labels(&["person"]);
        assert_eq!(m.len(), 1);
        assert_eq!(m.objects()[0].id, big);
    }

    #[test]
    fn test_semantic_formula_selected_by_config() {
        let t0 = Instant::now();
        let f = frame(1000, 1000);
        let threat = ThreatConfig {
            formula: ThreatFormula::Semantic,
            ..ThreatConfig::default()
        };
        let b = BBox::new(0.0, 0.0, 100.0, 100.0);
        let mut m = ObjectManager::new(TrackingConfig::default(), threat, scripted(vec![Some(b), Some(b)]));
        let person = m.add_object("person", b, 1.0, None, t0);
        let pen = m.add_object("pen", b, 1.0, None, t0);
        m.init_all_trackers(&f);
        m.update_trackers(&f, t0);
        assert!(m.get(person).unwrap().threat_score > m.get(pen).unwrap().threat_score);
    }

    #[test]
    fn test_local_recovery_reinitialises_lost_object() {
        let mut rng = StdRng::seed_from_u64(21);
        let img = RgbImage::from_fn(240, 180, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]));
        let t0 = Instant::now();
        let f0 = Frame::new(img.clone(), 0);

        let mut m = manager(scripted(vec![]));
        let id = m.add_object("cup", BBox::new(60.0, 40.0, 24.0, 24.0), 1.0, None, t0);
        assert!(m.update_template(id, &f0, t0));

        // 目标移动到新位置
        let patch = image::imageops::crop_imm(&img, 60, 40, 24, 24).to_image();
        let mut rng = StdRng::seed_from_u64(22);
        let mut moved = RgbImage::from_fn(240, 180, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]));
        image::imageops::replace(&mut moved, &patch, 150, 120);
        let f1 = Frame::new(moved, 1);

        m.get_mut(id).unwrap().mark_lost(t0);
        let found = m.attempt_recoveries(&f1, t0);
        assert_eq!(found, vec![id]);
        let obj = m.get(id).unwrap();
        assert_eq!(obj.bbox, BBox::new(150.0, 120.0, 24.0, 24.0));
        assert!(!obj.is_lost);
        assert!(obj.has_tracker());
    }

    #[test]
    fn test_refresh_templates_only_healthy_and_due() {
        let t0 = Instant::now();
        let f = frame(300, 300);
        let mut m = manager(scripted(vec![]));
        let a = m.add_object("cup", BBox::new(10.0, 10.0, 40.0, 40.0), 1.0, None, t0);
        let b = m.add_object("cup", BBox::new(100.0, 100.0, 40.0, 40.0), 1.0, None, t0);
        m.init_all_trackers(&f);
        m.get_mut(b).unwrap().mark_lost(t0);

        // 初始化时已截取模板, 1 秒内不刷新
        assert_eq!(m.refresh_templates(&f, f.timestamp + Duration::from_millis(500)), 0);
        assert_eq!(m.refresh_templates(&f, f.timestamp + Duration::from_millis(1500)), 1);
        assert!(m.get(a).unwrap().template.is_some());
    }
}
