//! 后台检测 (同时最多一个请求在途)
//!
//! 跟踪线程调用 `start` 发起请求后立即返回, 之后每个 tick 用 `poll` 取结果。

use super::{RawDetection, VisionService};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{info, warn};

pub struct AsyncDetector {
    service: Arc<dyn VisionService>,
    in_flight: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<Vec<RawDetection>>>>,
}

impl AsyncDetector {
    pub fn new(service: Arc<dyn VisionService>) -> Self {
        Self {
            service,
            in_flight: Arc::new(AtomicBool::new(false)),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// 是否有请求在途
    pub fn is_searching(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 发起检测; 已有请求在途时返回 false
    pub fn start(&self, image: RgbImage, prompt: String) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let service = self.service.clone();
        let in_flight = self.in_flight.clone();
        let slot = self.slot.clone();
        let spawned = thread::Builder::new()
            .name("nova-detect".into())
            .spawn(move || {
                let detections = match service.detect(&image, &prompt) {
                    Ok(dets) => {
                        info!("✅ 检测到 {} 个目标", dets.len());
                        dets
                    }
                    Err(e) => {
                        warn!("❌ 检测失败: {:#}", e);
                        Vec::new()
                    }
                };
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                *guard = Some(detections);
                in_flight.store(false, Ordering::Release);
            });

        if let Err(e) = spawned {
            warn!("❌ 无法启动检测线程: {}", e);
            self.in_flight.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// 取走已完成的结果 (非阻塞)
    pub fn poll(&self) -> Option<Vec<RawDetection>> {
        if self.is_searching() {
            return None;
        }
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
