//! 对象 → 空间声源参数映射

use super::mixer::SourceParams;
use crate::config::AudioConfig;
use crate::tracking::{BBox, FrameDims, ObjectSnapshot};

/// 最小增益 (远处对象仍然可闻)
pub const MIN_GAIN: f32 = 0.1;

/// 空间参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialCue {
    /// 归一化水平位置 (-1 左 .. 1 右)
    pub norm_x: f32,
    /// 归一化垂直位置 (-1 下 .. 1 上)
    pub norm_y: f32,
    /// 估计距离 [0.5, 10]
    pub distance: f32,
    pub gain: f32,
    /// 听者坐标系位置 (x 右, y 上, -z 前)
    pub position: [f32; 3],
}

/// 按参考帧尺寸计算空间参数: 框越大越近越响
pub fn spatial_cue(bbox: &BBox, reference: FrameDims) -> SpatialCue {
    let (w, h) = (reference.width.max(1) as f32, reference.height.max(1) as f32);
    let (cx, cy) = bbox.center();
    let norm_x = (cx / w) * 2.0 - 1.0;
    let norm_y = -((cy / h) * 2.0 - 1.0);

    // 占满半幅画面 ≈ 1 米
    let max_ref_area = w * h * 0.5;
    let distance = (max_ref_area / (bbox.area() + 1.0)).sqrt().clamp(0.5, 10.0);
    let gain = (1.0 / (distance * 0.5)).min(1.0).max(MIN_GAIN);

    SpatialCue {
        norm_x,
        norm_y,
        distance,
        gain,
        position: [norm_x * distance * 2.0, norm_y * distance, -distance],
    }
}

/// 威胁压低: 威胁低于 ratio × 最大威胁的对象增益乘以 duck_gain
pub fn duck(gain: f32, threat: f32, max_threat: f32, ratio: f32, duck_gain: f32) -> f32 {
    if threat < max_threat * ratio {
        gain * duck_gain
    } else {
        gain
    }
}

/// 由快照生成一帧音频场景
pub fn build_scene(objects: &[ObjectSnapshot], config: &AudioConfig) -> Vec<SourceParams> {
    let reference = FrameDims::new(config.reference_width, config.reference_height);
    let max_threat = objects
        .iter()
        .map(|o| o.threat_score)
        .fold(0.0f32, f32::max);

    objects
        .iter()
        .map(|obj| {
            let cue = spatial_cue(&obj.bbox, reference);
            SourceParams {
                id: obj.id,
                signature: obj.signature,
                gain: duck(cue.gain, obj.threat_score, max_threat, config.duck_ratio, config.duck_gain),
                position: cue.position,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const REF: FrameDims = FrameDims {
        width: 1280,
        height: 720,
    };

    fn centered(side: f32) -> BBox {
        BBox::from_center(640.0, 360.0, side, side)
    }

    #[test]
    fn test_gain_monotonic_in_size() {
        let big = spatial_cue(&centered(600.0), REF).gain;
        let mid = spatial_cue(&centered(200.0), REF).gain;
        let small = spatial_cue(&centered(50.0), REF).gain;
        assert!(big > mid && mid > small);
        assert!((big - 1.0).abs() <= 0.2, "big = {}", big);
        assert!((small - 0.1).abs() <= 0.2, "small = {}", small);
    }

    #[test]
    fn test_position_axes() {
        let c = spatial_cue(&centered(200.0), REF);
        assert_relative_eq!(c.norm_x, 0.0);
        assert_relative_eq!(c.norm_y, 0.0);
        assert_relative_eq!(c.position[2], -c.distance);

        // 左上角: x 为负, y 为正 (向上)
        let c = spatial_cue(&BBox::new(0.0, 0.0, 100.0, 100.0), REF);
        assert!(c.norm_x < -0.8);
        assert!(c.norm_y > 0.8);
        assert!(c.position[0] < 0.0 && c.position[1] > 0.0);
    }

    #[test]
    fn test_distance_clamped() {
        let huge = spatial_cue(&BBox::new(0.0, 0.0, 1280.0, 720.0), REF);
        assert_relative_eq!(huge.distance, (460800.0f32 / 921601.0).sqrt(), epsilon = 1e-5);
        assert_relative_eq!(huge.gain, 1.0);
        let oversized = spatial_cue(&BBox::new(-1000.0, -1000.0, 4000.0, 4000.0), REF);
        assert_relative_eq!(oversized.distance, 0.5);
        let tiny = spatial_cue(&BBox::new(0.0, 0.0, 1.0, 1.0), REF);
        assert_relative_eq!(tiny.distance, 10.0);
        assert_relative_eq!(tiny.gain, 0.2);
    }

    #[test]
    fn test_mid_sized_box_distance_and_gain() {
        // sqrt(1280*720*0.5 / (200*200 + 1))
        let c = spatial_cue(&centered(200.0), REF);
        let expected = (460800.0f32 / 40001.0).sqrt();
        assert_relative_eq!(c.distance, expected, epsilon = 1e-5);
        assert_relative_eq!(c.distance, 3.394, epsilon = 1e-3);
        assert_relative_eq!(c.gain, 1.0 / (expected * 0.5), epsilon = 1e-5);
        assert_relative_eq!(c.gain, 0.589, epsilon = 1e-3);
        assert_relative_eq!(c.position[2], -expected, epsilon = 1e-5);
    }

    #[test]
    fn test_ducking() {
        let threats = [1.0, 0.5, 0.1];
        let ducked: Vec<f32> = threats.iter().map(|&t| duck(1.0, t, 1.0, 0.8, 0.3)).collect();
        assert_eq!(ducked, vec![1.0, 0.3, 0.3]);

        // 全部为 0 时不压低
        assert_eq!(duck(0.7, 0.0, 0.0, 0.8, 0.3), 0.7);
    }

    #[test]
    fn test_build_scene_ducks_lower_threats() {
        let snap = |id: u32, threat: f32| ObjectSnapshot {
            id,
            label: "cup".into(),
            context: None,
            bbox: centered(600.0),
            confidence: 1.0,
            velocity: None,
            predicted_bbox: None,
            threat_score: threat,
            is_lost: false,
            lost_time: None,
            color: (0, 0, 0),
            signature: "cup",
        };
        let scene = build_scene(&[snap(1, 1.0), snap(2, 0.5), snap(3, 0.1)], &AudioConfig::default());
        assert_eq!(scene.len(), 3);
        assert_relative_eq!(scene[1].gain, scene[0].gain * 0.3);
        assert_relative_eq!(scene[2].gain, scene[0].gain * 0.3);
        assert_eq!(scene[0].signature, "cup");
    }
}
