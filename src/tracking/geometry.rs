//! 几何工具: IOU / 速度 / 运动预测 / 检测框转换

use super::types::{BBox, FrameDims};

/// 名义帧率 (预测时间 → 帧数)
pub const NOMINAL_FPS: f32 = 30.0;

/// 检测坐标归一化空间 (0..1000)
pub const DETECTION_SCALE: f32 = 1000.0;

/// 计算两个边界框的IOU (Intersection over Union)
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.x2().min(b.x2());
    let y2 = a.y2().min(b.y2());

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// 中心点位移 (像素/tick)
pub fn velocity(old: &BBox, new: &BBox) -> (f32, f32) {
    let (ox, oy) = old.center();
    let (nx, ny) = new.center();
    (nx - ox, ny - oy)
}

/// 线性运动预测
///
/// 两个分量都低于 `min_velocity` 时视为静止,返回原框。
pub fn predict(bbox: &BBox, velocity: Option<(f32, f32)>, horizon_secs: f32, min_velocity: f32) -> BBox {
    let Some((vx, vy)) = velocity else {
        return *bbox;
    };
    if vx.abs() < min_velocity && vy.abs() < min_velocity {
        return *bbox;
    }
    let frames_ahead = horizon_secs * NOMINAL_FPS;
    bbox.translated(vx * frames_ahead, vy * frames_ahead)
}

/// 检测框转换: `[y_min, x_min, y_max, x_max]` (0..1000) → 像素框
///
/// 坐标截断取整后裁剪到帧内;任一边小于 `min_side` 的框丢弃。
pub fn detection_to_bbox(box_2d: &[f32], dims: FrameDims, min_side: u32) -> Option<BBox> {
    let [y_min, x_min, y_max, x_max] = <[f32; 4]>::try_from(box_2d).ok()?;
    if !(y_min.is_finite() && x_min.is_finite() && y_max.is_finite() && x_max.is_finite()) {
        return None;
    }

    let (w_px, h_px) = (dims.width as f32, dims.height as f32);
    let x = (x_min * w_px / DETECTION_SCALE).trunc() as i64;
    let y = (y_min * h_px / DETECTION_SCALE).trunc() as i64;
    let w = ((x_max - x_min) * w_px / DETECTION_SCALE).trunc() as i64;
    let h = ((y_max - y_min) * h_px / DETECTION_SCALE).trunc() as i64;

    let x = x.clamp(0, (dims.width as i64 - 1).max(0));
    let y = y.clamp(0, (dims.height as i64 - 1).max(0));
    let w = w.clamp(1, (dims.width as i64 - x).max(1));
    let h = h.clamp(1, (dims.height as i64 - y).max(1));

    if w < min_side as i64 || h < min_side as i64 {
        return None;
    }
    Some(BBox::new(x as f32, y as f32, w as f32, h as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_iou_identity_and_disjoint() {
        let a = BBox::new(10.0, 20.0, 30.0, 40.0);
        assert_relative_eq!(iou(&a, &a), 1.0);

        let b = BBox::new(100.0, 100.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);

        // 边相接也算不相交
        let c = BBox::new(40.0, 20.0, 30.0, 40.0);
        assert_eq!(iou(&a, &c), 0.0);
    }

    #[test]
    fn test_iou_symmetric() {
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(50.0, 0.0, 100.0, 100.0);
        assert_relative_eq!(iou(&a, &b), iou(&b, &a));
        assert_relative_eq!(iou(&a, &b), 1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iou_zero_union() {
        let a = BBox::new(5.0, 5.0, 0.0, 0.0);
        assert_eq!(iou(&a, &a), 0.0);
    }

    #[test]
    fn test_predict_respects_min_velocity() {
        let b = BBox::new(100.0, 100.0, 20.0, 20.0);
        assert_eq!(predict(&b, Some((4.0, -4.0)), 0.5, 5.0), b);
        assert_eq!(predict(&b, None, 0.5, 5.0), b);

        let p = predict(&b, Some((6.0, 0.0)), 0.5, 5.0);
        assert_relative_eq!(p.x, 100.0 + 6.0 * 15.0);
        assert_relative_eq!(p.y, 100.0);
        assert_eq!((p.w, p.h), (20.0, 20.0));
    }

    #[test]
    fn test_detection_to_bbox() {
        let dims = FrameDims::new(640, 480);
        let b = detection_to_bbox(&[100.0, 250.0, 600.0, 500.0], dims, 5).unwrap();
        assert_eq!(b, BBox::new(160.0, 48.0, 160.0, 240.0));

        // 超出右边界被裁剪
        let b = detection_to_bbox(&[0.0, 900.0, 500.0, 1200.0], dims, 5).unwrap();
        assert_eq!(b.x, 576.0);
        assert_eq!(b.w, 64.0);

        // 太小 / 格式错误
        assert!(detection_to_bbox(&[0.0, 0.0, 5.0, 5.0], dims, 5).is_none());
        assert!(detection_to_bbox(&[0.0, 0.0, 5.0], dims, 5).is_none());
        assert!(detection_to_bbox(&[0.0, f32::NAN, 5.0, 5.0], dims, 5).is_none());
    }
}
