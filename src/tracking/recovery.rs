//! 本地找回引擎 (模板匹配)
//!
//! 零均值归一化互相关 (ZNCC):
//!   score = (Σft - n·f̄·t̄) / sqrt((Σf² - n·f̄²)(Σt² - n·t̄²))
//! 互相关项 Σft 由 imageproc 计算,窗口内 Σf / Σf² 由积分图求得。

use super::types::{BBox, Frame, FrameDims};
use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use ndarray::Array2;

/// 粗搜索时模板较长边的目标尺寸
const COARSE_TEMPLATE_SIDE: u32 = 32;

/// 粗搜索时图像较长边的目标尺寸
const COARSE_FRAME_SIDE: u32 = 320;

/// 粗搜索时模板的最小边长
const MIN_COARSE_SIDE: u32 = 4;

/// 方差下限 (低于视为平坦窗口)
const VARIANCE_EPS: f64 = 1e-6;

/// 匹配结果 (左上角 + 得分)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchResult {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// 本地找回器
#[derive(Clone, Debug)]
pub struct LocalRecovery {
    threshold: f32,
}

impl LocalRecovery {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 在整帧中搜索模板,得分严格大于阈值才返回
    pub fn recover(&self, frame: &Frame, template: Option<&GrayImage>) -> Option<(BBox, f32)> {
        let template = template?;
        let found = best_match(frame.gray(), template)?;
        if found.score <= self.threshold {
            return None;
        }
        let bbox = BBox::new(
            found.x as f32,
            found.y as f32,
            template.width() as f32,
            template.height() as f32,
        );
        Some((bbox, found.score))
    }
}

/// 截取灰度模板: 裁剪后的框任一边小于 `min_side` 时放弃
pub fn capture_template(frame: &Frame, bbox: &BBox, min_side: u32) -> Option<GrayImage> {
    let dims: FrameDims = frame.dims();
    let r = bbox.clamp_to(dims);
    if r.w < min_side || r.h < min_side {
        return None;
    }
    Some(imageops::crop_imm(frame.gray(), r.x, r.y, r.w, r.h).to_image())
}

/// 最佳匹配位置 (粗到细)
///
/// 模板为空或大于图像时返回 None。
pub fn best_match(image: &GrayImage, template: &GrayImage) -> Option<MatchResult> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let factor = search_factor((iw, ih), (tw, th));
    if factor == 1 {
        return exhaustive_match(image, template);
    }

    // 粗搜索
    let small_image = imageops::resize(image, iw / factor, ih / factor, FilterType::Triangle);
    let small_template = imageops::resize(template, tw / factor, th / factor, FilterType::Triangle);
    let coarse = exhaustive_match(&small_image, &small_template)?;

    // 全分辨率下 ±factor 像素内细化
    let max_x = iw - tw;
    let max_y = ih - th;
    let cx = (coarse.x * factor).min(max_x);
    let cy = (coarse.y * factor).min(max_y);
    let x0 = cx.saturating_sub(factor);
    let y0 = cy.saturating_sub(factor);
    let x1 = (cx + factor).min(max_x);
    let y1 = (cy + factor).min(max_y);

    let region = imageops::crop_imm(image, x0, y0, x1 - x0 + tw, y1 - y0 + th).to_image();
    let fine = exhaustive_match(&region, template)?;
    Some(MatchResult {
        x: x0 + fine.x,
        y: y0 + fine.y,
        score: fine.score,
    })
}

/// 粗搜索的整数缩小倍数 (1 = 直接穷举)
///
/// 取模板和图像两者要求的较大值, 但缩小后的模板边长不低于 MIN_COARSE_SIDE。
pub fn search_factor(image: (u32, u32), template: (u32, u32)) -> u32 {
    let (iw, ih) = image;
    let (tw, th) = template;
    let by_template = tw.max(th) / COARSE_TEMPLATE_SIDE;
    let by_frame = iw.max(ih).div_ceil(COARSE_FRAME_SIDE);
    let limit = tw.min(th) / MIN_COARSE_SIDE;
    by_template.max(by_frame).min(limit).max(1)
}

/// 穷举搜索,返回行优先顺序下第一个最高分位置
pub fn exhaustive_match(image: &GrayImage, template: &GrayImage) -> Option<MatchResult> {
    let scores = zncc_map(image, template)?;
    let mut best: Option<MatchResult> = None;
    for ((y, x), &score) in scores.indexed_iter() {
        if best.map_or(true, |b| score > b.score) {
            best = Some(MatchResult {
                x: x as u32,
                y: y as u32,
                score,
            });
        }
    }
    best
}

/// ZNCC 得分图, 形状 (H-h+1, W-w+1)
pub fn zncc_map(image: &GrayImage, template: &GrayImage) -> Option<Array2<f32>> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let n = (tw * th) as f64;
    let (t_sum, t_sq) = template
        .pixels()
        .fold((0.0f64, 0.0f64), |(s, sq), p| {
            let v = p[0] as f64;
            (s + v, sq + v * v)
        });
    let t_var = t_sq - t_sum * t_sum / n;

    let out_w = (iw - tw + 1) as usize;
    let out_h = (ih - th + 1) as usize;
    if t_var <= VARIANCE_EPS {
        return Some(Array2::zeros((out_h, out_w)));
    }

    let cross = match_template(image, template, MatchTemplateMethod::CrossCorrelation);
    let (sum, sq) = integral_images(image);
    let (tw, th) = (tw as usize, th as usize);

    let scores = Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let f_sum = window_sum(&sum, x, y, tw, th);
        let f_sq = window_sum(&sq, x, y, tw, th);
        let f_var = f_sq - f_sum * f_sum / n;
        if f_var <= VARIANCE_EPS {
            return 0.0;
        }
        let ft = cross.get_pixel(x as u32, y as u32)[0] as f64;
        let num = ft - f_sum * t_sum / n;
        (num / (f_var * t_var).sqrt()).clamp(-1.0, 1.0) as f32
    });
    Some(scores)
}

/// 积分图 (Σf, Σf²), 形状 (H+1, W+1)
fn integral_images(image: &GrayImage) -> (Array2<f64>, Array2<f64>) {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut sum = Array2::<f64>::zeros((h + 1, w + 1));
    let mut sq = Array2::<f64>::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut row_sum = 0.0;
        let mut row_sq = 0.0;
        for x in 0..w {
            let v = image.get_pixel(x as u32, y as u32)[0] as f64;
            row_sum += v;
            row_sq += v * v;
            sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row_sum;
            sq[[y + 1, x + 1]] = sq[[y, x + 1]] + row_sq;
        }
    }
    (sum, sq)
}

fn window_sum(ii: &Array2<f64>, x: usize, y: usize, w: usize, h: usize) -> f64 {
    ii[[y + h, x + w]] - ii[[y, x + w]] - ii[[y + h, x]] + ii[[y, x]]
}
