//! 视觉模型响应解析

use super::RawDetection;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("static regex"));
static BARE_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[\s\S]*\]").expect("static regex"));
static LABEL_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\[(.*?)\]").expect("static regex"));

/// 提取 JSON 文本: ```json 代码块 → 裸数组 → 整段文本
pub fn extract_json(text: &str) -> &str {
    if let Some(caps) = FENCED_JSON.captures(text) {
        if let Some(m) = caps.get(1) {
            return m.as_str().trim();
        }
    }
    if let Some(m) = BARE_ARRAY.find(text) {
        return m.as_str().trim();
    }
    text.trim()
}

/// 解析检测结果
///
/// 不是数组时返回空列表;单条记录格式错误只跳过该条。
pub fn parse_detections(text: &str) -> Result<Vec<RawDetection>> {
    let cleaned = extract_json(text);
    let value: Value = serde_json::from_str(cleaned)
        .with_context(|| format!("JSON解析失败: {}", cleaned.chars().take(200).collect::<String>()))?;

    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    let detections = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawDetection>(item) {
            Ok(det) => Some(det),
            Err(e) => {
                debug!("跳过格式错误的检测记录: {}", e);
                None
            }
        })
        .collect();
    Ok(detections)
}

/// 拆分 "Label [context]" → ("Label", Some("context"))
pub fn split_label_context(raw: &str) -> (String, Option<String>) {
    match LABEL_CONTEXT.captures(raw) {
        Some(caps) => {
            let label = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
            let context = caps.get(2).map(|m| m.as_str().trim().to_string());
            (label, context)
        }
        None => (raw.trim().to_string(), None),
    }
}
