//! 视觉服务客户端

use super::parse::parse_detections;
use super::RawDetection;
use crate::config::VisionConfig;
use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

/// 视觉服务接口 (检测 / 场景描述 / 视觉问答)
pub trait VisionService: Send + Sync {
    /// 检测目标, 返回原始检测记录
    fn detect(&self, image: &RgbImage, prompt: &str) -> Result<Vec<RawDetection>>;

    /// 自由文本回答 (history 为最近对话上下文, 可为空)
    fn describe(&self, image: &RgbImage, prompt: &str, history: &str) -> Result<String>;
}

// ========== Gemini 请求/响应 ==========

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Image { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// 第一个候选的全部文本
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// PNG 编码 + base64
pub fn encode_png_base64(image: &RgbImage) -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .context("PNG编码失败")?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

// ========== Gemini 客户端 ==========

pub struct GeminiClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &VisionConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("⚠️ 未设置 {}, 视觉请求将返回空结果", config.api_key_env);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build();
        Self {
            agent,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        }
    }

    fn generate(&self, image: &RgbImage, prompt: String, temperature: f32) -> Result<String> {
        let Some(key) = self.api_key.as_deref() else {
            bail!("未配置视觉服务 API key");
        };

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: encode_png_base64(image)?,
                        },
                    },
                    Part::Text { text: prompt },
                ],
            }],
            generation_config: GenerationConfig { temperature },
        };
        let body = serde_json::to_string(&request)?;

        let url = format!("{}/{}:generateContent", self.endpoint, self.model);
        let started = std::time::Instant::now();
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", key)
            .send_string(&body)
            .map_err(|e| anyhow!("视觉请求失败: {}", e))?;
        let text = response.into_string().context("读取响应失败")?;
        debug!("视觉请求耗时 {:.0}ms", started.elapsed().as_secs_f64() * 1000.0);

        let parsed: GenerateResponse = serde_json::from_str(&text).context("响应格式错误")?;
        parsed.text().context("响应中没有文本")
    }
}

impl VisionService for GeminiClient {
    fn detect(&self, image: &RgbImage, prompt: &str) -> Result<Vec<RawDetection>> {
        let text = self.generate(image, prompt.to_string(), 0.5)?;
        parse_detections(&text)
    }

    fn describe(&self, image: &RgbImage, prompt: &str, history: &str) -> Result<String> {
        let full_prompt = if history.is_empty() {
            prompt.to_string()
        } else {
            format!("Recent conversation:\n{}\n\n{}", history, prompt)
        };
        let text = self.generate(image, full_prompt, 0.7)?;
        Ok(text.trim().to_string())
    }
}
