//! 音频签名 (每类对象一种循环音)

use crate::config::AudioConfig;
use crate::tables::{AUDIO_SIGNATURES, DEFAULT_SIGNATURE, DEFAULT_SIGNATURE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    /// 心跳式脉冲: 每分钟 freq 次, 每次 10% 周期的低频音
    Pulse,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignatureSpec {
    pub waveform: Waveform,
    pub freq: f32,
}

/// 签名峰值
const SIGNATURE_PEAK: f32 = 0.5;

/// 生成单声道签名: 峰值归一到 0.5, 首尾线性淡入淡出
pub fn generate(spec: SignatureSpec, duration_secs: f32, sample_rate: u32, envelope_samples: usize) -> Vec<f32> {
    let n = ((duration_secs * sample_rate as f32) as usize).max(1);
    let sr = sample_rate as f32;

    let mut samples: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f32 / sr;
            let phase = (spec.freq * t).fract();
            match spec.waveform {
                Waveform::Sine => (TAU * spec.freq * t).sin(),
                Waveform::Square => {
                    if phase < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                Waveform::Sawtooth => 2.0 * phase - 1.0,
                Waveform::Pulse => {
                    let beat_phase = (spec.freq / 60.0 * t).fract();
                    if beat_phase < 0.1 {
                        (TAU * spec.freq * t).sin()
                    } else {
                        0.0
                    }
                }
            }
        })
        .collect();

    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let scale = SIGNATURE_PEAK / peak;
        samples.iter_mut().for_each(|s| *s *= scale);
    }

    // 包络
    let env = envelope_samples.min(n / 2);
    for i in 0..env {
        let g = i as f32 / env as f32;
        samples[i] *= g;
        samples[n - 1 - i] *= g;
    }
    samples
}

/// 签名库 (启动时一次性生成, 渲染线程只读共享)
#[derive(Clone, Debug)]
pub struct SignatureBank {
    buffers: HashMap<&'static str, Arc<[f32]>>,
    default: Arc<[f32]>,
}

impl SignatureBank {
    pub fn build(config: &AudioConfig) -> Self {
        let make = |spec: SignatureSpec| -> Arc<[f32]> {
            generate(spec, config.signature_secs, config.sample_rate, config.envelope_samples).into()
        };
        let buffers = AUDIO_SIGNATURES
            .entries()
            .map(|(name, spec)| (*name, make(*spec)))
            .collect();
        Self {
            buffers,
            default: make(DEFAULT_SIGNATURE),
        }
    }

    /// 按签名名称取缓冲, 未知名称返回默认签名
    pub fn get(&self, name: &str) -> Arc<[f32]> {
        if name == DEFAULT_SIGNATURE_NAME {
            return self.default.clone();
        }
        self.buffers
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
