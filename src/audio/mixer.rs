//! 多声源混音器
//!
//! 每个对象一个循环声源。增益在每个输出块内线性过渡;
//! 双耳模式使用耳间时间差 + 远耳低通 + 耳间电平差, 否则等功率声像。
//! 混音后峰值超过 1.0 时整块等比缩放。

use super::signature::SignatureBank;
use crate::config::AudioConfig;
use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
use std::sync::Arc;

/// 头部半径 (米)
const HEAD_RADIUS: f32 = 0.0875;
/// 声速 (米/秒)
const SPEED_OF_SOUND: f32 = 343.0;

/// 单个声源的目标参数
#[derive(Clone, Debug, PartialEq)]
pub struct SourceParams {
    pub id: u32,
    pub signature: &'static str,
    pub gain: f32,
    /// 听者坐标系 (x 右, y 上, -z 前)
    pub position: [f32; 3],
}

/// 更新线程 → 渲染回调
#[derive(Clone, Debug)]
pub enum MixCommand {
    Scene(Vec<SourceParams>),
    Clear,
}

/// 左右耳渲染参数
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct EarParams {
    gain: f32,
    delay: usize,
    /// 单极点低通系数 (1.0 = 直通)
    lowpass: f32,
}

/// 水平方位角 (右为正, 弧度)
fn azimuth(position: [f32; 3]) -> f32 {
    position[0].atan2(-position[2])
}

fn ear_params(params: &SourceParams, binaural: bool, sample_rate: u32, master_gain: f32) -> [EarParams; 2] {
    let gain = params.gain.max(0.0) * master_gain;
    let theta = azimuth(params.position);
    let lateral = theta.sin();

    if !binaural {
        let angle = (lateral.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
        return [
            EarParams {
                gain: gain * angle.cos(),
                delay: 0,
                lowpass: 1.0,
            },
            EarParams {
                gain: gain * angle.sin(),
                delay: 0,
                lowpass: 1.0,
            },
        ];
    }

    // Woodworth 耳间时间差
    let side = theta.abs().min(FRAC_PI_2);
    let itd = HEAD_RADIUS / SPEED_OF_SOUND * (side + side.sin());
    let delay = (itd * sample_rate as f32).round() as usize;

    let near = EarParams {
        gain,
        delay: 0,
        lowpass: 1.0,
    };
    let far = EarParams {
        gain: gain * (1.0 - 0.5 * lateral.abs()),
        delay,
        lowpass: 1.0 - 0.6 * lateral.abs(),
    };
    if lateral >= 0.0 {
        [far, near]
    } else {
        [near, far]
    }
}

/// 正在播放的声源
struct Voice {
    buffer: Arc<[f32]>,
    cursor: usize,
    current: [EarParams; 2],
    target: [EarParams; 2],
    lp_state: [f32; 2],
}

impl Voice {
    fn new(buffer: Arc<[f32]>, target: [EarParams; 2]) -> Self {
        // 从静音开始淡入
        let mut current = target;
        current[0].gain = 0.0;
        current[1].gain = 0.0;
        Self {
            buffer,
            cursor: 0,
            current,
            target,
            lp_state: [0.0; 2],
        }
    }

    fn mix_into(&mut self, out: &mut [f32], frames: usize) {
        let len = self.buffer.len();
        if len == 0 || frames == 0 {
            return;
        }

        // 延迟每块最多变化 1 个采样
        for ear in 0..2 {
            let (cur, tgt) = (self.current[ear].delay, self.target[ear].delay);
            self.current[ear].delay = if tgt > cur {
                cur + 1
            } else if tgt < cur {
                cur - 1
            } else {
                cur
            };
            self.current[ear].lowpass = self.target[ear].lowpass;
        }

        let start = [self.current[0].gain, self.current[1].gain];
        let end = [self.target[0].gain, self.target[1].gain];
        let delays = [self.current[0].delay % len, self.current[1].delay % len];
        let lowpass = [self.current[0].lowpass, self.current[1].lowpass];

        for f in 0..frames {
            let t = (f + 1) as f32 / frames as f32;
            for ear in 0..2 {
                let x = self.buffer[(self.cursor + len - delays[ear]) % len];
                self.lp_state[ear] += lowpass[ear] * (x - self.lp_state[ear]);
                let g = start[ear] + (end[ear] - start[ear]) * t;
                out[2 * f + ear] += self.lp_state[ear] * g;
            }
            self.cursor = (self.cursor + 1) % len;
        }

        self.current[0].gain = end[0];
        self.current[1].gain = end[1];
    }
}

/// 混音器 (由渲染回调独占)
pub struct Mixer {
    bank: Arc<SignatureBank>,
    voices: HashMap<u32, Voice>,
    /// 已移除、正在淡出的声源 (渲染一个块后释放)
    releasing: Vec<Voice>,
    sample_rate: u32,
    binaural: bool,
    master_gain: f32,
}

impl Mixer {
    pub fn new(bank: Arc<SignatureBank>, config: &AudioConfig) -> Self {
        Self {
            bank,
            voices: HashMap::new(),
            releasing: Vec::new(),
            sample_rate: config.sample_rate,
            binaural: config.binaural,
            master_gain: config.master_gain,
        }
    }

    pub fn active_sources(&self) -> usize {
        self.voices.len()
    }

    pub fn has_source(&self, id: u32) -> bool {
        self.voices.contains_key(&id)
    }

    pub fn apply(&mut self, command: MixCommand) {
        match command {
            MixCommand::Scene(scene) => self.apply_scene(&scene),
            MixCommand::Clear => self.clear(),
        }
    }

    /// 同步声源集合: 新ID创建, 已有ID更新目标参数, 消失的ID移除
    pub fn apply_scene(&mut self, scene: &[SourceParams]) {
        let gone: Vec<u32> = self
            .voices
            .keys()
            .filter(|id| !scene.iter().any(|p| p.id == **id))
            .copied()
            .collect();
        for id in gone {
            self.release(id);
        }

        for params in scene {
            let target = ear_params(params, self.binaural, self.sample_rate, self.master_gain);
            match self.voices.get_mut(&params.id) {
                Some(voice) => voice.target = target,
                None => {
                    let voice = Voice::new(self.bank.get(params.signature), target);
                    self.voices.insert(params.id, voice);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        let ids: Vec<u32> = self.voices.keys().copied().collect();
        for id in ids {
            self.release(id);
        }
    }

    fn release(&mut self, id: u32) {
        if let Some(mut voice) = self.voices.remove(&id) {
            voice.target[0].gain = 0.0;
            voice.target[1].gain = 0.0;
            self.releasing.push(voice);
        }
    }

    /// 渲染一块交错立体声 (L, R, L, R, ...)
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = out.len() / 2;

        for voice in self.voices.values_mut() {
            voice.mix_into(out, frames);
        }
        for voice in self.releasing.iter_mut() {
            voice.mix_into(out, frames);
        }
        self.releasing.clear();

        // 防削波
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 1.0 {
            out.iter_mut().for_each(|s| *s /= peak);
        }
    }
}
