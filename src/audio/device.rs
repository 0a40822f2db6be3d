//! cpal 输出设备 (仅 `device` 功能)
//!
//! cpal::Stream 不能跨线程移动, 因此在专用线程中创建并持有, 直到收到停止信号。

use super::engine::{render_block, OutputHandle};
use super::mixer::{MixCommand, Mixer};
use crate::config::AudioConfig;
use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

pub fn open(config: &AudioConfig, mixer: Mixer, rx: Receiver<MixCommand>) -> Result<OutputHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = bounded::<Result<String>>(1);
    let (sample_rate, buffer_frames) = (config.sample_rate, config.buffer_frames);

    let stop_flag = stop.clone();
    let handle = thread::Builder::new()
        .name("nova-audio-out".into())
        .spawn(move || {
            let stream = match build_stream(sample_rate, buffer_frames, mixer, rx) {
                Ok((stream, name)) => {
                    let _ = ready_tx.send(Ok(name));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            while !stop_flag.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        })
        .context("无法启动音频输出线程")?;

    match ready_rx.recv_timeout(Duration::from_secs(5)) {
        Ok(Ok(name)) => {
            info!("🔈 音频输出设备: {} ({}Hz)", name, sample_rate);
            Ok(OutputHandle::new(stop, handle))
        }
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            stop.store(true, Ordering::Release);
            bail!("音频设备初始化超时")
        }
    }
}

fn build_stream(
    sample_rate: u32,
    buffer_frames: u32,
    mut mixer: Mixer,
    rx: Receiver<MixCommand>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("没有默认音频输出设备")?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let stream_config = cpal::StreamConfig {
        channels: 2,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: if buffer_frames == 0 {
            cpal::BufferSize::Default
        } else {
            cpal::BufferSize::Fixed(buffer_frames)
        },
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render_block(&mut mixer, &rx, data);
            },
            |err| warn!("⚠️ 音频流错误: {}", err),
            None,
        )
        .context("创建音频输出流失败")?;
    stream.play().context("启动音频流失败")?;
    Ok((stream, name))
}
