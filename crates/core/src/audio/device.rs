//! Output-device context backed by `cpal`.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{
    context::{AudioContext, ContextFactory, ContextState},
    graph::{AudioGraph, Voice},
};
use crate::{AudioConfig, Result, SequenceError};

/// Plays the voice graph on the default output device. The device callback
/// owns the clock; [`AudioContext::advance`] is a no-op here.
pub struct DeviceContext {
    graph: Arc<Mutex<AudioGraph>>,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
    stream: Option<cpal::Stream>,
}

impl DeviceContext {
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SequenceError::AudioUnavailable("no default output device".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|err| SequenceError::AudioUnavailable(err.to_string()))?;
        let sample_format = supported.sample_format();
        let stream_config = supported.config();
        let sample_rate = stream_config.sample_rate.0;

        let graph = Arc::new(Mutex::new(AudioGraph::new(
            sample_rate,
            config.master_gain,
            config.noise_seed,
        )));
        let frames = Arc::new(AtomicU64::new(0));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, &graph, &frames)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, &graph, &frames)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, &graph, &frames)?,
            other => {
                return Err(SequenceError::AudioUnavailable(format!(
                    "unsupported device sample format: {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|err| SequenceError::AudioUnavailable(err.to_string()))?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels = stream_config.channels,
            "audio device opened"
        );

        Ok(Self {
            graph,
            frames,
            sample_rate,
            stream: Some(stream),
        })
    }

    fn lock_graph(&self) -> Result<MutexGuard<'_, AudioGraph>> {
        self.graph
            .lock()
            .map_err(|_| SequenceError::msg("audio graph has been poisoned"))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    graph: &Arc<Mutex<AudioGraph>>,
    frames: &Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let sample_rate = f64::from(config.sample_rate.0);
    let graph = graph.clone();
    let frames = frames.clone();
    let mut mono = Vec::<f32>::new();

    device
        .build_output_stream(
            config,
            move |output: &mut [T], _| {
                let count = output.len() / channels;
                mono.resize(count, 0.0);
                let start = frames.fetch_add(count as u64, Ordering::Relaxed) as f64 / sample_rate;
                match graph.lock() {
                    Ok(mut graph) => graph.render(start, &mut mono),
                    Err(_) => mono.iter_mut().for_each(|s| *s = 0.0),
                }
                for (frame, value) in output.chunks_mut(channels).zip(&mono) {
                    let sample = T::from_sample(*value);
                    frame.iter_mut().for_each(|ch| *ch = sample);
                }
            },
            |err| tracing::warn!(%err, "audio stream error"),
            None,
        )
        .map_err(|err| SequenceError::AudioUnavailable(err.to_string()))
}

impl AudioContext for DeviceContext {
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 / f64::from(self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        if self.stream.is_some() {
            ContextState::Running
        } else {
            ContextState::Closed
        }
    }

    fn schedule(&mut self, voice: Voice) -> Result<()> {
        if self.stream.is_none() {
            return Err(SequenceError::ContextClosed);
        }
        self.lock_graph()?.add(voice);
        Ok(())
    }

    fn stop_all(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(SequenceError::ContextClosed);
        }
        let now = self.current_time();
        self.lock_graph()?.stop_all(now);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let stream = self.stream.take().ok_or(SequenceError::ContextClosed)?;
        if let Err(err) = stream.pause() {
            tracing::debug!(%err, "pausing stream before close failed");
        }
        drop(stream);
        self.lock_graph()?.clear();
        Ok(())
    }

    fn active_voices(&self) -> usize {
        self.lock_graph().map(|graph| graph.voice_count()).unwrap_or(0)
    }
}

/// Opens [`DeviceContext`]s on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFactory;

impl ContextFactory for DeviceFactory {
    fn create(&self, config: &AudioConfig) -> Result<Box<dyn AudioContext>> {
        Ok(Box::new(DeviceContext::open(config)?))
    }
}
