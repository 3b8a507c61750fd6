// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

#[cfg(test)]
use std::error::Error;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, span, warn, Level};

use super::mixer::AudioMixer;
use super::{AudioError, Device as AudioDevice, Voice};
use crate::config;

/// Frames mixed per producer iteration.
const BLOCK_FRAMES: usize = 512;

/// Audio buffered between the mixer and the output stream.
pub const BUFFER_LATENCY: Duration = Duration::from_millis(100);

/// How long the producer waits when there's nothing to do.
const IDLE_SLEEP: Duration = Duration::from_micros(500);

/// How long to wait for the output thread to answer a resume request.
const RESUME_TIMEOUT: Duration = Duration::from_secs(2);

/// Lock-free single producer, single consumer ring of samples.
struct CircularBuffer {
    /// Samples stored as their bit patterns.
    buffer: Box<[AtomicU32]>,
    /// Capacity (always a power of 2)
    capacity: usize,
    /// Read position (consumer)
    read_pos: AtomicUsize,
    /// Write position (producer)
    write_pos: AtomicUsize,
}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        Self {
            buffer: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Get number of samples available to read
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.capacity - read + write
        }
    }

    /// Get space available to write
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Returns number of samples actually written
    fn write(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let write = self.write_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        for (offset, sample) in samples[..to_write].iter().enumerate() {
            self.buffer[(write + offset) & mask].store(sample.to_bits(), Ordering::Relaxed);
        }

        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Returns number of samples actually read
    fn read(&self, output: &mut [f32]) -> usize {
        let to_read = self.available().min(output.len());
        let read = self.read_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;

        for (offset, sample) in output[..to_read].iter_mut().enumerate() {
            *sample = f32::from_bits(self.buffer[(read + offset) & mask].load(Ordering::Relaxed));
        }

        self.read_pos.store((read + to_read) & mask, Ordering::Release);
        to_read
    }
}

/// Flags shared between the device handle and its threads.
struct StreamState {
    running: AtomicBool,
    suspended: AtomicBool,
}

enum StreamCommand {
    Resume(crossbeam_channel::Sender<Result<(), String>>),
    Shutdown,
}

/// An output device as reported by cpal.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// A cpal output stream fed by a mixing thread through a ring buffer.
///
/// The stream is built paused. It only starts once [`resume`](AudioDevice::resume)
/// is called, and voices added before that wait until it does.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    num_channels: u16,
    sample_rate: u32,
    voice_tx: crossbeam_channel::Sender<Box<dyn Voice>>,
    command_tx: crossbeam_channel::Sender<StreamCommand>,
    state: Arc<StreamState>,
    /// Owns the cpal stream.
    output_thread: Option<thread::JoinHandle<()>>,
    /// Fills the ring buffer.
    producer_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, {} Hz) ({})",
            self.name,
            self.num_channels,
            self.sample_rate,
            self.host_id.name()
        )
    }
}

/// Builds an output stream that drains the ring, converting to the device's format.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<CircularBuffer>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let scratch = &mut scratch[..data.len()];
            let read = ring.read(scratch);
            // Zero-fill any shortfall
            scratch[read..].fill(0.0);

            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| error!(err = err.to_string(), "Output stream error"),
        None,
    )
}

fn build_for_format(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: Arc<CircularBuffer>,
) -> Result<cpal::Stream, String> {
    let result = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring),
        cpal::SampleFormat::F64 => build_stream::<f64>(device, config, ring),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring),
        other => return Err(format!("unsupported sample format {:?}", other)),
    };
    result.map_err(|e| e.to_string())
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceInfo>, AudioError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().map_err(|e| AudioError::Device(e.to_string()))?;
        let _shh_stderr = shh::stderr().map_err(|e| AudioError::Device(e.to_string()))?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    warn!(err = e.to_string(), host = host_id.name(), "Host unavailable");
                    continue;
                }
            };
            let host_devices = match host.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(DeviceInfo {
                        name: device
                            .name()
                            .map_err(|e| AudioError::Device(e.to_string()))?,
                        host: host_id.name().to_string(),
                        max_channels,
                    });
                }
            }
        }

        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    /// Finds the named output device. "default" selects the default host's default output.
    fn find(name: &str) -> Result<(cpal::HostId, cpal::Device), AudioError> {
        let _shh_stderr = shh::stderr().map_err(|e| AudioError::Device(e.to_string()))?;

        if name == config::audio::DEFAULT_DEVICE {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| AudioError::NoDevice(name.to_string()))?;
            return Ok((host.id(), device));
        }

        for host_id in cpal::available_hosts() {
            let Ok(host) = cpal::host_from_id(host_id) else {
                continue;
            };
            let Ok(devices) = host.output_devices() else {
                continue;
            };
            for device in devices {
                if device
                    .name()
                    .map(|device_name| device_name.trim() == name)
                    .unwrap_or(false)
                {
                    return Ok((host_id, device));
                }
            }
        }

        Err(AudioError::NoDevice(name.to_string()))
    }

    /// Opens the configured device. The stream starts suspended.
    pub fn get(config: &config::Audio) -> Result<Device, AudioError> {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let (host_id, device) = Device::find(config.device())?;
        let name = device
            .name()
            .unwrap_or_else(|_| config.device().to_string());
        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        let num_channels = default_config.channels();
        let sample_rate = config
            .sample_rate()
            .unwrap_or(default_config.sample_rate().0);
        let sample_format = default_config.sample_format();

        let mixer = AudioMixer::new(num_channels, sample_rate, config.master_gain());
        let state = Arc::new(StreamState {
            running: AtomicBool::new(true),
            suspended: AtomicBool::new(true),
        });

        let capacity_samples = (sample_rate as usize * num_channels as usize)
            * BUFFER_LATENCY.as_millis() as usize
            / 1000;
        let ring = Arc::new(CircularBuffer::new(capacity_samples.max(4096)));

        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<Box<dyn Voice>>();
        let producer_thread = {
            let mixer = mixer.clone();
            let ring = ring.clone();
            let state = state.clone();
            thread::spawn(move || {
                let block_samples = BLOCK_FRAMES * num_channels as usize;
                let mut scratch = vec![0.0f32; block_samples];

                while state.running.load(Ordering::Acquire) {
                    let suspended = state.suspended.load(Ordering::Acquire);
                    while let Ok(voice) = voice_rx.try_recv() {
                        if suspended {
                            debug!(pitch = %voice.pitch(), "Output suspended, dropping voice");
                            continue;
                        }
                        mixer.add_voice(voice);
                    }

                    if !suspended && ring.space() >= block_samples {
                        mixer.process_into_output(&mut scratch, BLOCK_FRAMES);
                        ring.write(&scratch);
                    } else {
                        thread::sleep(IDLE_SLEEP);
                    }
                }
            })
        };

        let (command_tx, command_rx) = crossbeam_channel::unbounded::<StreamCommand>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let output_thread = {
            let state = state.clone();
            thread::spawn(move || {
                let stream_config = cpal::StreamConfig {
                    channels: num_channels,
                    sample_rate: cpal::SampleRate(sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream = match build_for_format(&device, &stream_config, sample_format, ring)
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StreamCommand::Resume(reply) => {
                            let result = stream.play().map_err(|e| e.to_string());
                            if result.is_ok() {
                                state.suspended.store(false, Ordering::Release);
                            }
                            let _ = reply.send(result);
                        }
                        StreamCommand::Shutdown => break,
                    }
                }
            })
        };

        let device = Device {
            name,
            host_id,
            num_channels,
            sample_rate,
            voice_tx,
            command_tx,
            state,
            output_thread: Some(output_thread),
            producer_thread: Some(producer_thread),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = device.name,
                    channels = num_channels,
                    sample_rate,
                    format = format!("{:?}", sample_format),
                    "Output stream ready"
                );
                Ok(device)
            }
            Ok(Err(e)) => Err(AudioError::Device(e)),
            Err(_) => Err(AudioError::Device("output thread exited".to_string())),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
        let _ = self.command_tx.send(StreamCommand::Shutdown);

        if let Some(thread) = self.producer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl AudioDevice for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_suspended(&self) -> bool {
        self.state.suspended.load(Ordering::Acquire)
    }

    fn resume(&self) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.command_tx
            .send(StreamCommand::Resume(reply_tx))
            .map_err(|_| AudioError::Closed)?;

        match reply_rx.recv_timeout(RESUME_TIMEOUT) {
            Ok(result) => result.map_err(AudioError::Resume),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(AudioError::Resume(
                "timed out waiting for the output stream".to_string(),
            )),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(AudioError::Closed),
        }
    }

    fn add_voice(&self, voice: Box<dyn Voice>) -> Result<(), AudioError> {
        self.voice_tx.send(voice).map_err(|_| AudioError::Closed)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ring_wraps_around() {
        let ring = CircularBuffer::new(8);
        assert_eq!(ring.space(), 7);

        assert_eq!(ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]), 5);
        let mut out = [0.0f32; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);

        // Crosses the end of the buffer.
        assert_eq!(ring.write(&[6.0, 7.0, 8.0, 9.0, 10.0]), 5);
        assert_eq!(ring.available(), 6);
        let mut out = [0.0f32; 8];
        assert_eq!(ring.read(&mut out), 6);
        assert_eq!(&out[..6], &[5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_ring_full() {
        let ring = CircularBuffer::new(4);
        assert_eq!(ring.write(&[0.5; 10]), 3);
        assert_eq!(ring.space(), 0);
        assert_eq!(ring.write(&[0.5]), 0);
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            name: "UltraLite-mk5".to_string(),
            host: "ALSA".to_string(),
            max_channels: 22,
        };
        assert_eq!(info.to_string(), "UltraLite-mk5 (Channels=22) (ALSA)");
    }
}
