// GNU AGPL v3 License

//! Reading the audio track and video geometry of the input file.

mod sample;

use crate::segment::AudioSignal;
use anyhow::{anyhow, Context as _, Result};
use crossbeam_channel::{bounded, Receiver};
use ffmpeg::{
    decoder::Audio as AudioDecoder,
    format::{sample::Type as SampleType, Sample},
    frame::Audio,
    media::Type,
    packet::Packet,
    software::resampling::Context as Resampler,
    ChannelLayout, Rational, Stream,
};
use std::{
    fmt, mem,
    path::Path,
    thread::{self, JoinHandle},
};

const EMIT_EVERY: usize = 500;
const PACKET_QUEUE: usize = 10000;
const RESAMPLE_SLACK: usize = 256;
const MAX_FLUSHES: usize = 1024;

/// What the rest of the program needs to know about the input.
pub(crate) struct MediaInfo {
    pub(crate) signal: AudioSignal,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) frame_rate: f64,
}

impl fmt::Debug for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaInfo")
            .field("signal", &self.signal)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_rate", &self.frame_rate)
            .finish()
    }
}

/// Decode the audio of `path` to mono `f32` at `sample_rate` Hz.
pub(crate) fn media_info(path: &Path, sample_rate: u32) -> Result<MediaInfo> {
    decode(path, sample_rate).with_context(|| format!("failed to decode {}", path.display()))
}

fn decode(path: &Path, sample_rate: u32) -> Result<MediaInfo> {
    let mut input_ctx = ffmpeg::format::input(&path)?;

    let video = input_ctx
        .streams()
        .best(Type::Video)
        .ok_or_else(|| anyhow!("No video stream found"))?;
    let audio = input_ctx
        .streams()
        .best(Type::Audio)
        .ok_or_else(|| anyhow!("No audio stream found"))?;
    let audio_index = audio.index();

    let frame_rate = match rational_to_float(&video.avg_frame_rate()) {
        Some(rate) => rate,
        None => rational_to_float(&video.rate())
            .ok_or_else(|| anyhow!("Video stream has no frame rate"))?,
    };
    let video_decoder = video.codec().decoder().video()?;
    let (width, height) = (video_decoder.width(), video_decoder.height());

    tracing::info!(
        "Video stream is {}x{} at {:.3} fps",
        width,
        height,
        frame_rate
    );

    let (send_audio_packets, recv_audio_packets) = bounded::<Packet>(PACKET_QUEUE);
    let handle = spawn_audio_thread(&audio, recv_audio_packets, sample_rate)?;

    for (iter_index, res) in input_ctx.packets().enumerate() {
        if iter_index % EMIT_EVERY == 0 {
            tracing::debug!("Read {} packets", iter_index);
        }

        let (stream, packet) = res?;
        if stream.index() == audio_index {
            send_audio_packets.send(packet)?;
        }
    }

    mem::drop(send_audio_packets);

    let samples = handle
        .join()
        .map_err(|_| anyhow!("Audio decoding thread panicked"))??;

    let signal = AudioSignal::new(samples, sample_rate);
    tracing::info!(
        "Decoded {} samples ({:.1}s) of audio",
        signal.len(),
        signal.seconds()
    );

    Ok(MediaInfo {
        signal,
        width,
        height,
        frame_rate,
    })
}

fn spawn_audio_thread(
    stream: &Stream,
    recv_audio_packets: Receiver<Packet>,
    sample_rate: u32,
) -> Result<JoinHandle<Result<Vec<f32>>>> {
    let mut audio_decoder = stream.codec().decoder().audio()?;

    Ok(thread::Builder::new()
        .name("audio-decoder".to_string())
        .spawn(move || {
            // some containers leave the layout unset
            let layout = match audio_decoder.channel_layout() {
                layout if layout.is_empty() => {
                    ChannelLayout::default(audio_decoder.channels() as i32)
                }
                layout => layout,
            };

            let mut resampler = Resampler::get(
                audio_decoder.format(),
                layout,
                audio_decoder.rate(),
                Sample::F32(SampleType::Packed),
                ChannelLayout::MONO,
                sample_rate,
            )?;
            let mut samples = vec![];

            loop {
                match recv_audio_packets.recv() {
                    Ok(packet) => {
                        audio_decoder.send_packet(&packet)?;
                        handle_audio_decoding(
                            &mut audio_decoder,
                            &mut resampler,
                            layout,
                            sample_rate,
                            &mut samples,
                        )?;
                    }
                    Err(_) => {
                        // packet channel is dropped, signalling time to end
                        audio_decoder.send_eof()?;
                        handle_audio_decoding(
                            &mut audio_decoder,
                            &mut resampler,
                            layout,
                            sample_rate,
                            &mut samples,
                        )?;
                        break;
                    }
                }
            }

            drain(&mut samples, |samples| {
                let mut rest = output_frame(RESAMPLE_SLACK);
                let delay = resampler.flush(&mut rest)?;
                push_samples(&rest, samples)?;
                Ok((rest.samples(), delay.is_some()))
            })?;

            anyhow::Ok(samples)
        })?)
}

fn handle_audio_decoding(
    decoder: &mut AudioDecoder,
    resampler: &mut Resampler,
    layout: ChannelLayout,
    out_rate: u32,
    samples: &mut Vec<f32>,
) -> Result<()> {
    let mut aframe = Audio::empty();

    while decoder.receive_frame(&mut aframe).is_ok() {
        if aframe.channel_layout().is_empty() {
            aframe.set_channel_layout(layout);
        }

        let capacity = output_capacity(aframe.samples(), decoder.rate(), out_rate);
        let mut resampled = output_frame(capacity);
        resampler.run(&aframe, &mut resampled)?;
        push_samples(&resampled, samples)?;
    }

    Ok(())
}

/// An allocated mono `f32` frame that the resampler can write into.
fn output_frame(capacity: usize) -> Audio {
    let mut frame = Audio::new(
        Sample::F32(SampleType::Packed),
        capacity,
        ChannelLayout::MONO,
    );
    frame.set_channels(1);
    frame
}

/// Room for `in_samples` converted from `in_rate` to `out_rate`, plus slack
/// for samples the resampler is still holding.
fn output_capacity(in_samples: usize, in_rate: u32, out_rate: u32) -> usize {
    let converted = in_samples as u64 * out_rate as u64 / in_rate.max(1) as u64;
    converted as usize + RESAMPLE_SLACK
}

/// Call `pull` until it yields nothing or reports nothing left buffered.
///
/// `pull` appends to `samples` and returns how many samples it added and
/// whether more are pending.
fn drain(
    samples: &mut Vec<f32>,
    mut pull: impl FnMut(&mut Vec<f32>) -> Result<(usize, bool)>,
) -> Result<()> {
    for _ in 0..MAX_FLUSHES {
        let (added, pending) = pull(samples)?;
        if added == 0 || !pending {
            return Ok(());
        }
    }

    Err(anyhow!("Resampler still held samples after {} flushes", MAX_FLUSHES))
}

fn push_samples(frame: &Audio, samples: &mut Vec<f32>) -> Result<()> {
    if frame.samples() == 0 {
        return Ok(());
    }

    let decoded = sample::decode_samples(
        frame.data(0),
        frame.format(),
        frame.channels() as usize,
        frame.samples(),
    )?;
    samples.extend(decoded);
    Ok(())
}

fn rational_to_float(rational: &Rational) -> Option<f64> {
    match rational.denominator() {
        0 => None,
        den => Some(rational.numerator() as f64 / den as f64).filter(|rate| *rate > 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntsc_rate_is_fractional() {
        let rate = rational_to_float(&Rational::new(30000, 1001)).unwrap();
        assert!((rate - 29.97).abs() < 0.001);
    }

    #[test]
    fn upsampled_output_fits_in_frame() {
        // 8 kHz to 22.05 kHz nearly triples the sample count
        let capacity = output_capacity(1024, 8000, 22050);
        assert!(capacity >= 1024 * 22050 / 8000 + 1);
        assert!(output_capacity(0, 0, 22050) >= RESAMPLE_SLACK);
    }

    #[test]
    fn drain_pulls_until_buffer_is_empty() {
        // 700 buffered samples come out 256 at a time
        let mut held = 700usize;
        let mut samples = vec![];
        drain(&mut samples, |samples| {
            let out = held.min(RESAMPLE_SLACK);
            held -= out;
            samples.extend(std::iter::repeat(0.5).take(out));
            Ok((out, held > 0))
        })
        .unwrap();

        assert_eq!(samples.len(), 700);
        assert_eq!(held, 0);
    }

    #[test]
    fn drain_stops_on_empty_output() {
        let mut calls = 0;
        let mut samples = vec![1.0];
        drain(&mut samples, |_| {
            calls += 1;
            Ok((0, true))
        })
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(samples, vec![1.0]);
    }

    #[test]
    fn drain_gives_up_on_stuck_resampler() {
        let mut samples = vec![];
        let result = drain(&mut samples, |samples| {
            samples.push(0.0);
            Ok((1, true))
        });

        assert!(result.is_err());
        assert_eq!(samples.len(), MAX_FLUSHES);
    }

    #[test]
    fn unset_rate_is_none() {
        assert_eq!(rational_to_float(&Rational::new(0, 1)), None);
        assert_eq!(rational_to_float(&Rational::new(1, 0)), None);
    }
}
