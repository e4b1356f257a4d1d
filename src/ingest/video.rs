//! Local video file source using FFmpeg.
//!
//! Decodes the best video stream in-memory and converts each frame to RGB24. End of
//! file drains the decoder and then reports end of stream.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::FrameSource;
use crate::frame::Frame;

pub struct VideoFileSource {
    path: PathBuf,
    state: Option<DecoderState>,
    frame_count: u64,
}

struct DecoderState {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl VideoFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: None,
            frame_count: 0,
        }
    }

    fn open_decoder(&self) -> Result<DecoderState> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&self.path).with_context(|| {
            format!("failed to open video file '{}' with ffmpeg", self.path.display())
        })?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(DecoderState {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        format!("video {}", self.path.display())
    }

    fn open(&mut self) -> Result<()> {
        let state = self.open_decoder()?;
        log::info!(
            "VideoFileSource: opened {} ({}x{})",
            self.path.display(),
            state.decoder.width(),
            state.decoder.height()
        );
        self.state = Some(state);
        self.frame_count = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("video source not opened"))?;
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                state
                    .scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
                let frame = Frame::from_rgb(pixels, width, height, self.frame_count)?;
                self.frame_count += 1;
                return Ok(Some(frame));
            }
            if state.eof_sent {
                return Ok(None);
            }

            let mut sent = false;
            for (stream, packet) in state.input.packets() {
                if stream.index() != state.stream_index {
                    continue;
                }
                state
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                sent = true;
                break;
            }
            if !sent {
                state
                    .decoder
                    .send_eof()
                    .context("flush ffmpeg decoder")?;
                state.eof_sent = true;
            }
        }
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "VideoFileSource: closed {} after {} frames",
                self.path.display(),
                self.frame_count
            );
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}
