//! Container muxing.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::EncoderEvents;
use crate::error::Result;
use crate::format::{EncodedAudioFormat, EncodedVideoFormat};
use crate::frame::RawPacket;

/// Where a muxer writes its container output.
pub enum MuxerOutput {
    /// A target the muxer opens itself: a file path or a streaming URL
    /// (`rtmp://`, `srt://`); the container format is inferred from it.
    Url(String),
    /// A caller-owned byte stream with an explicit container format name
    /// (`"mp4"`, `"mpegts"`, `"matroska"`).
    Stream {
        stream: Box<dyn Write + Send>,
        format: String,
    },
}

impl std::fmt::Debug for MuxerOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuxerOutput::Url(url) => f.debug_tuple("Url").field(url).finish(),
            MuxerOutput::Stream { format, .. } => {
                f.debug_struct("Stream").field("format", format).finish()
            }
        }
    }
}

/// Identifies one elementary stream within an open muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub usize);

/// Interleaves encoded packets from one or more streams into a container.
///
/// Streams are registered before [`open`](Muxer::open); packets for each
/// stream must arrive in decode order, and [`close`](Muxer::close) finalizes
/// the container (for formats with trailing indices this is what makes the
/// output playable).
pub trait Muxer: Send {
    fn add_audio_stream(&mut self, format: EncodedAudioFormat) -> Result<StreamId>;

    fn add_video_stream(&mut self, format: EncodedVideoFormat) -> Result<StreamId>;

    fn open(&mut self, output: MuxerOutput) -> Result<()>;

    fn write_packet(&mut self, stream: StreamId, packet: RawPacket) -> Result<()>;

    /// Total duration written so far, when the container tracks one.
    fn duration(&self) -> Option<Duration> {
        None
    }

    fn close(&mut self) -> Result<()>;
}

/// Subscribe a muxer to an encoder's output, feeding every encoded packet
/// into `stream`.
///
/// The muxer stays caller-owned behind the shared mutex, so several
/// encoders (an audio and a video stream) can feed the same container.
/// Write failures cannot surface to the encoder's thread from here; they
/// are logged and the remaining packets keep flowing.
pub fn attach_encoder(
    muxer: &Arc<Mutex<dyn Muxer>>,
    stream: StreamId,
    events: &mut EncoderEvents,
) {
    let muxer = Arc::clone(muxer);
    events.frame_encoded.subscribe(move |packet| {
        let mut muxer = match muxer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = muxer.write_packet(stream, packet.clone()) {
            log::error!("muxer write to stream {} failed: {err}", stream.0);
        }
    });
}
