//! Wall-clock pacing for decoded streams.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::device::{DeviceHandle, DeviceState};
use crate::error::Result;
use crate::format::FrameFormat;
use crate::frame::RawFrame;
use crate::modifier::Modifier;

/// Sleep bounds for one pacing step. The lower bound avoids busy spinning
/// on sub-millisecond waits, the upper bound keeps the gate responsive to
/// scrub requests and close.
const MIN_STEP: Duration = Duration::from_millis(1);
const MAX_STEP: Duration = Duration::from_millis(100);

/// Control surface of a [`SyncPlayModifier`], usable from any thread.
#[derive(Clone)]
pub struct SyncPlayHandle {
    scrub: Arc<AtomicBool>,
    skipped: Arc<AtomicU64>,
}

impl SyncPlayHandle {
    /// Forward the next frame immediately, regardless of its timing.
    ///
    /// One-shot; the gate clears the flag when it consumes it. Call after a
    /// seek so the first frame at the new position shows up without waiting
    /// for the clock.
    pub fn scrub(&self) {
        self.scrub.store(true, Ordering::Release);
    }

    /// Total frames dropped for arriving after their presentation window.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Acquire)
    }
}

/// Paces frames against a clock: early frames wait, on-time frames pass,
/// frames whose presentation window has already passed are dropped and
/// counted.
///
/// Pacing applies to frames carrying both a pts and a duration; frames
/// without timing bypass the gate entirely. While the device is not
/// running, timed frames are discarded so stale data cannot pile up behind
/// a pause.
pub struct SyncPlayModifier<F: FrameFormat> {
    clock: Option<Box<dyn Fn() -> Duration + Send>>,
    epoch: Option<Instant>,
    device: Option<DeviceHandle>,
    scrub: Arc<AtomicBool>,
    skipped: Arc<AtomicU64>,
    _format: PhantomData<fn(F)>,
}

impl<F: FrameFormat> SyncPlayModifier<F> {
    /// Pace against wall time measured from the device opening.
    pub fn new() -> Self {
        Self {
            clock: None,
            epoch: None,
            device: None,
            scrub: Arc::new(AtomicBool::new(false)),
            skipped: Arc::new(AtomicU64::new(0)),
            _format: PhantomData,
        }
    }

    /// Pace against an external clock, for syncing against another
    /// stream's position.
    pub fn with_clock(clock: impl Fn() -> Duration + Send + 'static) -> Self {
        Self {
            clock: Some(Box::new(clock)),
            ..Self::new()
        }
    }

    pub fn handle(&self) -> SyncPlayHandle {
        SyncPlayHandle {
            scrub: self.scrub.clone(),
            skipped: self.skipped.clone(),
        }
    }

    fn now(&self) -> Duration {
        match (&self.clock, self.epoch) {
            (Some(clock), _) => clock(),
            (None, Some(epoch)) => epoch.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }
}

impl<F: FrameFormat> Default for SyncPlayModifier<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FrameFormat> Modifier<F> for SyncPlayModifier<F> {
    fn open(&mut self, device: &DeviceHandle, _source_format: &F) -> Result<()> {
        self.epoch = Some(Instant::now());
        self.device = Some(device.clone());
        Ok(())
    }

    fn modify_frame(&mut self, frame: RawFrame<F>) -> Result<Option<RawFrame<F>>> {
        let (Some(pts), Some(duration)) = (frame.pts, frame.duration) else {
            // untimed frames bypass pacing
            return Ok(Some(frame));
        };

        loop {
            // re-checked every step so a frame waiting in the gate is
            // discarded when the device pauses or closes under it
            if let Some(device) = &self.device {
                if device.current_state() != DeviceState::Running {
                    return Ok(None);
                }
            }
            if self.scrub.swap(false, Ordering::AcqRel) {
                return Ok(Some(frame));
            }

            let now = self.now();
            if now < pts {
                // early; wait in bounded steps so scrub and pause stay
                // responsive
                std::thread::sleep((pts - now).clamp(MIN_STEP, MAX_STEP));
            } else if now <= pts + duration {
                return Ok(Some(frame));
            } else {
                // presentation window already passed
                self.skipped.fetch_add(1, Ordering::AcqRel);
                return Ok(None);
            }
        }
    }

    fn close(&mut self, _device: &DeviceHandle) -> Result<()> {
        self.device = None;
        self.epoch = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameSink;
    use crate::device::{CaptureContext, CaptureSource, InputDevice};
    use crate::error::Result;
    use crate::format::AudioFormat;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn fmt() -> AudioFormat {
        AudioFormat::new(8_000, 16, 1).unwrap()
    }

    fn frame_at(pts: Duration) -> RawFrame<AudioFormat> {
        RawFrame::alloc(4, fmt()).with_timing(pts, Duration::from_secs(1))
    }

    #[test]
    fn test_early_frame_waits_for_the_clock() {
        let position = Arc::new(Mutex::new(Duration::from_secs(9)));
        let clock = position.clone();
        let mut gate = SyncPlayModifier::with_clock(move || *clock.lock().unwrap());

        let started = Instant::now();
        let ticker = position.clone();
        let advance = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            *ticker.lock().unwrap() = Duration::from_secs(10);
        });

        let out = gate.modify_frame(frame_at(Duration::from_secs(10))).unwrap();
        assert!(out.is_some());
        assert!(started.elapsed() >= Duration::from_millis(40));
        advance.join().unwrap();
    }

    #[test]
    fn test_on_time_frame_passes_immediately() {
        let mut gate = SyncPlayModifier::with_clock(|| Duration::from_millis(10_500));
        let started = Instant::now();
        let out = gate.modify_frame(frame_at(Duration::from_secs(10))).unwrap();
        assert!(out.is_some());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_late_frame_is_dropped_and_counted() {
        let mut gate = SyncPlayModifier::with_clock(|| Duration::from_secs(12));
        let handle = gate.handle();

        assert!(gate.modify_frame(frame_at(Duration::from_secs(10))).unwrap().is_none());
        assert_eq!(handle.skipped(), 1);
    }

    #[test]
    fn test_untimed_frames_bypass_pacing() {
        let mut gate = SyncPlayModifier::with_clock(|| Duration::ZERO);
        let out = gate.modify_frame(RawFrame::alloc(4, fmt())).unwrap();
        assert!(out.is_some());
    }

    #[test]
    fn test_scrub_forwards_one_frame_regardless_of_timing() {
        // clock far ahead: the frame would normally be dropped as late
        let mut gate = SyncPlayModifier::with_clock(|| Duration::from_secs(100));
        let handle = gate.handle();

        handle.scrub();
        assert!(gate.modify_frame(frame_at(Duration::from_secs(1))).unwrap().is_some());
        // one-shot: the next late frame drops again
        assert!(gate.modify_frame(frame_at(Duration::from_secs(2))).unwrap().is_none());
        assert_eq!(handle.skipped(), 1);
    }

    /// Emits a single frame timestamped well into the future, then ends.
    struct OneEarlyFrame {
        format: AudioFormat,
    }

    impl CaptureSource<AudioFormat> for OneEarlyFrame {
        fn uid(&self) -> &str {
            "early"
        }

        fn format(&self) -> &AudioFormat {
            &self.format
        }

        fn open(&mut self, _device: &crate::device::DeviceHandle) -> Result<()> {
            Ok(())
        }

        fn run(&mut self, ctx: &mut CaptureContext<'_, AudioFormat>) -> Result<()> {
            ctx.checkpoint()?;
            let frame = RawFrame::alloc(4, self.format)
                .with_timing(Duration::from_secs(5), Duration::from_millis(100));
            ctx.process_frame(frame)
        }

        fn close(&mut self, _device: &crate::device::DeviceHandle) -> Result<()> {
            Ok(())
        }
    }

    struct CountingSink(Arc<AtomicUsize>);

    impl FrameSink<AudioFormat> for CountingSink {
        fn open(&mut self, _device: &crate::device::DeviceHandle, _format: &AudioFormat) -> Result<()> {
            Ok(())
        }

        fn push_frame(&mut self, _frame: RawFrame<AudioFormat>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self, _device: &crate::device::DeviceHandle) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pausing_drops_a_frame_already_waiting_in_the_gate() {
        let gate = SyncPlayModifier::new();
        let handle = gate.handle();
        let delivered = Arc::new(AtomicUsize::new(0));

        let mut device = InputDevice::new(Box::new(OneEarlyFrame { format: fmt() }));
        device.set_modifier(Box::new(gate)).unwrap();
        device.set_sink(Box::new(CountingSink(delivered.clone()))).unwrap();

        device.open().unwrap();
        device.start().unwrap();
        // the worker is now sleeping towards the frame's 5 s pts
        std::thread::sleep(Duration::from_millis(50));
        device.pause().unwrap();

        // the waiting frame must be dropped on the next step, not slept out
        let deadline = Instant::now() + Duration::from_secs(2);
        while device.current_state() != DeviceState::Closed && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(device.current_state(), DeviceState::Closed);
        device.close().unwrap();

        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        // dropped for the pause, not counted as late
        assert_eq!(handle.skipped(), 0);
        device.throw_and_clear().unwrap();
    }
}
