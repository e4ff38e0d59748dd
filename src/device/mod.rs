//! Input device lifecycle and the capture worker loop.
//!
//! An [`InputDevice`] owns one [`CaptureSource`] plus an optional modifier
//! and sink, and drives them from a dedicated worker thread. The public
//! control surface (`open`/`start`/`pause`/`close`) runs on the caller's
//! thread and communicates with the worker through shared state, a pause
//! gate and a cancellation token.
//!
//! Errors raised inside the worker never unwind across the thread boundary:
//! they are delivered to the registered error handler, or parked in a sticky
//! slot for [`InputDevice::throw_and_clear`].

mod decoded;

pub use decoded::DecodedSource;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Stopwatch;
use crate::codec::FrameSink;
use crate::error::{MediaError, Result};
use crate::format::FrameFormat;
use crate::frame::RawFrame;
use crate::modifier::Modifier;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ─────────────────────────────── State ───────────────────────────────

/// Lifecycle state of an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No worker thread, resources released. The only state that allows
    /// reconfiguration.
    Closed,
    /// Worker thread is running the setup hooks.
    Opening,
    /// Open but not capturing; the worker is parked at the pause gate.
    Paused,
    /// Actively capturing frames.
    Running,
    /// Teardown hooks are running; the device will reach `Closed` shortly.
    Closing,
}

impl DeviceState {
    pub fn name(self) -> &'static str {
        match self {
            DeviceState::Closed => "closed",
            DeviceState::Opening => "opening",
            DeviceState::Paused => "paused",
            DeviceState::Running => "running",
            DeviceState::Closing => "closing",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────── Gate ────────────────────────────────

/// Manual-reset event parking the worker while the device is paused.
struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn set(&self) {
        *lock(&self.open) = true;
        self.cond.notify_all();
    }

    fn reset(&self) {
        *lock(&self.open) = false;
    }

    /// Block until the gate is set.
    fn wait(&self) {
        let mut open = lock(&self.open);
        while !*open {
            open = match self.cond.wait(open) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

// ─────────────────────────── Shared state ────────────────────────────

type StateSubscriber = Box<dyn FnMut(DeviceState) + Send>;
type ErrorHandler = Box<dyn FnMut(&DeviceHandle, MediaError) + Send>;

/// State shared between a device's control surface, its worker thread and
/// every [`DeviceHandle`] pointing at it.
struct DeviceShared {
    uid: String,
    state: Mutex<DeviceState>,
    state_changed: Condvar,
    state_subs: Mutex<Vec<StateSubscriber>>,
    gate: Gate,
    stopwatch: Mutex<Stopwatch>,
    last_error: Mutex<Option<MediaError>>,
    error_handler: Mutex<Option<ErrorHandler>>,
}

impl DeviceShared {
    fn new(uid: String) -> Arc<Self> {
        Arc::new(Self {
            uid,
            state: Mutex::new(DeviceState::Closed),
            state_changed: Condvar::new(),
            state_subs: Mutex::new(Vec::new()),
            gate: Gate::new(),
            stopwatch: Mutex::new(Stopwatch::new()),
            last_error: Mutex::new(None),
            error_handler: Mutex::new(None),
        })
    }

    fn state(&self) -> DeviceState {
        *lock(&self.state)
    }

    /// Transition to `new`, waking state waiters and notifying subscribers.
    ///
    /// Subscribers run on the transitioning thread while the subscriber list
    /// is locked, so transitions are delivered in order.
    fn set_state(&self, new: DeviceState) {
        let mut subs = lock(&self.state_subs);
        let prev = {
            let mut state = lock(&self.state);
            std::mem::replace(&mut *state, new)
        };
        self.state_changed.notify_all();
        if prev != new {
            log::debug!("device {}: {prev} -> {new}", self.uid);
            for sub in subs.iter_mut() {
                sub(new);
            }
        }
    }

    fn wait_state(&self, mut done: impl FnMut(DeviceState) -> bool) -> DeviceState {
        let mut state = lock(&self.state);
        while !done(*state) {
            state = match self.state_changed.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *state
    }

    /// State write that bypasses subscribers, for the unwind path where
    /// running arbitrary callbacks could turn a panic into an abort.
    fn force_closed(&self) {
        *lock(&self.state) = DeviceState::Closed;
        self.state_changed.notify_all();
    }

    /// Route a worker error to the handler, or park it for
    /// [`InputDevice::throw_and_clear`] when no handler is registered.
    ///
    /// The handler runs without the handler slot locked, so it may call back
    /// into the device. A panicking handler is logged and dropped from the
    /// error path, never unwound into the worker.
    fn deliver_error(self: &Arc<Self>, err: MediaError) {
        let handler = lock(&self.error_handler).take();
        match handler {
            Some(mut handler) => {
                let handle = DeviceHandle {
                    shared: self.clone(),
                };
                let outcome = catch_unwind(AssertUnwindSafe(|| handler(&handle, err)));
                if outcome.is_err() {
                    log::error!("device {}: error handler panicked", self.uid);
                }
                let mut slot = lock(&self.error_handler);
                if slot.is_none() {
                    *slot = Some(handler);
                }
            }
            None => {
                log::warn!("device {}: unhandled capture error parked", self.uid);
                *lock(&self.last_error) = Some(err);
            }
        }
    }
}

// ────────────────────────────── Handle ───────────────────────────────

/// Cheap, cloneable view of a device, safe to hold from any thread.
///
/// Handed to pipeline stages and error handlers so they can identify and
/// inspect the device that drives them without owning it.
#[derive(Clone)]
pub struct DeviceHandle {
    shared: Arc<DeviceShared>,
}

impl DeviceHandle {
    /// A handle not backed by any device, identified only by its uid.
    pub fn detached(uid: &str) -> Self {
        Self {
            shared: DeviceShared::new(uid.to_string()),
        }
    }

    pub fn uid(&self) -> &str {
        &self.shared.uid
    }

    pub fn current_state(&self) -> DeviceState {
        self.shared.state()
    }

    /// Accumulated capture time: advances while running, holds while paused.
    pub fn current_time(&self) -> Duration {
        lock(&self.shared.stopwatch).elapsed()
    }
}

impl PartialEq for DeviceHandle {
    /// Devices with uids compare by uid; uid-less devices by identity.
    fn eq(&self, other: &Self) -> bool {
        if self.shared.uid.is_empty() || other.shared.uid.is_empty() {
            Arc::ptr_eq(&self.shared, &other.shared)
        } else {
            self.shared.uid == other.shared.uid
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("uid", &self.shared.uid)
            .field("state", &self.shared.state())
            .finish()
    }
}

// ───────────────────────── Source and context ────────────────────────

/// A producer of raw frames: a microphone, a camera, a screen grabber, a
/// decoded file.
///
/// `open` and `close` run once per device session on the worker thread. In
/// between, `run` owns the thread: it is expected to call
/// [`CaptureContext::checkpoint`] before producing each frame (honouring
/// pause and cancellation) and hand frames to
/// [`CaptureContext::process_frame`]. Returning `Ok` or
/// [`MediaError::Cancelled`] ends the session normally; any other error is
/// routed through the device's error funnel.
pub trait CaptureSource<F: FrameFormat>: Send {
    /// Stable identifier of the underlying device, unique per endpoint.
    fn uid(&self) -> &str;

    /// The format of the frames this source produces.
    fn format(&self) -> &F;

    /// Whether the underlying endpoint is present and can be opened.
    ///
    /// Checked synchronously by [`InputDevice::open`] before any thread is
    /// spawned; a source backed by removable hardware reports detachment
    /// here.
    fn is_ready(&self) -> bool {
        true
    }

    fn open(&mut self, device: &DeviceHandle) -> Result<()>;

    fn run(&mut self, ctx: &mut CaptureContext<'_, F>) -> Result<()>;

    fn close(&mut self, device: &DeviceHandle) -> Result<()>;
}

/// The capture loop's view of its device, passed to [`CaptureSource::run`].
pub struct CaptureContext<'a, F: FrameFormat> {
    shared: &'a Arc<DeviceShared>,
    cancel: &'a CancellationToken,
    pipeline: &'a mut Pipeline<F>,
}

impl<F: FrameFormat> CaptureContext<'_, F> {
    /// Park while the device is paused, then check for cancellation.
    ///
    /// Call before producing each frame. Returns [`MediaError::Cancelled`]
    /// once the device is closing; the source should propagate it.
    pub fn checkpoint(&self) -> Result<()> {
        self.shared.gate.wait();
        if self.cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        Ok(())
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The session's cancellation token, for sources that block on I/O and
    /// want to race it themselves.
    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }

    pub fn device(&self) -> DeviceHandle {
        DeviceHandle {
            shared: self.shared.clone(),
        }
    }

    /// Send one frame through the modifier chain into the sink.
    pub fn process_frame(&mut self, frame: RawFrame<F>) -> Result<()> {
        self.pipeline.process(frame)
    }
}

// ───────────────────────────── Pipeline ──────────────────────────────

/// The transformation half of a device: modifier chain plus sink.
struct Pipeline<F: FrameFormat> {
    modifier: Option<Box<dyn Modifier<F>>>,
    sink: Option<Box<dyn FrameSink<F>>>,
}

impl<F: FrameFormat> Pipeline<F> {
    fn new() -> Self {
        Self {
            modifier: None,
            sink: None,
        }
    }

    /// The format the sink will receive: the source format as rewritten by
    /// the modifier chain's declared output.
    fn negotiated_format(&self, source: &F) -> F {
        match &self.modifier {
            Some(modifier) => modifier.target_format().apply(source),
            None => source.clone(),
        }
    }

    /// The sink opens first, with the negotiated format, so it is ready
    /// before the modifier can produce anything.
    fn open(&mut self, device: &DeviceHandle, source_format: &F) -> Result<()> {
        let negotiated = self.negotiated_format(source_format);
        if let Some(sink) = &mut self.sink {
            sink.open(device, &negotiated)?;
        }
        if let Some(modifier) = &mut self.modifier {
            modifier.open(device, source_format)?;
        }
        Ok(())
    }

    fn process(&mut self, frame: RawFrame<F>) -> Result<()> {
        let frame = match &mut self.modifier {
            Some(modifier) => match modifier.modify_frame(frame)? {
                Some(frame) => frame,
                None => return Ok(()),
            },
            None => frame,
        };
        if let Some(sink) = &mut self.sink {
            sink.push_frame(frame)?;
        }
        Ok(())
    }

    /// Teardown mirrors frame flow: modifier first, then the sink flushes.
    fn close(&mut self, device: &DeviceHandle) -> Result<()> {
        if let Some(modifier) = &mut self.modifier {
            modifier.close(device)?;
        }
        if let Some(sink) = &mut self.sink {
            sink.close(device)?;
        }
        Ok(())
    }
}

// ────────────────────────────── Device ───────────────────────────────

/// The pieces the worker thread borrows for the duration of one session and
/// returns through its join handle.
struct Parts<F: FrameFormat> {
    source: Box<dyn CaptureSource<F>>,
    pipeline: Pipeline<F>,
}

/// An input device: one capture source, its pipeline, and the worker thread
/// driving them.
///
/// State machine: `Closed -> Opening -> Paused <-> Running -> Closing ->
/// Closed`. Configuration (`set_modifier`, `set_sink`) is only valid while
/// closed. Dropping the device closes it.
pub struct InputDevice<F: FrameFormat> {
    shared: Arc<DeviceShared>,
    format: F,
    parts: Option<Parts<F>>,
    worker: Option<JoinHandle<Parts<F>>>,
    cancel: CancellationToken,
}

pub type AudioInputDevice = InputDevice<crate::format::AudioFormat>;
pub type VideoInputDevice = InputDevice<crate::format::VideoFormat>;

impl<F: FrameFormat> InputDevice<F> {
    pub fn new(source: Box<dyn CaptureSource<F>>) -> Self {
        let shared = DeviceShared::new(source.uid().to_string());
        let format = source.format().clone();
        Self {
            shared,
            format,
            parts: Some(Parts {
                source,
                pipeline: Pipeline::new(),
            }),
            worker: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.shared.uid
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn average_bytes_per_second(&self) -> u64 {
        self.format.average_bytes_per_second()
    }

    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn current_state(&self) -> DeviceState {
        self.shared.state()
    }

    /// Accumulated capture time of the current session.
    pub fn current_time(&self) -> Duration {
        lock(&self.shared.stopwatch).elapsed()
    }

    /// Observe every state transition. Subscribers run on the thread that
    /// performs the transition and must not block.
    pub fn subscribe_state(&self, subscriber: impl FnMut(DeviceState) + Send + 'static) {
        lock(&self.shared.state_subs).push(Box::new(subscriber));
    }

    /// Install the error handler worker errors are delivered to.
    ///
    /// Without a handler, errors park in a sticky slot until
    /// [`throw_and_clear`](Self::throw_and_clear) collects them.
    pub fn set_error_handler(
        &self,
        handler: impl FnMut(&DeviceHandle, MediaError) + Send + 'static,
    ) {
        *lock(&self.shared.error_handler) = Some(Box::new(handler));
    }

    /// Take the parked error, if any.
    pub fn throw_and_clear(&self) -> Result<()> {
        match lock(&self.shared.last_error).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Install the modifier chain. Only valid while closed.
    pub fn set_modifier(&mut self, modifier: Box<dyn Modifier<F>>) -> Result<()> {
        let parts = self.configurable("set_modifier")?;
        parts.pipeline.modifier = Some(modifier);
        Ok(())
    }

    /// Install the frame sink. Only valid while closed.
    pub fn set_sink(&mut self, sink: Box<dyn FrameSink<F>>) -> Result<()> {
        let parts = self.configurable("set_sink")?;
        parts.pipeline.sink = Some(sink);
        Ok(())
    }

    /// The format the sink will receive once the device opens.
    pub fn negotiated_format(&mut self) -> F {
        self.reap();
        match &self.parts {
            Some(parts) => parts.pipeline.negotiated_format(&self.format),
            None => self.format.clone(),
        }
    }

    fn configurable(&mut self, operation: &'static str) -> Result<&mut Parts<F>> {
        self.reap();
        let state = self.shared.state();
        self.parts.as_mut().ok_or(MediaError::InvalidState {
            operation,
            state: state.name(),
        })
    }

    /// Run the setup hooks on a fresh worker thread and park at the pause
    /// gate.
    ///
    /// A no-op on a device that is already open. Blocks until setup
    /// finishes. A source that reports itself not ready fails here,
    /// synchronously, with the device untouched. Errors thrown by the setup
    /// hooks themselves do not surface here: they go through the error
    /// funnel and the device returns to `Closed`, so callers observe them
    /// via the handler, the sticky slot, or the resulting state.
    pub fn open(&mut self) -> Result<()> {
        self.throw_and_clear()?;
        self.reap();
        let Some(parts) = self.parts.take() else {
            // a live worker still holds the parts: already open
            return Ok(());
        };
        if !parts.source.is_ready() {
            self.parts = Some(parts);
            return Err(MediaError::DeviceNotReady {
                uid: self.shared.uid.clone(),
            });
        }

        log::info!("device {}: opening", self.shared.uid);
        self.shared.gate.reset();
        self.shared.set_state(DeviceState::Opening);
        self.cancel = CancellationToken::new();

        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        self.worker = Some(std::thread::spawn(move || {
            worker_main(shared, cancel, parts)
        }));

        self.shared
            .wait_state(|state| state != DeviceState::Opening);
        Ok(())
    }

    /// Release the pause gate and start the capture clock.
    ///
    /// A no-op in any state but `Paused`; only a parked error surfaces.
    pub fn start(&mut self) -> Result<()> {
        self.throw_and_clear()?;
        self.reap();
        if self.shared.state() != DeviceState::Paused {
            return Ok(());
        }
        lock(&self.shared.stopwatch).start();
        self.shared.set_state(DeviceState::Running);
        self.shared.gate.set();
        Ok(())
    }

    /// Close the pause gate and hold the capture clock.
    ///
    /// A no-op in any state but `Running`. A frame already past its
    /// checkpoint still completes; the worker parks before the next one.
    pub fn pause(&mut self) -> Result<()> {
        self.throw_and_clear()?;
        self.reap();
        if self.shared.state() != DeviceState::Running {
            return Ok(());
        }
        self.shared.gate.reset();
        lock(&self.shared.stopwatch).stop();
        self.shared.set_state(DeviceState::Paused);
        Ok(())
    }

    /// Cancel the session, run the teardown hooks and join the worker.
    ///
    /// Idempotent; closing a closed device only reports a parked error, if
    /// one is waiting.
    pub fn close(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            log::info!("device {}: closing", self.shared.uid);
            self.cancel.cancel();
            // release a worker parked at the pause gate so it can observe
            // the cancellation
            self.shared.gate.set();
            match worker.join() {
                Ok(parts) => self.parts = Some(parts),
                Err(_) => {
                    log::error!("device {}: capture worker panicked", self.shared.uid);
                    self.shared.set_state(DeviceState::Closed);
                }
            }
        }
        self.throw_and_clear()
    }

    /// Collect a worker that finished on its own (source ran to completion),
    /// restoring the source and pipeline for the next session.
    fn reap(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            if let Some(worker) = self.worker.take() {
                match worker.join() {
                    Ok(parts) => self.parts = Some(parts),
                    Err(_) => {
                        log::error!("device {}: capture worker panicked", self.shared.uid);
                        self.shared.set_state(DeviceState::Closed);
                    }
                }
            }
        }
    }
}

impl<F: FrameFormat> Drop for InputDevice<F> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// The worker thread: setup, capture loop, teardown. Always returns the
/// parts so the device can reopen.
/// Unblocks state waiters if a hook panics and unwinds the worker.
struct PanicGuard {
    shared: Arc<DeviceShared>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("device {}: capture worker panicked", self.shared.uid);
            self.shared.force_closed();
        }
    }
}

fn worker_main<F: FrameFormat>(
    shared: Arc<DeviceShared>,
    cancel: CancellationToken,
    mut parts: Parts<F>,
) -> Parts<F> {
    let _guard = PanicGuard {
        shared: shared.clone(),
    };
    let handle = DeviceHandle {
        shared: shared.clone(),
    };

    let setup = match parts.source.open(&handle) {
        Ok(()) => {
            let format = parts.source.format().clone();
            parts.pipeline.open(&handle, &format)
        }
        Err(err) => Err(err),
    };
    if let Err(err) = setup {
        shared.deliver_error(err);
        // unwind whatever did open; failures here are secondary
        if let Err(err) = parts.pipeline.close(&handle) {
            log::warn!("device {}: pipeline teardown after failed setup: {err}", shared.uid);
        }
        if let Err(err) = parts.source.close(&handle) {
            log::warn!("device {}: source teardown after failed setup: {err}", shared.uid);
        }
        shared.set_state(DeviceState::Closed);
        return parts;
    }

    shared.set_state(DeviceState::Paused);

    let run_result = {
        let Parts { source, pipeline } = &mut parts;
        let mut ctx = CaptureContext {
            shared: &shared,
            cancel: &cancel,
            pipeline,
        };
        source.run(&mut ctx)
    };
    match run_result {
        Ok(()) | Err(MediaError::Cancelled) => {}
        Err(err) => shared.deliver_error(err),
    }

    shared.set_state(DeviceState::Closing);
    if let Err(err) = parts.pipeline.close(&handle) {
        shared.deliver_error(err);
    }
    if let Err(err) = parts.source.close(&handle) {
        shared.deliver_error(err);
    }
    {
        let mut stopwatch = lock(&shared.stopwatch);
        stopwatch.stop();
        stopwatch.reset();
    }
    shared.set_state(DeviceState::Closed);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AudioFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fmt() -> AudioFormat {
        AudioFormat::new(48_000, 16, 2).unwrap()
    }

    /// Emits `frames` numbered frames, or loops until cancelled when `None`.
    struct ScriptedSource {
        format: AudioFormat,
        frames: Option<usize>,
        ready: bool,
        fail_open: bool,
        fail_run: bool,
    }

    impl ScriptedSource {
        fn endless() -> Self {
            Self {
                format: fmt(),
                frames: None,
                ready: true,
                fail_open: false,
                fail_run: false,
            }
        }

        fn counted(frames: usize) -> Self {
            Self {
                frames: Some(frames),
                ..Self::endless()
            }
        }
    }

    impl CaptureSource<AudioFormat> for ScriptedSource {
        fn uid(&self) -> &str {
            "scripted"
        }

        fn format(&self) -> &AudioFormat {
            &self.format
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn open(&mut self, _device: &DeviceHandle) -> Result<()> {
            if self.fail_open {
                return Err(anyhow::anyhow!("hardware handle acquisition failed").into());
            }
            Ok(())
        }

        fn run(&mut self, ctx: &mut CaptureContext<'_, AudioFormat>) -> Result<()> {
            if self.fail_run {
                ctx.checkpoint()?;
                return Err(MediaError::UnsupportedFormat("mid-capture failure".into()));
            }
            let mut emitted = 0usize;
            loop {
                ctx.checkpoint()?;
                if let Some(total) = self.frames {
                    if emitted == total {
                        return Ok(());
                    }
                }
                let mut frame = RawFrame::alloc(8, self.format);
                frame.data_mut()[0] = (emitted % 256) as u8;
                ctx.process_frame(frame)?;
                emitted += 1;
                if self.frames.is_none() {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }

        fn close(&mut self, _device: &DeviceHandle) -> Result<()> {
            Ok(())
        }
    }

    /// Records the first byte of every frame it receives.
    struct RecordingSink {
        seen: Arc<Mutex<Vec<u8>>>,
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl FrameSink<AudioFormat> for RecordingSink {
        fn open(&mut self, _device: &DeviceHandle, _format: &AudioFormat) -> Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn push_frame(&mut self, frame: RawFrame<AudioFormat>) -> Result<()> {
            self.seen.lock().unwrap().push(frame.data()[0]);
            Ok(())
        }

        fn close(&mut self, _device: &DeviceHandle) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wait_for(device: &InputDevice<AudioFormat>, state: DeviceState) {
        device.shared.wait_state(|s| s == state);
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_state_transitions_in_order() {
        init_logging();
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let mut device = InputDevice::new(Box::new(ScriptedSource::endless()));
        let log = transitions.clone();
        device.subscribe_state(move |state| log.lock().unwrap().push(state));

        device.open().unwrap();
        assert_eq!(device.current_state(), DeviceState::Paused);
        device.start().unwrap();
        device.pause().unwrap();
        device.start().unwrap();
        device.close().unwrap();
        assert_eq!(device.current_state(), DeviceState::Closed);

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![
                DeviceState::Opening,
                DeviceState::Paused,
                DeviceState::Running,
                DeviceState::Paused,
                DeviceState::Running,
                DeviceState::Closing,
                DeviceState::Closed,
            ]
        );
        device.throw_and_clear().unwrap();
    }

    #[test]
    fn test_frames_reach_sink_in_order() {
        init_logging();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let mut device = InputDevice::new(Box::new(ScriptedSource::counted(100)));
        device
            .set_sink(Box::new(RecordingSink {
                seen: seen.clone(),
                opened: opened.clone(),
                closed: closed.clone(),
            }))
            .unwrap();

        device.open().unwrap();
        device.start().unwrap();
        wait_for(&device, DeviceState::Closed);
        device.close().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 100);
        assert!(seen.iter().enumerate().all(|(i, b)| *b == i as u8));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        device.throw_and_clear().unwrap();
    }

    #[test]
    fn test_not_ready_source_fails_open_synchronously() {
        let mut device = InputDevice::new(Box::new(ScriptedSource {
            ready: false,
            ..ScriptedSource::endless()
        }));
        assert!(matches!(
            device.open(),
            Err(MediaError::DeviceNotReady { .. })
        ));
        assert_eq!(device.current_state(), DeviceState::Closed);
        // the device is untouched and still configurable
        device
            .set_modifier(Box::new(crate::modifier::AggregateModifier::new(vec![])))
            .unwrap();
    }

    #[test]
    fn test_failed_setup_returns_to_closed() {
        let mut device = InputDevice::new(Box::new(ScriptedSource {
            fail_open: true,
            ..ScriptedSource::endless()
        }));
        device.open().unwrap();
        assert_eq!(device.current_state(), DeviceState::Closed);
        assert!(matches!(
            device.throw_and_clear(),
            Err(MediaError::Other(_))
        ));
        // and it clears
        device.throw_and_clear().unwrap();
    }

    #[test]
    fn test_run_error_rethrows_on_next_lifecycle_call() {
        let mut device = InputDevice::new(Box::new(ScriptedSource {
            fail_run: true,
            ..ScriptedSource::endless()
        }));
        device.open().unwrap();
        device.start().unwrap();
        wait_for(&device, DeviceState::Closed);

        // the parked error surfaces on the next lifecycle call, once
        assert!(matches!(
            device.start(),
            Err(MediaError::UnsupportedFormat(_))
        ));
        // cleared: the next call is a clean no-op on the closed device
        device.start().unwrap();
        device.close().unwrap();
    }

    #[test]
    fn test_error_handler_preempts_sticky_slot() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let mut device = InputDevice::new(Box::new(ScriptedSource {
            fail_run: true,
            ..ScriptedSource::endless()
        }));
        let log = delivered.clone();
        device.set_error_handler(move |handle, err| {
            log.lock().unwrap().push((handle.uid().to_string(), err.to_string()));
        });

        device.open().unwrap();
        device.start().unwrap();
        wait_for(&device, DeviceState::Closed);
        device.close().unwrap();

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "scripted");
        device.throw_and_clear().unwrap();
    }

    #[test]
    fn test_reopen_after_close() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut device = InputDevice::new(Box::new(ScriptedSource::counted(3)));
        device
            .set_sink(Box::new(RecordingSink {
                seen: seen.clone(),
                opened: Arc::default(),
                closed: Arc::default(),
            }))
            .unwrap();

        for _ in 0..2 {
            device.open().unwrap();
            device.start().unwrap();
            wait_for(&device, DeviceState::Closed);
            device.close().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 6);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut device = InputDevice::new(Box::new(ScriptedSource::endless()));
        device.close().unwrap();
        device.open().unwrap();
        device.close().unwrap();
        device.close().unwrap();
        assert_eq!(device.current_state(), DeviceState::Closed);
    }

    #[test]
    fn test_lifecycle_calls_outside_their_state_are_noops() {
        let mut device = InputDevice::new(Box::new(ScriptedSource::endless()));
        device.start().unwrap();
        device.pause().unwrap();
        assert_eq!(device.current_state(), DeviceState::Closed);

        device.open().unwrap();
        // a second open leaves the running session alone
        device.open().unwrap();
        assert_eq!(device.current_state(), DeviceState::Paused);
        device.start().unwrap();
        device.open().unwrap();
        assert_eq!(device.current_state(), DeviceState::Running);
        device.close().unwrap();
    }

    #[test]
    fn test_configuration_rejected_while_open() {
        let mut device = InputDevice::new(Box::new(ScriptedSource::endless()));
        device.open().unwrap();
        assert!(matches!(
            device.set_modifier(Box::new(crate::modifier::AggregateModifier::new(vec![]))),
            Err(MediaError::InvalidState {
                operation: "set_modifier",
                ..
            })
        ));
        device.close().unwrap();
    }

    #[test]
    fn test_capture_clock_holds_while_paused() {
        let mut device = InputDevice::new(Box::new(ScriptedSource::endless()));
        device.open().unwrap();
        assert_eq!(device.current_time(), Duration::ZERO);

        device.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        device.pause().unwrap();
        let at_pause = device.current_time();
        assert!(at_pause >= Duration::from_millis(20));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(device.current_time(), at_pause);
        device.close().unwrap();
        assert_eq!(device.current_time(), Duration::ZERO);
        device.throw_and_clear().unwrap();
    }

    #[test]
    fn test_handle_equality() {
        let device = InputDevice::new(Box::new(ScriptedSource::endless()));
        assert_eq!(device.handle(), device.handle());
        // uids identify devices across handle instances
        assert_eq!(device.handle(), DeviceHandle::detached("scripted"));
        assert_ne!(device.handle(), DeviceHandle::detached("other"));
        // uid-less handles compare by identity
        let a = DeviceHandle::detached("");
        assert_eq!(a, a.clone());
        assert_ne!(a, DeviceHandle::detached(""));
    }
}
