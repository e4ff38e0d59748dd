//! Runtime enable/disable wrapper around another modifier.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::device::DeviceHandle;
use crate::error::Result;
use crate::format::{FormatChange, FrameFormat};
use crate::frame::RawFrame;
use crate::modifier::Modifier;

/// Toggle for a [`SwitchableModifier`], usable from any thread.
#[derive(Clone)]
pub struct SwitchHandle {
    enabled: Arc<AtomicBool>,
}

impl SwitchHandle {
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Wraps a modifier so it can be switched on and off while frames flow.
///
/// An inner modifier that declares a format change cannot toggle mid
/// session, because the sink negotiated its format before any frame moved;
/// for those the enabled flag is latched when the device opens and toggles
/// apply on the next open. Format-preserving modifiers toggle per frame.
pub struct SwitchableModifier<F: FrameFormat, M: Modifier<F>> {
    inner: M,
    enabled: Arc<AtomicBool>,
    latched: Option<bool>,
    _format: PhantomData<fn(F)>,
}

impl<F: FrameFormat, M: Modifier<F>> SwitchableModifier<F, M> {
    pub fn new(inner: M, enabled: bool) -> Self {
        Self {
            inner,
            enabled: Arc::new(AtomicBool::new(enabled)),
            latched: None,
            _format: PhantomData,
        }
    }

    pub fn handle(&self) -> SwitchHandle {
        SwitchHandle {
            enabled: self.enabled.clone(),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut M {
        &mut self.inner
    }

    fn active(&self) -> bool {
        if self.inner.target_format().is_unchanged() {
            self.enabled.load(Ordering::Acquire)
        } else {
            self.latched
                .unwrap_or_else(|| self.enabled.load(Ordering::Acquire))
        }
    }
}

impl<F: FrameFormat, M: Modifier<F>> Modifier<F> for SwitchableModifier<F, M> {
    fn target_format(&self) -> FormatChange<F> {
        if self.active() {
            self.inner.target_format()
        } else {
            FormatChange::Unchanged
        }
    }

    /// The inner modifier opens even when disabled, so a later enable finds
    /// it ready.
    fn open(&mut self, device: &DeviceHandle, source_format: &F) -> Result<()> {
        self.latched = Some(self.enabled.load(Ordering::Acquire));
        self.inner.open(device, source_format)
    }

    fn modify_frame(&mut self, frame: RawFrame<F>) -> Result<Option<RawFrame<F>>> {
        if self.active() {
            self.inner.modify_frame(frame)
        } else {
            Ok(Some(frame))
        }
    }

    fn close(&mut self, device: &DeviceHandle) -> Result<()> {
        self.latched = None;
        self.inner.close(device)
    }
}
