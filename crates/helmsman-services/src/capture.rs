use crate::error::CaptureError;
use async_trait::async_trait;
use uuid::Uuid;

/// Which device a capture acquisition asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    Mic,
    Camera,
    Screen,
}

/// An acquired capture device. Handles are exclusively owned by whichever
/// component acquired them and must be passed back to [`CaptureDevice::release`]
/// on every exit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    pub id: Uuid,
    pub kind: CaptureKind,
}

impl CaptureHandle {
    #[must_use]
    pub fn new(kind: CaptureKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

/// Platform capture boundary.
///
/// Injectable so the timer and state-machine logic is testable without any
/// real microphone/camera/screen backend. Acquisition failure is non-fatal
/// by contract: callers disable the affected signal path and carry on.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire exclusive ownership of a device. Fails fast when the device
    /// or permission is unavailable.
    async fn acquire(&self, kind: CaptureKind) -> Result<CaptureHandle, CaptureError>;

    /// Read the next frame/chunk from an acquired device. `Ok(None)` marks
    /// end of stream (for a mic: detected silence / capture end).
    async fn capture_frame(&self, handle: &CaptureHandle)
        -> Result<Option<Vec<u8>>, CaptureError>;

    /// Release an acquired device.
    async fn release(&self, handle: CaptureHandle);
}

/// Capture backend for deployments with no devices configured. Every
/// acquisition fails fast, so heartbeat capture and voice dialogue simply
/// stay disabled.
#[derive(Debug, Default)]
pub struct DisabledCapture;

#[async_trait]
impl CaptureDevice for DisabledCapture {
    async fn acquire(&self, kind: CaptureKind) -> Result<CaptureHandle, CaptureError> {
        Err(CaptureError::DeviceUnavailable(format!(
            "no capture backend configured for {kind:?}"
        )))
    }

    async fn capture_frame(
        &self,
        handle: &CaptureHandle,
    ) -> Result<Option<Vec<u8>>, CaptureError> {
        Err(CaptureError::DeviceUnavailable(format!(
            "no capture backend configured for {:?}",
            handle.kind
        )))
    }

    async fn release(&self, _handle: CaptureHandle) {}
}
