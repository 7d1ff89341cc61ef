use crate::error::CaptureError;
use crate::types::DeviceInfo;
use std::sync::{Arc, Mutex};

/// Per-block callback installed by the controller.
pub type BlockHandler = Box<dyn FnMut(&[f32]) + Send>;

/// The backend's handle on the controller's block handler.
///
/// Backends call `deliver` once per fixed-size block from their delivery
/// thread. The controller can `detach` the handler at any time; after that
/// returns, no call is in progress and later deliveries are dropped.
#[derive(Clone)]
pub struct BlockSink {
    slot: Arc<Mutex<Option<BlockHandler>>>,
}

impl BlockSink {
    pub fn new(handler: BlockHandler) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(handler))),
        }
    }

    /// Hand one block to the handler. Returns false once detached.
    pub fn deliver(&self, block: &[f32]) -> bool {
        let Ok(mut slot) = self.slot.lock() else {
            return false;
        };
        match slot.as_mut() {
            Some(handler) => {
                handler(block);
                true
            }
            None => false,
        }
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

/// A source of audio input: a sound card, a file, a generator.
pub trait InputBackend: Send + Sync {
    /// Wake the processing context and report its sample rate.
    fn resume(&self) -> Result<u32, CaptureError>;

    /// Put the processing context to sleep between sessions.
    fn suspend(&self) {}

    fn devices(&self) -> Vec<DeviceInfo>;

    /// Acquire `device` (or the default) and start delivering
    /// `block_size`-sample mono blocks to `sink`. May block on the platform.
    fn open(
        &self,
        device: Option<&str>,
        block_size: usize,
        sink: BlockSink,
    ) -> Result<Box<dyn InputStream>, CaptureError>;
}

/// A live input stream. Dropping it without `close` also releases it.
pub trait InputStream: Send {
    /// Stop delivery and release the device. Blocks until the delivery
    /// thread, if any, has finished.
    fn close(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_detach_stops_delivery() {
        let seen = Arc::new(Mutex::new(0usize));
        let counter = seen.clone();
        let sink = BlockSink::new(Box::new(move |b: &[f32]| {
            *counter.lock().unwrap() += b.len();
        }));
        assert!(sink.deliver(&[0.0; 4]));
        let other = sink.clone();
        other.detach();
        assert!(!sink.is_attached());
        assert!(!sink.deliver(&[0.0; 4]));
        assert_eq!(*seen.lock().unwrap(), 4);
    }
}
