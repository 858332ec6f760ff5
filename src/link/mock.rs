//! Mock link for hardware-free testing

use super::RobotLink;
use crate::error::{Error, Result};
use crate::types::{ModeCommand, SensorFrame};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// In-memory link: frames are injected by the test, commands are recorded
/// with their send times.
pub struct MockLink {
    frame_tx: Sender<SensorFrame>,
    frame_rx: Receiver<SensorFrame>,
    sent: Mutex<Vec<(ModeCommand, Instant)>>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    resets: AtomicUsize,
}

impl MockLink {
    /// Create a mock link that connects successfully
    pub fn new() -> Self {
        let (frame_tx, frame_rx) = unbounded();
        Self {
            frame_tx,
            frame_rx,
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            resets: AtomicUsize::new(0),
        }
    }

    /// Create a mock link whose `connect` fails
    pub fn failing() -> Self {
        let link = Self::new();
        link.fail_connect.store(true, Ordering::Relaxed);
        link
    }

    /// Inject a frame to be delivered to the watchdog
    pub fn push_frame(&self, frame: SensorFrame) {
        let _ = self.frame_tx.send(frame);
    }

    /// Mode commands sent so far, in order
    pub fn sent_modes(&self) -> Vec<ModeCommand> {
        self.sent.lock().iter().map(|(mode, _)| *mode).collect()
    }

    /// Mode commands with their send instants
    pub fn sent_with_times(&self) -> Vec<(ModeCommand, Instant)> {
        self.sent.lock().clone()
    }

    /// How many times the position accumulator was reset
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl RobotLink for MockLink {
    fn connect(&self) -> Result<()> {
        if self.fail_connect.load(Ordering::Relaxed) {
            return Err(Error::ConnectionFailed("mock link refused".to_string()));
        }
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn send_mode(&self, mode: ModeCommand) -> Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(Error::NotConnected);
        }
        self.sent.lock().push((mode, Instant::now()));
        Ok(())
    }

    fn recv_frame(&self, timeout: Duration) -> Result<Option<SensorFrame>> {
        match self.frame_rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(_) => Ok(None),
        }
    }

    fn reset_position(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}
