//! Serial implementation of the robot link
//!
//! Owns the Roomba serial port through a dedicated transport worker thread.
//! The worker drains the command queue, polls the sensor query at a fixed
//! rate and publishes decoded frames latest-wins, so a slow consumer always
//! sees the freshest snapshot.

use super::RobotLink;
use super::protocol::{
    self, DeadReckoner, OP_POWER, OP_SAFE, OP_START, SENSOR_QUERY, SENSOR_REPLY_LEN,
};
use crate::config::HardwareConfig;
use crate::error::{Error, Result};
use crate::types::{ModeCommand, SensorFrame};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Sensor poll period (the OI answers a query list on demand)
const POLL_INTERVAL_MS: u64 = 100;
/// Delay between the wake-up START and the SAFE mode command
const WAKEUP_DELAY_MS: u64 = 100;
/// Per-byte serial read timeout
const READ_TIMEOUT_MS: u64 = 50;

/// Serial link to the Roomba
pub struct SerialLink {
    hardware: HardwareConfig,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
    cmd_tx: Sender<ModeCommand>,
    cmd_rx: Receiver<ModeCommand>,
    frame_tx: Sender<SensorFrame>,
    frame_rx: Receiver<SensorFrame>,
    reckoner: Arc<Mutex<DeadReckoner>>,
}

impl SerialLink {
    /// Create a link for the configured serial device (no I/O yet)
    pub fn new(hardware: HardwareConfig) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        // Capacity 1: the worker overwrites, the consumer reads latest
        let (frame_tx, frame_rx) = bounded(1);

        Self {
            hardware,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            connected: AtomicBool::new(false),
            cmd_tx,
            cmd_rx,
            frame_tx,
            frame_rx,
            reckoner: Arc::new(Mutex::new(DeadReckoner::new())),
        }
    }
}

impl RobotLink for SerialLink {
    fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::Relaxed) {
            return Err(Error::Other("Link already connected".to_string()));
        }

        let mut port = serialport::new(&self.hardware.serial_port, self.hardware.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .open()?;

        log::info!(
            "Opened serial port {} at {} baud",
            self.hardware.serial_port,
            self.hardware.baud_rate
        );

        // Wake the OI and drop into safe mode before polling starts
        port.write_all(&[OP_START])?;
        thread::sleep(Duration::from_millis(WAKEUP_DELAY_MS));
        port.write_all(&[OP_SAFE])?;

        self.shutdown.store(false, Ordering::Relaxed);

        let cmd_rx = self.cmd_rx.clone();
        let frame_tx = self.frame_tx.clone();
        let frame_rx = self.frame_rx.clone();
        let reckoner = Arc::clone(&self.reckoner);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = thread::Builder::new()
            .name("roomba-serial".to_string())
            .spawn(move || {
                serial_worker(port, cmd_rx, frame_tx, frame_rx, reckoner, shutdown);
            })
            .map_err(|e| Error::Other(format!("Failed to spawn serial worker: {}", e)))?;

        *self.worker.lock() = Some(handle);
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn send_mode(&self, mode: ModeCommand) -> Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(Error::NotConnected);
        }
        self.cmd_tx.send(mode).map_err(|_| Error::QueueClosed)
    }

    fn recv_frame(&self, timeout: Duration) -> Result<Option<SensorFrame>> {
        match self.frame_rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Ok(None),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn reset_position(&self) {
        self.reckoner.lock().reset();
    }

    fn disconnect(&self) -> Result<()> {
        log::info!("Closing serial link");
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.worker.lock().take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }

        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }
}

/// Transport worker: drain queued commands, poll sensors, publish frames.
///
/// Runs until the shutdown flag is set; the port is closed when the worker
/// drops it on exit.
fn serial_worker(
    mut port: Box<dyn SerialPort>,
    cmd_rx: Receiver<ModeCommand>,
    frame_tx: Sender<SensorFrame>,
    frame_rx: Receiver<SensorFrame>,
    reckoner: Arc<Mutex<DeadReckoner>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut reply = [0u8; SENSOR_REPLY_LEN];

    while !shutdown.load(Ordering::Relaxed) {
        // Commands first: they are ordered and must go out before the next poll
        while let Ok(mode) = cmd_rx.try_recv() {
            let opcode = protocol::mode_opcode(mode);
            match port.write_all(&[opcode]) {
                Ok(()) => log::debug!("Sent mode command '{}' (opcode {})", mode, opcode),
                Err(e) => log::error!("Mode command '{}' send failed: {}", mode, e),
            }
        }

        if let Err(e) = port.write_all(&SENSOR_QUERY) {
            log::error!("Sensor query send failed: {}", e);
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            continue;
        }

        match read_reply(&mut *port, &mut reply, Duration::from_millis(POLL_INTERVAL_MS)) {
            Ok(true) => {
                if let Some(raw) = protocol::parse_sensor_reply(&reply) {
                    let position = {
                        let mut dr = reckoner.lock();
                        dr.update(raw.distance_mm, raw.angle_deg);
                        dr.position()
                    };
                    let frame = protocol::build_frame(&raw, position);

                    // Latest-wins: displace a stale frame rather than block
                    if frame_tx.try_send(frame.clone()).is_err() {
                        let _ = frame_rx.try_recv();
                        let _ = frame_tx.try_send(frame);
                    }
                }
            }
            Ok(false) => {
                log::warn!("Truncated sensor reply, discarding");
                let _ = port.clear(serialport::ClearBuffer::Input);
            }
            Err(e) => {
                log::error!("Sensor reply read failed: {}", e);
            }
        }

        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }

    // Leave the robot stopped and powered down, matching the original
    // gateway's close sequence
    let _ = port.write_all(&[OP_SAFE]);
    let _ = port.write_all(&[OP_POWER]);
    let _ = port.flush();

    log::info!("Serial worker exiting");
}

/// Accumulate exactly `buf.len()` bytes, tolerating per-read timeouts until
/// the deadline. Returns `Ok(false)` if the reply stayed incomplete.
fn read_reply(port: &mut dyn SerialPort, buf: &mut [u8], window: Duration) -> Result<bool> {
    let deadline = Instant::now() + window;
    let mut filled = 0;

    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(0) => {}
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
        if Instant::now() >= deadline {
            return Ok(filled == buf.len());
        }
    }

    Ok(true)
}
