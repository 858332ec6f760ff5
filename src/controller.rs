//! Robot controller
//!
//! Public state machine for the gateway-attached Roomba. Owns the current
//! status, battery and position, issues mode commands through the link and
//! coordinates the transport worker and watchdog supervisor lifecycles.
//!
//! Status writes are arbitrated by a mutex: command methods hold the status
//! guard across their check-and-set, so they cannot interleave with the
//! watchdog's safety transitions.

use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::link::{RobotLink, SerialLink};
use crate::state::SharedState;
use crate::types::{BATTERY_UNKNOWN, BatteryState, ModeCommand, Position, Status};
use crate::watchdog;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Supervisory controller for one robot session.
///
/// Create once, `init()`, drive it, `close()`. Instances are not reused
/// after close; recovery from the error status requires a fresh session.
///
/// # Examples
///
/// ```no_run
/// use roomba_gateway::{GatewayConfig, RobotController};
///
/// # fn main() -> roomba_gateway::Result<()> {
/// let mut robot = RobotController::with_serial(GatewayConfig::roomba_defaults());
/// robot.init()?;
/// robot.start()?;
///
/// if let (pos, true) = robot.get_position() {
///     println!("Robot at x={:.2} y={:.2}", pos.x, pos.y);
/// }
///
/// robot.stop()?;
/// robot.close()?;
/// # Ok(())
/// # }
/// ```
pub struct RobotController {
    link: Arc<dyn RobotLink>,
    state: Arc<SharedState>,
    config: GatewayConfig,
    watch_shutdown: Arc<AtomicBool>,
    watch_handle: Option<JoinHandle<()>>,
}

impl RobotController {
    /// Create a controller over an arbitrary link (serial or mock)
    pub fn new(link: Arc<dyn RobotLink>, config: GatewayConfig) -> Self {
        Self {
            link,
            state: Arc::new(SharedState::new()),
            config,
            watch_shutdown: Arc::new(AtomicBool::new(false)),
            watch_handle: None,
        }
    }

    /// Create a controller over the configured serial device
    pub fn with_serial(config: GatewayConfig) -> Self {
        let link = Arc::new(SerialLink::new(config.hardware.clone()));
        Self::new(link, config)
    }

    /// Open the robot connection and start both background workers.
    ///
    /// On connection failure the status is forced to `Error` and the error
    /// is returned; no retry is attempted here, the caller re-invokes.
    pub fn init(&mut self) -> Result<()> {
        log::debug!("Init roomba communication");

        if let Err(e) = self.link.connect() {
            log::error!("Roomba connection failed: {}", e);
            self.state.set_status(Status::Error);
            return Err(e);
        }

        // Let the link stabilize before supervising it
        thread::sleep(self.config.supervisor.settle());

        self.watch_shutdown.store(false, Ordering::Relaxed);
        let link = Arc::clone(&self.link);
        let state = Arc::clone(&self.state);
        let shutdown = Arc::clone(&self.watch_shutdown);
        let supervisor = self.config.supervisor.clone();
        let thresholds = self.config.battery.clone();

        let handle = thread::Builder::new()
            .name("roomba-watchdog".to_string())
            .spawn(move || {
                watchdog::watchdog_loop(link, state, shutdown, supervisor, thresholds);
            })
            .map_err(|e| {
                self.state.set_status(Status::Error);
                Error::Other(format!("Failed to spawn watchdog thread: {}", e))
            })?;

        self.watch_handle = Some(handle);
        self.state.set_status(Status::Init);
        Ok(())
    }

    /// Close the robot connection.
    ///
    /// Stops the watchdog first and waits for it to quiesce, then tears
    /// down the transport. Safe to call exactly once after a successful
    /// `init`.
    pub fn close(&mut self) -> Result<()> {
        log::debug!("Close roomba communication");

        self.watch_shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.watch_handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }

        thread::sleep(self.config.supervisor.settle());

        self.link.disconnect()?;
        self.state.set_status(Status::Closed);
        Ok(())
    }

    /// Start the experiment: autonomous cleaning motion
    pub fn start(&self) -> Result<()> {
        let mut status = self.state.lock_status();
        if !status.accepts_motion() {
            log::error!("Start experiment failed (status '{}')", *status);
            return Err(Error::BadState {
                op: "start",
                status: *status,
            });
        }

        log::debug!("Start experiment");
        self.link.send_mode(ModeCommand::Clean)?;
        *status = Status::Moving;
        Ok(())
    }

    /// Stop the experiment and send the robot back to its dock.
    ///
    /// The dock command is sent twice with a fixed gap; a lone dock request
    /// has been observed to get lost on the link. Keep the double send.
    pub fn stop(&self) -> Result<()> {
        {
            let status = self.state.lock_status();
            if !status.accepts_motion() {
                log::error!("Stop experiment failed (status '{}')", *status);
                return Err(Error::BadState {
                    op: "stop",
                    status: *status,
                });
            }

            log::debug!("Stop experiment");
            self.link.send_mode(ModeCommand::Dock)?;
        }

        // Status lock released during the gap so the watchdog is not stalled
        thread::sleep(self.config.supervisor.dock_resend_gap());

        let mut status = self.state.lock_status();
        // The watchdog may have transitioned during the gap; re-check before
        // committing. Error in particular must stand until a fresh init.
        if !status.accepts_motion() {
            log::error!("Stop experiment aborted (status '{}')", *status);
            return Err(Error::BadState {
                op: "stop",
                status: *status,
            });
        }
        self.link.send_mode(ModeCommand::Dock)?;
        *status = Status::SearchingDock;
        Ok(())
    }

    /// Pause the motion (only while moving)
    pub fn motion_pause(&self) -> Result<()> {
        let mut status = self.state.lock_status();
        if *status != Status::Moving {
            log::error!("Motion pause failed (status '{}')", *status);
            return Err(Error::BadState {
                op: "motion_pause",
                status: *status,
            });
        }

        log::debug!("Motion pause");
        self.link.send_mode(ModeCommand::Safe)?;
        *status = Status::Paused;
        Ok(())
    }

    /// Resume a paused motion
    pub fn motion_continue(&self) -> Result<()> {
        let mut status = self.state.lock_status();
        if *status != Status::Paused {
            log::error!("Motion continue failed (status '{}')", *status);
            return Err(Error::BadState {
                op: "motion_continue",
                status: *status,
            });
        }

        log::debug!("Motion continue");
        self.link.send_mode(ModeCommand::Clean)?;
        *status = Status::Moving;
        Ok(())
    }

    /// Seek the dock without ending the session state machine
    pub fn motion_search_dock(&self) -> Result<()> {
        let mut status = self.state.lock_status();
        if !status.accepts_motion() {
            log::error!("Search dock failed (status '{}')", *status);
            return Err(Error::BadState {
                op: "motion_search_dock",
                status: *status,
            });
        }

        log::debug!("Search dock");
        self.link.send_mode(ModeCommand::Dock)?;
        *status = Status::SearchingDock;
        Ok(())
    }

    /// Current status
    pub fn get_status(&self) -> Status {
        self.state.status()
    }

    /// Battery level in percent, or [`BATTERY_UNKNOWN`] without valid
    /// telemetry (which is also forced back into the shared state)
    pub fn get_battery(&self) -> i16 {
        if self.state.rank() < Status::Init.rank() {
            log::error!("Get battery failed (status '{}')", self.state.status());
            self.state.set_battery(BATTERY_UNKNOWN);
            return BATTERY_UNKNOWN;
        }
        self.state.battery()
    }

    /// Coarse charged/discharged state from the configured thresholds
    pub fn battery_state(&self) -> BatteryState {
        if self.state.rank() < Status::Init.rank() {
            return BatteryState::Unknown;
        }
        self.state.battery_state()
    }

    /// Last-known position plus an explicit validity flag.
    ///
    /// The fix is stale whenever the flag is false; an error is logged but
    /// the last computed values are still returned.
    pub fn get_position(&self) -> (Position, bool) {
        let valid = self.state.rank() >= Status::Init.rank();
        if !valid {
            log::error!("Get position failed (status '{}')", self.state.status());
        }
        (self.state.position(), valid)
    }
}

impl Drop for RobotController {
    fn drop(&mut self) {
        // Safety net if close() was never called: stop the watchdog
        self.watch_shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.watch_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatteryConfig, HardwareConfig, SupervisorConfig};
    use crate::link::MockLink;
    use crate::types::SensorFrame;
    use std::time::{Duration, Instant};

    fn test_config(frame_timeout_ms: u64) -> GatewayConfig {
        GatewayConfig {
            hardware: HardwareConfig {
                serial_port: "/dev/null".to_string(),
                baud_rate: 115_200,
            },
            supervisor: SupervisorConfig {
                settle_ms: 5,
                watch_interval_ms: 10,
                dock_resend_gap_ms: 40,
                frame_timeout_ms,
            },
            battery: BatteryConfig {
                low_level: 20,
                high_level: 80,
            },
        }
    }

    fn controller(frame_timeout_ms: u64) -> (RobotController, Arc<MockLink>) {
        let link = Arc::new(MockLink::new());
        let ctl = RobotController::new(
            Arc::clone(&link) as Arc<dyn RobotLink>,
            test_config(frame_timeout_ms),
        );
        (ctl, link)
    }

    fn telemetry_frame() -> SensorFrame {
        SensorFrame {
            battery_charge: 50,
            battery_capacity: 200,
            ..Default::default()
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_init_failure_sets_error() {
        let link = Arc::new(MockLink::failing());
        let mut ctl = RobotController::new(
            Arc::clone(&link) as Arc<dyn RobotLink>,
            test_config(10_000),
        );

        assert!(ctl.init().is_err());
        assert_eq!(ctl.get_status(), Status::Error);

        // Error suppresses command issuance
        assert!(ctl.start().is_err());
        assert_eq!(ctl.get_status(), Status::Error);
    }

    #[test]
    fn test_commands_rejected_before_init() {
        let (ctl, link) = controller(10_000);

        assert!(ctl.start().is_err());
        assert!(ctl.stop().is_err());
        assert!(ctl.motion_search_dock().is_err());
        assert_eq!(ctl.get_status(), Status::Closed);
        assert!(link.sent_modes().is_empty());
    }

    #[test]
    fn test_full_lifecycle_scenario() {
        let (mut ctl, link) = controller(10_000);

        ctl.init().unwrap();
        assert_eq!(ctl.get_status(), Status::Init);
        assert!(link.is_connected());

        ctl.start().unwrap();
        assert_eq!(ctl.get_status(), Status::Moving);

        ctl.motion_pause().unwrap();
        assert_eq!(ctl.get_status(), Status::Paused);

        ctl.motion_continue().unwrap();
        assert_eq!(ctl.get_status(), Status::Moving);

        ctl.stop().unwrap();
        assert_eq!(ctl.get_status(), Status::SearchingDock);

        ctl.close().unwrap();
        assert_eq!(ctl.get_status(), Status::Closed);
        assert!(!link.is_connected());

        assert_eq!(
            link.sent_modes(),
            vec![
                ModeCommand::Clean,
                ModeCommand::Safe,
                ModeCommand::Clean,
                ModeCommand::Dock,
                ModeCommand::Dock,
            ]
        );

        // Closed rejects everything again
        assert!(ctl.start().is_err());
        assert_eq!(ctl.get_status(), Status::Closed);
    }

    #[test]
    fn test_stop_sends_dock_twice_with_gap() {
        let (mut ctl, link) = controller(10_000);
        ctl.init().unwrap();

        ctl.stop().unwrap();

        let sent = link.sent_with_times();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, ModeCommand::Dock);
        assert_eq!(sent[1].0, ModeCommand::Dock);
        let gap = sent[1].1.duration_since(sent[0].1);
        assert!(gap >= Duration::from_millis(40), "gap was {:?}", gap);

        ctl.close().unwrap();
    }

    #[test]
    fn test_stop_aborts_when_watchdog_errors_mid_gap() {
        // Silence shorter than the resend gap: the watchdog forces the error
        // status while stop() is sleeping between its two dock commands
        let link = Arc::new(MockLink::new());
        let mut config = test_config(50);
        config.supervisor.dock_resend_gap_ms = 400;
        let mut ctl = RobotController::new(Arc::clone(&link) as Arc<dyn RobotLink>, config);

        ctl.init().unwrap();
        let result = ctl.stop();

        // Error stood; the second dock was never committed
        assert!(result.is_err());
        assert_eq!(ctl.get_status(), Status::Error);

        let sent = link.sent_modes();
        let docks = sent.iter().filter(|m| **m == ModeCommand::Dock).count();
        assert_eq!(docks, 1, "second dock must not be sent in error, got {:?}", sent);
        assert!(sent.contains(&ModeCommand::Safe));

        ctl.close().unwrap();
    }

    #[test]
    fn test_pause_preconditions() {
        let (mut ctl, _link) = controller(10_000);
        ctl.init().unwrap();

        // Not moving yet
        assert!(ctl.motion_pause().is_err());
        assert_eq!(ctl.get_status(), Status::Init);

        ctl.start().unwrap();
        ctl.motion_pause().unwrap();

        // Already paused
        assert!(ctl.motion_pause().is_err());
        assert_eq!(ctl.get_status(), Status::Paused);

        // Continue only from paused
        ctl.motion_continue().unwrap();
        assert!(ctl.motion_continue().is_err());
        assert_eq!(ctl.get_status(), Status::Moving);

        ctl.close().unwrap();
    }

    #[test]
    fn test_watchdog_docks_and_resets_position() {
        let (mut ctl, link) = controller(10_000);
        ctl.init().unwrap();
        ctl.motion_search_dock().unwrap();

        let mut frame = telemetry_frame();
        frame.x = 1.5;
        frame.y = 0.5;
        link.push_frame(frame);

        let mut frame = telemetry_frame();
        frame.home_base = true;
        frame.x = 1.6;
        frame.y = 0.6;
        link.push_frame(frame);

        assert!(wait_for(
            || ctl.get_status() == Status::Docked,
            Duration::from_secs(2)
        ));
        assert_eq!(link.reset_count(), 1);

        let (pos, valid) = ctl.get_position();
        assert!(valid);
        assert_eq!(pos, Position::ORIGIN);
        assert_eq!(ctl.get_battery(), 25);

        ctl.close().unwrap();
    }

    #[test]
    fn test_watchdog_wheel_drop_forces_init() {
        let (mut ctl, link) = controller(10_000);
        ctl.init().unwrap();
        ctl.start().unwrap();

        let mut frame = telemetry_frame();
        frame.wheel_drop_left = true;
        link.push_frame(frame);

        assert!(wait_for(
            || ctl.get_status() == Status::Init,
            Duration::from_secs(2)
        ));

        ctl.close().unwrap();
    }

    #[test]
    fn test_watchdog_overcurrent_keeps_status() {
        let (mut ctl, link) = controller(10_000);
        ctl.init().unwrap();
        ctl.start().unwrap();

        let mut frame = telemetry_frame();
        frame.overcurrent_left = true;
        link.push_frame(frame);

        // Battery update proves the frame was processed
        assert!(wait_for(|| ctl.get_battery() == 25, Duration::from_secs(2)));
        assert_eq!(ctl.get_status(), Status::Moving);

        ctl.close().unwrap();
    }

    #[test]
    fn test_frame_silence_forces_error_and_safety_stop() {
        let (mut ctl, link) = controller(100);
        ctl.init().unwrap();

        assert!(wait_for(
            || ctl.get_status() == Status::Error,
            Duration::from_secs(2)
        ));

        // Safe is re-issued on every watchdog pass while the error persists
        assert!(wait_for(
            || {
                link.sent_modes()
                    .iter()
                    .filter(|m| **m == ModeCommand::Safe)
                    .count()
                    >= 2
            },
            Duration::from_secs(2)
        ));

        ctl.close().unwrap();
        assert_eq!(ctl.get_status(), Status::Closed);
    }

    #[test]
    fn test_battery_unknown_without_telemetry() {
        let (mut ctl, link) = controller(10_000);

        // Before init
        assert_eq!(ctl.get_battery(), BATTERY_UNKNOWN);
        assert_eq!(ctl.battery_state(), BatteryState::Unknown);

        ctl.init().unwrap();
        ctl.start().unwrap();
        link.push_frame(telemetry_frame());
        assert!(wait_for(|| ctl.get_battery() == 25, Duration::from_secs(2)));

        ctl.close().unwrap();

        // Closed forces the sentinel back, never a stale numeric value
        assert_eq!(ctl.get_battery(), BATTERY_UNKNOWN);
    }

    #[test]
    fn test_position_stale_flag() {
        let (ctl, _link) = controller(10_000);

        let (pos, valid) = ctl.get_position();
        assert!(!valid);
        assert_eq!(pos, Position::ORIGIN);
    }

    #[test]
    fn test_battery_state_charged() {
        let (mut ctl, link) = controller(10_000);
        ctl.init().unwrap();
        ctl.start().unwrap();

        let mut frame = telemetry_frame();
        frame.battery_charge = 180;
        frame.battery_capacity = 200;
        link.push_frame(frame);

        assert!(wait_for(
            || ctl.battery_state() == BatteryState::Charged,
            Duration::from_secs(2)
        ));

        ctl.close().unwrap();
    }
}
