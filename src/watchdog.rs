//! Watchdog supervisor
//!
//! Background loop that drains sensor frames from the link, updates the
//! derived state (battery, docking, position) and enforces the safety
//! transitions. It never returns an error to its caller: every hazard is
//! either logged or converted into a status transition.
//!
//! The loop runs until the shutdown flag is set. Frame waits are bounded and
//! sliced so the flag is observed promptly during `close()`, before the
//! transport is torn down.

use crate::config::{BatteryConfig, SupervisorConfig};
use crate::link::RobotLink;
use crate::state::SharedState;
use crate::types::{BATTERY_UNKNOWN, ModeCommand, Position, SensorFrame, Status};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the sliced frame wait
const FRAME_POLL_SLICE_MS: u64 = 50;

/// Supervisor loop, spawned by `RobotController::init` on a dedicated thread
pub(crate) fn watchdog_loop(
    link: Arc<dyn RobotLink>,
    state: Arc<SharedState>,
    shutdown: Arc<AtomicBool>,
    supervisor: SupervisorConfig,
    thresholds: BatteryConfig,
) {
    log::info!("Watchdog supervisor started");

    while !shutdown.load(Ordering::Relaxed) {
        let frame = next_frame(link.as_ref(), &shutdown, supervisor.frame_timeout());
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        supervise(link.as_ref(), &state, frame.as_ref(), &thresholds);

        // Throttle independent of frame arrival rate
        thread::sleep(supervisor.watch_interval());
    }

    log::info!("Watchdog supervisor exiting");
}

/// Bounded wait for the next frame, sliced so shutdown is observed quickly.
///
/// Returns `None` on prolonged silence or shutdown.
fn next_frame(link: &dyn RobotLink, shutdown: &AtomicBool, timeout: Duration) -> Option<SensorFrame> {
    let slice = timeout.min(Duration::from_millis(FRAME_POLL_SLICE_MS));
    let deadline = Instant::now() + timeout;

    while !shutdown.load(Ordering::Relaxed) {
        match link.recv_frame(slice) {
            Ok(Some(frame)) => return Some(frame),
            Ok(None) => {}
            Err(e) => {
                log::error!("Frame read failed: {}", e);
                return None;
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
    }

    None
}

/// One supervision step over the latest frame (or its absence)
fn supervise(
    link: &dyn RobotLink,
    state: &SharedState,
    frame: Option<&SensorFrame>,
    thresholds: &BatteryConfig,
) {
    // Error persists until a fresh init cycle; keep the robot stopped
    if state.status() == Status::Error {
        if let Err(e) = link.send_mode(ModeCommand::Safe) {
            log::error!("Emergency stop send failed: {}", e);
        }
        log::error!("Roomba emergency stop");
    }

    match frame {
        Some(frame) => apply_frame(link, state, frame, thresholds),
        None => {
            // Prolonged silence while telemetry is expected
            if state.rank() >= Status::Init.rank() {
                log::error!("No sensor frame from the robot, forcing error status");
                state.set_status(Status::Error);
            }
        }
    }
}

/// Evaluate the safety and derived-state rules for one frame, in fixed order
fn apply_frame(
    link: &dyn RobotLink,
    state: &SharedState,
    frame: &SensorFrame,
    thresholds: &BatteryConfig,
) {
    // Rules apply only with active telemetry (above Init)
    if state.rank() <= Status::Init.rank() {
        return;
    }

    // (a) docking detection
    let freshly_docked = {
        let mut status = state.lock_status();
        if frame.home_base && *status != Status::Docked && *status != Status::Moving {
            *status = Status::Docked;
            true
        } else {
            false
        }
    };
    if freshly_docked {
        link.reset_position();
        state.reset_position();
        log::debug!("Docked");
    }

    // (b) motor overcurrent: logged, no state change
    if frame.overcurrent_left || frame.overcurrent_right {
        log::error!(
            "Motors overcurrent (left={}, right={})",
            frame.overcurrent_left,
            frame.overcurrent_right
        );
    }

    // (c) wheel drop: robot lifted off the ground, back to init
    if frame.wheel_drop_left || frame.wheel_drop_right {
        log::error!(
            "Robot dropped (left={}, right={})",
            frame.wheel_drop_left,
            frame.wheel_drop_right
        );
        state.set_status(Status::Init);
    }

    // (d) battery level
    let level = battery_percent(frame.battery_charge, frame.battery_capacity);
    state.set_battery(level);
    state.update_energy(level, thresholds);

    // (e) position; the frame predates a dock-triggered reset, so skip it then
    if !freshly_docked {
        state.set_position(Position {
            x: frame.x,
            y: frame.y,
            theta: frame.theta,
        });
    }
    let status = state.status();
    if status == Status::Moving || status == Status::SearchingDock {
        log::debug!(
            "Position: x={:.3} y={:.3} theta={:.3}",
            frame.x,
            frame.y,
            frame.theta
        );
    }
}

/// Battery percentage, floored; unknown when the capacity field is zero
pub(crate) fn battery_percent(charge: u16, capacity: u16) -> i16 {
    if capacity == 0 {
        return BATTERY_UNKNOWN;
    }
    ((100 * charge as u32) / capacity as u32) as i16
}
