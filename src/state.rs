//! Shared controller state
//!
//! The status cell is written both by command methods on the calling thread
//! and by the watchdog on its own thread, so it sits behind a mutex and
//! compound check-and-set sequences hold the guard across the whole update.
//! Battery and energy state are single words and use atomics for lockless
//! reads.

use crate::config::BatteryConfig;
use crate::types::{BATTERY_UNKNOWN, BatteryState, Position, Status};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicI16, AtomicU8, Ordering};

const ENERGY_UNKNOWN: u8 = 0;
const ENERGY_CHARGED: u8 = 1;
const ENERGY_DISCHARGED: u8 = 2;

/// State shared between the controller and the watchdog
pub(crate) struct SharedState {
    status: Mutex<Status>,
    battery: AtomicI16,
    energy: AtomicU8,
    position: Mutex<Position>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(Status::Closed),
            battery: AtomicI16::new(BATTERY_UNKNOWN),
            energy: AtomicU8::new(ENERGY_UNKNOWN),
            position: Mutex::new(Position::ORIGIN),
        }
    }

    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    pub fn set_status(&self, status: Status) {
        *self.status.lock() = status;
    }

    /// Lock the status cell for a compound check-and-set
    pub fn lock_status(&self) -> MutexGuard<'_, Status> {
        self.status.lock()
    }

    pub fn rank(&self) -> i8 {
        self.status().rank()
    }

    pub fn battery(&self) -> i16 {
        self.battery.load(Ordering::Relaxed)
    }

    pub fn set_battery(&self, level: i16) {
        self.battery.store(level, Ordering::Relaxed);
    }

    pub fn battery_state(&self) -> BatteryState {
        match self.energy.load(Ordering::Relaxed) {
            ENERGY_CHARGED => BatteryState::Charged,
            ENERGY_DISCHARGED => BatteryState::Discharged,
            _ => BatteryState::Unknown,
        }
    }

    /// Update the energy state from a freshly computed battery level,
    /// with hysteresis between the two thresholds
    pub fn update_energy(&self, level: i16, thresholds: &BatteryConfig) {
        if level < 0 {
            return;
        }
        if level <= thresholds.low_level {
            self.energy.store(ENERGY_DISCHARGED, Ordering::Relaxed);
        } else if level >= thresholds.high_level {
            self.energy.store(ENERGY_CHARGED, Ordering::Relaxed);
        }
        // Between the thresholds the previous state stands
    }

    pub fn position(&self) -> Position {
        *self.position.lock()
    }

    pub fn set_position(&self, position: Position) {
        *self.position.lock() = position;
    }

    pub fn reset_position(&self) {
        *self.position.lock() = Position::ORIGIN;
    }
}
