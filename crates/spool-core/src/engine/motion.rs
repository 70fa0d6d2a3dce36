//! Knob-to-playhead motion physics
//!
//! The knob feeds angular deltas into a raw velocity; each 60 Hz tick smooths
//! the raw velocity into the tape speed, advances the playhead, applies
//! friction, and damps motion against the tape ends. All velocities are in
//! seconds of tape per tick.
//!
//! Per tick the order is: smooth, move and clamp, friction, edge damping.
//! Damping lands after the move so a reel that just hit an end still played
//! its last step, then bleeds off over the following ticks.

use crate::config::TransportConfig;

/// Playhead must be this close (seconds) to an end for edge damping to kick in
const EDGE_EPSILON: f64 = 0.0005;

/// Raw-velocity multiplier while edge damping is active
const EDGE_RAW_DAMP: f64 = 0.6;

/// Tape-speed multiplier while edge damping is active
const EDGE_SPEED_DAMP: f64 = 0.75;

/// Direction of tape travel, gated by the deadzone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionDirection {
    Forward,
    Reverse,
    Stopped,
}

/// Integrates knob gestures into playhead motion
pub struct MotionIntegrator {
    config: TransportConfig,
    /// Instantaneous velocity accumulated from knob deltas
    raw_velocity: f64,
    /// Smoothed tape speed that actually moves the playhead
    speed: f64,
    /// Playhead position in seconds of tape
    playhead: f64,
    /// Tape length in seconds
    duration: f64,
}

impl MotionIntegrator {
    /// Create an integrator at rest, playhead at the tape start
    pub fn new(config: TransportConfig, duration: f64) -> Self {
        Self {
            config,
            raw_velocity: 0.0,
            speed: 0.0,
            playhead: 0.0,
            duration: duration.max(0.0),
        }
    }

    /// Feed one knob rotation delta (degrees; positive = forward)
    ///
    /// Rewind deltas get an extra multiplier so winding backwards feels
    /// quicker than playing forwards, and the clamp is wider on the reverse
    /// side for the same reason.
    pub fn apply_knob_delta(&mut self, delta_degrees: f64) {
        let mut gain = delta_degrees * self.config.drag_sensitivity;
        if gain < 0.0 {
            gain *= self.config.rewind_multiplier;
        }
        self.raw_velocity = (self.raw_velocity + gain)
            .clamp(-self.config.max_reverse_speed, self.config.max_forward_speed);
    }

    /// Advance one tick of motion
    pub fn tick(&mut self) {
        // Smooth raw velocity into tape speed
        self.speed += (self.raw_velocity - self.speed) * self.config.speed_smoothing;

        // Move the playhead, pinned to the tape
        self.playhead = (self.playhead + self.speed).clamp(0.0, self.duration);

        // Inertial coasting
        self.raw_velocity *= self.config.friction;

        // Bleed off motion against the reel ends
        if self.playhead <= EDGE_EPSILON || self.playhead >= self.duration - EDGE_EPSILON {
            self.raw_velocity *= EDGE_RAW_DAMP;
            self.speed *= EDGE_SPEED_DAMP;
        }
    }

    /// Current smoothed tape speed (seconds of tape per tick)
    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Current playhead position in seconds
    #[inline]
    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    /// Tape length in seconds
    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Direction of travel; speeds inside the deadzone read as stopped
    pub fn direction(&self) -> MotionDirection {
        if self.speed > self.config.deadzone {
            MotionDirection::Forward
        } else if self.speed < -self.config.deadzone {
            MotionDirection::Reverse
        } else {
            MotionDirection::Stopped
        }
    }

    /// Whether the tape is audibly moving
    #[inline]
    pub fn is_moving(&self) -> bool {
        self.direction() != MotionDirection::Stopped
    }

    /// Jump the playhead, killing all motion
    pub fn seek(&mut self, position: f64) {
        self.playhead = position.clamp(0.0, self.duration);
        self.raw_velocity = 0.0;
        self.speed = 0.0;
    }

    /// Kill all motion, leaving the playhead where it is
    pub fn stop(&mut self) {
        self.raw_velocity = 0.0;
        self.speed = 0.0;
    }

    /// Replace the tape length (new clip), resetting motion
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
        self.seek(0.0);
    }
}
