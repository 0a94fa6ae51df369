//! Stereo pairing: assign left/right frames a shared pair timestamp.
//!
//! Each frame carries a hardware timestamp from its own camera. A frame joins
//! the enclosure's open pair when its partner camera has a recorded timestamp
//! within `window_ms` of it; otherwise it opens a new pair stamped with the
//! current wall-clock time. Output file names use the pair timestamp, so the
//! left and right images of one moment can be joined by name downstream.
//!
//! New pair timestamps are strictly increasing within a session: a pair
//! opened in the same millisecond as the previous one is stamped one
//! millisecond later, so two pairs never share a file name.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::camera::CameraDescriptor;
use crate::config::{CaptureParams, DEFAULT_PAIR_WINDOW_MS};

/// Source of wall-clock milliseconds for new pair timestamps.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl<F: Fn() -> u64> Clock for F {
    fn now_ms(&self) -> u64 {
        self()
    }
}

/// When a frame may join the open pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingPolicy {
    /// Largest accepted `|frame - partner_last|` in milliseconds.
    pub window_ms: u64,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_PAIR_WINDOW_MS,
        }
    }
}

impl From<&CaptureParams> for PairingPolicy {
    fn from(params: &CaptureParams) -> Self {
        Self {
            window_ms: params.pair_window_ms,
        }
    }
}

/// Pairing decision for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairAssignment {
    pub pair_timestamp_ms: u64,
    /// `true` when this frame opened a new pair.
    pub opened: bool,
    /// Distance to the partner's last timestamp, if the partner has one.
    pub partner_delta_ms: Option<u64>,
}

/// Mutable pairing state owned by a capture loop.
#[derive(Clone, Debug, Default)]
pub struct PairingState {
    policy: PairingPolicy,
    last_seen_ms: HashMap<String, u64>,
    // keyed by enclosure id
    open_pairs: HashMap<String, u64>,
    last_opened_ms: Option<u64>,
}

impl PairingState {
    pub fn new(policy: PairingPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> PairingPolicy {
        self.policy
    }

    /// Decide the pair timestamp for a frame from `camera` and record its
    /// hardware timestamp.
    pub fn assign(
        &mut self,
        camera: &CameraDescriptor,
        timestamp_ms: u64,
        clock: &impl Clock,
    ) -> PairAssignment {
        let partner_delta_ms = self
            .last_seen_ms
            .get(&camera.partner_serial_number)
            .map(|&partner| timestamp_ms.abs_diff(partner));
        let open = self.open_pairs.get(&camera.enclosure_id).copied();

        let assignment = match (open, partner_delta_ms) {
            (Some(pair), Some(delta)) if delta <= self.policy.window_ms => PairAssignment {
                pair_timestamp_ms: pair,
                opened: false,
                partner_delta_ms,
            },
            _ => {
                let now = clock.now_ms();
                let pair = self.last_opened_ms.map_or(now, |last| now.max(last + 1));
                self.last_opened_ms = Some(pair);
                self.open_pairs.insert(camera.enclosure_id.clone(), pair);
                log::debug!(
                    "camera {} opened pair {} (partner delta {:?})",
                    camera.serial_number,
                    pair,
                    partner_delta_ms
                );
                PairAssignment {
                    pair_timestamp_ms: pair,
                    opened: true,
                    partner_delta_ms,
                }
            }
        };

        self.last_seen_ms
            .insert(camera.serial_number.clone(), timestamp_ms);
        assignment
    }

    /// Last hardware timestamp recorded for `serial_number`.
    pub fn last_seen_ms(&self, serial_number: &str) -> Option<u64> {
        self.last_seen_ms.get(serial_number).copied()
    }

    /// Currently open pair timestamp of an enclosure.
    pub fn open_pair_ms(&self, enclosure_id: &str) -> Option<u64> {
        self.open_pairs.get(enclosure_id).copied()
    }
}
