//! Bit-plane scheduler.
//!
//! Decides which (row pair, bit plane) is shifted next and for how long it is
//! displayed, and tracks where the current cycle is:
//!
//! ```text
//!            select            begin_shift          shift_complete
//!   Idle ──────────▶ SelectPlane ─────────▶ Shifting ─────────────▶ Latching
//!    ▲                    │ skip                                       │
//!    │◀───────────────────┘                              latch_complete│
//!    │                                                                 ▼
//!    └─────────────────────────── blanking_complete ─────────────── Blanking
//! ```
//!
//! A shutdown request turns the next `blanking_complete` (or `skip`) into a
//! transition to `Stopped`, so output always stops at a row/plane boundary.
//!
//! # Plane order
//! Within each row-scan period plane `p` (weight `2^p`) gets `v_p` visits,
//! one for planes below the transition plane `t` and `2^(p - t)` from `t`
//! upwards. Each visit shows the plane for `lsb_on_time_ns * 2^min(p, t)`, so
//! every plane contributes `lsb_on_time_ns * 2^p` per row. Visits are spread
//! evenly (visit `k` of plane `p` is due at `k / v_p` of the period); when
//! several are due at once the least significant plane goes first.

use heapless::Vec;

use crate::error::{ConfigurationError, TimingViolationError};
use crate::timing::ScanParameters;

/// Most plane visits per row, reached with 8 planes and transition plane 0.
pub const MAX_SLOTS: usize = 255;

/// Index of a row pair, `0..row_pairs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct RowAddress(u8);

impl RowAddress {
    /// Wrap a row pair index.
    #[must_use]
    pub const fn new(row: u8) -> Self {
        Self(row)
    }

    /// Value driven on the address lines.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Index for buffer lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a bit plane, `0..planes`, 0 being the least significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct BitPlane(u8);

impl BitPlane {
    /// Wrap a plane index.
    #[must_use]
    pub const fn new(plane: u8) -> Self {
        Self(plane)
    }

    /// Index for buffer lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Binary weight, `2^p`, saturating at `u32::MAX` for planes past 31.
    #[must_use]
    pub const fn weight(self) -> u32 {
        match 1u32.checked_shl(self.0 as u32) {
            Some(weight) => weight,
            None => u32::MAX,
        }
    }
}

/// Scheduler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerState {
    /// Between cycles.
    Idle,
    /// A (row, plane) pair was selected, data not yet requested.
    SelectPlane,
    /// Row data is being clocked out.
    Shifting,
    /// Latch pulse in progress.
    Latching,
    /// Row lit for its on-time.
    Blanking,
    /// Shut down at a cycle boundary.
    Stopped,
}

/// One scheduled display window of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlaneVisit {
    /// Plane shown.
    pub plane: BitPlane,
    /// How long the row stays lit.
    pub on_time_ns: u32,
}

/// What the next cycle has to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Selection {
    /// Row pair to address.
    pub row: RowAddress,
    /// Plane to shift.
    pub plane: BitPlane,
    /// On-time once latched.
    pub on_time_ns: u32,
    /// Whether this is the first cycle of a refresh.
    pub frame_start: bool,
}

/// Number of visits plane `plane` gets per row-scan period.
#[must_use]
pub const fn plane_visits(plane: u8, transition: u8) -> u32 {
    if plane < transition {
        1
    } else {
        1 << (plane - transition)
    }
}

/// On-time of a single visit of `plane`.
#[must_use]
pub const fn visit_on_time_ns(plane: u8, transition: u8, lsb_on_time_ns: u32) -> u32 {
    let shift = if plane < transition { plane } else { transition };
    lsb_on_time_ns.saturating_mul(1 << shift)
}

/// Plane visits of one row-scan period, in display order.
fn plane_sequence(scan: &ScanParameters) -> Vec<PlaneVisit, MAX_SLOTS> {
    // (visit, visits of the plane, plane)
    let mut due: Vec<(u32, u32, u8), MAX_SLOTS> = Vec::new();
    for plane in 0..scan.planes() {
        let visits = plane_visits(plane, scan.transition());
        for k in 0..visits {
            // capacity holds for validated parameters
            let pushed = due.push((k, visits, plane));
            debug_assert!(pushed.is_ok(), "plane sequence exceeds {} slots", MAX_SLOTS);
        }
    }
    due.sort_unstable_by(|&(k1, v1, p1), &(k2, v2, p2)| (k1 * v2).cmp(&(k2 * v1)).then(p1.cmp(&p2)));

    let mut sequence = Vec::new();
    for &(_, _, plane) in &due {
        let pushed = sequence.push(PlaneVisit {
            plane: BitPlane::new(plane),
            on_time_ns: visit_on_time_ns(plane, scan.transition(), scan.lsb_on_time_ns()),
        });
        debug_assert!(pushed.is_ok(), "plane sequence exceeds {} slots", MAX_SLOTS);
    }
    sequence
}

/// Weighted round-robin over rows and planes.
#[derive(Debug, Clone)]
pub struct BitPlaneScheduler {
    sequence: Vec<PlaneVisit, MAX_SLOTS>,
    row_pairs: u8,
    row: u8,
    slot: usize,
    state: SchedulerState,
    shutdown_requested: bool,
    refreshes: u32,
}

impl BitPlaneScheduler {
    /// Build the plane order for `scan`.
    ///
    /// # Errors
    ///
    /// Any [`ConfigurationError`] from [`ScanParameters::validate`].
    pub fn new(scan: &ScanParameters) -> Result<Self, ConfigurationError> {
        scan.validate()?;
        Ok(Self {
            sequence: plane_sequence(scan),
            row_pairs: scan.row_pairs(),
            row: 0,
            slot: 0,
            state: SchedulerState::Idle,
            shutdown_requested: false,
            refreshes: 0,
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Plane visits of one row-scan period.
    #[must_use]
    pub fn sequence(&self) -> &[PlaneVisit] {
        &self.sequence
    }

    /// Cycles in a complete refresh.
    #[must_use]
    pub fn slots_per_refresh(&self) -> usize {
        self.sequence.len() * usize::from(self.row_pairs)
    }

    /// Completed refreshes.
    #[must_use]
    pub const fn refreshes(&self) -> u32 {
        self.refreshes
    }

    /// Whether the next selection starts a new refresh.
    #[must_use]
    pub const fn at_frame_start(&self) -> bool {
        self.row == 0 && self.slot == 0
    }

    /// Whether a shutdown is waiting for the next boundary.
    #[must_use]
    pub const fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    fn require(&self, state: SchedulerState) -> Result<(), TimingViolationError> {
        if self.state == state {
            Ok(())
        } else {
            Err(TimingViolationError::OutOfOrder(self.state))
        }
    }

    /// `Idle → SelectPlane`: pick the next (row, plane).
    ///
    /// # Errors
    ///
    /// [`TimingViolationError::OutOfOrder`] outside `Idle`.
    pub fn select(&mut self) -> Result<Selection, TimingViolationError> {
        self.require(SchedulerState::Idle)?;
        let visit = self.sequence[self.slot];
        self.state = SchedulerState::SelectPlane;
        Ok(Selection {
            row: RowAddress::new(self.row),
            plane: visit.plane,
            on_time_ns: visit.on_time_ns,
            frame_start: self.at_frame_start(),
        })
    }

    /// `SelectPlane → Shifting`: data was obtained.
    ///
    /// # Errors
    ///
    /// [`TimingViolationError::OutOfOrder`] outside `SelectPlane`.
    pub fn begin_shift(&mut self) -> Result<(), TimingViolationError> {
        self.require(SchedulerState::SelectPlane)?;
        self.state = SchedulerState::Shifting;
        Ok(())
    }

    /// `SelectPlane → Idle`: no data, move on to the next pair.
    ///
    /// Returns `true` if this completed a refresh.
    ///
    /// # Errors
    ///
    /// [`TimingViolationError::OutOfOrder`] outside `SelectPlane`.
    pub fn skip(&mut self) -> Result<bool, TimingViolationError> {
        self.require(SchedulerState::SelectPlane)?;
        Ok(self.finish_cycle())
    }

    /// `Shifting → Latching`.
    ///
    /// # Errors
    ///
    /// [`TimingViolationError::OutOfOrder`] outside `Shifting`.
    pub fn shift_complete(&mut self) -> Result<(), TimingViolationError> {
        self.require(SchedulerState::Shifting)?;
        self.state = SchedulerState::Latching;
        Ok(())
    }

    /// `Latching → Blanking`.
    ///
    /// # Errors
    ///
    /// [`TimingViolationError::OutOfOrder`] outside `Latching`.
    pub fn latch_complete(&mut self) -> Result<(), TimingViolationError> {
        self.require(SchedulerState::Latching)?;
        self.state = SchedulerState::Blanking;
        Ok(())
    }

    /// `Blanking → Idle` (or `Stopped` after a shutdown request).
    ///
    /// Returns `true` if this completed a refresh.
    ///
    /// # Errors
    ///
    /// [`TimingViolationError::OutOfOrder`] outside `Blanking`.
    pub fn blanking_complete(&mut self) -> Result<bool, TimingViolationError> {
        self.require(SchedulerState::Blanking)?;
        Ok(self.finish_cycle())
    }

    /// Stop at the next boundary, immediately when idle.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
        if self.state == SchedulerState::Idle {
            self.state = SchedulerState::Stopped;
        }
    }

    /// Back to `Idle` at the start of a refresh, clearing any shutdown.
    pub fn reset(&mut self) {
        self.row = 0;
        self.slot = 0;
        self.state = SchedulerState::Idle;
        self.shutdown_requested = false;
    }

    fn finish_cycle(&mut self) -> bool {
        let mut refresh_done = false;
        self.slot += 1;
        if self.slot == self.sequence.len() {
            self.slot = 0;
            self.row += 1;
            if self.row == self.row_pairs {
                self.row = 0;
                self.refreshes = self.refreshes.wrapping_add(1);
                refresh_done = true;
            }
        }
        self.state = if self.shutdown_requested {
            SchedulerState::Stopped
        } else {
            SchedulerState::Idle
        };
        refresh_done
    }
}
