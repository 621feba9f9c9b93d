//! Error taxonomy for the refresh engine.
//!
//! | Error | When | Recovery |
//! |---|---|---|
//! | [`ConfigurationError`] | startup, bad timing or scan constants | none, the driver never starts |
//! | [`BindingError`] | startup, pin role conflicts | none, the driver never starts |
//! | [`BufferUnavailableError`] | per cycle, no frame presented yet | skip the cycle, retry next tick |
//! | [`TimingViolationError`] | runtime, sequencing broken | output blanked, full reinitialisation |

use crate::pins::{PhysicalLine, SignalRole};
use crate::scheduler::SchedulerState;

/// Invalid timing or scan constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurationError {
    /// Latch pulse width outside the supported window.
    #[error("latch pulse width {0} ns outside [{min}, {max}] ns", min = crate::timing::LATCH_PULSE_WIDTH_MIN_NS, max = crate::timing::LATCH_PULSE_WIDTH_MAX_NS)]
    LatchPulseWidth(u32),
    /// Latch-to-clock delay of zero.
    #[error("latch to clock delay must be positive")]
    LatchToClockDelay,
    /// Latch-to-clock delay shorter than the measured propagation delay.
    #[error("latch to clock delay {delay} ns below measured propagation delay {measured} ns")]
    LatchToClockBelowPropagation {
        /// Configured delay.
        delay: u32,
        /// Measured clock-to-output delay for the core clock.
        measured: u32,
    },
    /// Clock divider is not even.
    #[error("clock divider {0} is odd")]
    ClockDividerOdd(u16),
    /// Clock divider below the fastest clock the panels tolerate.
    #[error("clock divider {0} below minimum {min}", min = crate::timing::CLOCK_DIVIDER_MIN)]
    ClockDividerTooSmall(u16),
    /// Clock divider beyond what the shift timer can count.
    #[error("clock divider {0} above maximum {max}", max = crate::timing::CLOCK_DIVIDER_MAX)]
    ClockDividerTooLarge(u16),
    /// Base clock below 1 MHz, the resolution of the budget formula.
    #[error("base clock below 1 MHz")]
    BaseClock,
    /// The 32-pixel transfer budget does not cover the real shift time.
    #[error("transfer budget {budget} ns does not exceed 32 pixel shift time {required} ns")]
    TransferBudget {
        /// Derived budget.
        budget: u32,
        /// Actual shift time for 32 pixels.
        required: u32,
    },
    /// Colour depth outside `1..=8` planes.
    #[error("colour depth of {0} planes not supported")]
    ColorDepth(u8),
    /// Row pair count outside `1..=32`.
    #[error("{0} row pairs not supported")]
    RowPairs(u8),
    /// Zero columns.
    #[error("panel chain has no columns")]
    Columns,
    /// LSB on-time of zero.
    #[error("least significant plane on-time must be positive")]
    OnTime,
    /// Transition plane beyond the colour depth.
    #[error("transition plane {transition} beyond {planes} planes")]
    TransitionPlane {
        /// Configured transition plane.
        transition: u8,
        /// Configured colour depth.
        planes: u8,
    },
    /// Frame source with fewer row pairs than the scan, or a different row
    /// length or colour depth.
    #[error("frame of {row_pairs} row pairs, {cols} columns and {planes} planes does not match the scan")]
    FrameGeometry {
        /// Row pairs the frame stores.
        row_pairs: usize,
        /// Entries per row the frame stores.
        cols: usize,
        /// Planes the frame stores.
        planes: usize,
    },
}

/// Pin role conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BindingError {
    /// The role has no physical line.
    #[error("role {0:?} has no assigned line")]
    Unassigned(SignalRole),
    /// Both clock roles were assigned.
    #[error("default and alternate clock pins are both assigned")]
    ClockConflict,
    /// Two roles share a physical line.
    #[error("roles {first:?} and {second:?} share line {line}")]
    DuplicateLine {
        /// First role using the line.
        first: SignalRole,
        /// Second role using the line.
        second: SignalRole,
        /// The shared line.
        line: PhysicalLine,
    },
    /// The SPI jumpers are in the position that disconnects the matrix.
    #[error("alternate SPI jumpers disconnect the LED matrix")]
    MatrixDisconnected,
}

/// No frame is ready to be scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("no frame buffer has been presented")]
pub struct BufferUnavailableError;

/// Sequencing or timing broken at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingViolationError {
    /// Row address would change while the output is lit.
    #[error("row address change while output enabled")]
    AddressWhileLit,
    /// Shifting the row took longer than its budget.
    #[error("row shift took {elapsed} ns, budget {budget} ns")]
    ShiftOverrun {
        /// Per-row budget.
        budget: u32,
        /// Measured shift time.
        elapsed: u32,
    },
    /// Latch asserted before the clock-to-latch delay elapsed.
    #[error("latch asserted {actual} ns after last clock, need {required} ns")]
    LatchTooEarly {
        /// Required delay.
        required: u32,
        /// Measured delay.
        actual: u32,
    },
    /// Latch held for anything other than the configured width.
    #[error("latch held {measured} ns, expected exactly {expected} ns")]
    LatchWidth {
        /// Configured width.
        expected: u32,
        /// Measured width.
        measured: u32,
    },
    /// Row data length does not match the panel chain.
    #[error("row data has {actual} columns, expected {expected}")]
    RowLength {
        /// Configured chained columns.
        expected: u16,
        /// Columns handed to the sequencer.
        actual: u16,
    },
    /// Scheduler event in the wrong state.
    #[error("scheduler event out of order in state {0:?}")]
    OutOfOrder(SchedulerState),
    /// A previous violation halted the output.
    #[error("output halted by an earlier timing violation")]
    Halted,
}

/// Any error the refresh engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// See [`ConfigurationError`].
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// See [`BindingError`].
    #[error(transparent)]
    Binding(#[from] BindingError),
    /// See [`BufferUnavailableError`].
    #[error(transparent)]
    BufferUnavailable(#[from] BufferUnavailableError),
    /// See [`TimingViolationError`].
    #[error(transparent)]
    TimingViolation(#[from] TimingViolationError),
}

impl Error {
    /// Whether the error may go away on the next tick.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Error::BufferUnavailable(_))
    }
}
