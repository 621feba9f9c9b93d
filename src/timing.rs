//! Physically derived timing constants.
//!
//! The pixel clock is generated from a fixed-frequency base clock (480 MHz
//! PLL3 on the Teensy 4) through an even divide-by-n counter, so the pixel
//! clock frequency does not depend on the CPU clock. The latch and
//! output-enable pulses come from a separate PWM timer and are described in
//! nanoseconds.
//!
//! [`TimingParameters`] holds those constants and [`ScanParameters`] holds the
//! panel geometry and Binary Code Modulation settings. Both are validated once
//! at startup and never mutated afterwards.
//!
//! # Example
//! ```rust
//! use hub75_refresh::timing::TimingParameters;
//!
//! let timing = TimingParameters::TEENSY4_ADAPTER;
//! assert!(timing.validate().is_ok());
//! assert_eq!(timing.pixel_transfer_budget_ns(), 1650);
//! ```

use fugit::HertzU32;

use crate::error::ConfigurationError;

/// Shortest latch pulse any tested panel recognises (DP5020B).
pub const LATCH_PULSE_WIDTH_MIN_NS: u32 = 20;
/// Longest latch pulse before it starts to interfere with the next transfer.
pub const LATCH_PULSE_WIDTH_MAX_NS: u32 = 150;
/// Smallest divider the panels keep up with (24 MHz at 480 MHz).
pub const CLOCK_DIVIDER_MIN: u16 = 20;
/// Largest divider the shift timer can represent, its compare register holds
/// `divider / 2 - 1` in eight bits.
pub const CLOCK_DIVIDER_MAX: u16 = 512;
/// Number of pixels the transfer budget is specified for.
pub const PIXELS_PER_TRANSFER: u32 = 32;
/// Most planes a channel can be split into (8-bit colour).
pub const MAX_PLANES: u8 = 8;
/// Most row pairs five address lines can select.
pub const MAX_ROW_PAIRS: u8 = 32;

/// CPU core clocks with a measured latch-to-clock propagation delay.
///
/// DMA activity delays the first pixel clock after the latch rising edge; the
/// delay shrinks as the core clock goes up. Slower cores are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreClock {
    /// 600 MHz, the Teensy 4 default.
    Mhz600,
    /// 816 MHz overclock.
    Mhz816,
}

impl CoreClock {
    /// Measured delay from the latch rising edge to the first pixel clock.
    #[must_use]
    pub const fn clock_to_output_delay_ns(self) -> u32 {
        match self {
            CoreClock::Mhz600 => 220,
            CoreClock::Mhz816 => 160,
        }
    }

    /// Core frequency.
    #[must_use]
    pub const fn frequency(self) -> HertzU32 {
        match self {
            CoreClock::Mhz600 => HertzU32::MHz(600),
            CoreClock::Mhz816 => HertzU32::MHz(816),
        }
    }
}

/// Timing constants for the clock, latch and output-enable lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParameters {
    latch_pulse_width_ns: u32,
    latch_to_clock_delay_ns: u32,
    clock_divider: u16,
    base_clock: HertzU32,
    transfer_overhead_ns: u32,
    clock_to_output_delay_ns: u32,
}

impl TimingParameters {
    /// SmartLED Shield V4 on the Teensy 4 adapter at 600 MHz.
    ///
    /// 100 ns latch (works with FM6126A panels), 400 ns latch-to-clock delay
    /// (measured 220 ns, plus margin), divider 24 (20 MHz pixel clock, which
    /// avoids intermittent glitching seen at 24 MHz) and 50 ns of transfer
    /// overhead.
    pub const TEENSY4_ADAPTER: Self = Self::new(100, 400, 24)
        .with_base_clock(HertzU32::MHz(480))
        .with_transfer_overhead_ns(50)
        .with_core_clock(CoreClock::Mhz600);

    /// Create a parameter set with the 480 MHz base clock, 50 ns overhead and
    /// no propagation floor. Call [`validate`](Self::validate) before use.
    #[must_use]
    pub const fn new(latch_pulse_width_ns: u32, latch_to_clock_delay_ns: u32, clock_divider: u16) -> Self {
        Self {
            latch_pulse_width_ns,
            latch_to_clock_delay_ns,
            clock_divider,
            base_clock: HertzU32::MHz(480),
            transfer_overhead_ns: 50,
            clock_to_output_delay_ns: 0,
        }
    }

    /// Replace the base clock feeding the pixel clock divider.
    #[must_use]
    pub const fn with_base_clock(mut self, base_clock: HertzU32) -> Self {
        self.base_clock = base_clock;
        self
    }

    /// Replace the fixed overhead added to the 32-pixel transfer time.
    #[must_use]
    pub const fn with_transfer_overhead_ns(mut self, overhead_ns: u32) -> Self {
        self.transfer_overhead_ns = overhead_ns;
        self
    }

    /// Require the latch-to-clock delay to cover the propagation delay
    /// measured for `core`.
    #[must_use]
    pub const fn with_core_clock(mut self, core: CoreClock) -> Self {
        self.clock_to_output_delay_ns = core.clock_to_output_delay_ns();
        self
    }

    /// Require the latch-to-clock delay to cover an explicitly measured
    /// propagation delay.
    #[must_use]
    pub const fn with_clock_to_output_delay_ns(mut self, delay_ns: u32) -> Self {
        self.clock_to_output_delay_ns = delay_ns;
        self
    }

    /// Latch pulse width in ns.
    #[must_use]
    pub const fn latch_pulse_width_ns(&self) -> u32 {
        self.latch_pulse_width_ns
    }

    /// Delay between the last pixel clock and the latch in ns.
    #[must_use]
    pub const fn latch_to_clock_delay_ns(&self) -> u32 {
        self.latch_to_clock_delay_ns
    }

    /// Pixel clock divider.
    #[must_use]
    pub const fn clock_divider(&self) -> u16 {
        self.clock_divider
    }

    /// Base clock feeding the divider.
    #[must_use]
    pub const fn base_clock(&self) -> HertzU32 {
        self.base_clock
    }

    /// Fixed overhead added to the 32-pixel transfer time.
    #[must_use]
    pub const fn transfer_overhead_ns(&self) -> u32 {
        self.transfer_overhead_ns
    }

    /// Propagation delay the latch-to-clock delay must cover.
    #[must_use]
    pub const fn clock_to_output_delay_ns(&self) -> u32 {
        self.clock_to_output_delay_ns
    }

    /// Pixel clock frequency, `base_clock / clock_divider`.
    #[must_use]
    pub const fn pixel_clock(&self) -> HertzU32 {
        if self.clock_divider == 0 {
            return HertzU32::from_raw(0);
        }
        HertzU32::from_raw(self.base_clock.raw() / self.clock_divider as u32)
    }

    /// Maximum time allowed to transfer 32 pixels:
    /// `32 * clock_divider * 1000 / base_clock_MHz + transfer_overhead_ns`.
    #[must_use]
    pub const fn pixel_transfer_budget_ns(&self) -> u32 {
        let mhz = self.base_clock.to_MHz();
        if mhz == 0 {
            return self.transfer_overhead_ns;
        }
        (PIXELS_PER_TRANSFER * self.clock_divider as u32 * 1000 / mhz).saturating_add(self.transfer_overhead_ns)
    }

    /// Time the pixel clock needs to shift `pixels` pixels, rounded up.
    #[must_use]
    pub const fn shift_time_ns(&self, pixels: u32) -> u32 {
        let hz = self.base_clock.raw() as u64;
        if hz == 0 {
            return u32::MAX;
        }
        let ns = (pixels as u64 * self.clock_divider as u64 * 1_000_000_000).div_ceil(hz);
        if ns > u32::MAX as u64 {
            u32::MAX
        } else {
            ns as u32
        }
    }

    /// Budget for shifting one row of `cols` chained pixels, one
    /// [`pixel_transfer_budget_ns`](Self::pixel_transfer_budget_ns) per
    /// started group of 32 pixels.
    #[must_use]
    pub const fn row_transfer_budget_ns(&self, cols: u32) -> u32 {
        cols.div_ceil(PIXELS_PER_TRANSFER)
            .saturating_mul(self.pixel_transfer_budget_ns())
    }

    /// Check every constant against the panel and timer limits.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found. The driver must not
    /// touch any output pin when this fails.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(LATCH_PULSE_WIDTH_MIN_NS..=LATCH_PULSE_WIDTH_MAX_NS).contains(&self.latch_pulse_width_ns) {
            return Err(ConfigurationError::LatchPulseWidth(self.latch_pulse_width_ns));
        }
        if self.latch_to_clock_delay_ns == 0 {
            return Err(ConfigurationError::LatchToClockDelay);
        }
        if self.latch_to_clock_delay_ns < self.clock_to_output_delay_ns {
            return Err(ConfigurationError::LatchToClockBelowPropagation {
                delay: self.latch_to_clock_delay_ns,
                measured: self.clock_to_output_delay_ns,
            });
        }
        if self.clock_divider % 2 != 0 {
            return Err(ConfigurationError::ClockDividerOdd(self.clock_divider));
        }
        if self.clock_divider < CLOCK_DIVIDER_MIN {
            return Err(ConfigurationError::ClockDividerTooSmall(self.clock_divider));
        }
        if self.clock_divider > CLOCK_DIVIDER_MAX {
            return Err(ConfigurationError::ClockDividerTooLarge(self.clock_divider));
        }
        if self.base_clock.to_MHz() == 0 {
            return Err(ConfigurationError::BaseClock);
        }
        let budget = self.pixel_transfer_budget_ns();
        let required = self.shift_time_ns(PIXELS_PER_TRANSFER);
        if budget <= required {
            return Err(ConfigurationError::TransferBudget { budget, required });
        }
        Ok(())
    }
}

impl Default for TimingParameters {
    fn default() -> Self {
        Self::TEENSY4_ADAPTER
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TimingParameters {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "TimingParameters latch: {} ns, latch->clk: {} ns, divider: {}, base: {} Hz, budget: {} ns",
            self.latch_pulse_width_ns,
            self.latch_to_clock_delay_ns,
            self.clock_divider,
            self.base_clock.raw(),
            self.pixel_transfer_budget_ns()
        );
    }
}

/// Panel geometry and Binary Code Modulation settings.
///
/// Plane `p` (weight `2^p`) is shown for `lsb_on_time_ns * 2^p` per row and
/// refresh. Planes below `transition` get that as one window; planes at or
/// above it are split into `2^(p - transition)` windows of
/// `lsb_on_time_ns * 2^transition` each, spread over the row-scan period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParameters {
    planes: u8,
    row_pairs: u8,
    cols: u16,
    lsb_on_time_ns: u32,
    transition: u8,
}

impl ScanParameters {
    /// Create scan parameters where every plane gets one window
    /// (transition plane equal to `planes`).
    #[must_use]
    pub const fn new(planes: u8, row_pairs: u8, cols: u16, lsb_on_time_ns: u32) -> Self {
        Self {
            planes,
            row_pairs,
            cols,
            lsb_on_time_ns,
            transition: planes,
        }
    }

    /// Set the first plane that is split into repeated equal windows.
    #[must_use]
    pub const fn with_transition(mut self, transition: u8) -> Self {
        self.transition = transition;
        self
    }

    /// Colour depth in planes.
    #[must_use]
    pub const fn planes(&self) -> u8 {
        self.planes
    }

    /// Row pairs scanned per refresh.
    #[must_use]
    pub const fn row_pairs(&self) -> u8 {
        self.row_pairs
    }

    /// Pixels per row across the whole chain.
    #[must_use]
    pub const fn cols(&self) -> u16 {
        self.cols
    }

    /// On-time of the least significant plane.
    #[must_use]
    pub const fn lsb_on_time_ns(&self) -> u32 {
        self.lsb_on_time_ns
    }

    /// First split plane.
    #[must_use]
    pub const fn transition(&self) -> u8 {
        self.transition
    }

    /// Check the geometry against the address lines and colour depth.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.planes == 0 || self.planes > MAX_PLANES {
            return Err(ConfigurationError::ColorDepth(self.planes));
        }
        if self.row_pairs == 0 || self.row_pairs > MAX_ROW_PAIRS {
            return Err(ConfigurationError::RowPairs(self.row_pairs));
        }
        if self.cols == 0 {
            return Err(ConfigurationError::Columns);
        }
        if self.lsb_on_time_ns == 0 {
            return Err(ConfigurationError::OnTime);
        }
        if self.transition > self.planes {
            return Err(ConfigurationError::TransitionPlane {
                transition: self.transition,
                planes: self.planes,
            });
        }
        Ok(())
    }
}
