//! Signal sequencer.
//!
//! Emits the waveform of one (row, plane) cycle through a [`SignalPeripheral`]
//! and checks every step against the [`TimingParameters`]:
//!
//! 1. Blank (output enable off), then drive the row address. The address
//!    never changes while the row is lit.
//! 2. Shift the row data at `base_clock / clock_divider`, within the row
//!    transfer budget.
//! 3. Wait `latch_to_clock_delay_ns` after the last clock.
//! 4. Hold the latch for exactly `latch_pulse_width_ns`.
//! 5. Release the latch, light the row for its on-time, blank again.
//!
//! Any deviation is a [`TimingViolationError`]. The sequencer then forces the
//! output blanked and refuses to emit until [`SignalSequencer::reinitialize`].

use crate::error::TimingViolationError;
use crate::framebuffer::RowPlane;
use crate::pins::SignalBinding;
use crate::scheduler::RowAddress;
use crate::timing::TimingParameters;

/// Platform adapter driving the physical lines.
///
/// Implementations usually sit on fixed-function timers and DMA (a FlexIO
/// shifter for the pixel clock and data, a FlexPWM one-shot for the latch).
/// Every method returns once the hardware has finished the step; waits are
/// fixed hardware-timed durations, never open-ended.
pub trait SignalPeripheral {
    /// Configure the pins of `binding` as outputs, data bits in
    /// [`SignalBinding::data_bit_order`].
    fn attach(&mut self, binding: &SignalBinding);

    /// Set the pixel clock divider.
    fn configure_divider(&mut self, divider: u16);

    /// Monotonic time in ns.
    fn now_ns(&self) -> u64;

    /// Drive output enable, `true` lights the latched row.
    fn set_output_enable(&mut self, lit: bool);

    /// Current output enable level as seen on the line.
    fn output_lit(&self) -> bool;

    /// Drive the row address lines.
    fn set_row_address(&mut self, row: RowAddress);

    /// Clock out `data`, returning after the last clock edge.
    fn start_pulse_train(&mut self, data: RowPlane<'_>);

    /// Busy-wait for `ns`.
    fn delay_ns(&mut self, ns: u32);

    /// Assert the latch for `width_ns`, then release it.
    fn pulse_latch(&mut self, width_ns: u32);

    /// A cycle finished.
    fn on_cycle_complete(&mut self, _result: &CycleResult) {}
}

impl<P: SignalPeripheral + ?Sized> SignalPeripheral for &mut P {
    fn attach(&mut self, binding: &SignalBinding) {
        (**self).attach(binding);
    }

    fn configure_divider(&mut self, divider: u16) {
        (**self).configure_divider(divider);
    }

    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }

    fn set_output_enable(&mut self, lit: bool) {
        (**self).set_output_enable(lit);
    }

    fn output_lit(&self) -> bool {
        (**self).output_lit()
    }

    fn set_row_address(&mut self, row: RowAddress) {
        (**self).set_row_address(row);
    }

    fn start_pulse_train(&mut self, data: RowPlane<'_>) {
        (**self).start_pulse_train(data);
    }

    fn delay_ns(&mut self, ns: u32) {
        (**self).delay_ns(ns);
    }

    fn pulse_latch(&mut self, width_ns: u32) {
        (**self).pulse_latch(width_ns);
    }

    fn on_cycle_complete(&mut self, result: &CycleResult) {
        (**self).on_cycle_complete(result);
    }
}

/// Measured timing of an emitted cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleResult {
    /// Row pair that was latched.
    pub row: RowAddress,
    /// Time the cycle started (output blanked).
    pub started_at_ns: u64,
    /// Time spent shifting the row.
    pub shift_ns: u32,
    /// Time from the last clock to the latch.
    pub latch_delay_ns: u32,
    /// Latch pulse width.
    pub latch_ns: u32,
    /// Time the row was lit.
    pub on_time_ns: u32,
    /// Time the cycle ended (output blanked again).
    pub finished_at_ns: u64,
}

fn elapsed(from: u64, to: u64) -> u32 {
    u32::try_from(to.saturating_sub(from)).unwrap_or(u32::MAX)
}

/// Emits refresh cycles on a [`SignalPeripheral`].
#[derive(Debug)]
pub struct SignalSequencer<P> {
    peripheral: P,
    timing: TimingParameters,
    cols: u16,
    row_budget_ns: u32,
    halted: bool,
    cycles: u32,
}

impl<P: SignalPeripheral> SignalSequencer<P> {
    /// Create a sequencer for rows of `cols` chained pixels. Nothing is driven
    /// until [`initialize`](Self::initialize).
    pub fn new(peripheral: P, timing: TimingParameters, cols: u16) -> Self {
        Self {
            peripheral,
            timing,
            cols,
            row_budget_ns: timing.row_transfer_budget_ns(u32::from(cols)),
            halted: false,
            cycles: 0,
        }
    }

    /// Attach the pins, program the divider and blank the output.
    pub fn initialize(&mut self, binding: &SignalBinding) {
        self.peripheral.attach(binding);
        self.peripheral.configure_divider(self.timing.clock_divider());
        self.peripheral.set_output_enable(false);
        self.halted = false;
    }

    /// Recover from a [`TimingViolationError`] by running the full
    /// initialisation again.
    pub fn reinitialize(&mut self, binding: &SignalBinding) {
        debug!("sequencer reinitialised after {} cycles", self.cycles);
        self.initialize(binding);
    }

    /// Whether a violation stopped the output.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Cycles emitted successfully.
    #[must_use]
    pub const fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Budget for shifting one row.
    #[must_use]
    pub const fn row_budget_ns(&self) -> u32 {
        self.row_budget_ns
    }

    /// The peripheral.
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// The peripheral, mutably.
    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    /// Give back the peripheral, blanked.
    pub fn release(mut self) -> P {
        self.peripheral.set_output_enable(false);
        self.peripheral
    }

    fn fault(&mut self, err: TimingViolationError) -> TimingViolationError {
        self.peripheral.set_output_enable(false);
        self.halted = true;
        error!("timing violation, output halted: {}", err);
        err
    }

    /// Emit one cycle: blank, address, shift, latch, light for
    /// `on_time_ns`, blank.
    ///
    /// # Errors
    ///
    /// A [`TimingViolationError`] when a step breaks the ordering or timing
    /// rules; the output is blanked and further calls fail with
    /// [`TimingViolationError::Halted`].
    pub fn emit(
        &mut self,
        row: RowAddress,
        data: RowPlane<'_>,
        on_time_ns: u32,
    ) -> Result<CycleResult, TimingViolationError> {
        if self.halted {
            return Err(TimingViolationError::Halted);
        }
        if data.len() != usize::from(self.cols) {
            let actual = u16::try_from(data.len()).unwrap_or(u16::MAX);
            return Err(self.fault(TimingViolationError::RowLength {
                expected: self.cols,
                actual,
            }));
        }

        let started_at_ns = self.peripheral.now_ns();
        self.peripheral.set_output_enable(false);
        if self.peripheral.output_lit() {
            return Err(self.fault(TimingViolationError::AddressWhileLit));
        }
        self.peripheral.set_row_address(row);

        let shift_start = self.peripheral.now_ns();
        self.peripheral.start_pulse_train(data);
        let shift_end = self.peripheral.now_ns();
        let shift_ns = elapsed(shift_start, shift_end);
        if shift_ns > self.row_budget_ns {
            return Err(self.fault(TimingViolationError::ShiftOverrun {
                budget: self.row_budget_ns,
                elapsed: shift_ns,
            }));
        }

        self.peripheral.delay_ns(self.timing.latch_to_clock_delay_ns());
        let latch_start = self.peripheral.now_ns();
        let latch_delay_ns = elapsed(shift_end, latch_start);
        if latch_delay_ns < self.timing.latch_to_clock_delay_ns() {
            return Err(self.fault(TimingViolationError::LatchTooEarly {
                required: self.timing.latch_to_clock_delay_ns(),
                actual: latch_delay_ns,
            }));
        }

        self.peripheral.pulse_latch(self.timing.latch_pulse_width_ns());
        let latch_end = self.peripheral.now_ns();
        let latch_ns = elapsed(latch_start, latch_end);
        if latch_ns != self.timing.latch_pulse_width_ns() {
            return Err(self.fault(TimingViolationError::LatchWidth {
                expected: self.timing.latch_pulse_width_ns(),
                measured: latch_ns,
            }));
        }

        self.peripheral.set_output_enable(true);
        let lit_at = self.peripheral.now_ns();
        self.peripheral.delay_ns(on_time_ns);
        self.peripheral.set_output_enable(false);
        let finished_at_ns = self.peripheral.now_ns();

        let result = CycleResult {
            row,
            started_at_ns,
            shift_ns,
            latch_delay_ns,
            latch_ns,
            on_time_ns: elapsed(lit_at, finished_at_ns),
            finished_at_ns,
        };
        self.cycles = self.cycles.wrapping_add(1);
        self.peripheral.on_cycle_complete(&result);
        Ok(result)
    }
}
