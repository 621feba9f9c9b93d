//! Timing-accurate [`SignalPeripheral`] without hardware.
//!
//! [`SimulatedPanel`] keeps a nanosecond timeline. Shifting takes exactly as
//! long as the configured divider makes the pixel clock, delays and latch
//! pulses take what was asked for, and output enable and address writes are
//! instantaneous. While running it records:
//!
//! - the edges of the most recent cycle ([`SimulatedPanel::trace`]),
//! - address changes that happened while the output was lit,
//! - the shortest and longest latch pulse seen,
//! - a signature of the last shifted row and of the last data seen per row
//!   pair (the entry every column had, or `None` for a mixed row).
//!
//! Fault injection knobs stretch shifts, skew delays and latch pulses, or hold
//! output enable stuck, so every violation path of the sequencer can be
//! exercised.

use fugit::HertzU32;
use heapless::Vec;

use crate::framebuffer::{Entry, RowPlane};
use crate::pins::SignalBinding;
use crate::scheduler::RowAddress;
use crate::sequencer::{CycleResult, SignalPeripheral};
use crate::timing::MAX_ROW_PAIRS;

/// Edges kept per cycle.
pub const TRACE_DEPTH: usize = 16;

/// Lines observed by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    /// Output enable, high while lit.
    OutputEnable,
    /// Latch.
    Latch,
    /// Pixel clock, first rising and last falling edge of a pulse train.
    Clock,
    /// Row address lines, recorded when the address changes.
    Address,
}

/// A level change on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Edge {
    /// Time of the change.
    pub at_ns: u64,
    /// Line that changed.
    pub line: Line,
    /// New level.
    pub level: bool,
}

/// Simulated panel and timer peripheral.
#[derive(Debug, Clone)]
pub struct SimulatedPanel {
    base_clock: HertzU32,
    divider: u16,
    attached: bool,
    now_ns: u64,
    lit: bool,
    address: Option<RowAddress>,
    trace: Vec<Edge, TRACE_DEPTH>,
    trace_done: bool,
    cycles: u32,
    pixels_shifted: u64,
    lit_ns: u64,
    lit_since: u64,
    address_changes_while_lit: u32,
    latch_min_ns: Option<u32>,
    latch_max_ns: Option<u32>,
    last_signature: Option<Entry>,
    row_signatures: [Option<Entry>; MAX_ROW_PAIRS as usize],
    extra_shift_ns: u32,
    delay_skew_ns: i32,
    latch_skew_ns: i32,
    output_enable_stuck: bool,
}

impl Default for SimulatedPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPanel {
    /// A panel fed by a 480 MHz base clock.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_base_clock(HertzU32::MHz(480))
    }

    /// A panel fed by `base_clock`.
    #[must_use]
    pub const fn with_base_clock(base_clock: HertzU32) -> Self {
        Self {
            base_clock,
            divider: 0,
            attached: false,
            now_ns: 0,
            lit: false,
            address: None,
            trace: Vec::new(),
            trace_done: false,
            cycles: 0,
            pixels_shifted: 0,
            lit_ns: 0,
            lit_since: 0,
            address_changes_while_lit: 0,
            latch_min_ns: None,
            latch_max_ns: None,
            last_signature: None,
            row_signatures: [None; MAX_ROW_PAIRS as usize],
            extra_shift_ns: 0,
            delay_skew_ns: 0,
            latch_skew_ns: 0,
            output_enable_stuck: false,
        }
    }

    /// Add `ns` to every pulse train.
    pub fn set_extra_shift_ns(&mut self, ns: u32) {
        self.extra_shift_ns = ns;
    }

    /// Add `ns` (possibly negative) to every delay.
    pub fn set_delay_skew_ns(&mut self, ns: i32) {
        self.delay_skew_ns = ns;
    }

    /// Add `ns` (possibly negative) to every latch pulse.
    pub fn set_latch_skew_ns(&mut self, ns: i32) {
        self.latch_skew_ns = ns;
    }

    /// Hold output enable lit regardless of what is written.
    pub fn set_output_enable_stuck(&mut self, stuck: bool) {
        self.output_enable_stuck = stuck;
        if stuck {
            self.drive_output_enable(true);
        }
    }

    /// Programmed divider, 0 before configuration.
    #[must_use]
    pub const fn divider(&self) -> u16 {
        self.divider
    }

    /// Whether pins were attached.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// Row currently on the address lines.
    #[must_use]
    pub const fn address(&self) -> Option<RowAddress> {
        self.address
    }

    /// Edges of the most recent cycle.
    #[must_use]
    pub fn trace(&self) -> &[Edge] {
        &self.trace
    }

    /// Completed cycles.
    #[must_use]
    pub const fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Pixels clocked out so far.
    #[must_use]
    pub const fn pixels_shifted(&self) -> u64 {
        self.pixels_shifted
    }

    /// Total time the output was lit.
    #[must_use]
    pub const fn lit_ns(&self) -> u64 {
        self.lit_ns
    }

    /// Address changes observed while the output was lit.
    #[must_use]
    pub const fn address_changes_while_lit(&self) -> u32 {
        self.address_changes_while_lit
    }

    /// Shortest and longest latch pulse seen.
    #[must_use]
    pub const fn latch_range_ns(&self) -> Option<(u32, u32)> {
        match (self.latch_min_ns, self.latch_max_ns) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }

    /// Entry shared by every column of the last shifted row, `None` if the
    /// row was mixed or nothing was shifted.
    #[must_use]
    pub const fn last_signature(&self) -> Option<Entry> {
        self.last_signature
    }

    /// Signature of the last data shifted while `row` was addressed.
    #[must_use]
    pub fn row_signature(&self, row: RowAddress) -> Option<Entry> {
        self.row_signatures.get(row.index()).copied().flatten()
    }

    fn record(&mut self, line: Line, level: bool) {
        if self.trace_done {
            self.trace.clear();
            self.trace_done = false;
        }
        let _ = self.trace.push(Edge {
            at_ns: self.now_ns,
            line,
            level,
        });
    }

    fn advance(&mut self, ns: u64) {
        self.now_ns += ns;
    }

    fn skewed(ns: u32, skew: i32) -> u64 {
        u64::try_from(i64::from(ns) + i64::from(skew)).unwrap_or(0)
    }

    fn drive_output_enable(&mut self, lit: bool) {
        let level = lit || self.output_enable_stuck;
        if level == self.lit {
            return;
        }
        if level {
            self.lit_since = self.now_ns;
        } else {
            self.lit_ns += self.now_ns - self.lit_since;
        }
        self.lit = level;
        self.record(Line::OutputEnable, level);
    }
}

impl SignalPeripheral for SimulatedPanel {
    fn attach(&mut self, _binding: &SignalBinding) {
        self.attached = true;
        self.trace.clear();
    }

    fn configure_divider(&mut self, divider: u16) {
        self.divider = divider;
    }

    fn now_ns(&self) -> u64 {
        self.now_ns
    }

    fn set_output_enable(&mut self, lit: bool) {
        self.drive_output_enable(lit);
    }

    fn output_lit(&self) -> bool {
        self.lit
    }

    fn set_row_address(&mut self, row: RowAddress) {
        if self.address == Some(row) {
            return;
        }
        if self.lit {
            self.address_changes_while_lit += 1;
        }
        self.address = Some(row);
        self.record(Line::Address, true);
    }

    fn start_pulse_train(&mut self, data: RowPlane<'_>) {
        let pixels = data.len() as u64;
        let hz = u64::from(self.base_clock.raw()).max(1);
        let shift = (pixels * u64::from(self.divider) * 1_000_000_000).div_ceil(hz);

        self.record(Line::Clock, true);
        self.advance(shift + u64::from(self.extra_shift_ns));
        self.record(Line::Clock, false);

        self.pixels_shifted += pixels;
        self.last_signature = match data.entries().split_first() {
            Some((first, rest)) if rest.iter().all(|e| e == first) => Some(*first),
            _ => None,
        };
        if let Some(slot) = self.address.and_then(|row| self.row_signatures.get_mut(row.index())) {
            *slot = self.last_signature;
        }
    }

    fn delay_ns(&mut self, ns: u32) {
        self.advance(Self::skewed(ns, self.delay_skew_ns));
    }

    fn pulse_latch(&mut self, width_ns: u32) {
        let width = Self::skewed(width_ns, self.latch_skew_ns);
        self.record(Line::Latch, true);
        self.advance(width);
        self.record(Line::Latch, false);

        let width = u32::try_from(width).unwrap_or(u32::MAX);
        self.latch_min_ns = Some(self.latch_min_ns.map_or(width, |m| m.min(width)));
        self.latch_max_ns = Some(self.latch_max_ns.map_or(width, |m| m.max(width)));
    }

    fn on_cycle_complete(&mut self, _result: &CycleResult) {
        self.cycles += 1;
        self.trace_done = true;
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::pins::Jumpers;

    fn attached() -> SimulatedPanel {
        let mut panel = SimulatedPanel::new();
        panel.attach(&SignalBinding::teensy4_adapter(Jumpers::default()).unwrap());
        panel.configure_divider(24);
        panel
    }

    #[test]
    fn test_shift_time_follows_divider() {
        let mut panel = attached();
        let data = [Entry::new(); 32];
        panel.start_pulse_train(RowPlane::new(&data));
        assert_eq!(panel.now_ns(), 1600);

        panel.configure_divider(20);
        panel.start_pulse_train(RowPlane::new(&data));
        assert_eq!(panel.now_ns(), 1600 + 1334);
        assert_eq!(panel.pixels_shifted(), 64);
    }

    #[test]
    fn test_address_change_while_lit_counted() {
        let mut panel = attached();
        panel.set_row_address(RowAddress::new(1));
        panel.set_output_enable(true);
        panel.set_row_address(RowAddress::new(2));
        panel.set_row_address(RowAddress::new(2));
        assert_eq!(panel.address_changes_while_lit(), 1);
    }

    #[test]
    fn test_lit_time_accumulates() {
        let mut panel = attached();
        panel.set_output_enable(true);
        panel.delay_ns(250);
        panel.set_output_enable(false);
        panel.delay_ns(1000);
        panel.set_output_enable(true);
        panel.delay_ns(50);
        panel.set_output_enable(false);
        assert_eq!(panel.lit_ns(), 300);
    }

    #[test]
    fn test_latch_range() {
        let mut panel = attached();
        assert_eq!(panel.latch_range_ns(), None);
        panel.pulse_latch(100);
        panel.set_latch_skew_ns(1);
        panel.pulse_latch(100);
        assert_eq!(panel.latch_range_ns(), Some((100, 101)));
    }

    #[test]
    fn test_signature() {
        let mut panel = attached();
        let mut data = [Entry::new(); 4];
        panel.start_pulse_train(RowPlane::new(&data));
        assert_eq!(panel.last_signature(), Some(Entry::new()));
        data[2].set_red1(true);
        panel.start_pulse_train(RowPlane::new(&data));
        assert_eq!(panel.last_signature(), None);
    }

    #[test]
    fn test_row_signature_follows_address() {
        let mut panel = attached();
        let mut lit = Entry::new();
        lit.set_grn2(true);
        panel.set_row_address(RowAddress::new(5));
        panel.start_pulse_train(RowPlane::new(&[lit; 8]));
        panel.set_row_address(RowAddress::new(6));
        panel.start_pulse_train(RowPlane::new(&[Entry::new(); 8]));
        assert_eq!(panel.row_signature(RowAddress::new(5)), Some(lit));
        assert_eq!(panel.row_signature(RowAddress::new(6)), Some(Entry::new()));
        assert_eq!(panel.row_signature(RowAddress::new(7)), None);
    }

    #[test]
    fn test_stuck_output_enable() {
        let mut panel = attached();
        panel.set_output_enable_stuck(true);
        panel.set_output_enable(false);
        assert!(panel.output_lit());
    }

    #[test]
    fn test_negative_skew_saturates() {
        let mut panel = attached();
        panel.set_delay_skew_ns(-500);
        panel.delay_ns(100);
        assert_eq!(panel.now_ns(), 0);
    }
}
