//! Property-based tests for the timing and scan constants.
//! Checks the validation rules and budget arithmetic over whole ranges.

use hub75_refresh::error::ConfigurationError;
use hub75_refresh::scheduler::BitPlaneScheduler;
use hub75_refresh::timing::{ScanParameters, TimingParameters};

proptest::proptest! {
    /// Every in-range combination validates at the 480 MHz base clock.
    #[test]
    fn valid_ranges_always_ok(latch in 20u32..=150, delay in 1u32..=2000, half in 10u16..=256) {
        let timing = TimingParameters::new(latch, delay, half * 2);
        assert_eq!(timing.validate(), Ok(()));
    }

    /// Latch widths outside [20, 150] are rejected whatever the rest is.
    #[test]
    fn latch_width_out_of_range_rejected(latch in proptest::prop_oneof![0u32..20, 151u32..=10_000]) {
        assert_eq!(
            TimingParameters::new(latch, 400, 24).validate(),
            Err(ConfigurationError::LatchPulseWidth(latch))
        );
    }

    /// Odd dividers are rejected before the range checks.
    #[test]
    fn odd_divider_rejected(half in 0u16..=1000) {
        let divider = half * 2 + 1;
        assert_eq!(
            TimingParameters::new(100, 400, divider).validate(),
            Err(ConfigurationError::ClockDividerOdd(divider))
        );
    }

    /// Even dividers below 20 are too fast for the panel.
    #[test]
    fn small_divider_rejected(half in 0u16..10) {
        assert_eq!(
            TimingParameters::new(100, 400, half * 2).validate(),
            Err(ConfigurationError::ClockDividerTooSmall(half * 2))
        );
    }

    /// The 32 pixel budget follows the hardware formula and always leaves
    /// room for the transfer overhead.
    #[test]
    fn budget_formula(half in 10u16..=256, overhead in 1u32..=500) {
        let divider = half * 2;
        let timing = TimingParameters::new(100, 400, divider).with_transfer_overhead_ns(overhead);
        let budget = timing.pixel_transfer_budget_ns();
        assert_eq!(budget, 32 * u32::from(divider) * 1000 / 480 + overhead);
        assert!(budget > timing.shift_time_ns(32));
        assert_eq!(timing.row_transfer_budget_ns(64), 2 * budget);
        assert_eq!(timing.row_transfer_budget_ns(65), 3 * budget);
    }

    /// Whatever the transition plane, plane `p` is shown for
    /// `lsb * 2^p` per row.
    #[test]
    fn on_time_proportional_to_weight(planes in 1u8..=8, transition_seed in 0u8..=8, lsb in 1u32..=5000) {
        let transition = transition_seed % (planes + 1);
        let scan = ScanParameters::new(planes, 4, 64, lsb).with_transition(transition);
        let scheduler = BitPlaneScheduler::new(&scan).unwrap();

        let mut totals = [0u32; 8];
        for visit in scheduler.sequence() {
            totals[visit.plane.index()] += visit.on_time_ns;
        }
        for plane in 0..usize::from(planes) {
            assert_eq!(totals[plane], lsb << plane, "plane {}", plane);
        }
        assert_eq!(scheduler.slots_per_refresh(), scheduler.sequence().len() * 4);
    }

    /// Scan geometry outside the address and depth limits never validates.
    #[test]
    fn scan_limits(planes in 0u8..=20, row_pairs in 0u8..=64) {
        let result = ScanParameters::new(planes, row_pairs, 64, 100).validate();
        let valid = (1..=8).contains(&planes) && (1..=32).contains(&row_pairs);
        assert_eq!(result.is_ok(), valid);
    }
}
