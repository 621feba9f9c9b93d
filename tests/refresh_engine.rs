//! End-to-end refresh runs against the simulated panel.

use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use hub75_refresh::engine::{DriverConfig, RefreshEngine, Tick};
use hub75_refresh::error::{BindingError, ConfigurationError, Error};
use hub75_refresh::framebuffer::{DoubleBuffer, Entry, PlaneFrameBuffer};
use hub75_refresh::pins::{ClockPin, Jumpers, PhysicalLine, PinMap, SignalRole};
use hub75_refresh::sequencer::SignalPeripheral;
use hub75_refresh::sim::SimulatedPanel;
use hub75_refresh::timing::{CoreClock, ScanParameters, TimingParameters};
use hub75_refresh::{compute_rows, Color};

const ROWS: usize = 16;
const COLS: usize = 64;
const NROWS: usize = compute_rows(ROWS);
const PLANES: usize = 4;
const LSB_NS: u32 = 150;

type Frame = PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>;

fn scan() -> ScanParameters {
    ScanParameters::new(PLANES as u8, NROWS as u8, COLS as u16, LSB_NS).with_transition(2)
}

fn engine() -> RefreshEngine<SimulatedPanel> {
    let config = DriverConfig::teensy4_adapter(scan(), Jumpers::default());
    RefreshEngine::new(&config, SimulatedPanel::new()).unwrap()
}

fn filled(color: Color) -> Frame {
    let mut frame = Frame::new();
    Rectangle::new(Point::zero(), Size::new(COLS as u32, ROWS as u32))
        .into_styled(PrimitiveStyle::with_fill(color))
        .draw(&mut frame)
        .unwrap();
    frame
}

#[test]
fn address_never_changes_while_lit() {
    let mut engine = engine();
    let mut frames = DoubleBuffer::new(Frame::new(), filled(Color::new(0xa0, 0x50, 0xf0)));
    frames.swap_buffers();
    for _ in 0..5 {
        engine.refresh(&mut frames).unwrap();
    }
    let panel = engine.peripheral();
    assert_eq!(panel.address_changes_while_lit(), 0);
    assert_eq!(panel.latch_range_ns(), Some((100, 100)));
    assert!(!panel.output_lit());
}

#[test]
fn lit_time_matches_plane_weights() {
    let mut engine = engine();
    let mut frame = filled(Color::WHITE);
    engine.refresh(&mut frame).unwrap();

    let per_row: u64 = (0..PLANES as u32).map(|p| u64::from(LSB_NS << p)).sum();
    assert_eq!(engine.peripheral().lit_ns(), per_row * NROWS as u64);
}

#[test]
fn buffer_swap_is_atomic_per_refresh() {
    let mut red_entry = Entry::new();
    red_entry.set_red1(true);
    red_entry.set_red2(true);
    let mut blue_entry = Entry::new();
    blue_entry.set_blu1(true);
    blue_entry.set_blu2(true);

    let mut engine = engine();
    let mut frames = DoubleBuffer::new(Frame::new(), filled(Color::RED));
    frames.swap_buffers();

    let slots = engine.scheduler().slots_per_refresh();
    for refresh in 0..6 {
        let expected = if refresh % 2 == 0 { red_entry } else { blue_entry };
        for slot in 0..slots {
            // the producer presents a new frame in the middle of every refresh
            if slot == slots / 2 {
                let next = if refresh % 2 == 0 { Color::BLUE } else { Color::RED };
                let back = frames.back_mut().unwrap();
                *back = filled(next);
                frames.swap_buffers();
            }
            match engine.tick(&mut frames).unwrap() {
                Tick::Emitted(emitted) => {
                    assert_eq!(emitted.frame_start, slot == 0);
                    assert_eq!(engine.peripheral().last_signature(), Some(expected), "refresh {refresh}, slot {slot}");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}

#[test]
fn stops_only_at_cycle_boundary() {
    let mut engine = engine();
    let mut frame = filled(Color::GREEN);
    for _ in 0..3 {
        assert!(matches!(engine.tick(&mut frame).unwrap(), Tick::Emitted(_)));
    }
    engine.request_shutdown();
    assert_eq!(engine.tick(&mut frame).unwrap(), Tick::Stopped);
    assert_eq!(engine.peripheral().cycles(), 3);

    engine.reinitialize();
    assert!(matches!(engine.tick(&mut frame).unwrap(), Tick::Emitted(e) if e.frame_start));
}

#[test]
fn alternate_clock_jumper_selects_pin_seven() {
    let jumpers = Jumpers::with_clock(ClockPin::Alternate);
    let config = DriverConfig::teensy4_adapter(scan(), jumpers);
    let engine = RefreshEngine::new(&config, SimulatedPanel::new()).unwrap();
    assert_eq!(engine.binding().clock_line(), PhysicalLine(7));
}

#[test]
fn invalid_configurations_never_touch_the_panel() {
    let mut shared = PinMap::teensy4_adapter(ClockPin::Default);
    shared.latch = Some(PhysicalLine(2));

    let slow_core = TimingParameters::TEENSY4_ADAPTER
        .with_core_clock(CoreClock::Mhz600)
        .with_clock_to_output_delay_ns(500);

    let cases = [
        (
            DriverConfig {
                pin_map: shared,
                ..DriverConfig::teensy4_adapter(scan(), Jumpers::default())
            },
            Error::Binding(BindingError::DuplicateLine {
                first: SignalRole::OutputEnable,
                second: SignalRole::Latch,
                line: PhysicalLine(2),
            }),
        ),
        (
            DriverConfig {
                timing: slow_core,
                ..DriverConfig::teensy4_adapter(scan(), Jumpers::default())
            },
            Error::Configuration(ConfigurationError::LatchToClockBelowPropagation {
                delay: 400,
                measured: 500,
            }),
        ),
        (
            DriverConfig::teensy4_adapter(ScanParameters::new(9, 8, 64, 100), Jumpers::default()),
            Error::Configuration(ConfigurationError::ColorDepth(9)),
        ),
    ];

    for (config, expected) in cases {
        let mut panel = SimulatedPanel::new();
        assert_eq!(RefreshEngine::new(&config, &mut panel).err(), Some(expected));
        assert!(!panel.is_attached());
        assert_eq!(panel.divider(), 0);
        assert!(panel.trace().is_empty());
    }
}
