//! Refresh engine.
//!
//! Glues the [`BitPlaneScheduler`] to the [`SignalSequencer`]: every
//! [`tick`](RefreshEngine::tick) picks the next (row pair, plane), fetches its
//! data from a [`FrameSource`], emits one cycle and advances the scheduler.
//!
//! # Example
//! ```rust
//! use embedded_graphics::pixelcolor::RgbColor;
//! use embedded_graphics::prelude::*;
//! use hub75_refresh::engine::{DriverConfig, RefreshEngine, Tick};
//! use hub75_refresh::framebuffer::{DoubleBuffer, PlaneFrameBuffer};
//! use hub75_refresh::pins::Jumpers;
//! use hub75_refresh::sim::SimulatedPanel;
//! use hub75_refresh::timing::ScanParameters;
//! use hub75_refresh::Color;
//!
//! type Frame = PlaneFrameBuffer<32, 64, 16, 4>;
//!
//! let config = DriverConfig::teensy4_adapter(ScanParameters::new(4, 16, 64, 200), Jumpers::default());
//! let mut engine = RefreshEngine::new(&config, SimulatedPanel::new()).unwrap();
//! let mut frames = DoubleBuffer::new(Frame::new(), Frame::new());
//!
//! // nothing presented yet
//! assert_eq!(engine.tick(&mut frames).unwrap(), Tick::Skipped);
//!
//! frames.back_mut().unwrap().set_pixel(Point::new(3, 4), Color::WHITE);
//! frames.swap_buffers();
//! engine.refresh(&mut frames).unwrap();
//! engine.refresh(&mut frames).unwrap();
//! assert_eq!(engine.stats().refreshes, 2);
//! ```

use crate::error::{BufferUnavailableError, ConfigurationError, Error, TimingViolationError};
use crate::framebuffer::{FrameGeometry, FrameSource};
use crate::pins::{Jumpers, PinMap, SignalBinding};
use crate::scheduler::{BitPlane, BitPlaneScheduler, SchedulerState};
use crate::sequencer::{CycleResult, SignalPeripheral, SignalSequencer};
use crate::timing::{ScanParameters, TimingParameters};

/// Everything the engine needs, validated together by
/// [`RefreshEngine::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    /// Waveform timing.
    pub timing: TimingParameters,
    /// Panel geometry and modulation.
    pub scan: ScanParameters,
    /// Lines per role.
    pub pin_map: PinMap,
    /// Adapter jumper state.
    pub jumpers: Jumpers,
}

impl DriverConfig {
    /// Teensy 4 adapter timing and pins for the given scan and jumpers.
    #[must_use]
    pub const fn teensy4_adapter(scan: ScanParameters, jumpers: Jumpers) -> Self {
        Self {
            timing: TimingParameters::TEENSY4_ADAPTER,
            scan,
            pin_map: PinMap::teensy4_adapter(jumpers.clock),
            jumpers,
        }
    }

    /// Check timing, scan and pins, returning the resolved binding.
    ///
    /// # Errors
    ///
    /// The first [`ConfigurationError`] or [`BindingError`](crate::error::BindingError)
    /// found, timing first.
    pub fn validate(&self) -> Result<SignalBinding, Error> {
        self.timing.validate()?;
        self.scan.validate()?;
        Ok(SignalBinding::new(&self.pin_map, self.jumpers)?)
    }
}

/// A cycle that made it to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Emitted {
    /// Plane that was shown.
    pub plane: BitPlane,
    /// First cycle of a refresh.
    pub frame_start: bool,
    /// Last cycle of a refresh.
    pub refresh_complete: bool,
    /// Measured waveform.
    pub cycle: CycleResult,
}

/// Outcome of [`RefreshEngine::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tick {
    /// A cycle was emitted.
    Emitted(Emitted),
    /// No frame was available, the slot was skipped with the output blanked.
    Skipped,
    /// Shutdown completed, nothing is driven any more.
    Stopped,
}

/// Counters kept by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineStats {
    /// Cycles emitted.
    pub emitted: u32,
    /// Slots skipped for lack of a frame.
    pub skipped: u32,
    /// Complete refreshes, skipped slots included.
    pub refreshes: u32,
    /// Timing violations reported.
    pub violations: u32,
}

/// Drives a panel from a [`FrameSource`].
#[derive(Debug)]
pub struct RefreshEngine<P> {
    sequencer: SignalSequencer<P>,
    scheduler: BitPlaneScheduler,
    binding: SignalBinding,
    scan: ScanParameters,
    stats: EngineStats,
}

impl<P: SignalPeripheral> RefreshEngine<P> {
    /// Validate `config`, then attach and blank the peripheral.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] or [`Error::Binding`]; the peripheral is left
    /// untouched in that case.
    pub fn new(config: &DriverConfig, peripheral: P) -> Result<Self, Error> {
        let binding = config.validate().inspect_err(|err| {
            error!("refresh engine configuration rejected: {}", err);
        })?;
        let scheduler = BitPlaneScheduler::new(&config.scan)?;

        let mut sequencer = SignalSequencer::new(peripheral, config.timing, config.scan.cols());
        sequencer.initialize(&binding);
        info!(
            "refresh engine started: {} planes, {} row pairs, {} columns, {} slots per refresh",
            config.scan.planes(),
            config.scan.row_pairs(),
            config.scan.cols(),
            scheduler.slots_per_refresh()
        );

        Ok(Self {
            sequencer,
            scheduler,
            binding,
            scan: config.scan,
            stats: EngineStats::default(),
        })
    }

    /// Scheduler state between ticks.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Whether shutdown completed.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        matches!(self.scheduler.state(), SchedulerState::Stopped)
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> EngineStats {
        self.stats
    }

    /// The scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &BitPlaneScheduler {
        &self.scheduler
    }

    /// Resolved pins.
    #[must_use]
    pub const fn binding(&self) -> &SignalBinding {
        &self.binding
    }

    /// The peripheral.
    pub fn peripheral(&self) -> &P {
        self.sequencer.peripheral()
    }

    /// The peripheral, mutably.
    pub fn peripheral_mut(&mut self) -> &mut P {
        self.sequencer.peripheral_mut()
    }

    fn check_geometry(&self, geometry: FrameGeometry) -> Result<(), ConfigurationError> {
        if geometry.row_pairs < usize::from(self.scan.row_pairs())
            || geometry.planes != usize::from(self.scan.planes())
            || geometry.cols != usize::from(self.scan.cols())
        {
            return Err(ConfigurationError::FrameGeometry {
                row_pairs: geometry.row_pairs,
                cols: geometry.cols,
                planes: geometry.planes,
            });
        }
        Ok(())
    }

    /// Run one scheduler step: select, fetch, emit, advance.
    ///
    /// At the first slot of every refresh `frames` gets a
    /// [`frame_boundary`](FrameSource::frame_boundary) call first, so a
    /// pending buffer swap takes effect between refreshes only.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] when the frame doesn't match the scan.
    /// - [`Error::TimingViolation`] when the cycle broke the waveform rules;
    ///   the output is blanked and [`reinitialize`](Self::reinitialize) is
    ///   needed.
    pub fn tick<F>(&mut self, frames: &mut F) -> Result<Tick, Error>
    where
        F: FrameSource + ?Sized,
    {
        if self.is_stopped() {
            return Ok(Tick::Stopped);
        }
        if self.sequencer.is_halted() {
            return Err(TimingViolationError::Halted.into());
        }
        if self.scheduler.at_frame_start() {
            frames.frame_boundary();
            self.check_geometry(frames.geometry())?;
        }

        let selection = self.scheduler.select()?;
        let data = match frames.row_plane(selection.row, selection.plane) {
            Ok(data) => data,
            Err(BufferUnavailableError) => {
                trace!("no frame for row {}, slot skipped", selection.row.value());
                let refresh_complete = self.scheduler.skip()?;
                self.stats.skipped = self.stats.skipped.wrapping_add(1);
                self.finish(refresh_complete);
                return Ok(Tick::Skipped);
            }
        };

        self.scheduler.begin_shift()?;
        let cycle = match self.sequencer.emit(selection.row, data, selection.on_time_ns) {
            Ok(cycle) => cycle,
            Err(err) => {
                self.stats.violations = self.stats.violations.wrapping_add(1);
                return Err(err.into());
            }
        };
        self.scheduler.shift_complete()?;
        self.scheduler.latch_complete()?;
        let refresh_complete = self.scheduler.blanking_complete()?;
        self.stats.emitted = self.stats.emitted.wrapping_add(1);
        self.finish(refresh_complete);

        Ok(Tick::Emitted(Emitted {
            plane: selection.plane,
            frame_start: selection.frame_start,
            refresh_complete,
            cycle,
        }))
    }

    fn finish(&mut self, refresh_complete: bool) {
        if refresh_complete {
            self.stats.refreshes = self.stats.refreshes.wrapping_add(1);
            debug!("refresh {} complete", self.stats.refreshes);
        }
        if self.is_stopped() {
            info!("refresh engine stopped after {} refreshes", self.stats.refreshes);
        }
    }

    /// Tick until the current refresh completes or the engine stops.
    ///
    /// # Errors
    ///
    /// Anything [`tick`](Self::tick) reports.
    pub fn refresh<F>(&mut self, frames: &mut F) -> Result<(), Error>
    where
        F: FrameSource + ?Sized,
    {
        let start = self.scheduler.refreshes();
        while self.scheduler.refreshes() == start {
            if self.tick(frames)? == Tick::Stopped {
                break;
            }
        }
        Ok(())
    }

    /// Stop at the next cycle boundary. Between ticks that is immediately.
    pub fn request_shutdown(&mut self) {
        debug!("shutdown requested");
        self.scheduler.request_shutdown();
        if self.is_stopped() {
            self.sequencer.peripheral_mut().set_output_enable(false);
            info!("refresh engine stopped after {} refreshes", self.stats.refreshes);
        }
    }

    /// Recover from a timing violation or a shutdown: attach, configure and
    /// blank again, then restart from the first row of a refresh.
    pub fn reinitialize(&mut self) {
        self.sequencer.reinitialize(&self.binding);
        self.scheduler.reset();
    }

    /// Give back the peripheral, blanked.
    pub fn release(self) -> P {
        self.sequencer.release()
    }
}
