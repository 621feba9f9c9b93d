//! Mapping of HUB75 signal roles to physical output lines.
//!
//! The Teensy 4 adapter for the SmartLED Shield V4 has two solder jumper
//! pairs that change which pins are connected:
//!
//! - JP1 & JP4 select the pixel clock pin: default pin 8 (pin 7 free) or
//!   alternate pin 7 (pin 8 free). The jumper position is a [`ClockPin`].
//! - JP2 & JP3 select where SPI is routed: default pins 4/5 (SPI emulation,
//!   matrix still drivable) or alternate pins 13/11 (hardware SPI, matrix
//!   disconnected). The jumper position is a [`SpiPins`].
//!
//! A [`PinMap`] lists candidate line numbers per role. [`SignalBinding::new`]
//! resolves it against the jumper state and rejects inconsistent tables; the
//! result answers [`SignalBinding::bind`] queries and carries the order in
//! which the colour bits appear on the data port.

use core::fmt;

use crate::error::BindingError;

/// Number of colour data lines (R, G, B for the upper and lower half).
pub const COLOR_LINES: usize = 6;

/// A physical output line, e.g. a Teensy pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct PhysicalLine(pub u8);

impl fmt::Display for PhysicalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical signal roles of a HUB75 connector.
///
/// `ColorBit0*` drive the upper half of the panel (R1 G1 B1) and
/// `ColorBit1*` the lower half (R2 G2 B2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalRole {
    /// Output enable, blanks the LEDs when inactive.
    OutputEnable,
    /// Latch, commits the shift register contents.
    Latch,
    /// Pixel clock on the default jumper position.
    Clock,
    /// Pixel clock on the alternate jumper position.
    ClockAlt,
    /// Red, upper half.
    ColorBit0R,
    /// Green, upper half.
    ColorBit0G,
    /// Blue, upper half.
    ColorBit0B,
    /// Red, lower half.
    ColorBit1R,
    /// Green, lower half.
    ColorBit1G,
    /// Blue, lower half.
    ColorBit1B,
}

impl SignalRole {
    /// Colour roles in the bit order of a packed data word
    /// (see [`Entry`](crate::framebuffer::Entry)).
    pub const COLOR: [SignalRole; COLOR_LINES] = [
        SignalRole::ColorBit0R,
        SignalRole::ColorBit0G,
        SignalRole::ColorBit0B,
        SignalRole::ColorBit1R,
        SignalRole::ColorBit1G,
        SignalRole::ColorBit1B,
    ];

    /// Whether the role carries colour data.
    #[must_use]
    pub const fn is_color(self) -> bool {
        matches!(
            self,
            SignalRole::ColorBit0R
                | SignalRole::ColorBit0G
                | SignalRole::ColorBit0B
                | SignalRole::ColorBit1R
                | SignalRole::ColorBit1G
                | SignalRole::ColorBit1B
        )
    }
}

/// Position of the clock pin jumpers (JP1 & JP4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockPin {
    /// Clock on the default pin.
    #[default]
    Default,
    /// Clock on the alternate pin.
    Alternate,
}

impl ClockPin {
    /// Role carrying the pixel clock in this jumper position.
    #[must_use]
    pub const fn role(self) -> SignalRole {
        match self {
            ClockPin::Default => SignalRole::Clock,
            ClockPin::Alternate => SignalRole::ClockAlt,
        }
    }
}

/// Position of the SPI routing jumpers (JP2 & JP3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiPins {
    /// SPI emulation on free pins, matrix still drivable.
    #[default]
    Default,
    /// Hardware SPI, the matrix can't be driven at the same time.
    Alternate,
}

/// Jumper state of the adapter board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Jumpers {
    /// Clock pin jumpers.
    pub clock: ClockPin,
    /// SPI routing jumpers.
    pub spi: SpiPins,
}

impl Jumpers {
    /// Jumpers with the given clock position and default SPI routing.
    #[must_use]
    pub const fn with_clock(clock: ClockPin) -> Self {
        Self {
            clock,
            spi: SpiPins::Default,
        }
    }
}

/// Candidate line per role, before the jumper state is applied.
///
/// `clock` and `clock_alt` describe what the table assigns; at most one may be
/// set and it has to match the jumper position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinMap {
    /// Output enable line.
    pub output_enable: Option<PhysicalLine>,
    /// Latch line.
    pub latch: Option<PhysicalLine>,
    /// Clock line on the default jumper position.
    pub clock: Option<PhysicalLine>,
    /// Clock line on the alternate jumper position.
    pub clock_alt: Option<PhysicalLine>,
    /// Colour lines in [`SignalRole::COLOR`] order.
    pub color: [Option<PhysicalLine>; COLOR_LINES],
}

impl PinMap {
    /// Pins of the Teensy 4 adapter with the clock jumpers in position
    /// `clock`.
    #[must_use]
    pub const fn teensy4_adapter(clock: ClockPin) -> Self {
        let (clock, clock_alt) = match clock {
            ClockPin::Default => (Some(PhysicalLine(8)), None),
            ClockPin::Alternate => (None, Some(PhysicalLine(7))),
        };
        Self {
            output_enable: Some(PhysicalLine(2)),
            latch: Some(PhysicalLine(3)),
            clock,
            clock_alt,
            color: [
                Some(PhysicalLine(6)),
                Some(PhysicalLine(9)),
                Some(PhysicalLine(10)),
                Some(PhysicalLine(12)),
                Some(PhysicalLine(11)),
                Some(PhysicalLine(13)),
            ],
        }
    }

    fn line(&self, role: SignalRole) -> Option<PhysicalLine> {
        match role {
            SignalRole::OutputEnable => self.output_enable,
            SignalRole::Latch => self.latch,
            SignalRole::Clock => self.clock,
            SignalRole::ClockAlt => self.clock_alt,
            SignalRole::ColorBit0R => self.color[0],
            SignalRole::ColorBit0G => self.color[1],
            SignalRole::ColorBit0B => self.color[2],
            SignalRole::ColorBit1R => self.color[3],
            SignalRole::ColorBit1G => self.color[4],
            SignalRole::ColorBit1B => self.color[5],
        }
    }
}

/// Validated role to line mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalBinding {
    output_enable: PhysicalLine,
    latch: PhysicalLine,
    clock_pin: ClockPin,
    clock: PhysicalLine,
    color: [PhysicalLine; COLOR_LINES],
    data_order: [SignalRole; COLOR_LINES],
}

impl SignalBinding {
    /// Resolve `map` against the jumper state.
    ///
    /// # Errors
    ///
    /// - [`BindingError::MatrixDisconnected`] when the SPI jumpers are in the
    ///   alternate position.
    /// - [`BindingError::ClockConflict`] when both clock roles are assigned.
    /// - [`BindingError::Unassigned`] when a required role, or the clock role
    ///   selected by the jumpers, has no line.
    /// - [`BindingError::DuplicateLine`] when two roles share a line.
    pub fn new(map: &PinMap, jumpers: Jumpers) -> Result<Self, BindingError> {
        if jumpers.spi == SpiPins::Alternate {
            return Err(BindingError::MatrixDisconnected);
        }
        if map.clock.is_some() && map.clock_alt.is_some() {
            return Err(BindingError::ClockConflict);
        }

        let required = |role: SignalRole| map.line(role).ok_or(BindingError::Unassigned(role));
        let output_enable = required(SignalRole::OutputEnable)?;
        let latch = required(SignalRole::Latch)?;
        let clock = required(jumpers.clock.role())?;
        let mut color = [PhysicalLine(0); COLOR_LINES];
        for (line, role) in color.iter_mut().zip(SignalRole::COLOR) {
            *line = required(role)?;
        }

        let mut assigned = [(SignalRole::OutputEnable, output_enable); COLOR_LINES + 3];
        assigned[1] = (SignalRole::Latch, latch);
        assigned[2] = (jumpers.clock.role(), clock);
        for (slot, (role, line)) in assigned[3..].iter_mut().zip(SignalRole::COLOR.into_iter().zip(color)) {
            *slot = (role, line);
        }
        for (i, &(first, line)) in assigned.iter().enumerate() {
            if let Some(&(second, _)) = assigned[i + 1..].iter().find(|(_, other)| *other == line) {
                return Err(BindingError::DuplicateLine { first, second, line });
            }
        }

        let mut data_order = SignalRole::COLOR;
        data_order.sort_unstable_by_key(|role| map.line(*role));

        Ok(Self {
            output_enable,
            latch,
            clock_pin: jumpers.clock,
            clock,
            color,
            data_order,
        })
    }

    /// Binding for the Teensy 4 adapter.
    ///
    /// # Errors
    ///
    /// Only fails for the alternate SPI jumper position.
    pub fn teensy4_adapter(jumpers: Jumpers) -> Result<Self, BindingError> {
        Self::new(&PinMap::teensy4_adapter(jumpers.clock), jumpers)
    }

    /// Line driving `role`.
    ///
    /// # Errors
    ///
    /// [`BindingError::Unassigned`] for the clock role the jumpers did not
    /// select.
    pub fn bind(&self, role: SignalRole) -> Result<PhysicalLine, BindingError> {
        match role {
            SignalRole::OutputEnable => Ok(self.output_enable),
            SignalRole::Latch => Ok(self.latch),
            SignalRole::Clock | SignalRole::ClockAlt if role == self.clock_pin.role() => Ok(self.clock),
            SignalRole::Clock | SignalRole::ClockAlt => Err(BindingError::Unassigned(role)),
            SignalRole::ColorBit0R => Ok(self.color[0]),
            SignalRole::ColorBit0G => Ok(self.color[1]),
            SignalRole::ColorBit0B => Ok(self.color[2]),
            SignalRole::ColorBit1R => Ok(self.color[3]),
            SignalRole::ColorBit1G => Ok(self.color[4]),
            SignalRole::ColorBit1B => Ok(self.color[5]),
        }
    }

    /// Jumper position of the pixel clock.
    #[must_use]
    pub const fn clock_pin(&self) -> ClockPin {
        self.clock_pin
    }

    /// Line carrying the pixel clock.
    #[must_use]
    pub const fn clock_line(&self) -> PhysicalLine {
        self.clock
    }

    /// Colour roles sorted by ascending line number, i.e. the order of the
    /// data bits on a port that is written in pin order.
    #[must_use]
    pub const fn data_bit_order(&self) -> [SignalRole; COLOR_LINES] {
        self.data_order
    }

    /// Port bit (position in [`data_bit_order`](Self::data_bit_order)) of a
    /// colour role, `None` for control roles.
    #[must_use]
    pub fn data_bit(&self, role: SignalRole) -> Option<u8> {
        self.data_order
            .iter()
            .position(|r| *r == role)
            .map(|p| p as u8)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn test_teensy4_default_clock() {
        let binding = SignalBinding::teensy4_adapter(Jumpers::default()).unwrap();
        assert_eq!(binding.bind(SignalRole::OutputEnable), Ok(PhysicalLine(2)));
        assert_eq!(binding.bind(SignalRole::Latch), Ok(PhysicalLine(3)));
        assert_eq!(binding.bind(SignalRole::Clock), Ok(PhysicalLine(8)));
        assert_eq!(
            binding.bind(SignalRole::ClockAlt),
            Err(BindingError::Unassigned(SignalRole::ClockAlt))
        );
        assert_eq!(binding.bind(SignalRole::ColorBit0R), Ok(PhysicalLine(6)));
        assert_eq!(binding.bind(SignalRole::ColorBit0G), Ok(PhysicalLine(9)));
        assert_eq!(binding.bind(SignalRole::ColorBit0B), Ok(PhysicalLine(10)));
        assert_eq!(binding.bind(SignalRole::ColorBit1R), Ok(PhysicalLine(12)));
        assert_eq!(binding.bind(SignalRole::ColorBit1G), Ok(PhysicalLine(11)));
        assert_eq!(binding.bind(SignalRole::ColorBit1B), Ok(PhysicalLine(13)));
        assert_eq!(binding.clock_pin(), ClockPin::Default);
    }

    #[test]
    fn test_teensy4_alternate_clock() {
        let binding = SignalBinding::teensy4_adapter(Jumpers::with_clock(ClockPin::Alternate)).unwrap();
        assert_eq!(binding.bind(SignalRole::ClockAlt), Ok(PhysicalLine(7)));
        assert_eq!(binding.clock_line(), PhysicalLine(7));
        assert_eq!(
            binding.bind(SignalRole::Clock),
            Err(BindingError::Unassigned(SignalRole::Clock))
        );
    }

    #[test]
    fn test_both_clocks_rejected() {
        let mut map = PinMap::teensy4_adapter(ClockPin::Default);
        map.clock_alt = Some(PhysicalLine(7));
        for clock in [ClockPin::Default, ClockPin::Alternate] {
            assert_eq!(
                SignalBinding::new(&map, Jumpers::with_clock(clock)),
                Err(BindingError::ClockConflict)
            );
        }
    }

    #[test]
    fn test_no_clock_rejected() {
        let mut map = PinMap::teensy4_adapter(ClockPin::Default);
        map.clock = None;
        assert_eq!(
            SignalBinding::new(&map, Jumpers::default()),
            Err(BindingError::Unassigned(SignalRole::Clock))
        );
        assert_eq!(
            SignalBinding::new(&map, Jumpers::with_clock(ClockPin::Alternate)),
            Err(BindingError::Unassigned(SignalRole::ClockAlt))
        );
    }

    #[test]
    fn test_clock_must_match_jumpers() {
        let map = PinMap::teensy4_adapter(ClockPin::Default);
        assert_eq!(
            SignalBinding::new(&map, Jumpers::with_clock(ClockPin::Alternate)),
            Err(BindingError::Unassigned(SignalRole::ClockAlt))
        );
    }

    #[test]
    fn test_missing_roles_rejected() {
        let mut map = PinMap::teensy4_adapter(ClockPin::Default);
        map.latch = None;
        assert_eq!(
            SignalBinding::new(&map, Jumpers::default()),
            Err(BindingError::Unassigned(SignalRole::Latch))
        );

        let mut map = PinMap::teensy4_adapter(ClockPin::Default);
        map.color[4] = None;
        assert_eq!(
            SignalBinding::new(&map, Jumpers::default()),
            Err(BindingError::Unassigned(SignalRole::ColorBit1G))
        );

        assert_eq!(
            SignalBinding::new(&PinMap::default(), Jumpers::default()),
            Err(BindingError::Unassigned(SignalRole::OutputEnable))
        );
    }

    #[test]
    fn test_duplicate_color_lines_rejected() {
        let mut map = PinMap::teensy4_adapter(ClockPin::Default);
        map.color[5] = Some(PhysicalLine(6));
        assert_eq!(
            SignalBinding::new(&map, Jumpers::default()),
            Err(BindingError::DuplicateLine {
                first: SignalRole::ColorBit0R,
                second: SignalRole::ColorBit1B,
                line: PhysicalLine(6)
            })
        );
    }

    #[test]
    fn test_color_line_shared_with_control_rejected() {
        let mut map = PinMap::teensy4_adapter(ClockPin::Default);
        map.color[0] = Some(PhysicalLine(8));
        assert_eq!(
            SignalBinding::new(&map, Jumpers::default()),
            Err(BindingError::DuplicateLine {
                first: SignalRole::Clock,
                second: SignalRole::ColorBit0R,
                line: PhysicalLine(8)
            })
        );
    }

    #[test]
    fn test_alternate_spi_disconnects_matrix() {
        let jumpers = Jumpers {
            clock: ClockPin::Default,
            spi: SpiPins::Alternate,
        };
        assert_eq!(
            SignalBinding::teensy4_adapter(jumpers),
            Err(BindingError::MatrixDisconnected)
        );
    }

    #[test]
    fn test_data_bit_order_follows_pin_numbers() {
        let binding = SignalBinding::teensy4_adapter(Jumpers::default()).unwrap();
        // pins R0=6 G0=9 B0=10 G1=11 R1=12 B1=13
        assert_eq!(
            binding.data_bit_order(),
            [
                SignalRole::ColorBit0R,
                SignalRole::ColorBit0G,
                SignalRole::ColorBit0B,
                SignalRole::ColorBit1G,
                SignalRole::ColorBit1R,
                SignalRole::ColorBit1B,
            ]
        );
        assert_eq!(binding.data_bit(SignalRole::ColorBit0R), Some(0));
        assert_eq!(binding.data_bit(SignalRole::ColorBit1R), Some(4));
        assert_eq!(binding.data_bit(SignalRole::Latch), None);
    }

    #[test]
    fn test_is_color() {
        for role in SignalRole::COLOR {
            assert!(role.is_color());
        }
        assert!(!SignalRole::Clock.is_color());
        assert!(!SignalRole::OutputEnable.is_color());
    }
}
