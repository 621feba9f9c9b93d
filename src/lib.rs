//! Refresh timing engine for HUB75 LED matrix displays.
//!
//! ## How HUB75 LED Displays Work
//!
//! HUB75 RGB LED matrix panels are scanned, time-multiplexed displays that behave like a long
//! daisy-chained shift register rather than a random-access framebuffer.
//!
//! ### Signal names
//! - **R1 G1 B1 / R2 G2 B2** – Serial colour data for the upper and lower halves of the active scan line
//! - **CLK** – Shift-register clock; every rising edge pushes the six colour bits one pixel to the right
//! - **LAT / STB** – Latch; copies the shift-register contents to the LED drivers for the row currently selected by the address lines
//! - **OE** – Output-Enable: LEDs are lit only while it is asserted
//! - **A B C D (E)** – Row-address select lines (choose which pair of rows is lit)
//!
//! ### One refresh cycle
//! 1. Blank the output and drive the address of row pair N.
//! 2. Clock the six colour bits of every column of row pair N into the chain.
//! 3. Wait for the clock-to-output propagation delay, then pulse LAT to copy the shift registers into the output drivers.
//! 4. Light the row for the on-time of the bit plane that was shifted, then blank again.
//!
//! The address never changes while the output is lit, and the latch pulse width is held exactly.
//!
//! ### Brightness and colour depth (Binary Code Modulation)
//! Each bit plane is displayed for a period proportional to its binary weight (1, 2, 4, 8 …),
//! yielding 2ⁿ intensity levels per channel. See
//! [Batsocks – LED dimming using Binary Code Modulation](https://www.batsocks.co.uk/readme/art_bcm_1.htm)
//! for a deeper explanation. Long planes can be split into equal windows spread over the
//! row-scan period, which keeps the refresh rate of the brightest bits high; see
//! [`scheduler`].
//!
//! ## Crate layout
//!
//! | Module | Role |
//! |---|---|
//! | [`timing`] | latch, delay and pixel clock constants, transfer budget |
//! | [`pins`] | role to line binding, clock and SPI jumpers |
//! | [`framebuffer`] | bit-plane frames and the double buffer |
//! | [`scheduler`] | which (row pair, plane) comes next, and for how long |
//! | [`sequencer`] | emits and checks one cycle on a [`sequencer::SignalPeripheral`] |
//! | [`engine`] | the refresh loop tying the above together |
//! | [`sim`] | a timing-accurate peripheral for tests and benchmarks |
//! | [`error`] | the error taxonomy |
//!
//! ## Available Feature Flags
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the public types and routes the crate's
//! log statements to `defmt`.
//!
//! ### `log` Feature
//! Routes the crate's log statements to the `log` facade. Ignored when `defmt`
//! is enabled.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

#[macro_use]
mod fmt;

pub mod engine;
pub mod error;
pub mod framebuffer;
pub mod pins;
pub mod scheduler;
pub mod sequencer;
pub mod sim;
pub mod timing;

use embedded_graphics::pixelcolor::Rgb888;

pub use engine::{DriverConfig, RefreshEngine, Tick};
pub use error::Error;

/// Color type used in the framebuffer
pub type Color = Rgb888;

/// Computes the NROWS value (row pairs) from the panel's ROWS.
#[must_use]
pub const fn compute_rows(rows: usize) -> usize {
    rows / 2
}

/// Computes the chained column count of `panels` panels of `cols` columns
/// each.
#[must_use]
pub const fn compute_chained_cols(cols: usize, panels: usize) -> usize {
    cols * panels
}

/// Computes the number of plane windows shown per row pair and refresh.
///
/// Planes below `transition` get one window each, plane `p` at or above it
/// gets `2^(p - transition)`. With `transition == 0` this is the classic
/// `2^planes - 1`.
#[must_use]
pub const fn compute_refresh_slots(planes: u8, transition: u8) -> usize {
    if transition >= planes {
        planes as usize
    } else {
        transition as usize + (1usize << (planes - transition)) - 1
    }
}
