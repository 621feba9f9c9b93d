//! Bit-plane frame storage and the double buffer the refresh engine scans.
//!
//! The engine never looks at colours. It asks a [`FrameSource`] for the
//! packed data of one (row pair, bit plane) and shifts it out unchanged, so
//! the buffer stores pixels already decomposed into planes:
//!
//! - Every [`Entry`] holds one bit of R, G and B for two pixels, the one in
//!   the selected row (upper half) and the one `NROWS` rows further down
//!   (lower half).
//! - A row of `COLS` entries is what a single shift transfers.
//! - Plane `p` holds bit `8 - PLANES + p` of every 8-bit channel, so plane 0
//!   is the least significant bit that is displayed.
//!
//! # Memory Usage
//! `NROWS * COLS * PLANES` bytes per buffer, twice that for a
//! [`DoubleBuffer`].
//!
//! # Example
//! ```rust
//! use embedded_graphics::pixelcolor::RgbColor;
//! use embedded_graphics::prelude::*;
//! use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
//! use hub75_refresh::compute_rows;
//! use hub75_refresh::framebuffer::{DoubleBuffer, PlaneFrameBuffer};
//! use hub75_refresh::Color;
//!
//! const ROWS: usize = 32;
//! const COLS: usize = 64;
//! const NROWS: usize = compute_rows(ROWS);
//! const PLANES: usize = 4;
//!
//! type Frame = PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>;
//! let mut buffers = DoubleBuffer::new(Frame::new(), Frame::new());
//!
//! if let Some(back) = buffers.back_mut() {
//!     Rectangle::new(Point::new(10, 10), Size::new(20, 20))
//!         .into_styled(PrimitiveStyle::with_fill(Color::RED))
//!         .draw(back)
//!         .unwrap();
//! }
//! buffers.swap_buffers();
//! ```

use core::convert::Infallible;

use bitfield::bitfield;
use embedded_dma::ReadBuffer;
use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::{OriginDimensions, Point, Size};

use crate::error::BufferUnavailableError;
use crate::scheduler::{BitPlane, RowAddress};
use crate::Color;

bitfield! {
    /// One clock cycle of colour data for both halves of the panel.
    ///
    /// The bit layout is as follows:
    /// - Bit 5: Blue channel for the lower half
    /// - Bit 4: Green channel for the lower half
    /// - Bit 3: Red channel for the lower half
    /// - Bit 2: Blue channel for the upper half
    /// - Bit 1: Green channel for the upper half
    /// - Bit 0: Red channel for the upper half
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Entry(u8);
    impl Debug;
    pub blu2, set_blu2: 5;
    pub grn2, set_grn2: 4;
    pub red2, set_red2: 3;
    pub blu1, set_blu1: 2;
    pub grn1, set_grn1: 1;
    pub red1, set_red1: 0;
}

impl Entry {
    /// Mask of the six colour bits.
    pub const COLOR_MASK: u8 = 0b0011_1111;

    /// An entry with every line low.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Raw bits, in [`SignalRole::COLOR`](crate::pins::SignalRole::COLOR) order.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    fn set_color0(&mut self, r: bool, g: bool, b: bool) {
        self.set_red1(r);
        self.set_grn1(g);
        self.set_blu1(b);
    }

    fn set_color1(&mut self, r: bool, g: bool, b: bool) {
        self.set_red2(r);
        self.set_grn2(g);
        self.set_blu2(b);
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Entry {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Entry({=u8:#b})", self.0);
    }
}

/// Packed data for one (row pair, plane), borrowed from a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPlane<'a> {
    entries: &'a [Entry],
}

impl<'a> RowPlane<'a> {
    /// Wrap a slice of entries.
    #[must_use]
    pub const fn new(entries: &'a [Entry]) -> Self {
        Self { entries }
    }

    /// The entries, one per clock cycle.
    #[must_use]
    pub const fn entries(&self) -> &'a [Entry] {
        self.entries
    }

    /// Number of clock cycles needed to shift the row.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the row is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// SAFETY: `Entry` is `repr(transparent)` over `u8` and the slice is borrowed
// for as long as the `RowPlane` exists.
unsafe impl ReadBuffer for RowPlane<'_> {
    type Word = u8;

    unsafe fn read_buffer(&self) -> (*const u8, usize) {
        (self.entries.as_ptr().cast::<u8>(), self.entries.len())
    }
}

/// Something the refresh engine can read row/plane data from.
pub trait FrameSource {
    /// Data for `row` in `plane` of the frame currently being displayed.
    ///
    /// # Errors
    ///
    /// [`BufferUnavailableError`] when no frame is ready. The caller skips the
    /// cycle and retries on the next tick.
    fn row_plane(&self, row: RowAddress, plane: BitPlane) -> Result<RowPlane<'_>, BufferUnavailableError>;

    /// Called by the engine before the first row of every refresh. This is
    /// the only point where the displayed frame may change.
    fn frame_boundary(&mut self) {}

    /// Row pairs, chained columns and planes stored per frame.
    fn geometry(&self) -> FrameGeometry;
}

/// Dimensions of the data a [`FrameSource`] provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameGeometry {
    /// Row pairs.
    pub row_pairs: usize,
    /// Entries per row.
    pub cols: usize,
    /// Planes.
    pub planes: usize,
}

#[derive(Clone, Copy, PartialEq, Debug)]
#[repr(C)]
struct Plane<const COLS: usize, const NROWS: usize> {
    rows: [[Entry; COLS]; NROWS],
}

impl<const COLS: usize, const NROWS: usize> Plane<COLS, NROWS> {
    const fn new() -> Self {
        Self {
            rows: [[Entry::new(); COLS]; NROWS],
        }
    }

    fn set_pixel(&mut self, y: usize, x: usize, r: bool, g: bool, b: bool) {
        if y < NROWS {
            self.rows[y][x].set_color0(r, g, b);
        } else {
            self.rows[y - NROWS][x].set_color1(r, g, b);
        }
    }
}

/// Frame stored as bit planes.
///
/// # Type Parameters
/// - `ROWS`: Total number of rows in the panel
/// - `COLS`: Number of columns across the whole chain
/// - `NROWS`: Number of row pairs (use [`compute_rows`](crate::compute_rows))
/// - `PLANES`: Colour depth, 1 to 8 planes
#[derive(Copy, Clone)]
#[repr(C)]
#[repr(align(4))]
pub struct PlaneFrameBuffer<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize> {
    planes: [Plane<COLS, NROWS>; PLANES],
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize> Default
    for PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize>
    PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>
{
    /// Create a black frame.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            planes: [Plane::new(); PLANES],
        }
    }

    /// Turn every pixel off.
    pub fn erase(&mut self) {
        self.planes = [Plane::new(); PLANES];
    }

    /// Set a pixel. Points outside the panel are ignored.
    pub fn set_pixel(&mut self, p: Point, color: Color) {
        if p.x < 0 || p.y < 0 {
            return;
        }
        self.set_pixel_internal(p.x as usize, p.y as usize, color);
    }

    fn set_pixel_internal(&mut self, x: usize, y: usize, color: Color) {
        if x >= COLS || y >= ROWS {
            return;
        }
        let skip = 8usize.saturating_sub(PLANES);
        for (plane, data) in self.planes.iter_mut().enumerate() {
            // planes past the eighth have no channel bit and stay dark
            let bit = (skip + plane) as u32;
            let lit = |channel: u8| channel.checked_shr(bit).is_some_and(|v| v & 1 == 1);
            let r = lit(color.r());
            let g = lit(color.g());
            let b = lit(color.b());
            data.set_pixel(y, x, r, g, b);
        }
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize> FrameSource
    for PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>
{
    fn row_plane(&self, row: RowAddress, plane: BitPlane) -> Result<RowPlane<'_>, BufferUnavailableError> {
        self.planes
            .get(plane.index())
            .and_then(|p| p.rows.get(row.index()))
            .map(|entries| RowPlane::new(entries))
            .ok_or(BufferUnavailableError)
    }

    fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            row_pairs: NROWS,
            cols: COLS,
            planes: PLANES,
        }
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize> OriginDimensions
    for PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>
{
    fn size(&self) -> Size {
        Size::new(COLS as u32, ROWS as u32)
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize>
    embedded_graphics::draw_target::DrawTarget for PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>
{
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for pixel in pixels {
            self.set_pixel(pixel.0, pixel.1);
        }
        Ok(())
    }
}

impl<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize> core::fmt::Debug
    for PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlaneFrameBuffer")
            .field("size", &core::mem::size_of_val(&self.planes))
            .field("plane_count", &PLANES)
            .field("plane_size", &core::mem::size_of::<Plane<COLS, NROWS>>())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const ROWS: usize, const COLS: usize, const NROWS: usize, const PLANES: usize> defmt::Format
    for PlaneFrameBuffer<ROWS, COLS, NROWS, PLANES>
{
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "PlaneFrameBuffer<{}, {}, {}, {}>",
            ROWS,
            COLS,
            NROWS,
            PLANES
        );
        defmt::write!(f, " size: {}", core::mem::size_of_val(&self.planes));
    }
}

/// Two frames, one displayed and one being drawn.
///
/// The producer only ever gets the back buffer and asks for a swap with
/// [`swap_buffers`](Self::swap_buffers); the swap itself happens in
/// [`FrameSource::frame_boundary`], a single index flip between two complete
/// refreshes, so the scan never sees half of one frame and half of another.
/// While a swap is pending the back buffer is locked because it is about to
/// be displayed.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<F> {
    buffers: [F; 2],
    front: usize,
    swap_pending: bool,
    presented: bool,
}

impl<F> DoubleBuffer<F> {
    /// Create a double buffer. Nothing is displayed until the first
    /// [`swap_buffers`](Self::swap_buffers) takes effect.
    pub const fn new(front: F, back: F) -> Self {
        Self {
            buffers: [front, back],
            front: 0,
            swap_pending: false,
            presented: false,
        }
    }

    /// The buffer the producer may draw into, `None` while a swap is pending.
    pub fn back_mut(&mut self) -> Option<&mut F> {
        if self.swap_pending {
            return None;
        }
        Some(&mut self.buffers[self.front ^ 1])
    }

    /// Present the back buffer at the next frame boundary.
    pub fn swap_buffers(&mut self) {
        self.swap_pending = true;
    }

    /// Whether a presented frame is waiting for the next frame boundary.
    pub const fn is_swap_pending(&self) -> bool {
        self.swap_pending
    }

    /// The displayed frame, `None` before the first swap.
    pub fn front(&self) -> Option<&F> {
        if self.presented {
            Some(&self.buffers[self.front])
        } else {
            None
        }
    }
}

impl<F: FrameSource> FrameSource for DoubleBuffer<F> {
    fn row_plane(&self, row: RowAddress, plane: BitPlane) -> Result<RowPlane<'_>, BufferUnavailableError> {
        self.front().ok_or(BufferUnavailableError)?.row_plane(row, plane)
    }

    fn frame_boundary(&mut self) {
        if self.swap_pending {
            self.front ^= 1;
            self.swap_pending = false;
            self.presented = true;
        }
    }

    fn geometry(&self) -> FrameGeometry {
        self.buffers[self.front].geometry()
    }
}
