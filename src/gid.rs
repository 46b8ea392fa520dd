use macroquad::prelude::Vec2;

pub const FLIP_H: u32 = 0x8000_0000; // bit 31
pub const FLIP_V: u32 = 0x4000_0000; // bit 30
pub const FLIP_D: u32 = 0x2000_0000; // bit 29
pub const GID_MASK: u32 = 0x1FFF_FFFF; // keep lower 29 bits

/// Global tile identifier as stored in TMX layer data: a 29-bit tile index
/// with the three flip flags packed above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Gid(pub u32);

impl Gid {
    pub fn new(index: u32, flips: FlipBits) -> Self {
        let mut raw = index & GID_MASK;
        if flips.vertical() {
            raw |= FLIP_V;
        }
        if flips.horizontal() {
            raw |= FLIP_H;
        }
        if flips.diagonal() {
            raw |= FLIP_D;
        }
        Gid(raw)
    }

    #[inline] pub fn raw(self) -> u32 { self.0 }
    #[inline] pub fn clean(self) -> u32 { self.0 & GID_MASK }
    #[inline] pub fn is_empty(self) -> bool { self.clean() == 0 }

    #[inline]
    pub fn flips(self) -> FlipBits {
        let mut bits = 0u8;
        if self.0 & FLIP_V != 0 {
            bits |= FlipBits::VERTICAL;
        }
        if self.0 & FLIP_H != 0 {
            bits |= FlipBits::HORIZONTAL;
        }
        if self.0 & FLIP_D != 0 {
            bits |= FlipBits::DIAGONAL;
        }
        FlipBits(bits)
    }

    /// Splits into the tile index (usable directly as a `TileInfo` index)
    /// and the orientation flags.
    #[inline]
    pub fn split(self) -> (u32, FlipBits) {
        (self.clean(), self.flips())
    }
}

/// Three-bit orientation code. Bit 0 is the vertical flip, bit 1 the
/// horizontal flip and bit 2 the diagonal flip, so `0b001` reads as
/// "vertical only".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlipBits(u8);

impl FlipBits {
    pub const NONE: FlipBits = FlipBits(0);
    pub const VERTICAL: u8 = 0b001;
    pub const HORIZONTAL: u8 = 0b010;
    pub const DIAGONAL: u8 = 0b100;

    /// Keeps the low three bits of `code`.
    pub fn from_code(code: u8) -> Self {
        FlipBits(code & 0b111)
    }

    #[inline] pub fn code(self) -> u8 { self.0 }
    #[inline] pub fn vertical(self) -> bool { self.0 & Self::VERTICAL != 0 }
    #[inline] pub fn horizontal(self) -> bool { self.0 & Self::HORIZONTAL != 0 }
    #[inline] pub fn diagonal(self) -> bool { self.0 & Self::DIAGONAL != 0 }

    /// Flips the four texture corners (top-left, top-right, bottom-right,
    /// bottom-left) in place. The per-code order matters: the diagonal swap
    /// does not commute with the axis swaps.
    pub fn apply(self, c: &mut [Vec2; 4]) {
        match self.0 {
            0b000 => {}
            0b001 => flip_y(c),
            0b010 => flip_x(c),
            0b011 => {
                flip_y(c);
                flip_x(c);
            }
            0b100 => flip_d(c),
            0b101 => {
                flip_x(c);
                flip_d(c);
            }
            0b110 => {
                flip_y(c);
                flip_d(c);
            }
            _ => {
                flip_y(c);
                flip_x(c);
                flip_d(c);
            }
        }
    }

    /// The code whose [`apply`](Self::apply) undoes this one. Codes 101 and
    /// 110 are quarter turns in opposite directions; the rest are involutions.
    pub fn inverse(self) -> Self {
        match self.0 {
            0b101 => FlipBits(0b110),
            0b110 => FlipBits(0b101),
            other => FlipBits(other),
        }
    }
}

// The corner order is fixed (top-left, top-right, bottom-right,
// bottom-left), so each flip is a fixed permutation of the four slots.
fn flip_y(c: &mut [Vec2; 4]) {
    c.swap(0, 3);
    c.swap(1, 2);
}

fn flip_x(c: &mut [Vec2; 4]) {
    c.swap(0, 1);
    c.swap(2, 3);
}

fn flip_d(c: &mut [Vec2; 4]) {
    c.swap(1, 3);
}
