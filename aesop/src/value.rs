use core::fmt;

use crate::RuntimeError;

/// A 32-bit VM cell. Untagged: the opcode decides whether it is read as a
/// signed integer, a pair of 16-bit halves, or an [`Address`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Value(u32);

impl Value {
    pub const ZERO: Value = Value(0);

    #[inline]
    pub const fn from_i32(v: i32) -> Self {
        Self(v as u32)
    }

    #[inline]
    pub const fn from_u32(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    pub const fn from_halves(low: u16, high: u16) -> Self {
        Self(low as u32 | (high as u32) << 16)
    }

    #[inline]
    pub const fn from_bool(b: bool) -> Self {
        Self(b as u32)
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// `(low, high)` 16-bit halves.
    #[inline]
    pub const fn as_halves(self) -> (u16, u16) {
        (self.0 as u16, (self.0 >> 16) as u16)
    }

    #[inline]
    pub const fn low(self) -> u16 {
        self.0 as u16
    }

    #[inline]
    pub const fn high(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[inline]
    pub const fn is_true(self) -> bool {
        self.0 != 0
    }

    pub fn as_addr(self) -> Result<Address, RuntimeError> {
        Address::decode(self.0).ok_or(RuntimeError::InvalidAddress { value: self.0 })
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::from_i32(v)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({} / 0x{:08x})", self.as_i32(), self.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Which storage an [`Address`] points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Space {
    /// Program bytes of the program resource `index`. Read-only.
    Code,
    /// Auto variables of the frame at call level `index`.
    Auto,
    /// Static area of the object at table slot `index`.
    Static,
    /// Native function `index` of the intrinsics registry.
    Intrinsic,
}

/// A location in VM memory.
///
/// Stored in a cell it is packed as `[space:4][index:12][offset:16]`; space 0
/// is never produced, so a zero cell is a null address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub space: Space,
    pub index: u32,
    pub offset: u32,
}

impl Address {
    /// Largest object, frame, program or intrinsic index a cell can carry.
    /// Code addresses hold the program's resource id, so `LECA` and the
    /// table address opcodes fail in programs with ids above this.
    pub const MAX_INDEX: u32 = 0x0fff;

    pub const fn new(space: Space, index: u32, offset: u32) -> Self {
        Self { space, index, offset }
    }

    /// The same address moved by `delta` bytes.
    pub const fn add(self, delta: u32) -> Self {
        Self {
            offset: self.offset.wrapping_add(delta),
            ..self
        }
    }

    const fn tag(self) -> u32 {
        match self.space {
            Space::Code => 1,
            Space::Auto => 2,
            Space::Static => 3,
            Space::Intrinsic => 4,
        }
    }

    /// Pack into a cell. Fails when index or offset do not fit their fields.
    pub fn to_value(self) -> Result<Value, RuntimeError> {
        if self.index > Self::MAX_INDEX || self.offset > u16::MAX as u32 {
            return Err(RuntimeError::AddressOutOfRange {
                index: self.index as usize,
                offset: self.offset as usize,
            });
        }
        Ok(Value::from_u32(self.tag() << 28 | self.index << 16 | self.offset))
    }

    pub fn decode(raw: u32) -> Option<Self> {
        let space = match raw >> 28 {
            1 => Space::Code,
            2 => Space::Auto,
            3 => Space::Static,
            4 => Space::Intrinsic,
            _ => return None,
        };
        Some(Self {
            space,
            index: (raw >> 16) & Self::MAX_INDEX,
            offset: raw & 0xffff,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]+0x{:04x}", self.space, self.index, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves() {
        let v = Value::from_halves(0x1234, 0xabcd);
        assert_eq!(v.as_u32(), 0xabcd_1234);
        assert_eq!(v.as_halves(), (0x1234, 0xabcd));
        assert_eq!(Value::from_i32(-1).as_halves(), (0xffff, 0xffff));
        assert_eq!(Value::from_i32(-2).as_i32(), -2);
    }

    #[test]
    fn addresses_survive_a_cell() {
        let addr = Address::new(Space::Static, 2047, 0x1f0);
        let cell = addr.to_value().unwrap();
        assert_eq!(cell.as_addr().unwrap(), addr);
        assert_eq!(addr.add(0x10).offset, 0x200);
    }

    #[test]
    fn zero_and_plain_integers_are_not_addresses() {
        assert!(Value::ZERO.as_addr().is_err());
        assert!(Value::from_i32(42).as_addr().is_err());
        assert!(Address::new(Space::Code, 4096, 0).to_value().is_err());
        assert!(Address::new(Space::Code, 1, 0x1_0000).to_value().is_err());
    }
}
