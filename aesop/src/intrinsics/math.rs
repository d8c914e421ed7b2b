use super::{IntrinsicContext, arity};
use crate::{IntrinsicError, Value};

/// SplitMix64 generator. Seeded from the engine configuration so script
/// runs are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.state = seed;
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `[low, high]`. Bounds given in either order.
    pub fn range(&mut self, low: i32, high: i32) -> i32 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let span = (high as i64 - low as i64 + 1) as u64;
        (low as i64 + (self.next_u64() % span) as i64) as i32
    }
}

/// `rnd(low, high)`
pub fn rnd(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("rnd", args, 2)?;
    Ok(Value::from_i32(ctx.engine.rng_mut().range(args[0].as_i32(), args[1].as_i32())))
}

/// `dice(count, sides, bonus)`: sum of `count` rolls of 1..=sides, plus bonus.
pub fn dice(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("dice", args, 3)?;
    let (count, sides, bonus) = (args[0].as_i32(), args[1].as_i32(), args[2].as_i32());
    let mut total = bonus;
    for _ in 0..count.max(0) {
        // each roll costs an instruction
        ctx.state.tick()?;
        total = total.wrapping_add(ctx.engine.rng_mut().range(1, sides));
    }
    Ok(Value::from_i32(total))
}

pub fn absv(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("absv", args, 1)?;
    Ok(Value::from_i32(args[0].as_i32().wrapping_abs()))
}

pub fn minv(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("minv", args, 2)?;
    Ok(Value::from_i32(args[0].as_i32().min(args[1].as_i32())))
}

pub fn maxv(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("maxv", args, 2)?;
    Ok(Value::from_i32(args[0].as_i32().max(args[1].as_i32())))
}

/// `seed_random(seed)`
pub fn seed_random(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("seed_random", args, 1)?;
    ctx.engine.rng_mut().reseed(args[0].as_u32() as u64);
    Ok(Value::from_i32(-1))
}
