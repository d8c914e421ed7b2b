//! Dungeon grid movement helpers.
//!
//! Maps are 32x32 squares; each square is split into four regions
//! (0..=3, bit 0 selects east/west, bit 1 south/north). Facing is
//! N=0, E=1, S=2, W=3.

use super::{IntrinsicContext, arity};
use crate::{IntrinsicError, Value};

const LVL_X: u32 = 32;
const LVL_Y: u32 = 32;

const DIR_N: u32 = 0;
const DIR_E: u32 = 1;
const DIR_S: u32 = 2;
const DIR_W: u32 = 3;

// move types
const MTYP_INIT: u32 = 0;
const MTYP_TL: u32 = 1;
const MTYP_F: u32 = 2;
const MTYP_TR: u32 = 3;
const MTYP_L: u32 = 4;
const MTYP_R: u32 = 6;
const MTYP_ML: u32 = 7;
const MTYP_MM: u32 = 8;
const MTYP_MR: u32 = 9;

/// Per move type (TL, F, TR, L, B, R) and facing.
const DX_OFFSET: [[i8; 4]; 6] = [
    [0, 0, 0, 0],
    [0, 1, 0, -1],
    [0, 0, 0, 0],
    [-1, 0, 1, 0],
    [0, -1, 0, 1],
    [1, 0, -1, 0],
];

const DY_OFFSET: [[i8; 4]; 6] = [
    [0, 0, 0, 0],
    [-1, 0, 1, 0],
    [0, 0, 0, 0],
    [0, -1, 0, 1],
    [1, 0, -1, 0],
    [0, 1, 0, -1],
];

fn offset(table: &[[i8; 4]; 6], mtype: u32, fdir: u32) -> u8 {
    let row = (mtype as usize).wrapping_sub(1);
    table
        .get(row)
        .and_then(|r| r.get(fdir as usize))
        .map_or(0, |&d| d as u8)
}

fn step(table: &[[i8; 4]; 6], pos: u32, fdir: u32, mtype: u32, distance: u32, size: u32) -> u32 {
    if distance == 0 {
        return pos;
    }
    let mut p = pos as u8;
    match mtype {
        MTYP_ML => {
            p = p.wrapping_add(offset(table, MTYP_F, fdir));
            p = p.wrapping_add(offset(table, MTYP_L, fdir));
        }
        MTYP_MR => {
            p = p.wrapping_add(offset(table, MTYP_F, fdir));
            p = p.wrapping_add(offset(table, MTYP_R, fdir));
        }
        MTYP_MM => p = p.wrapping_add(offset(table, MTYP_F, fdir).wrapping_mul(2)),
        MTYP_INIT => {}
        _ => p = p.wrapping_add((distance as u8).wrapping_mul(offset(table, mtype, fdir))),
    }
    p as u32 & (size - 1)
}

pub(crate) fn step_x_raw(x: u32, fdir: u32, mtype: u32, distance: u32) -> u32 {
    step(&DX_OFFSET, x, fdir, mtype, distance, LVL_X)
}

pub(crate) fn step_y_raw(y: u32, fdir: u32, mtype: u32, distance: u32) -> u32 {
    step(&DY_OFFSET, y, fdir, mtype, distance, LVL_Y)
}

/// `step_X(x, fdir, mtype, distance)`
pub fn step_x(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("step_X", args, 4)?;
    let [x, fdir, mtype, distance] = [0, 1, 2, 3].map(|i| args[i].as_u32());
    Ok(Value::from_u32(step_x_raw(x, fdir, mtype, distance)))
}

/// `step_Y(y, fdir, mtype, distance)`
pub fn step_y(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("step_Y", args, 4)?;
    let [y, fdir, mtype, distance] = [0, 1, 2, 3].map(|i| args[i].as_u32());
    Ok(Value::from_u32(step_y_raw(y, fdir, mtype, distance)))
}

/// `step_FDIR(fdir, mtype)`: facing after a turn. Other moves keep the facing.
pub fn step_fdir(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("step_FDIR", args, 2)?;
    let f = args[0].as_u32() as u8 as u32;
    let out = match args[1].as_u32() {
        MTYP_TL => if f == 0 { 3 } else { f - 1 },
        MTYP_TR => if f == 3 { 0 } else { f + 1 },
        _ => args[0].as_u32(),
    };
    Ok(Value::from_u32(out))
}

/// `step_square_X(x, region, dir)`: square reached when a region steps
/// across the square boundary.
pub fn step_square_x(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("step_square_X", args, 3)?;
    let [x, r, dir] = [0, 1, 2].map(|i| args[i].as_u32());
    let x = match dir {
        DIR_E => step_x_raw(x, dir, MTYP_F, r & 1),
        DIR_W => step_x_raw(x, dir, MTYP_F, (r & 1 == 0) as u32),
        _ => x,
    };
    Ok(Value::from_u32(x))
}

/// `step_square_Y(y, region, dir)`
pub fn step_square_y(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("step_square_Y", args, 3)?;
    let [y, r, dir] = [0, 1, 2].map(|i| args[i].as_u32());
    let y = match dir {
        DIR_N => step_y_raw(y, dir, MTYP_F, (r < 2) as u32),
        DIR_S => step_y_raw(y, dir, MTYP_F, (r >= 2) as u32),
        _ => y,
    };
    Ok(Value::from_u32(y))
}

/// `step_region(region, dir)`
pub fn step_region(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("step_region", args, 2)?;
    let r = args[0].as_u32();
    let r = match args[1].as_u32() {
        DIR_N | DIR_S => r ^ 2,
        DIR_E | DIR_W => r ^ 1,
        _ => r,
    };
    Ok(Value::from_u32(r))
}

/// `distance(x1, y1, x2, y2)`: integer ceiling of the euclidean distance,
/// capped at 31.
pub fn distance(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("distance", args, 4)?;
    let [x1, y1, x2, y2] = [0, 1, 2, 3].map(|i| args[i].as_i32());
    let dx = x1.wrapping_sub(x2).wrapping_abs() as i64;
    let dy = y1.wrapping_sub(y2).wrapping_abs() as i64;
    let squared = dx * dx + dy * dy;
    let root = (0..31i64).find(|r| r * r >= squared).unwrap_or(31);
    Ok(Value::from_i32(root as i32))
}

/// `seek_direction(x, y, dest_x, dest_y)`: one of eight compass directions
/// (0 = north, clockwise), -1 when already there.
pub fn seek_direction(_: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("seek_direction", args, 4)?;
    let [x, y, dest_x, dest_y] = [0, 1, 2, 3].map(|i| args[i].as_i32());
    let dx = dest_x.wrapping_sub(x);
    let dy = dest_y.wrapping_sub(y);
    let dir = match (dx.signum(), dy.signum()) {
        (-1, 1) => 5,
        (-1, -1) => 7,
        (-1, _) => 6,
        (1, 1) => 3,
        (1, -1) => 1,
        (1, _) => 2,
        (_, 1) => 4,
        (_, -1) => 0,
        _ => -1,
    };
    Ok(Value::from_i32(dir))
}
