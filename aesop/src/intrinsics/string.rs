use super::{IntrinsicContext, arity};
use crate::resource::atoi;
use crate::{IntrinsicError, Value};

const DONE: Value = Value::from_i32(-1);

/// `copy_string(src, dst)`
pub fn copy_string(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("copy_string", args, 2)?;
    let text = ctx.read_string(args[0])?;
    ctx.write_string(args[1], &text)?;
    Ok(DONE)
}

/// `cat_string(dst, src)`: append `src` to `dst`.
pub fn cat_string(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("cat_string", args, 2)?;
    let mut text = ctx.read_string(args[0])?;
    text.extend_from_slice(&ctx.read_string(args[1])?);
    ctx.write_string(args[0], &text)?;
    Ok(DONE)
}

fn map_in_place(ctx: &mut IntrinsicContext<'_>, addr: Value, f: fn(&mut [u8])) -> Result<Value, IntrinsicError> {
    let mut text = ctx.read_string(addr)?;
    f(&mut text);
    ctx.write_string(addr, &text)?;
    Ok(DONE)
}

pub fn string_force_lower(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("string_force_lower", args, 1)?;
    map_in_place(ctx, args[0], <[u8]>::make_ascii_lowercase)
}

pub fn string_force_upper(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("string_force_upper", args, 1)?;
    map_in_place(ctx, args[0], <[u8]>::make_ascii_uppercase)
}

pub fn string_len(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("string_len", args, 1)?;
    Ok(Value::from_u32(ctx.read_string(args[0])?.len() as u32))
}

/// Case-insensitive comparison: the difference of the first pair of
/// differing (lower-cased) bytes, 0 when equal.
pub fn string_compare(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("string_compare", args, 2)?;
    let a = ctx.read_string(args[0])?;
    let b = ctx.read_string(args[1])?;
    Ok(Value::from_i32(compare_ignore_case(&a, &b)))
}

fn compare_ignore_case(a: &[u8], b: &[u8]) -> i32 {
    let a = a.iter().map(u8::to_ascii_lowercase).chain(std::iter::once(0));
    let b = b.iter().map(u8::to_ascii_lowercase).chain(std::iter::once(0));
    a.zip(b)
        .map(|(x, y)| x as i32 - y as i32)
        .find(|&d| d != 0)
        .unwrap_or(0)
}

/// `strval(str)`: decimal value of a string, -1 for a null address.
pub fn strval(ctx: &mut IntrinsicContext<'_>, args: &[Value]) -> Result<Value, IntrinsicError> {
    arity("strval", args, 1)?;
    if args[0] == Value::ZERO {
        return Ok(DONE);
    }
    let text = ctx.read_string(args[0])?;
    Ok(Value::from_i32(atoi(&String::from_utf8_lossy(&text))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_is_case_insensitive() {
        assert_eq!(compare_ignore_case(b"Wizard", b"wIZARD"), 0);
        assert!(compare_ignore_case(b"abc", b"abd") < 0);
        assert!(compare_ignore_case(b"abcd", b"ABC") > 0);
        assert_eq!(compare_ignore_case(b"", b""), 0);
    }
}
