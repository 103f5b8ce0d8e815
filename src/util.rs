use nom::error::{ErrorKind, ParseError};
use nom::{Err, IResult, InputLength, Parser};
use tinyvec::{Array, ArrayVec};

/// Largest value of a 24 bit length field.
pub const MAX_U24: usize = 0x00FF_FFFF;

/// Parse `f` until it fails, collecting into a bounded `ArrayVec`.
///
/// Input that would overflow the capacity fails with `ErrorKind::TooLarge`
/// instead of panicking on push.
#[inline(always)]
pub fn many0<I, O, E, F, A>(mut f: F) -> impl FnMut(I) -> IResult<I, ArrayVec<A>, E>
where
    I: Clone + InputLength,
    F: Parser<I, O, E>,
    E: ParseError<I>,
    A: Array<Item = O>,
{
    move |mut i: I| {
        let mut acc = ArrayVec::default();
        loop {
            let len = i.input_len();
            if len == 0 {
                return Ok((i, acc));
            }
            match f.parse(i.clone()) {
                Err(Err::Error(_)) => return Ok((i, acc)),
                Err(e) => return Err(e),
                Ok((i1, o)) => {
                    // infinite loop check: the parser must always consume
                    if i1.input_len() == len {
                        return Err(Err::Error(E::from_error_kind(i, ErrorKind::Many0)));
                    }
                    if acc.len() == A::CAPACITY {
                        return Err(Err::Failure(E::from_error_kind(i, ErrorKind::TooLarge)));
                    }

                    i = i1;
                    acc.push(o);
                }
            }
        }
    }
}

/// Like [`many0`] but requires at least one element.
#[inline(always)]
pub fn many1<I, O, E, F, A>(f: F) -> impl FnMut(I) -> IResult<I, ArrayVec<A>, E>
where
    I: Clone + InputLength,
    F: Parser<I, O, E>,
    E: ParseError<I>,
    A: Array<Item = O>,
{
    let mut inner = many0(f);
    move |i: I| {
        let (rest, acc) = inner(i.clone())?;
        if acc.is_empty() {
            return Err(Err::Error(E::from_error_kind(i, ErrorKind::Many1)));
        }
        Ok((rest, acc))
    }
}

/// Fail unless a length-delimited block was consumed entirely.
#[inline(always)]
pub fn all_consumed(rest: &[u8]) -> Result<(), Err<nom::error::Error<&[u8]>>> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Err::Failure(nom::error::Error::new(
            rest,
            ErrorKind::LengthValue,
        )))
    }
}

/// Write the low three bytes of `value`, big endian.
#[inline(always)]
pub fn put_u24(output: &mut Vec<u8>, value: usize) {
    output.extend_from_slice(&(value as u32).to_be_bytes()[1..]);
}
