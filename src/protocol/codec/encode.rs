/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use bytes::{BufMut, BytesMut};

use crate::protocol::command::Arg;

/// Number of ASCII digits needed to print `n`
fn digits(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

/// `$<len>\r\n<bytes>\r\n`
#[inline]
fn arg_len(arg: &Arg) -> usize {
    1 + digits(arg.len()) + 2 + arg.len() + 2
}

/// The exact size of the encoded command, so the buffer can be sized once.
pub(crate) fn encoded_len(args: &[Arg]) -> usize {
    args.iter()
        .fold(1 + digits(args.len()) + 2, |acc, arg| acc + arg_len(arg))
}

fn write_rn(buf: &mut BytesMut) {
    buf.put_u8(b'\r');
    buf.put_u8(b'\n');
}

fn write_header(symb: u8, len: usize, buf: &mut BytesMut) {
    // Digits are produced backwards into a stack buffer, no allocation
    let mut digits = [0u8; 20];
    let mut pos = digits.len();
    let mut n = len;
    loop {
        pos -= 1;
        digits[pos] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buf.put_u8(symb);
    buf.put_slice(&digits[pos..]);
    write_rn(buf);
}

/// Appends the array-of-bulk-strings form of `args` to `buf`
pub(crate) fn encode(args: &[Arg], buf: &mut BytesMut) {
    buf.reserve(encoded_len(args));
    write_header(b'*', args.len(), buf);
    for arg in args {
        write_header(b'$', arg.len(), buf);
        buf.put_slice(arg.as_bytes());
        write_rn(buf);
    }
}
