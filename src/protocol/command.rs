/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Commands and their arguments, as sent to Redis

use std::slice;
use std::sync::Arc;

use bytes::Bytes;

use super::codec::encoded_len;

/// A single argument of a command.  Redis treats every argument as a binary-safe string, so
/// whatever the source type this is just bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Arg(Bytes);

impl Arg {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

macro_rules! arg_from_bytes {
    ($t:ty, $f:expr) => {
        impl<'a> From<$t> for Arg {
            fn from(from: $t) -> Arg {
                Arg($f(from))
            }
        }
    };
}

arg_from_bytes!(Bytes, |b| b);
arg_from_bytes!(Vec<u8>, Bytes::from);
arg_from_bytes!(String, Bytes::from);
arg_from_bytes!(&'a [u8], Bytes::copy_from_slice);
arg_from_bytes!(&'a Vec<u8>, |v: &Vec<u8>| Bytes::copy_from_slice(v));
arg_from_bytes!(&'a str, |s: &str| Bytes::copy_from_slice(s.as_bytes()));
arg_from_bytes!(&'a String, |s: &String| Bytes::copy_from_slice(s.as_bytes()));
arg_from_bytes!(Arc<str>, |s: Arc<str>| Bytes::copy_from_slice(s.as_bytes()));
arg_from_bytes!(&'a Arg, |a: &Arg| a.0.clone());

impl<const N: usize> From<&[u8; N]> for Arg {
    fn from(from: &[u8; N]) -> Arg {
        Arg(Bytes::copy_from_slice(from))
    }
}

/// Anything else printable is sent as its text form, e.g. `42`, `1.5`, `true`
macro_rules! arg_from_display {
    ($($t:ty),* $(,)*) => {
        $(
            impl From<$t> for Arg {
                fn from(from: $t) -> Arg {
                    Arg(Bytes::from(from.to_string()))
                }
            }
        )*
    };
}

arg_from_display!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, char);

/// `None` is sent as a zero-length argument, there is no way to send a nil to Redis
impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(from: Option<T>) -> Arg {
        match from {
            Some(t) => t.into(),
            None => Arg::default(),
        }
    }
}

/// A full command: the command name followed by its arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    args: Vec<Arg>,
}

impl Command {
    pub fn new(name: impl Into<Arg>) -> Self {
        Command {
            args: vec![name.into()],
        }
    }

    pub fn from_args(args: Vec<Arg>) -> Self {
        Command { args }
    }

    /// Builder-style: add one argument
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builder-style: add a variable number of arguments, e.g. the values of an RPUSH
    pub fn args<T>(mut self, args: impl IntoIterator<Item = T>) -> Self
    where
        T: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn push(&mut self, arg: impl Into<Arg>) {
        self.args.push(arg.into());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Arg> {
        self.args.iter()
    }

    pub fn as_slice(&self) -> &[Arg] {
        &self.args
    }

    /// The exact number of bytes this command occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        encoded_len(&self.args)
    }
}

impl<'a> IntoIterator for &'a Command {
    type Item = &'a Arg;
    type IntoIter = slice::Iter<'a, Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

/// Macro to create a command.  Elements can be any type, or a mixture of types, that satisfy
/// `Into<Arg>`.
///
/// # Examples
///
/// ```
/// #[macro_use]
/// extern crate redis_call;
///
/// fn main() {
///     let value = format!("something_{}", 123);
///     let command = cmd!["SET", "key_name", value, "EX", 10];
///     assert_eq!(command.len(), 5);
/// }
/// ```
///
/// For variable length commands:
///
/// ```
/// #[macro_use]
/// extern crate redis_call;
///
/// fn main() {
///     let data = vec!["data", "from", "somewhere", "else"];
///     let command = cmd!["RPUSH", "mykey"].args(data);
///     assert_eq!(command.len(), 6);
/// }
/// ```
#[macro_export]
macro_rules! cmd {
    ($($e:expr),* $(,)?) => {
        {
            $crate::Command::from_args(vec![
                $(
                    $crate::Arg::from($e),
                )*
            ])
        }
    }
}
