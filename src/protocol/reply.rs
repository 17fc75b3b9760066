/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Replies as read from Redis

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::str;

use bytes::Bytes;

use crate::error::{self, Error};

/// The raw payload of a scalar reply: a simple string, an integer or a bulk string.  Redis
/// transmits all three as text, the accessors parse on demand.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Elem(Bytes);

impl Elem {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Elem(bytes.into())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> Result<&str, Error> {
        str::from_utf8(&self.0)
            .map_err(|_| Error::RESP(format!("Not valid UTF-8: {:?}", self), None))
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn as_i64(&self) -> Result<i64, Error> {
        self.as_str()?
            .parse()
            .map_err(|_| Error::RESP(format!("Not an integer: {:?}", self), None))
    }

    pub fn as_f64(&self) -> Result<f64, Error> {
        self.as_str()?
            .parse()
            .map_err(|_| Error::RESP(format!("Not a float: {:?}", self), None))
    }

    /// Accepts `1`, `t`, `T`, `true`, `TRUE`, `True` and their `0`/`false` counterparts
    pub fn as_bool(&self) -> Result<bool, Error> {
        match self.as_bytes() {
            b"1" | b"t" | b"T" | b"true" | b"TRUE" | b"True" => Ok(true),
            b"0" | b"f" | b"F" | b"false" | b"FALSE" | b"False" => Ok(false),
            _ => Err(Error::RESP(format!("Not a boolean: {:?}", self), None)),
        }
    }
}

impl fmt::Debug for Elem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Elem({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for Elem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<&str> for Elem {
    fn from(from: &str) -> Elem {
        Elem(Bytes::copy_from_slice(from.as_bytes()))
    }
}

impl From<&[u8]> for Elem {
    fn from(from: &[u8]) -> Elem {
        Elem(Bytes::copy_from_slice(from))
    }
}

/// A single decoded reply.
///
/// Exactly one of: nothing (`Nil`), a scalar payload, a list of child replies or an error.
/// `Nil` children are dropped while decoding, so the number of `Elems` can be smaller than the
/// count the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A nil bulk string, e.g. `GET` of a key that doesn't exist
    Nil,

    /// A simple string, integer or bulk string
    Elem(Elem),

    /// Zero, one or more other `Reply`s
    Elems(Vec<Reply>),

    /// An error from the Redis server
    Error(String),

    /// A nil multi-bulk reply, sent by `EXEC` when a `WATCH`ed key changed.  This is not the
    /// same as an empty array.
    Aborted,
}

impl Reply {
    /// Turns server-side errors into an `Err`, leaves everything else as it is.
    pub fn into_result(self) -> Result<Reply, Error> {
        match self {
            Reply::Error(string) => Err(Error::Remote(string)),
            Reply::Aborted => Err(Error::Aborted),
            x => Ok(x),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_) | Reply::Aborted)
    }

    pub fn elem(&self) -> Option<&Elem> {
        match self {
            Reply::Elem(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn elems(&self) -> Option<&[Reply]> {
        match self {
            Reply::Elems(elems) => Some(elems),
            _ => None,
        }
    }

    /// Number of child replies, zero for anything that isn't an array
    pub fn len(&self) -> usize {
        self.elems().map_or(0, <[Reply]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Elem> for Reply {
    fn from(from: Elem) -> Reply {
        Reply::Elem(from)
    }
}

impl From<&str> for Reply {
    fn from(from: &str) -> Reply {
        Reply::Elem(from.into())
    }
}

/// A trait to be implemented for every type which can be read from a `Reply`.
///
/// Implementing this trait on a type means that type becomes a valid return type for
/// `Client::call_as`.
pub trait FromReply: Sized {
    /// Return a `Result` containing either `Self` or `Error`.  Errors can occur due to either: a)
    /// the particular `Reply` being incompatible with the required type, or b) a remote Redis
    /// error occurring.
    fn from_reply(reply: Reply) -> Result<Self, Error> {
        Self::from_reply_int(reply.into_result()?)
    }

    fn from_reply_int(reply: Reply) -> Result<Self, Error>;
}

impl FromReply for Reply {
    fn from_reply_int(reply: Reply) -> Result<Reply, Error> {
        Ok(reply)
    }
}

impl FromReply for Elem {
    fn from_reply_int(reply: Reply) -> Result<Elem, Error> {
        match reply {
            Reply::Elem(elem) => Ok(elem),
            _ => Err(error::resp("Not a scalar reply", reply)),
        }
    }
}

impl FromReply for Bytes {
    fn from_reply_int(reply: Reply) -> Result<Bytes, Error> {
        Elem::from_reply_int(reply).map(Elem::into_bytes)
    }
}

impl FromReply for Vec<u8> {
    fn from_reply_int(reply: Reply) -> Result<Vec<u8>, Error> {
        Elem::from_reply_int(reply).map(|elem| elem.as_bytes().to_vec())
    }
}

impl FromReply for String {
    fn from_reply_int(reply: Reply) -> Result<String, Error> {
        match reply {
            Reply::Elem(ref elem) => Ok(elem.to_string_lossy().into_owned()),
            _ => Err(error::resp("Cannot convert into a string", reply)),
        }
    }
}

impl FromReply for i64 {
    fn from_reply_int(reply: Reply) -> Result<i64, Error> {
        match reply {
            Reply::Elem(ref elem) => elem.as_i64(),
            _ => Err(error::resp("Cannot be converted into an i64", reply)),
        }
    }
}

macro_rules! impl_fromreply_integers {
    ($($int_ty:ident),* $(,)*) => {
        $(
            impl FromReply for $int_ty {
                fn from_reply_int(reply: Reply) -> Result<Self, Error> {
                    i64::from_reply_int(reply).and_then(|x| {
                        $int_ty::try_from(x).map_err(|_| {
                            error::resp(
                                concat!("i64 value cannot be represented as ", stringify!($int_ty)),
                                Reply::Elem(Elem::new(x.to_string())),
                            )
                        })
                    })
                }
            }
        )*
    };
}

impl_fromreply_integers!(isize, usize, i32, u32, u64);

impl FromReply for f64 {
    fn from_reply_int(reply: Reply) -> Result<f64, Error> {
        match reply {
            Reply::Elem(ref elem) => elem.as_f64(),
            _ => Err(error::resp("Cannot be converted into an f64", reply)),
        }
    }
}

impl FromReply for bool {
    fn from_reply_int(reply: Reply) -> Result<bool, Error> {
        match reply {
            Reply::Elem(ref elem) => elem.as_bool(),
            _ => Err(error::resp("Cannot be converted into a bool", reply)),
        }
    }
}

impl<T: FromReply> FromReply for Option<T> {
    fn from_reply_int(reply: Reply) -> Result<Option<T>, Error> {
        match reply {
            Reply::Nil => Ok(None),
            x => Ok(Some(T::from_reply_int(x)?)),
        }
    }
}

impl<T: FromReply> FromReply for Vec<T> {
    fn from_reply_int(reply: Reply) -> Result<Vec<T>, Error> {
        match reply {
            Reply::Elems(elems) => {
                let mut ar = Vec::with_capacity(elems.len());
                for value in elems {
                    ar.push(T::from_reply(value)?);
                }
                Ok(ar)
            }
            _ => Err(error::resp("Cannot be converted into a vector", reply)),
        }
    }
}

impl<K, T, S> FromReply for HashMap<K, T, S>
where
    K: FromReply + Hash + Eq,
    T: FromReply,
    S: BuildHasher + Default,
{
    fn from_reply_int(reply: Reply) -> Result<HashMap<K, T, S>, Error> {
        match reply {
            Reply::Elems(elems) => {
                let mut map = HashMap::with_capacity_and_hasher(elems.len() / 2, S::default());
                let mut items = elems.into_iter();

                while let Some(k) = items.next() {
                    let key = K::from_reply(k)?;
                    let value = T::from_reply(items.next().ok_or_else(|| {
                        Error::RESP(
                            "Cannot convert an odd number of elements into a hashmap".into(),
                            None,
                        )
                    })?)?;

                    map.insert(key, value);
                }

                Ok(map)
            }
            _ => Err(error::resp("Cannot be converted into a hashmap", reply)),
        }
    }
}

impl FromReply for () {
    fn from_reply_int(reply: Reply) -> Result<(), Error> {
        match reply {
            Reply::Elem(ref elem) if elem.as_bytes() == b"OK" => Ok(()),
            _ => Err(error::resp("Unexpected value", reply)),
        }
    }
}

impl<A, B> FromReply for (A, B)
where
    A: FromReply,
    B: FromReply,
{
    fn from_reply_int(reply: Reply) -> Result<(A, B), Error> {
        match reply {
            Reply::Elems(elems) => {
                if elems.len() == 2 {
                    let mut iter = elems.into_iter();
                    match (iter.next(), iter.next()) {
                        (Some(a), Some(b)) => Ok((A::from_reply(a)?, B::from_reply(b)?)),
                        _ => Err(error::unexpected("Array length changed while converting")),
                    }
                } else {
                    Err(Error::RESP(
                        format!("Array needs to be 2 elements, is: {}", elems.len()),
                        None,
                    ))
                }
            }
            _ => Err(error::resp("Unexpected value", reply)),
        }
    }
}
