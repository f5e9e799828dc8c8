// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! `Text`: a byte list with a mandatory trailing NUL that is not counted in
//! its logical length, interpreted strictly as UTF-8.

use alloc::string::String;

use crate::private::layout::{ElementSize, ListBuilder, PointerBuilder, PointerReader};
use crate::traits::{FromPointerBuilder, FromPointerReader, SetPointerBuilder};
use crate::{Error, ErrorKind, Result, Word};

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    /// `bytes` must not include the trailing NUL.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_str(&self) -> Result<&'a str> {
        core::str::from_utf8(self.bytes).map_err(|_| Error::from_kind(ErrorKind::InvalidUtf8))
    }
}

impl<'a> TryFrom<Reader<'a>> for &'a str {
    type Error = Error;
    fn try_from(value: Reader<'a>) -> Result<Self> {
        value.to_str()
    }
}

impl<'a> core::fmt::Debug for Reader<'a> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.to_str() {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "{:?}", self.bytes),
        }
    }
}

pub struct Builder<'a> {
    bytes: &'a mut [u8],
}

impl<'a> Builder<'a> {
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    pub fn push_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.bytes[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn to_str(&self) -> Result<&str> {
        core::str::from_utf8(self.bytes).map_err(|_| Error::from_kind(ErrorKind::InvalidUtf8))
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader { bytes: self.bytes }
    }
}

fn get_reader<'a>(pointer: &PointerReader<'a>, default: Option<&'a [Word]>) -> Result<Reader<'a>> {
    if pointer.is_null() {
        return match default {
            None => Ok(Reader::new(&[])),
            Some(d) => {
                let bytes = Word::words_to_bytes(d);
                Ok(Reader::new(trim_nul(bytes)))
            }
        };
    }
    let list = pointer.get_list(ElementSize::Byte, default)?;
    let bytes = list.into_raw_bytes();
    Ok(Reader::new(trim_nul(bytes)))
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    if bytes.is_empty() {
        bytes
    } else {
        &bytes[..bytes.len() - 1]
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>, default: Option<&'a [Word]>) -> Result<Self> {
        get_reader(reader, default)
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(mut builder: PointerBuilder<'a>, size: u32) -> Self {
        let mut list: ListBuilder<'a> = builder.init_list(ElementSize::Byte, size + 1);
        Builder {
            bytes: &mut list.as_raw_bytes()[..size as usize],
        }
    }

    fn get_from_pointer(builder: PointerBuilder<'a>, default: Option<&'a [Word]>) -> Result<Self> {
        if builder.is_null() {
            return match default {
                None => Ok(Builder::init_pointer(builder, 0)),
                Some(d) => {
                    let bytes = trim_nul(Word::words_to_bytes(d));
                    let mut b = Builder::init_pointer(builder, bytes.len() as u32);
                    b.bytes.copy_from_slice(bytes);
                    Ok(b)
                }
            };
        }
        let mut list = builder.get_list(ElementSize::Byte, default)?;
        let raw = list.as_raw_bytes();
        let len = raw.len().saturating_sub(1);
        Ok(Builder { bytes: &mut raw[..len] })
    }
}

impl<'a> SetPointerBuilder for Reader<'a> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self, _canonicalize: bool) -> Result<()> {
        let mut b = pointer.init_list(ElementSize::Byte, value.bytes.len() as u32 + 1);
        b.as_raw_bytes()[..value.bytes.len()].copy_from_slice(value.bytes);
        Ok(())
    }
}

impl<'a> SetPointerBuilder for &'a str {
    fn set_pointer_builder(pointer: PointerBuilder<'_>, value: Self, canonicalize: bool) -> Result<()> {
        Reader::set_pointer_builder(pointer, Reader::new(value.as_bytes()), canonicalize)
    }
}

/// Owned UTF-8 text, used as the value type of a `Text` field's default and
/// by test helpers that need a heap-owned copy rather than a reader borrowed
/// from a message.
pub fn to_owned_string(reader: Reader<'_>) -> Result<String> {
    Ok(String::from(reader.to_str()?))
}
