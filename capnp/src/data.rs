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

//! `Data`: a plain byte list, with no NUL convention and no encoding assumed.

use crate::private::layout::{ElementSize, PointerBuilder, PointerReader};
use crate::traits::{FromPointerBuilder, FromPointerReader, SetPointerBuilder};
use crate::{Result, Word};

pub type Reader<'a> = &'a [u8];

fn get_reader<'a>(pointer: &PointerReader<'a>, default: Option<&'a [Word]>) -> Result<Reader<'a>> {
    if pointer.is_null() && default.is_none() {
        return Ok(&[]);
    }
    let list = pointer.get_list(ElementSize::Byte, default)?;
    Ok(list.into_raw_bytes())
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>, default: Option<&'a [Word]>) -> Result<Self> {
        get_reader(reader, default)
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

    pub fn copy_from_slice(&mut self, src: &[u8]) {
        self.bytes.copy_from_slice(src);
    }

    pub fn into_reader(self) -> Reader<'a> {
        self.bytes
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(mut builder: PointerBuilder<'a>, size: u32) -> Self {
        let mut list = builder.init_list(ElementSize::Byte, size);
        Builder {
            bytes: list.as_raw_bytes(),
        }
    }

    fn get_from_pointer(builder: PointerBuilder<'a>, default: Option<&'a [Word]>) -> Result<Self> {
        if builder.is_null() {
            return match default {
                None => Ok(Builder::init_pointer(builder, 0)),
                Some(d) => {
                    let bytes = Word::words_to_bytes(d);
                    let mut b = Builder::init_pointer(builder, bytes.len() as u32);
                    b.bytes.copy_from_slice(bytes);
                    Ok(b)
                }
            };
        }
        let mut list = builder.get_list(ElementSize::Byte, default)?;
        Ok(Builder {
            bytes: list.as_raw_bytes(),
        })
    }
}

impl<'a> SetPointerBuilder for &'a [u8] {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self, _canonicalize: bool) -> Result<()> {
        let mut b = pointer.init_list(ElementSize::Byte, value.len() as u32);
        b.as_raw_bytes().copy_from_slice(value);
        Ok(())
    }
}
