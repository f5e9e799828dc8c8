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

//! `List(Text)`: a pointer list whose elements are `Text` fields.

use crate::Result;
use crate::private::layout::{ElementSize, ListBuilder, ListReader, PointerBuilder, PointerReader};
use crate::text;
use crate::traits::{
    FromPointerBuilder, FromPointerReader, IndexMove, IntoInternalListReader, ListIter, SetPointerBuilder,
};

#[derive(Clone, Copy)]
pub struct Owned;

impl crate::traits::Owned for Owned {
    type Reader<'a> = Reader<'a>;
    type Builder<'a> = Builder<'a>;
}

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: ListReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new(reader: ListReader<'a>) -> Self {
        Self { reader }
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(self, index: u32) -> Result<text::Reader<'a>> {
        assert!(index < self.len());
        text::Reader::get_from_pointer(&self.reader.get_pointer_element(index), None)
    }

    pub fn iter(self) -> ListIter<Self, Result<text::Reader<'a>>> {
        let l = self.len();
        ListIter::new(self, l)
    }
}

impl<'a> IndexMove<u32, Result<text::Reader<'a>>> for Reader<'a> {
    fn index_move(&self, index: u32) -> Result<text::Reader<'a>> {
        self.get(index)
    }
}

impl<'a> IntoInternalListReader<'a> for Reader<'a> {
    fn into_internal_list_reader(self) -> ListReader<'a> {
        self.reader
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>, default: Option<&'a [crate::Word]>) -> Result<Self> {
        Ok(Reader::new(reader.get_list(ElementSize::Pointer, default)?))
    }
}

pub struct Builder<'a> {
    builder: ListBuilder<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(builder: ListBuilder<'a>) -> Self {
        Self { builder }
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader::new(self.builder.into_reader())
    }

    pub fn get(self, index: u32) -> Result<text::Reader<'a>> {
        assert!(index < self.len());
        text::Builder::get_from_pointer(self.builder.get_pointer_element(index), None)
            .map(text::Builder::into_reader)
    }

    pub fn set(&mut self, index: u32, value: text::Reader<'_>) -> Result<()> {
        assert!(index < self.len());
        SetPointerBuilder::set_pointer_builder(self.builder.get_pointer_element(index), value, false)
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Self {
        Builder::new(builder.init_list(ElementSize::Pointer, size))
    }
    fn get_from_pointer(builder: PointerBuilder<'a>, default: Option<&'a [crate::Word]>) -> Result<Self> {
        Ok(Builder::new(builder.get_list(ElementSize::Pointer, default)?))
    }
}

impl<'a> SetPointerBuilder for Reader<'a> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self, canonicalize: bool) -> Result<()> {
        pointer.set_list(&value.reader, canonicalize)
    }
}
