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

//! `List(SomeInterface)`: a pointer list whose elements are capability
//! pointers, each indexing into the message's capability table.

use core::marker::PhantomData;

use crate::Result;
use crate::private::layout::{ElementSize, ListBuilder, ListReader, PointerBuilder, PointerReader};
use crate::traits::{FromPointerBuilder, FromPointerReader, IndexMove, IntoInternalListReader, ListIter};

pub struct Owned<T> {
    marker: PhantomData<T>,
}

impl<T> crate::traits::Owned for Owned<T>
where
    T: 'static,
{
    type Reader<'a> = Reader<'a, T>;
    type Builder<'a> = Builder<'a, T>;
}

pub struct Reader<'a, T> {
    marker: PhantomData<T>,
    reader: ListReader<'a>,
}

impl<T> Copy for Reader<'_, T> {}
impl<T> Clone for Reader<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Reader<'a, T> {
    pub fn new(reader: ListReader<'a>) -> Self {
        Self {
            marker: PhantomData,
            reader,
        }
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the capability table index at `index`. Resolving that index
    /// into an actual `T` client is left to the RPC layer plugged in on top
    /// of this crate, which owns the table.
    pub fn get(self, index: u32) -> Result<u32> {
        assert!(index < self.len());
        self.reader.get_pointer_element(index).get_capability()
    }

    pub fn iter(self) -> ListIter<Self, Result<u32>> {
        let l = self.len();
        ListIter::new(self, l)
    }
}

impl<'a, T> IndexMove<u32, Result<u32>> for Reader<'a, T> {
    fn index_move(&self, index: u32) -> Result<u32> {
        self.get(index)
    }
}

impl<'a, T> IntoInternalListReader<'a> for Reader<'a, T> {
    fn into_internal_list_reader(self) -> ListReader<'a> {
        self.reader
    }
}

impl<'a, T: 'static> FromPointerReader<'a> for Reader<'a, T> {
    fn get_from_pointer(reader: &PointerReader<'a>, default: Option<&'a [crate::Word]>) -> Result<Self> {
        Ok(Reader::new(reader.get_list(ElementSize::Pointer, default)?))
    }
}

pub struct Builder<'a, T> {
    marker: PhantomData<T>,
    builder: ListBuilder<'a>,
}

impl<'a, T> Builder<'a, T> {
    pub fn new(builder: ListBuilder<'a>) -> Self {
        Self {
            marker: PhantomData,
            builder,
        }
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_reader(self) -> Reader<'a, T> {
        Reader::new(self.builder.into_reader())
    }

    pub fn set(&mut self, index: u32, cap_index: u32) {
        assert!(index < self.len());
        self.builder.get_pointer_element(index).set_capability(cap_index);
    }
}

impl<'a, T: 'static> FromPointerBuilder<'a> for Builder<'a, T> {
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Self {
        Builder::new(builder.init_list(ElementSize::Pointer, size))
    }
    fn get_from_pointer(builder: PointerBuilder<'a>, default: Option<&'a [crate::Word]>) -> Result<Self> {
        Ok(Builder::new(builder.get_list(ElementSize::Pointer, default)?))
    }
}

impl<'a, T> crate::traits::SetPointerBuilder for Reader<'a, T> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self, canonicalize: bool) -> Result<()> {
        pointer.set_list(&value.reader, canonicalize)
    }
}
