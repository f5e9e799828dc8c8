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

//! The seams generated code is built against: turning a raw pointer
//! reader/builder into a typed value, and back.

use crate::Result;
use crate::private::layout::{ListBuilder, ListReader, PointerBuilder, PointerReader};

/// A type-level function from a lifetime to the reader/builder pair
/// generated code uses for a given schema type. Every generated struct,
/// and every one of [crate::any_pointer], gets an `Owned` impl.
pub trait Owned {
    type Reader<'a>: FromPointerReader<'a>;
    type Builder<'a>: FromPointerBuilder<'a>;
}

pub trait FromPointerReader<'a>: Sized {
    fn get_from_pointer(reader: &PointerReader<'a>, default: Option<&'a [crate::Word]>) -> Result<Self>;
}

pub trait FromPointerBuilder<'a>: Sized {
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Self;
    fn get_from_pointer(builder: PointerBuilder<'a>, default: Option<&'a [crate::Word]>) -> Result<Self>;
}

/// Anything that can write itself into a pointer slot: implemented once for
/// each reader type, used by every `set_xxx` generated setter.
pub trait SetPointerBuilder {
    fn set_pointer_builder(pointer: PointerBuilder<'_>, value: Self, canonicalize: bool) -> Result<()>;
}

/// A list element accessor (generic over both primitive and struct/pointer
/// element lists): `myList[i]` without a bounds-checked `Result`, matching
/// how generated code indexes lists once it already trusts `len()`.
pub trait IndexMove<Idx, Out> {
    fn index_move(&self, index: Idx) -> Out;
}

/// Bridges a typed list reader/builder down to the untyped list reader this
/// crate's serialize/canonicalize/validate passes operate on.
pub trait IntoInternalListReader<'a> {
    fn into_internal_list_reader(self) -> ListReader<'a>;
}

/// A by-value iterator over a typed list reader, used by generated code's
/// `IntoIterator` impls.
pub struct ListIter<T, E> {
    marker: core::marker::PhantomData<(T, E)>,
    list: T,
    index: u32,
    count: u32,
}

impl<T, E> ListIter<T, E>
where
    T: IndexMove<u32, E> + Copy,
{
    pub fn new(list: T, count: u32) -> Self {
        Self {
            marker: core::marker::PhantomData,
            list,
            index: 0,
            count,
        }
    }
}

impl<T, E> Iterator for ListIter<T, E>
where
    T: IndexMove<u32, E> + Copy,
{
    type Item = E;
    fn next(&mut self) -> Option<E> {
        if self.index < self.count {
            let result = self.list.index_move(self.index);
            self.index += 1;
            Some(result)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.index) as usize;
        (remaining, Some(remaining))
    }
}

impl<T, E> ExactSizeIterator for ListIter<T, E> where T: IndexMove<u32, E> + Copy {}

impl<T, E> DoubleEndedIterator for ListIter<T, E>
where
    T: IndexMove<u32, E> + Copy,
{
    fn next_back(&mut self) -> Option<E> {
        if self.index < self.count {
            self.count -= 1;
            Some(self.list.index_move(self.count))
        } else {
            None
        }
    }
}

/// Marker for generated typed-struct/list wrapper types that are themselves
/// `Copy` readers/builders over a `ListBuilder`, so that macro-generated
/// impls of `IndexMove` can share this bound.
pub trait FromListBuilder<'a> {
    fn from_list_builder(builder: ListBuilder<'a>) -> Self;
}

pub trait FromListReader<'a> {
    fn from_list_reader(reader: ListReader<'a>) -> Self;
}
