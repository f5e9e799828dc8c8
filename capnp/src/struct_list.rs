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

//! `List(SomeStruct)`: an inline-composite list whose elements are
//! themselves struct readers/builders.

use core::marker::PhantomData;

use crate::private::layout::{ElementSize, ListBuilder, ListReader, PointerBuilder, PointerReader};
use crate::traits::{
    FromPointerBuilder, FromPointerReader, IndexMove, IntoInternalListReader, Owned, SetPointerBuilder,
};
use crate::{Result, Word};

pub struct Owned<T> {
    marker: PhantomData<T>,
}

impl<T> crate::traits::Owned for Owned<T>
where
    T: for<'a> crate::traits::Owned + 'static,
{
    type Reader<'a> = Reader<'a, T>;
    type Builder<'a> = Builder<'a, T>;
}

pub struct Reader<'a, T>
where
    T: crate::traits::Owned,
{
    reader: ListReader<'a>,
    marker: PhantomData<T>,
}

impl<'a, T> Clone for Reader<'a, T>
where
    T: crate::traits::Owned,
{
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Copy for Reader<'a, T> where T: crate::traits::Owned {}

impl<'a, T> Reader<'a, T>
where
    T: crate::traits::Owned,
{
    pub fn new(reader: ListReader<'a>) -> Self {
        Self {
            reader,
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

}

impl<'a, T> Reader<'a, T>
where
    T: crate::traits::Owned,
    T::Reader<'a>: FromStructReader<'a>,
{
    pub fn iter(self) -> crate::traits::ListIter<Self, T::Reader<'a>> {
        crate::traits::ListIter::new(self, self.len())
    }

    pub fn get(self, index: u32) -> T::Reader<'a> {
        assert!(index < self.len());
        let struct_reader = self.reader.get_struct_element(index);
        FromStructReader::from_struct_reader(struct_reader)
    }
}

impl<'a, T> IndexMove<u32, T::Reader<'a>> for Reader<'a, T>
where
    T: crate::traits::Owned,
    T::Reader<'a>: FromStructReader<'a>,
{
    fn index_move(&self, index: u32) -> T::Reader<'a> {
        self.get(index)
    }
}

impl<'a, T> IntoInternalListReader<'a> for Reader<'a, T>
where
    T: crate::traits::Owned,
{
    fn into_internal_list_reader(self) -> ListReader<'a> {
        self.reader
    }
}

impl<'a, T> FromPointerReader<'a> for Reader<'a, T>
where
    T: crate::traits::Owned,
{
    fn get_from_pointer(reader: &PointerReader<'a>, default: Option<&'a [Word]>) -> Result<Self> {
        Ok(Reader::new(reader.get_list(ElementSize::InlineComposite, default)?))
    }
}

pub struct Builder<'a, T>
where
    T: crate::traits::Owned,
{
    builder: ListBuilder<'a>,
    marker: PhantomData<T>,
}

impl<'a, T> Builder<'a, T>
where
    T: crate::traits::Owned,
{
    pub fn new(builder: ListBuilder<'a>) -> Self {
        Self {
            builder,
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    pub fn into_reader(self) -> Reader<'a, T> {
        Reader::new(self.builder.into_reader())
    }
}

impl<'a, T> Builder<'a, T>
where
    T: crate::traits::Owned,
    T::Builder<'a>: FromStructBuilder<'a>,
{
    pub fn get(self, index: u32) -> T::Builder<'a> {
        assert!(index < self.len());
        let struct_builder = self.builder.get_struct_element(index);
        FromStructBuilder::from_struct_builder(struct_builder)
    }
}

impl<'a, T> FromPointerBuilder<'a> for Builder<'a, T>
where
    T: crate::traits::Owned,
{
    fn init_pointer(mut builder: PointerBuilder<'a>, size: u32) -> Self {
        panic!(
            "struct_list::Builder::init_pointer requires (data_words, pointer_count); use init_struct_list_pointer instead. size={size}, ptr={:p}",
            &mut builder as *mut _
        );
    }

    fn get_from_pointer(builder: PointerBuilder<'a>, default: Option<&'a [Word]>) -> Result<Self> {
        Ok(Builder::new(builder.get_list(ElementSize::InlineComposite, default)?))
    }
}

/// Generated code calls this directly (instead of going through
/// [FromPointerBuilder::init_pointer], which cannot express the element
/// shape) since it alone knows each element's data/pointer word counts.
pub fn init_pointer<'a, T>(
    mut builder: PointerBuilder<'a>,
    size: u32,
    data_words: u16,
    pointer_count: u16,
) -> Builder<'a, T>
where
    T: crate::traits::Owned,
{
    Builder::new(builder.init_struct_list(size, data_words, pointer_count))
}

impl<'a, T> SetPointerBuilder for Reader<'a, T>
where
    T: crate::traits::Owned,
{
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self, canonicalize: bool) -> Result<()> {
        pointer.set_list(&value.reader, canonicalize)
    }
}

/// Bridges a raw [crate::private::layout::StructReader] into a generated
/// struct's typed `Reader<'a>`. Every generated struct module provides this
/// (mirroring `FromPointerReader`, but for struct-shaped list elements which
/// don't go through a pointer indirection of their own).
pub trait FromStructReader<'a> {
    fn from_struct_reader(reader: crate::private::layout::StructReader<'a>) -> Self;
}

pub trait FromStructBuilder<'a> {
    fn from_struct_builder(builder: crate::private::layout::StructBuilder<'a>) -> Self;
}
