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

//! `AnyPointer`: a field whose schema type isn't known until read, wrapping
//! a raw [PointerReader]/[PointerBuilder] with typed `get_as`/`set_as`/`init_as`
//! accessors plus the deep-copy-preserving-kind clone used by generated code's
//! `AnyPointer` fields and by [crate::message::Reader::canonicalize].

use crate::Result;
use crate::private::layout::{self, PointerBuilder, PointerReader, DEFAULT_CLONE_DEPTH_LIMIT};
use crate::traits::{FromPointerBuilder, FromPointerReader, Owned, SetPointerBuilder};

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: PointerReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new(reader: PointerReader<'a>) -> Self {
        Self { reader }
    }

    pub fn is_null(&self) -> bool {
        self.reader.is_null()
    }

    pub fn total_size(&self) -> Result<crate::MessageSize> {
        self.reader.total_size()
    }

    pub fn target_size(&self) -> Result<crate::MessageSize> {
        self.reader.target_size()
    }

    pub fn get_as<T: FromPointerReader<'a>>(self) -> Result<T> {
        T::get_from_pointer(&self.reader, None)
    }

    pub fn get_capability(self) -> Result<u32> {
        self.reader.get_capability()
    }

    /// Exposes the raw pointer reader underneath, for callers (the schema
    /// validator, the canonicalizer) that need to interpret a pointer
    /// according to a schema type decided at runtime rather than at compile
    /// time.
    pub fn as_pointer_reader(&self) -> PointerReader<'a> {
        self.reader
    }

    /// Deep-copies whatever this pointer refers to into `other`, preserving
    /// its wire kind (struct, list, or capability) without needing to know
    /// its schema. Bounded to [DEFAULT_CLONE_DEPTH_LIMIT] pointer hops.
    pub fn clone_into(self, mut other: Builder<'_>) -> Result<()> {
        layout::deep_copy_pointer(other.builder.reborrow(), self.reader, DEFAULT_CLONE_DEPTH_LIMIT)
    }
}

pub struct Builder<'a> {
    builder: PointerBuilder<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(builder: PointerBuilder<'a>) -> Self {
        Self { builder }
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            builder: self.builder.reborrow(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.builder.is_null()
    }

    pub fn clear(&mut self) {
        self.builder.clear()
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader {
            reader: self.builder.as_reader(),
        }
    }

    pub fn get_as<T: FromPointerBuilder<'a>>(self) -> Result<T> {
        T::get_from_pointer(self.builder, None)
    }

    pub fn init_as<T: FromPointerBuilder<'a>>(self, size: u32) -> T {
        T::init_pointer(self.builder, size)
    }

    pub fn set_as<T>(&mut self, value: T) -> Result<()>
    where
        T: SetPointerBuilder,
    {
        SetPointerBuilder::set_pointer_builder(self.builder.reborrow(), value, false)
    }

    pub fn set_capability(&mut self, index: u32) {
        self.builder.set_capability(index)
    }

    pub fn copy_from(&mut self, other: Reader<'_>) -> Result<()> {
        self.builder.copy_from(other.reader, false)
    }

    /// Exposes the raw pointer builder underneath, for callers that need to
    /// initialize a pointer according to a schema type decided at runtime
    /// (mirrors [Reader::as_pointer_reader]).
    pub fn as_pointer_builder(self) -> PointerBuilder<'a> {
        self.builder
    }
}

/// The zero-sized marker used as the schema type for untyped pointer fields,
/// giving `AnyPointer` fields their `Reader<'a>`/`Builder<'a>` pair through
/// the same [Owned] seam every generated struct field uses.
pub struct AnyPointer;

impl Owned for AnyPointer {
    type Reader<'a> = Reader<'a>;
    type Builder<'a> = Builder<'a>;
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>, _default: Option<&'a [crate::Word]>) -> Result<Self> {
        Ok(Reader::new(*reader))
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: PointerBuilder<'a>, _size: u32) -> Self {
        Builder::new(builder)
    }
    fn get_from_pointer(builder: PointerBuilder<'a>, _default: Option<&'a [crate::Word]>) -> Result<Self> {
        Ok(Builder::new(builder))
    }
}

impl<'a> SetPointerBuilder for Reader<'a> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self, canonicalize: bool) -> Result<()> {
        pointer.copy_from(value.reader, canonicalize)
    }
}
