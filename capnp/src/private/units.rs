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

//! Basic units used throughout the wire format, plus the element-size
//! classification used by list pointers.

pub const BITS_PER_BYTE: usize = 8;
pub const BYTES_PER_WORD: usize = 8;
pub const BITS_PER_WORD: usize = BITS_PER_BYTE * BYTES_PER_WORD;

/// The size, in bits, of a single list element, keyed by the three-bit
/// element-size class embedded in a list pointer word.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

pub fn data_bits_per_element(size: ElementSize) -> u32 {
    match size {
        ElementSize::Void => 0,
        ElementSize::Bit => 1,
        ElementSize::Byte => 8,
        ElementSize::TwoBytes => 16,
        ElementSize::FourBytes => 32,
        ElementSize::EightBytes => 64,
        ElementSize::Pointer => 0,
        ElementSize::InlineComposite => 0,
    }
}

pub fn pointers_per_element(size: ElementSize) -> u32 {
    match size {
        ElementSize::Pointer => 1,
        _ => 0,
    }
}

pub fn element_size_from_tag(tag: u8) -> crate::Result<ElementSize> {
    match tag & 7 {
        0 => Ok(ElementSize::Void),
        1 => Ok(ElementSize::Bit),
        2 => Ok(ElementSize::Byte),
        3 => Ok(ElementSize::TwoBytes),
        4 => Ok(ElementSize::FourBytes),
        5 => Ok(ElementSize::EightBytes),
        6 => Ok(ElementSize::Pointer),
        7 => Ok(ElementSize::InlineComposite),
        _ => unreachable!(),
    }
}

/// Rounds `bits` up to the next whole number of bytes.
pub fn round_bits_up_to_bytes(bits: u64) -> u64 {
    (bits + 7) / BITS_PER_BYTE as u64
}

/// Rounds `bytes` up to the next whole number of words.
pub fn round_bytes_up_to_words(bytes: u64) -> u64 {
    (bytes + 7) / BYTES_PER_WORD as u64
}
