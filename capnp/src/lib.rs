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

//! # capnp
//!
//! This crate contains the runtime library for
//! [Cap'n Proto](https://capnproto.org): a zero-copy, infinite-schema binary
//! message format. It provides:
//!
//! * zero-copy [Reader](crate::message::Reader) / [Builder](crate::message::Builder)
//!   access to encoded messages (see [traits], [any_pointer], [text], [data],
//!   [struct_list], [enum_list], [text_list], [list_list], [capability_list],
//!   [primitive_list]),
//! * the unpacked and packed wire [serialize] / [serialize_packed] stream formats,
//! * a schema-driven [validate] and [canonicalize] pass, built on the plain-data
//!   [schema_model] node graph,
//! * the minimal [capability] handle plumbing that an external RPC implementation
//!   plugs into.
//!
//! Generated code (produced by the `capnpc` crate from a `.capnp` schema) is built
//! entirely out of the public types in this crate; it contains no logic of its own
//! beyond baked-in offsets and default values.

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::type_complexity)]

extern crate alloc;

pub mod any_pointer;
pub mod canonicalize;
pub mod capability;
pub mod capability_list;
pub mod data;
pub mod enum_list;
pub mod list_list;
pub mod message;
pub mod primitive_list;
pub mod private;
pub mod schema_model;
pub mod struct_list;
pub mod text;
pub mod text_list;
pub mod traits;
pub mod validate;

#[cfg(feature = "std")]
pub mod serialize;
#[cfg(feature = "std")]
pub mod serialize_packed;

/// An 8-byte, 8-byte-aligned word: the unit of allocation and pointer
/// arithmetic in a Cap'n Proto message.
#[derive(Copy, Clone)]
#[repr(align(8))]
pub struct Word([u8; 8]);

impl Word {
    pub fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    #[cfg(feature = "alloc")]
    pub fn allocate_zeroed_vec(size: usize) -> alloc::vec::Vec<Self> {
        alloc::vec![Self([0; 8]); size]
    }

    pub fn words_to_bytes(words: &[Self]) -> &[u8] {
        unsafe { core::slice::from_raw_parts(words.as_ptr() as *const u8, words.len() * 8) }
    }

    pub fn words_to_bytes_mut(words: &mut [Self]) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(words.as_mut_ptr() as *mut u8, words.len() * 8) }
    }

    pub fn bytes_to_words(bytes: &[u8]) -> &[Self] {
        assert_eq!(bytes.len() % 8, 0);
        unsafe { core::slice::from_raw_parts(bytes.as_ptr() as *const Self, bytes.len() / 8) }
    }
}

/// The segments that make up the wire representation of a built message,
/// as returned by `message::Builder::get_segments_for_output()`.
pub enum OutputSegments<'a> {
    SingleSegment([&'a [u8]; 1]),
    MultiSegment(alloc::vec::Vec<&'a [u8]>),
}

impl<'a> core::ops::Deref for OutputSegments<'a> {
    type Target = [&'a [u8]];
    fn deref(&self) -> &[&'a [u8]] {
        match self {
            Self::SingleSegment(s) => s,
            Self::MultiSegment(v) => v,
        }
    }
}

/// The maximum number of words in any list or struct, as constrained by the
/// 30-bit fields that carry element and word counts in pointer words.
pub const MAX_TEXT_SIZE: usize = (1 << 29) - 1;

/// Non-fatal size information about a message, as might be used to size an
/// initial allocation via `message::Builder::new` or `HeapAllocator::first_segment_words`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MessageSize {
    pub word_count: u64,
    pub cap_count: u32,
}

impl MessageSize {
    pub fn plus_eq(&mut self, other: Self) {
        self.word_count += other.word_count;
        self.cap_count += other.cap_count;
    }
}

/// The kinds of failures the wire codec, the schema validator, and the code
/// generator driver can report. Every fallible routine in this crate shares
/// this single taxonomy rather than defining its own local error type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    // Wire format.
    OutOfBounds,
    InvalidSegmentCount,
    MessageTooLarge,
    UnexpectedEof,
    InvalidPackedMessage,
    InvalidPointer,
    InvalidFarPointer,
    InvalidInlineCompositePointer,
    InvalidListElementSize,
    InvalidTextPointer,
    InvalidUtf8,
    IndexOutOfBounds,
    ElementCountTooLarge,
    TraversalLimitExceeded,
    NestingLimitExceeded,
    SegmentCountLimitExceeded,
    TruncatedMessage,
    InvalidMessageSize,
    OffsetOverflow,

    // Schema level.
    InvalidSchema,
    InvalidEnumValue,
    StructSizeTooSmall,
    SchemaCycleDetected,
    SchemaRecursionLimitExceeded,
    NonCanonicalSegments,

    // Clone / validate.
    RecursionLimitExceeded,

    // Resource.
    OutOfMemory,

    // Generic / io-adjacent.
    Failed,
    Overloaded,
    Disconnected,
    Unimplemented,
}

impl ErrorKind {
    /// The leading category tag used when an error is printed to stderr by a
    /// command-line frontend (see `capnpc`'s `run()`).
    pub fn category(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            OutOfBounds | InvalidSegmentCount | MessageTooLarge | UnexpectedEof
            | InvalidPackedMessage | InvalidPointer | InvalidFarPointer
            | InvalidInlineCompositePointer | InvalidListElementSize | InvalidTextPointer
            | InvalidUtf8 | IndexOutOfBounds | ElementCountTooLarge | TraversalLimitExceeded
            | NestingLimitExceeded | SegmentCountLimitExceeded | TruncatedMessage
            | InvalidMessageSize | OffsetOverflow => "wire",
            InvalidSchema | InvalidEnumValue | StructSizeTooSmall | SchemaCycleDetected
            | SchemaRecursionLimitExceeded | NonCanonicalSegments | RecursionLimitExceeded => {
                "schema"
            }
            OutOfMemory => "internal",
            Failed | Overloaded | Disconnected | Unimplemented => "internal",
        }
    }
}

/// A description of a failure, with an [ErrorKind] plus freeform context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub extra: alloc::string::String,
}

impl Error {
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            extra: alloc::string::String::new(),
        }
    }

    pub fn from_kind_context(kind: ErrorKind, context: impl Into<alloc::string::String>) -> Self {
        Self {
            kind,
            extra: context.into(),
        }
    }

    /// A catch-all failure, for conditions that don't fit the structured
    /// taxonomy (matches the real library's `Error::failed` escape hatch).
    pub fn failed(message: alloc::string::String) -> Self {
        Self {
            kind: ErrorKind::Failed,
            extra: message,
        }
    }

    pub fn unimplemented(message: impl Into<alloc::string::String>) -> Self {
        Self {
            kind: ErrorKind::Unimplemented,
            extra: message.into(),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.extra.is_empty() {
            write!(f, "{}: {:?}", self.kind.category(), self.kind)
        } else {
            write!(f, "{}: {:?}: {}", self.kind.category(), self.kind, self.extra)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
pub(crate) fn convert_io_err(err: std::io::Error) -> Error {
    use std::io::ErrorKind as K;
    let kind = match err.kind() {
        K::TimedOut => ErrorKind::Overloaded,
        K::BrokenPipe | K::ConnectionRefused | K::ConnectionReset | K::ConnectionAborted
        | K::NotConnected => ErrorKind::Disconnected,
        K::UnexpectedEof => ErrorKind::UnexpectedEof,
        _ => ErrorKind::Failed,
    };
    Error::from_kind_context(kind, alloc::format!("{err}"))
}

pub type Result<T> = core::result::Result<T, Error>;
