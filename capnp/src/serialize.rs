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

//! Reading and writing of unpacked messages on a byte stream.
//!
//! A stream framed this way starts with `segment_count - 1 : u32 LE`,
//! followed by `segment_count` segment lengths (each `u32 LE`, in words),
//! followed (after padding out to a word boundary) by the segments
//! themselves, back to back.

use alloc::vec::Vec;
use std::io::{Read, Write};

use crate::message;
use crate::private::units::BYTES_PER_WORD;
use crate::{Error, ErrorKind, OutputSegments, Result, Word};

/// Segment-count / total-size caps applied while parsing a segment table,
/// before any allocation happens. An attacker can claim an enormous
/// segment count or segment lengths in four bytes; these limits bound how
/// much we're willing to allocate on their say-so.
#[derive(Clone, Copy, Debug)]
pub struct SegmentLimits {
    pub max_segments: u32,
    pub max_total_words: u64,
}

pub const DEFAULT_SEGMENT_LIMITS: SegmentLimits = SegmentLimits {
    max_segments: 512,
    max_total_words: 8 * 1024 * 1024,
};

impl Default for SegmentLimits {
    fn default() -> Self {
        DEFAULT_SEGMENT_LIMITS
    }
}

/// The segment lengths (in words) decoded from a stream's header, plus the
/// total, still subject to [SegmentLimits].
pub(crate) struct SegmentLengths {
    pub(crate) lengths: Vec<u32>,
    pub(crate) total_words: u64,
}

pub(crate) fn read_segment_table<R: Read>(read: &mut R, limits: SegmentLimits) -> Result<SegmentLengths> {
    let mut buf4 = [0u8; 4];
    read_exact_eof(read, &mut buf4)?;
    let segment_count_minus_one = u32::from_le_bytes(buf4);
    if segment_count_minus_one == u32::MAX {
        // 0xFFFFFFFF is never a plausible segment count (it would overflow the
        // widening below); treat it as a malformed header rather than merely
        // "too many segments".
        return Err(Error::from_kind(ErrorKind::InvalidSegmentCount));
    }
    let segment_count = segment_count_minus_one as u64 + 1;
    if segment_count > limits.max_segments as u64 {
        return Err(Error::from_kind(ErrorKind::SegmentCountLimitExceeded));
    }

    let mut lengths = Vec::with_capacity(segment_count as usize);
    let mut total_words: u64 = 0;
    for _ in 0..segment_count {
        read_exact_eof(read, &mut buf4)?;
        let len = u32::from_le_bytes(buf4);
        total_words += len as u64;
        lengths.push(len);
    }
    if total_words > limits.max_total_words {
        return Err(Error::from_kind(ErrorKind::MessageTooLarge));
    }

    // The header (segment_count_minus_one plus each length) is padded to a
    // multiple of 8 bytes with a zero word when there's an even number of
    // u32s (i.e. an odd number of segments).
    if segment_count % 2 == 0 {
        read_exact_eof(read, &mut buf4)?;
    }

    Ok(SegmentLengths {
        lengths,
        total_words,
    })
}

fn read_exact_eof<R: Read>(read: &mut R, buf: &mut [u8]) -> Result<()> {
    match read.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(Error::from_kind(ErrorKind::UnexpectedEof))
        }
        Err(e) => Err(crate::convert_io_err(e)),
    }
}

/// Owned storage backing a message read off a stream: one contiguous,
/// word-aligned allocation sliced up per the segment table.
pub struct OwnedSegments {
    segment_slices: Vec<(usize, usize)>,
    owned_space: Vec<Word>,
}

impl message::ReaderSegments for OwnedSegments {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.segment_slices.get(id as usize).map(|&(start, end)| {
            Word::words_to_bytes(&self.owned_space[start..end])
        })
    }

    fn len(&self) -> usize {
        self.segment_slices.len()
    }
}

/// Reads a message from `read`, using the default [SegmentLimits].
pub fn read_message<R: Read>(
    read: R,
    options: message::ReaderOptions,
) -> Result<message::Reader<OwnedSegments>> {
    read_message_with_limits(read, options, DEFAULT_SEGMENT_LIMITS)
}

pub fn read_message_with_limits<R: Read>(
    mut read: R,
    options: message::ReaderOptions,
    limits: SegmentLimits,
) -> Result<message::Reader<OwnedSegments>> {
    let SegmentLengths {
        lengths,
        total_words,
    } = read_segment_table(&mut read, limits)?;

    let mut owned_space = Word::allocate_zeroed_vec(total_words as usize);
    read_exact_eof(&mut read, Word::words_to_bytes_mut(&mut owned_space))?;

    let mut segment_slices = Vec::with_capacity(lengths.len());
    let mut start = 0usize;
    for len in lengths {
        let end = start + len as usize;
        segment_slices.push((start, end));
        start = end;
    }

    Ok(message::Reader::new(
        OwnedSegments {
            segment_slices,
            owned_space,
        },
        options,
    ))
}

/// Writes `segments` to `write` in the unpacked stream format.
pub fn write_message_segments<W: Write>(write: &mut W, segments: &OutputSegments) -> Result<()> {
    write_segment_table(write, segments)?;
    write_segments(write, segments)
}

fn write_segment_table<W: Write>(write: &mut W, segments: &OutputSegments) -> Result<()> {
    let segment_count = segments.len();

    write
        .write_all(&(segment_count as u32 - 1).to_le_bytes())
        .map_err(crate::convert_io_err)?;

    for segment in segments.iter() {
        let words = segment.len() / BYTES_PER_WORD;
        write
            .write_all(&(words as u32).to_le_bytes())
            .map_err(crate::convert_io_err)?;
    }

    if segment_count % 2 == 0 {
        write.write_all(&[0; 4]).map_err(crate::convert_io_err)?;
    }
    Ok(())
}

fn write_segments<W: Write>(write: &mut W, segments: &OutputSegments) -> Result<()> {
    for segment in segments.iter() {
        write.write_all(segment).map_err(crate::convert_io_err)?;
    }
    Ok(())
}

/// Writes the message built by `message` to `write`.
pub fn write_message<W: Write, A: message::Allocator>(
    write: &mut W,
    message: &message::Builder<A>,
) -> Result<()> {
    write_message_segments(write, &message.get_segments_for_output())
}

/// Total number of bytes `write_message` would write for this message.
pub fn compute_serialized_size_in_words<A: message::Allocator>(message: &message::Builder<A>) -> usize {
    let segments = message.get_segments_for_output();
    let header_words = (segments.len() / 2) + 1;
    let body_words: usize = segments.iter().map(|s| s.len() / BYTES_PER_WORD).sum();
    header_words + body_words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_count_minus_one_of_u32_max_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = read_message(&bytes[..], message::ReaderOptions::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSegmentCount);
    }

    #[test]
    fn total_words_one_above_limit_is_rejected() {
        let limits = SegmentLimits {
            max_segments: 512,
            max_total_words: 10,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes()); // segment_count - 1 == 0
        bytes.extend_from_slice(&11u32.to_le_bytes()); // one word over the cap
        bytes.extend_from_slice(&0u32.to_le_bytes()); // header padding
        bytes.resize(bytes.len() + 11 * BYTES_PER_WORD, 0);
        let err =
            read_message_with_limits(&bytes[..], message::ReaderOptions::new(), limits).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MessageTooLarge);
    }

    #[test]
    fn segment_count_above_limit_is_rejected() {
        let limits = SegmentLimits {
            max_segments: 2,
            max_total_words: DEFAULT_SEGMENT_LIMITS.max_total_words,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes()); // segment_count - 1 == 2 -> 3 segments
        for _ in 0..3 {
            bytes.extend_from_slice(&1u32.to_le_bytes());
        }
        let err =
            read_message_with_limits(&bytes[..], message::ReaderOptions::new(), limits).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SegmentCountLimitExceeded);
    }

    #[test]
    fn truncated_header_surfaces_as_unexpected_eof() {
        let bytes = [0u8; 2];
        let err = read_message(&bytes[..], message::ReaderOptions::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedEof);
    }

    #[test]
    fn null_root_round_trips_to_empty_defaults() {
        let mut message = message::Builder::new_default();
        {
            let _root: crate::any_pointer::Builder<'_> = message.init_root();
        }
        let mut bytes = Vec::new();
        write_message(&mut bytes, &message).unwrap();
        let reader = read_message(&bytes[..], message::ReaderOptions::new()).unwrap();
        let root = reader
            .get_root::<crate::any_pointer::Reader<'_>>()
            .unwrap();
        assert!(root.as_pointer_reader().is_null());
        let text: crate::text::Reader<'_> = root.get_as().unwrap();
        assert_eq!(text.to_str().unwrap(), "");
        let data: crate::data::Reader<'_> = root.get_as().unwrap();
        assert_eq!(data, &b""[..]);
        let sr: crate::private::layout::StructReader<'_> = root.as_pointer_reader().get_struct(None).unwrap();
        assert_eq!(sr.get_data_field::<u64>(0), 0);
    }

    /// A double-hop far pointer's landing pad must start with a single-hop
    /// far pointer; a landing pad whose first word is some other pointer
    /// kind is a malformed message, not a value to silently reinterpret.
    #[test]
    fn double_far_with_mistyped_landing_pad_is_rejected() {
        let root_word: u64 = 2 | (1 << 2) | (1u64 << 32); // double-far -> segment 1, offset 0
        let landing_word0: u64 = 0; // kind bits == 00 (struct), not a far pointer
        let landing_word1: u64 = 0;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes()); // segment_count - 1 == 1
        bytes.extend_from_slice(&1u32.to_le_bytes()); // segment 0: 1 word
        bytes.extend_from_slice(&2u32.to_le_bytes()); // segment 1: 2 words
        bytes.extend_from_slice(&0u32.to_le_bytes()); // header padding (2 segments is even)
        bytes.extend_from_slice(&root_word.to_le_bytes());
        bytes.extend_from_slice(&landing_word0.to_le_bytes());
        bytes.extend_from_slice(&landing_word1.to_le_bytes());

        let reader = read_message(&bytes[..], message::ReaderOptions::new()).unwrap();
        let root = reader
            .get_root::<crate::any_pointer::Reader<'_>>()
            .unwrap();
        let err = root
            .as_pointer_reader()
            .get_struct(None)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFarPointer);
    }
}
