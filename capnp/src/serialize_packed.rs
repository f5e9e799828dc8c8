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

//! Reading and writing of packed messages.
//!
//! The packing algorithm zero-run-length-encodes each 8-byte word:
//! a tag byte's bits mark which of the word's 8 bytes are nonzero (only
//! those bytes follow in the stream), except that a tag byte of `0x00` or
//! `0xff` switches to a one-byte run-length instead (a count of following
//! all-zero words, respectively non-zero-tag words copied verbatim).

use alloc::vec::Vec;
use std::io::{Read, Write};

use crate::message;
use crate::serialize::{OwnedSegments, SegmentLimits};
use crate::{Error, ErrorKind, OutputSegments, Result, Word};

/// Reads a packed message from `read`, using the default segment limits.
pub fn read_message<R: Read>(
    read: R,
    options: message::ReaderOptions,
) -> Result<message::Reader<OwnedSegments>> {
    read_message_with_limits(read, options, SegmentLimits::default())
}

pub fn read_message_with_limits<R: Read>(
    read: R,
    options: message::ReaderOptions,
    limits: SegmentLimits,
) -> Result<message::Reader<OwnedSegments>> {
    let mut unpacked = Vec::new();
    unpack(read, &mut unpacked)?;

    let mut cursor = &unpacked[..];
    let crate::serialize::SegmentLengths {
        lengths,
        total_words,
    } = crate::serialize::read_segment_table(&mut cursor, limits)?;
    let header_bytes = unpacked.len() - cursor.len();
    let expected_len = header_bytes + total_words as usize * crate::private::units::BYTES_PER_WORD;
    if unpacked.len() != expected_len {
        return Err(Error::from_kind(ErrorKind::InvalidPackedMessage));
    }
    let _ = lengths;

    crate::serialize::read_message_with_limits(&unpacked[..], options, limits)
}

/// Unpacks the entirety of `read` into `out`.
fn unpack<R: Read>(mut read: R, out: &mut Vec<u8>) -> Result<()> {
    let mut tag_buf = [0u8; 1];
    loop {
        match read.read(&mut tag_buf).map_err(crate::convert_io_err)? {
            0 => return Ok(()),
            _ => {}
        }
        let tag = tag_buf[0];
        match tag {
            0x00 => {
                let count = read_byte(&mut read)? as usize + 1;
                out.resize(out.len() + count * 8, 0);
            }
            0xff => {
                let mut word = [0u8; 8];
                read_exact(&mut read, &mut word)?;
                out.extend_from_slice(&word);
                let extra_words = read_byte(&mut read)? as usize;
                if extra_words > 0 {
                    let start = out.len();
                    out.resize(start + extra_words * 8, 0);
                    read_exact(&mut read, &mut out[start..])?;
                }
            }
            _ => {
                let mut word = [0u8; 8];
                for i in 0..8 {
                    if (tag >> i) & 1 == 1 {
                        word[i] = read_byte(&mut read)?;
                    }
                }
                out.extend_from_slice(&word);
            }
        }
    }
}

fn read_byte<R: Read>(read: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(read, &mut buf)?;
    Ok(buf[0])
}

fn read_exact<R: Read>(read: &mut R, buf: &mut [u8]) -> Result<()> {
    match read.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(Error::from_kind(ErrorKind::UnexpectedEof))
        }
        Err(e) => Err(crate::convert_io_err(e)),
    }
}

/// Writes the message built by `message` to `write`, packed.
pub fn write_message<W: Write, A: message::Allocator>(
    write: &mut W,
    message: &message::Builder<A>,
) -> Result<()> {
    write_packed_message_segments(write, &message.get_segments_for_output())
}

pub fn write_packed_message_segments<W: Write>(write: &mut W, segments: &OutputSegments) -> Result<()> {
    let mut buf = Vec::new();
    crate::serialize::write_message_segments(&mut buf, segments)?;
    pack(&buf, write)
}

fn is_zero_word(word: &[u8]) -> bool {
    word.iter().all(|&b| b == 0)
}

fn is_dense_word(word: &[u8]) -> bool {
    word.iter().all(|&b| b != 0)
}

fn pack<W: Write>(unpacked: &[u8], write: &mut W) -> Result<()> {
    debug_assert_eq!(unpacked.len() % 8, 0);
    let word_count = unpacked.len() / 8;
    let mut out = Vec::with_capacity(unpacked.len());
    let mut i = 0usize;
    while i < word_count {
        let word = &unpacked[i * 8..i * 8 + 8];
        if is_zero_word(word) {
            let mut run = 0u32;
            let mut j = i + 1;
            while j < word_count && run < 255 && is_zero_word(&unpacked[j * 8..j * 8 + 8]) {
                run += 1;
                j += 1;
            }
            out.push(0x00);
            out.push(run as u8);
            i = j;
            continue;
        }

        let mut tag = 0u8;
        for (b, &byte) in word.iter().enumerate() {
            if byte != 0 {
                tag |= 1 << b;
            }
        }
        out.push(tag);
        for &byte in word {
            if byte != 0 {
                out.push(byte);
            }
        }
        i += 1;

        if tag == 0xff {
            let mut run = 0u32;
            let mut j = i;
            while j < word_count && run < 255 && is_dense_word(&unpacked[j * 8..j * 8 + 8]) {
                run += 1;
                j += 1;
            }
            out.push(run as u8);
            out.extend_from_slice(&unpacked[i * 8..j * 8]);
            i = j;
        }
    }
    write.write_all(&out).map_err(crate::convert_io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_round_trip_matches_unpacked() {
        let mut message = message::Builder::new_default();
        {
            let root: crate::any_pointer::Builder<'_> = message.init_root();
            let mut sb = root.as_pointer_builder().init_struct(1, 0);
            sb.set_data_field::<u64>(0, 0x0102_0000_0000_0304);
        }

        let mut unpacked = Vec::new();
        crate::serialize::write_message(&mut unpacked, &message).unwrap();

        let mut packed = Vec::new();
        write_message(&mut packed, &message).unwrap();

        let from_unpacked =
            crate::serialize::read_message(&unpacked[..], message::ReaderOptions::new()).unwrap();
        let from_packed = read_message(&packed[..], message::ReaderOptions::new()).unwrap();

        let a = from_unpacked
            .get_root::<crate::any_pointer::Reader<'_>>()
            .unwrap();
        let b = from_packed
            .get_root::<crate::any_pointer::Reader<'_>>()
            .unwrap();
        let sa = a.as_pointer_reader().get_struct(None).unwrap();
        let sb = b.as_pointer_reader().get_struct(None).unwrap();
        assert_eq!(
            sa.get_data_field::<u64>(0),
            sb.get_data_field::<u64>(0)
        );
    }

    #[test]
    fn truncated_packed_stream_is_unexpected_eof() {
        // A lone non-special tag byte promises 1 literal byte but supplies none.
        let bytes = [0x01u8];
        let err = read_message(&bytes[..], message::ReaderOptions::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedEof);
    }

    #[test]
    fn length_mismatch_after_unpacking_is_invalid_packed_message() {
        // Unpacks to a valid-looking header (1 segment, 1 word) but supplies
        // only the header, no segment payload: the embedded header claims
        // more bytes than the stream actually produced.
        let mut unpacked = Vec::new();
        unpacked.extend_from_slice(&0u32.to_le_bytes()); // segment_count - 1 == 0
        unpacked.extend_from_slice(&1u32.to_le_bytes()); // segment 0: 1 word
        // No padding word (odd segment count) and no 8-byte payload follows.

        let mut packed = Vec::new();
        pack(&unpacked, &mut packed).unwrap();

        let err = read_message(&packed[..], message::ReaderOptions::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPackedMessage);
    }
}
