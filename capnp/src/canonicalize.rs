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

//! Schema-aware canonicalization (C9): produces the structurally minimal,
//! single-segment encoding of a message, optionally validating it against a
//! schema graph first.
//!
//! The hard part — trimming trailing zero words off a struct's data section,
//! trimming trailing default-valued elements off a list, and rebuilding
//! everything into one segment — already lives in
//! [crate::message::Reader::canonicalize] and
//! [crate::message::Builder::set_root_canonical], both schema-less (the wire
//! format alone determines the canonical form of a well-formed message). This
//! module adds the policy layer most callers actually want on top of that:
//! canonicalizing a message should, by default, first confirm the message is
//! valid against its schema, since a malformed-but-well-formed message can
//! still have a structurally "canonical" encoding.

use alloc::vec::Vec;

use crate::message::{Reader, ReaderSegments};
use crate::schema_model::{NodeId, SchemaGraph};
use crate::validate::{validate, ValidationOptions};
use crate::{Result, Word};

/// Whether [canonicalize] should validate the message against its schema
/// before producing the canonical encoding, and with what limits.
#[derive(Clone, Copy, Debug)]
pub struct CanonicalizeOptions {
    pub validate: bool,
    pub validation: ValidationOptions,
}

impl Default for CanonicalizeOptions {
    fn default() -> Self {
        Self {
            validate: true,
            validation: ValidationOptions::default(),
        }
    }
}

/// Produces the canonical single-segment encoding of `message`'s root,
/// interpreted as a value of schema type `root_id` in `graph`.
///
/// With `options.validate` set (the default), a message that doesn't
/// validate against `graph` is rejected before any bytes are copied — turning
/// it into canonical bytes first would just launder an invalid message into
/// something that looks trustworthy.
pub fn canonicalize<S: ReaderSegments>(
    graph: &SchemaGraph,
    root_id: NodeId,
    message: &Reader<S>,
    options: CanonicalizeOptions,
) -> Result<Vec<Word>> {
    if options.validate {
        let root = message.get_root::<crate::any_pointer::Reader<'_>>()?;
        validate(graph, root_id, root.as_pointer_reader(), options.validation)?;
    }
    message.canonicalize()
}

/// Checks whether `message`'s current encoding is already canonical, without
/// copying it. Schema-less, like [crate::message::Reader::is_canonical]: a
/// well-formed-but-invalid message can still be structurally canonical, so a
/// caller that also cares about schema validity should call
/// [crate::validate::validate] separately.
pub fn is_canonical<S: ReaderSegments>(message: &Reader<S>) -> Result<bool> {
    message.is_canonical()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message;
    use crate::schema_model::{Field, FieldKind, Node, NodeKind, StructNode, NO_DISCRIMINANT};
    use alloc::string::ToString;
    use alloc::vec;

    fn pair_node() -> Node {
        Node {
            id: 1,
            display_name: "Pair".to_string(),
            display_name_prefix_length: 0,
            scope_id: 0,
            nested_nodes: Vec::new(),
            kind: NodeKind::Struct(StructNode {
                data_word_count: 1,
                pointer_count: 0,
                is_group: false,
                discriminant_count: 0,
                discriminant_offset: 0,
                fields: vec![Field {
                    name: "a".to_string(),
                    discriminant_value: NO_DISCRIMINANT,
                    kind: FieldKind::Slot {
                        offset: 0,
                        ty: crate::schema_model::Type::UInt32,
                        default: crate::schema_model::DefaultValue::none(),
                    },
                }],
            }),
        }
    }

    #[test]
    fn valid_message_canonicalizes() {
        let graph = SchemaGraph::new(vec![pair_node()]);
        let mut builder = message::Builder::new_default();
        {
            let root: crate::any_pointer::Builder<'_> = builder.init_root();
            let mut sb = root.as_pointer_builder().init_struct(1, 0);
            sb.set_data_field::<u32>(0, 42);
        }
        let reader = builder.into_reader();
        let bytes = canonicalize(&graph, 1, &reader, CanonicalizeOptions::default()).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn invalid_message_is_rejected_when_validation_enabled() {
        let bad_node = Node {
            id: 2,
            display_name: "BadEnum".to_string(),
            display_name_prefix_length: 0,
            scope_id: 0,
            nested_nodes: Vec::new(),
            kind: NodeKind::Struct(StructNode {
                data_word_count: 1,
                pointer_count: 0,
                is_group: false,
                discriminant_count: 0,
                discriminant_offset: 0,
                fields: vec![Field {
                    name: "color".to_string(),
                    discriminant_value: NO_DISCRIMINANT,
                    kind: FieldKind::Slot {
                        offset: 0,
                        ty: crate::schema_model::Type::Enum(999),
                        default: crate::schema_model::DefaultValue::none(),
                    },
                }],
            }),
        };
        let graph = SchemaGraph::new(vec![bad_node]);
        let mut builder = message::Builder::new_default();
        {
            let root: crate::any_pointer::Builder<'_> = builder.init_root();
            let mut sb = root.as_pointer_builder().init_struct(1, 0);
            sb.set_data_field::<u16>(0, 0);
        }
        let reader = builder.into_reader();
        // The enum type id (999) does not exist in `graph`, so validation
        // itself fails with InvalidSchema rather than InvalidEnumValue.
        let err = canonicalize(&graph, 2, &reader, CanonicalizeOptions::default()).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::InvalidSchema);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let graph = SchemaGraph::new(vec![pair_node()]);
        let mut builder = message::Builder::new_default();
        {
            let root: crate::any_pointer::Builder<'_> = builder.init_root();
            let mut sb = root.as_pointer_builder().init_struct(1, 0);
            sb.set_data_field::<u32>(0, 42);
        }
        let reader = builder.into_reader();
        let once = canonicalize(&graph, 1, &reader, CanonicalizeOptions::default()).unwrap();

        let segments = [Word::words_to_bytes(&once)];
        let canon_reader = message::Reader::new(
            message::SegmentArray::new(&segments),
            message::ReaderOptions::new(),
        );
        let twice = canonicalize(&graph, 1, &canon_reader, CanonicalizeOptions::default()).unwrap();

        assert_eq!(Word::words_to_bytes(&once), Word::words_to_bytes(&twice));
    }
}
