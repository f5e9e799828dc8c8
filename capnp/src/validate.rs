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

//! Schema-driven integrity check (C8): walks a decoded message guided by a
//! [SchemaGraph], confirming that every pointer resolves to the wire shape
//! its declared type demands, that union discriminants select a live
//! variant, and that enum ordinals and struct sizes are in range.
//!
//! Two independent guards bound the walk: a traversal-word budget shared
//! with the generic reader machinery (so a small encoded graph can't be
//! replayed into an exponential number of visits), and a schema-depth /
//! group-cycle guard so a self-nesting group can't recurse forever. See the
//! module-level cycle rule below — it is the one piece of this file that is
//! easy to get wrong in either direction.

use alloc::vec::Vec;

use crate::private::layout::{ElementSize, ListReader, PointerReader, StructReader};
use crate::private::units::round_bytes_up_to_words;
use crate::schema_model::{DefaultValue, Field, FieldKind, NodeId, SchemaGraph, StructNode, Type};
use crate::{Error, ErrorKind, Result};

/// Limits and strictness knobs for a single [validate] call. Defaults match
/// the crate-wide defaults in the external interface table.
#[derive(Clone, Copy, Debug)]
pub struct ValidationOptions {
    pub traversal_limit_words: u64,
    /// Caps both pointer-descent depth and group-chain length (see the
    /// module docs). Named `nesting_limit` to match the option as exposed
    /// by callers; its default is the crate-wide `max_schema_depth`.
    pub nesting_limit: u32,
    /// Accepted but not independently enforced here: a message decoded
    /// through [crate::serialize] or [crate::serialize_packed] has already
    /// had its segment count checked against this same limit by the framing
    /// codec (C4) before a reader ever exists to validate.
    pub segment_count_limit: u32,
    pub strict_text_termination: bool,
    pub require_struct_size: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            traversal_limit_words: 8 * 1024 * 1024,
            nesting_limit: 128,
            segment_count_limit: 512,
            strict_text_termination: false,
            require_struct_size: false,
        }
    }
}

/// Validates `root`, which must point to a struct of schema type `root_id`,
/// against `graph`.
pub fn validate(
    graph: &SchemaGraph,
    root_id: NodeId,
    root: PointerReader<'_>,
    options: ValidationOptions,
) -> Result<()> {
    let index = graph.build_index();
    let ctx = Ctx {
        graph,
        index,
        options,
        traversal: core::cell::Cell::new(0),
    };
    let node = ctx.lookup(root_id)?;
    let struct_node = node
        .as_struct()
        .ok_or_else(|| Error::from_kind(ErrorKind::InvalidSchema))?;
    let reader = root.get_struct(None)?;
    ctx.validate_struct(struct_node, &reader, 0, &mut Vec::new())
}

struct Ctx<'g> {
    graph: &'g SchemaGraph,
    index: Vec<(NodeId, usize)>,
    options: ValidationOptions,
    traversal: core::cell::Cell<u64>,
}

impl<'g> Ctx<'g> {
    fn lookup(&self, id: NodeId) -> Result<&'g crate::schema_model::Node> {
        self.graph
            .get_with_index(&self.index, id)
            .ok_or_else(|| Error::from_kind(ErrorKind::InvalidSchema))
    }

    fn account(&self, words: u64) -> Result<()> {
        let total = self.traversal.get() + words;
        if total > self.options.traversal_limit_words {
            return Err(Error::from_kind(ErrorKind::TraversalLimitExceeded));
        }
        self.traversal.set(total);
        Ok(())
    }

    fn validate_struct(
        &self,
        node: &StructNode,
        reader: &StructReader<'_>,
        depth: u32,
        group_chain: &mut Vec<NodeId>,
    ) -> Result<()> {
        if depth > self.options.nesting_limit {
            return Err(Error::from_kind(ErrorKind::SchemaRecursionLimitExceeded));
        }
        if self.options.require_struct_size {
            let have_data_words = (reader.data_size() as u64 + 63) / 64;
            if (have_data_words as u16) < node.data_word_count
                || reader.pointer_count() < node.pointer_count
            {
                return Err(Error::from_kind(ErrorKind::StructSizeTooSmall));
            }
        }
        self.account(node.data_word_count as u64 + node.pointer_count as u64)?;

        let discriminant = if node.discriminant_count > 0 {
            reader.get_data_field::<u16>(node.discriminant_offset as usize)
        } else {
            0
        };

        for field in &node.fields {
            if field.is_union_member() && field.discriminant_value != discriminant {
                continue;
            }
            self.validate_field(field, reader, depth, group_chain)?;
        }
        Ok(())
    }

    fn validate_field(
        &self,
        field: &Field,
        reader: &StructReader<'_>,
        depth: u32,
        group_chain: &mut Vec<NodeId>,
    ) -> Result<()> {
        match &field.kind {
            FieldKind::Group { type_id } => {
                // Entering a group shares the enclosing struct's data: the
                // same schema node reached twice along this chain without an
                // intervening pointer is a genuine cycle, not a legitimate
                // re-visit of a distinct instance (contrast the pointer-kind
                // branches below, which reset `group_chain`).
                if group_chain.contains(type_id) {
                    return Err(Error::from_kind(ErrorKind::SchemaCycleDetected));
                }
                let group_node = self.lookup(*type_id)?;
                let struct_node = group_node
                    .as_struct()
                    .ok_or_else(|| Error::from_kind(ErrorKind::InvalidSchema))?;
                group_chain.push(*type_id);
                let result = self.validate_struct(struct_node, reader, depth + 1, group_chain);
                group_chain.pop();
                result
            }
            FieldKind::Slot { offset, ty, default } => {
                self.validate_slot(ty, default, *offset, reader, depth)
            }
        }
    }

    fn validate_slot(
        &self,
        ty: &Type,
        default: &DefaultValue,
        offset: u32,
        reader: &StructReader<'_>,
        depth: u32,
    ) -> Result<()> {
        match ty {
            Type::Enum(id) => {
                let raw = reader.get_data_field::<u16>(offset as usize);
                let ordinal = raw ^ default.enum_ordinal();
                let enum_node = self.lookup(*id)?;
                let enumerants = enum_node
                    .as_enum()
                    .ok_or_else(|| Error::from_kind(ErrorKind::InvalidSchema))?;
                if ordinal as usize >= enumerants.enumerants.len() {
                    return Err(Error::from_kind(ErrorKind::InvalidEnumValue));
                }
                Ok(())
            }
            Type::Void
            | Type::Bool
            | Type::Int8
            | Type::Int16
            | Type::Int32
            | Type::Int64
            | Type::UInt8
            | Type::UInt16
            | Type::UInt32
            | Type::UInt64
            | Type::Float32
            | Type::Float64 => {
                // Schema-evolution tolerance: an out-of-range offset reads
                // back as the type's zero value rather than erroring (see
                // `StructReader::get_data_field`/`get_bool_field`).
                Ok(())
            }
            Type::Struct(_) | Type::Text | Type::Data | Type::List(_) | Type::Interface(_) | Type::AnyPointer => {
                let p = reader.get_pointer_field(offset as usize);
                self.validate_pointer(ty, p, depth)
            }
        }
    }

    fn validate_pointer(&self, ty: &Type, p: PointerReader<'_>, depth: u32) -> Result<()> {
        if p.is_null() {
            return Ok(());
        }
        if depth > self.options.nesting_limit {
            return Err(Error::from_kind(ErrorKind::SchemaRecursionLimitExceeded));
        }
        match ty {
            Type::AnyPointer => Ok(()),
            Type::Interface(_) => {
                p.get_capability()?;
                Ok(())
            }
            Type::Text => {
                let list = p.get_list(ElementSize::Byte, None)?;
                if list.get_element_size() != ElementSize::Byte {
                    return Err(Error::from_kind(ErrorKind::InvalidTextPointer));
                }
                self.account(round_bytes_up_to_words(list.len() as u64))?;
                if self.options.strict_text_termination {
                    let bytes = list.into_raw_bytes();
                    if bytes.last() != Some(&0) {
                        return Err(Error::from_kind(ErrorKind::InvalidTextPointer));
                    }
                }
                Ok(())
            }
            Type::Data => {
                let list = p.get_list(ElementSize::Byte, None)?;
                if list.get_element_size() != ElementSize::Byte {
                    return Err(Error::from_kind(ErrorKind::InvalidListElementSize));
                }
                self.account(round_bytes_up_to_words(list.len() as u64))?;
                Ok(())
            }
            Type::Struct(id) => {
                let node = self.lookup(*id)?;
                let struct_node = node
                    .as_struct()
                    .ok_or_else(|| Error::from_kind(ErrorKind::InvalidSchema))?;
                let sub = p.get_struct(None)?;
                // A new data instance reached through a pointer is not a
                // schema cycle on its own (a linked list of the same struct
                // type is perfectly legitimate); only the traversal budget
                // bounds how far this can go.
                self.validate_struct(struct_node, &sub, depth + 1, &mut Vec::new())
            }
            Type::List(elem) => self.validate_list(elem, p, depth),
            Type::Void
            | Type::Bool
            | Type::Int8
            | Type::Int16
            | Type::Int32
            | Type::Int64
            | Type::UInt8
            | Type::UInt16
            | Type::UInt32
            | Type::UInt64
            | Type::Float32
            | Type::Float64
            | Type::Enum(_) => Err(Error::from_kind(ErrorKind::InvalidPointer)),
        }
    }

    fn validate_list(&self, elem: &Type, p: PointerReader<'_>, depth: u32) -> Result<()> {
        if let Type::Struct(id) = elem {
            let node = self.lookup(*id)?;
            let struct_node = node
                .as_struct()
                .ok_or_else(|| Error::from_kind(ErrorKind::InvalidSchema))?;
            let list = p.get_list(ElementSize::InlineComposite, None)?;
            if list.get_element_size() != ElementSize::InlineComposite {
                return Err(Error::from_kind(ErrorKind::InvalidListElementSize));
            }
            self.account(list.len() as u64)?;
            for i in 0..list.len() {
                let elem_reader = list.get_struct_element(i);
                self.validate_struct(struct_node, &elem_reader, depth + 1, &mut Vec::new())?;
            }
            return Ok(());
        }

        let expected = list_wire_size(elem)?;
        let list = p.get_list(expected, None)?;
        if list.get_element_size() != expected {
            return Err(Error::from_kind(ErrorKind::InvalidListElementSize));
        }
        let bits = crate::private::units::data_bits_per_element(expected) as u64
            + crate::private::units::pointers_per_element(expected) as u64 * 64;
        self.account(round_bytes_up_to_words(
            (bits * list.len() as u64 + 7) / 8,
        ))?;

        if expected == ElementSize::Pointer {
            for i in 0..list.len() {
                self.validate_pointer(elem, list.get_pointer_element(i), depth + 1)?;
            }
        }
        Ok(())
    }
}

fn list_wire_size(ty: &Type) -> Result<ElementSize> {
    Ok(match ty {
        Type::Void => ElementSize::Void,
        Type::Bool => ElementSize::Bit,
        Type::Int8 | Type::UInt8 => ElementSize::Byte,
        Type::Int16 | Type::UInt16 | Type::Enum(_) => ElementSize::TwoBytes,
        Type::Int32 | Type::UInt32 | Type::Float32 => ElementSize::FourBytes,
        Type::Int64 | Type::UInt64 | Type::Float64 => ElementSize::EightBytes,
        Type::Text | Type::Data | Type::List(_) | Type::Interface(_) | Type::AnyPointer => {
            ElementSize::Pointer
        }
        Type::Struct(_) => ElementSize::InlineComposite,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_model::{
        DefaultValue, Enumerant, EnumNode, Field, FieldKind, Node, NodeKind, NO_DISCRIMINANT,
    };
    use alloc::string::ToString;
    use alloc::vec;

    fn color_node() -> Node {
        Node {
            id: 2,
            display_name: "Color".to_string(),
            display_name_prefix_length: 0,
            scope_id: 1,
            nested_nodes: Vec::new(),
            kind: NodeKind::Enum(EnumNode {
                enumerants: vec![
                    Enumerant { name: "red".to_string() },
                    Enumerant { name: "green".to_string() },
                    Enumerant { name: "blue".to_string() },
                ],
            }),
        }
    }

    fn point_node() -> Node {
        Node {
            id: 1,
            display_name: "Point".to_string(),
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
                        ty: Type::Enum(2),
                        default: DefaultValue::none(),
                    },
                }],
            }),
        }
    }

    fn build_point(ordinal: u16) -> crate::message::Builder<crate::message::HeapAllocator> {
        let mut message = crate::message::Builder::new_default();
        {
            let root: crate::any_pointer::Builder<'_> = message.init_root();
            let mut sb = root.as_pointer_builder().init_struct(1, 0);
            sb.set_data_field::<u16>(0, ordinal);
        }
        message
    }

    #[test]
    fn valid_enum_ordinal_passes() {
        let graph = SchemaGraph::new(vec![point_node(), color_node()]);
        let message = build_point(1); // green
        let reader = message.into_reader();
        let root = reader.get_root::<crate::any_pointer::Reader<'_>>().unwrap();
        let result = validate(
            &graph,
            1,
            root.as_pointer_reader(),
            ValidationOptions::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn out_of_range_enum_ordinal_fails() {
        let graph = SchemaGraph::new(vec![point_node(), color_node()]);
        let message = build_point(99);
        let reader = message.into_reader();
        let root = reader.get_root::<crate::any_pointer::Reader<'_>>().unwrap();
        let err = validate(
            &graph,
            1,
            root.as_pointer_reader(),
            ValidationOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidEnumValue);
    }

    /// A group that nests a field of its own group type, with no pointer
    /// indirection in between, must be rejected — the group-chain guard
    /// exists specifically to catch this.
    fn self_nesting_group_node() -> Node {
        Node {
            id: 10,
            display_name: "G".to_string(),
            display_name_prefix_length: 0,
            scope_id: 0,
            nested_nodes: Vec::new(),
            kind: NodeKind::Struct(StructNode {
                data_word_count: 0,
                pointer_count: 0,
                is_group: true,
                discriminant_count: 0,
                discriminant_offset: 0,
                fields: vec![Field {
                    name: "inner".to_string(),
                    discriminant_value: NO_DISCRIMINANT,
                    kind: FieldKind::Group { type_id: 10 },
                }],
            }),
        }
    }

    /// A struct that points to another instance of its own type is a
    /// perfectly ordinary linked list, not a schema cycle: the reference
    /// crosses a pointer, so each visit is a distinct instance bounded only
    /// by the traversal budget.
    fn linked_list_node() -> Node {
        Node {
            id: 11,
            display_name: "ListNode".to_string(),
            display_name_prefix_length: 0,
            scope_id: 0,
            nested_nodes: Vec::new(),
            kind: NodeKind::Struct(StructNode {
                data_word_count: 0,
                pointer_count: 1,
                is_group: false,
                discriminant_count: 0,
                discriminant_offset: 0,
                fields: vec![Field {
                    name: "next".to_string(),
                    discriminant_value: NO_DISCRIMINANT,
                    kind: FieldKind::Slot {
                        offset: 0,
                        ty: Type::Struct(11),
                        default: DefaultValue::none(),
                    },
                }],
            }),
        }
    }

    fn build_linked_list(depth: usize) -> crate::message::Builder<crate::message::HeapAllocator> {
        let mut message = crate::message::Builder::new_default();
        {
            let root: crate::any_pointer::Builder<'_> = message.init_root();
            let mut sb = root.as_pointer_builder().init_struct(0, 1);
            for _ in 0..depth {
                sb = sb.get_pointer_field(0).init_struct(0, 1);
            }
        }
        message
    }

    #[test]
    fn self_nesting_group_is_rejected_as_schema_cycle() {
        let graph = SchemaGraph::new(vec![self_nesting_group_node()]);
        let mut message = crate::message::Builder::new_default();
        {
            let root: crate::any_pointer::Builder<'_> = message.init_root();
            root.as_pointer_builder().init_struct(0, 0);
        }
        let reader = message.into_reader();
        let root = reader.get_root::<crate::any_pointer::Reader<'_>>().unwrap();
        let err = validate(
            &graph,
            10,
            root.as_pointer_reader(),
            ValidationOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SchemaCycleDetected);
    }

    #[test]
    fn linked_list_via_pointer_is_not_a_schema_cycle() {
        let graph = SchemaGraph::new(vec![linked_list_node()]);
        let message = build_linked_list(5);
        let reader = message.into_reader();
        let root = reader.get_root::<crate::any_pointer::Reader<'_>>().unwrap();
        let result = validate(
            &graph,
            11,
            root.as_pointer_reader(),
            ValidationOptions::default(),
        );
        assert!(result.is_ok());
    }
}
