// Copyright (c) 2013-2014 Sandstorm Development Group, Inc. and contributors
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

//! Decodes a `CodeGeneratorRequest` message into a [schema_model::CodeGeneratorRequest].
//!
//! `Node`, `Field`, `Type`, `Value`, `Enumerant`, `Method` and friends are
//! themselves Cap'n Proto structs, but we can't lean on generated Reader
//! types for them: those types would have to be generated by running this
//! very code generator over schema.capnp, which is exactly the message
//! we're trying to read. So this module walks the wire directly with the
//! same struct/list reader primitives (`capnp::private::layout`) that every
//! other typed accessor in the ecosystem is built on, using offsets fixed by
//! this crate's bootstrap layout for those types. It is, in effect,
//! hand-written "generated code" for one self-describing schema.
//!
//! Any field beyond what's read here (a newer schema feature, a brand or
//! generic parameter) is silently ignored rather than rejected: an older
//! `capnpc` reading a request produced by a newer schema compiler should
//! degrade gracefully, not fail outright.

use capnp::private::layout::{ListReader, PointerReader, StructReader};
use capnp::private::units::ElementSize;
use capnp::schema_model::{
    AnnotationNode, AnnotationTargets, CodeGeneratorRequest, ConstNode, DefaultValue, Enumerant,
    EnumNode, Field, FieldKind, InterfaceNode, Method, Node, NodeKind, NestedNode, RequestedFile,
    RequestedFileImport, SchemaGraph, StructNode, Type,
};
use capnp::{Error, ErrorKind, Result};

fn text_field(reader: &StructReader<'_>, pointer_index: usize) -> Result<String> {
    let text = reader
        .get_pointer_field(pointer_index)
        .get_list(ElementSize::Byte, None)?;
    Ok(bytes_to_text(&text))
}

fn bytes_to_text(list: &ListReader<'_>) -> String {
    // Text is a byte list with a trailing NUL; read it through the raw
    // slice rather than the `text`/`primitive_list` typed wrappers, which
    // are themselves built on top of this same reader.
    match list_as_byte_slice(list) {
        Some(slice) => {
            let trimmed = match slice.last() {
                Some(0) => &slice[..slice.len() - 1],
                _ => slice,
            };
            String::from_utf8_lossy(trimmed).into_owned()
        }
        None => String::new(),
    }
}

fn list_as_byte_slice<'a>(list: &ListReader<'a>) -> Option<&'a [u8]> {
    if list.get_element_size() != ElementSize::Byte {
        return None;
    }
    Some(list.into_raw_bytes())
}

/// Struct layout for `Node`: 5 data words, 10 pointers (see module docs).
#[allow(dead_code)]
mod node_layout {
    pub const DATA_WORDS: u16 = 5;
    pub const POINTERS: u16 = 10;

    pub const ID: usize = 0; // u64 @ word 0
    pub const WHICH: usize = 4; // u16 @ byte 8
    pub const DISPLAY_NAME_PREFIX_LEN: usize = 3; // u32 @ byte 12
    pub const SCOPE_ID: usize = 2; // u64 @ word 16
    pub const DATA_WORD_COUNT: usize = 12; // u16 @ byte 24
    pub const POINTER_COUNT: usize = 13; // u16 @ byte 26
    pub const DISCRIMINANT_COUNT: usize = 14; // u16 @ byte 28
    pub const IS_GROUP_BIT: usize = 240; // bit 0 of byte 30
    pub const DISCRIMINANT_OFFSET: usize = 8; // u32 @ byte 32
    pub const ANNOTATION_TARGETS: usize = 9; // u32 @ byte 36

    pub const DISPLAY_NAME: usize = 0;
    pub const NESTED_NODES: usize = 1;
    pub const FIELDS: usize = 3;
    pub const ENUMERANTS: usize = 4;
    pub const METHODS: usize = 5;
    pub const SUPERCLASSES: usize = 6;
    pub const CONST_TYPE: usize = 7;
    pub const CONST_VALUE: usize = 8;
    pub const ANNOTATION_TYPE: usize = 9;
}

#[allow(dead_code)]
mod field_layout {
    pub const CODE_ORDER: usize = 0; // u16 @ byte 0
    pub const DISCRIMINANT_VALUE: usize = 1; // u16 @ byte 2
    pub const WHICH_BYTE: usize = 4; // u8 @ byte 4
    // `slot.offset` and `group.typeId` occupy the same word (byte 8): the
    // union discriminant at WHICH_BYTE picks which one is meaningful, so
    // only one of SLOT_OFFSET/GROUP_TYPE_ID is ever read for a given field.
    // The slot's own default value lives in the separate `Value` struct
    // resolved through DEFAULT_VALUE, not inline here.
    pub const SLOT_OFFSET: usize = 2; // u32 @ byte 8
    pub const GROUP_TYPE_ID: usize = 1; // u64 @ word 1 (byte 8)

    pub const NAME: usize = 0;
    pub const TYPE: usize = 1;
    pub const DEFAULT_VALUE: usize = 2;
}

mod type_layout {
    pub const WHICH: usize = 0; // u8 @ byte 0
    pub const TYPE_ID: usize = 1; // u64 @ word 1

    pub const ELEMENT_TYPE: usize = 0;
}

mod value_layout {
    pub const WHICH: usize = 0; // u8 @ byte 0
    pub const BITS: usize = 1; // u64 @ word 1

    pub const POINTER_PAYLOAD: usize = 0;
}

/// Parses a `CodeGeneratorRequest`'s root struct, already resolved via the
/// unpacked stream framing (C4) and the segment arena (C1), into the plain
/// schema model (C10).
pub fn parse_request(root: StructReader<'_>) -> Result<CodeGeneratorRequest> {
    let nodes_list = root.get_pointer_field(0).get_list(ElementSize::InlineComposite, None)?;
    let mut nodes = Vec::with_capacity(nodes_list.len() as usize);
    for i in 0..nodes_list.len() {
        nodes.push(parse_node(nodes_list.get_struct_element(i))?);
    }

    let files_list = root.get_pointer_field(1).get_list(ElementSize::InlineComposite, None)?;
    let mut requested_files = Vec::with_capacity(files_list.len() as usize);
    for i in 0..files_list.len() {
        requested_files.push(parse_requested_file(files_list.get_struct_element(i))?);
    }

    let major = root.get_data_field::<u16>(0);
    let minor = root.get_data_field::<u8>(2);
    let micro = root.get_data_field::<u8>(3);

    Ok(CodeGeneratorRequest {
        nodes: SchemaGraph::new(nodes),
        requested_files,
        capnp_version: (major as u32, minor as u32, micro as u32),
    })
}

fn parse_node(s: StructReader<'_>) -> Result<Node> {
    let id = s.get_data_field::<u64>(node_layout::ID);
    let display_name = text_field(&s, node_layout::DISPLAY_NAME)?;
    let display_name_prefix_length = s.get_data_field::<u32>(node_layout::DISPLAY_NAME_PREFIX_LEN);
    let scope_id = s.get_data_field::<u64>(node_layout::SCOPE_ID);

    let nested_list = s
        .get_pointer_field(node_layout::NESTED_NODES)
        .get_list(ElementSize::InlineComposite, None)?;
    let mut nested_nodes = Vec::with_capacity(nested_list.len() as usize);
    for i in 0..nested_list.len() {
        let n = nested_list.get_struct_element(i);
        nested_nodes.push(NestedNode {
            name: text_field(&n, 0)?,
            id: n.get_data_field::<u64>(0),
        });
    }

    let which = s.get_data_field::<u16>(node_layout::WHICH);
    let kind = match which {
        1 => NodeKind::Struct(parse_struct_node(&s)?),
        2 => NodeKind::Enum(parse_enum_node(&s)?),
        3 => NodeKind::Interface(parse_interface_node(&s)?),
        4 => NodeKind::Const(parse_const_node(&s)?),
        5 => NodeKind::Annotation(parse_annotation_node(&s)?),
        _ => NodeKind::File,
    };

    Ok(Node {
        id,
        display_name,
        display_name_prefix_length,
        scope_id,
        nested_nodes,
        kind,
    })
}

fn parse_struct_node(s: &StructReader<'_>) -> Result<StructNode> {
    let data_word_count = s.get_data_field::<u16>(node_layout::DATA_WORD_COUNT);
    let pointer_count = s.get_data_field::<u16>(node_layout::POINTER_COUNT);
    let discriminant_count = s.get_data_field::<u16>(node_layout::DISCRIMINANT_COUNT);
    let discriminant_offset = s.get_data_field::<u32>(node_layout::DISCRIMINANT_OFFSET);
    let is_group = s.get_bool_field(node_layout::IS_GROUP_BIT);

    let fields_list = s
        .get_pointer_field(node_layout::FIELDS)
        .get_list(ElementSize::InlineComposite, None)?;
    let mut fields = Vec::with_capacity(fields_list.len() as usize);
    for i in 0..fields_list.len() {
        fields.push(parse_field(fields_list.get_struct_element(i))?);
    }

    Ok(StructNode {
        data_word_count,
        pointer_count,
        is_group,
        discriminant_count,
        discriminant_offset,
        fields,
    })
}

fn parse_field(s: StructReader<'_>) -> Result<Field> {
    let name = text_field(&s, field_layout::NAME)?;
    let discriminant_value = s.get_data_field::<u16>(field_layout::DISCRIMINANT_VALUE);
    let which = s.get_data_field::<u8>(field_layout::WHICH_BYTE);

    let kind = if which == 1 {
        FieldKind::Group {
            type_id: s.get_data_field::<u64>(field_layout::GROUP_TYPE_ID),
        }
    } else {
        let offset = s.get_data_field::<u32>(field_layout::SLOT_OFFSET);
        let ty = parse_type(s.get_pointer_field(field_layout::TYPE).get_struct(None)?)?;
        let default_reader = s.get_pointer_field(field_layout::DEFAULT_VALUE).get_struct(None)?;
        let default = parse_default_value(&default_reader, &ty)?;
        FieldKind::Slot { offset, ty, default }
    };

    Ok(Field {
        name,
        discriminant_value,
        kind,
    })
}

fn parse_type(s: StructReader<'_>) -> Result<Type> {
    let which = s.get_data_field::<u8>(type_layout::WHICH);
    Ok(match which {
        0 => Type::Void,
        1 => Type::Bool,
        2 => Type::Int8,
        3 => Type::Int16,
        4 => Type::Int32,
        5 => Type::Int64,
        6 => Type::UInt8,
        7 => Type::UInt16,
        8 => Type::UInt32,
        9 => Type::UInt64,
        10 => Type::Float32,
        11 => Type::Float64,
        12 => Type::Text,
        13 => Type::Data,
        14 => {
            let elem = s
                .get_pointer_field(type_layout::ELEMENT_TYPE)
                .get_struct(None)?;
            Type::List(Box::new(parse_type(elem)?))
        }
        15 => Type::Struct(s.get_data_field::<u64>(type_layout::TYPE_ID)),
        16 => Type::Enum(s.get_data_field::<u64>(type_layout::TYPE_ID)),
        17 => Type::Interface(s.get_data_field::<u64>(type_layout::TYPE_ID)),
        _ => Type::AnyPointer,
    })
}

/// Reads a `Value` struct into the `(data, pointer)` representation the
/// schema model stores defaults in. `expected_ty` decides whether the
/// pointer slot (if any) should be read as serialized bytes.
fn parse_default_value(s: &StructReader<'_>, expected_ty: &Type) -> Result<DefaultValue> {
    let bits = s.get_data_field::<u64>(value_layout::BITS);
    let pointer = s.get_pointer_field(value_layout::POINTER_PAYLOAD);
    let is_pointer_type = matches!(
        expected_ty,
        Type::Text | Type::Data | Type::Struct(_) | Type::List(_) | Type::AnyPointer
    );
    if is_pointer_type && !pointer.is_null() {
        Ok(DefaultValue {
            data: bits,
            pointer: Some(serialize_pointer_default(&pointer)?),
        })
    } else {
        Ok(DefaultValue::from_data(bits))
    }
}

/// Deep-copies whatever `pointer` refers to into a scratch message and
/// serializes it, giving the const/struct-default emitter (C13) a
/// self-contained byte string it can embed verbatim rather than needing to
/// keep the original request message alive until code generation runs.
fn serialize_pointer_default(pointer: &PointerReader<'_>) -> Result<Vec<u8>> {
    let mut message = capnp::message::Builder::new_default();
    {
        let root: capnp::any_pointer::Builder<'_> = message.init_root();
        root.as_pointer_builder().copy_from(*pointer, false)?;
    }
    let mut bytes = Vec::new();
    capnp::serialize::write_message(&mut bytes, &message)
        .map_err(|e| Error::from_kind_context(ErrorKind::Failed, format!("{e}")))?;
    Ok(bytes)
}

fn parse_enum_node(s: &StructReader<'_>) -> Result<EnumNode> {
    let list = s
        .get_pointer_field(node_layout::ENUMERANTS)
        .get_list(ElementSize::InlineComposite, None)?;
    let mut enumerants = Vec::with_capacity(list.len() as usize);
    for i in 0..list.len() {
        let e = list.get_struct_element(i);
        enumerants.push(Enumerant {
            name: text_field(&e, 0)?,
        });
    }
    Ok(EnumNode { enumerants })
}

fn parse_interface_node(s: &StructReader<'_>) -> Result<InterfaceNode> {
    let methods_list = s
        .get_pointer_field(node_layout::METHODS)
        .get_list(ElementSize::InlineComposite, None)?;
    let mut methods = Vec::with_capacity(methods_list.len() as usize);
    for i in 0..methods_list.len() {
        let m = methods_list.get_struct_element(i);
        methods.push(Method {
            name: text_field(&m, 0)?,
            param_struct_type: m.get_data_field::<u64>(1),
            result_struct_type: m.get_data_field::<u64>(2),
            streaming: m.get_bool_field(16), // bit 0 of byte 2
        });
    }

    let super_list = s
        .get_pointer_field(node_layout::SUPERCLASSES)
        .get_list(ElementSize::EightBytes, None)?;
    let mut superclasses = Vec::with_capacity(super_list.len() as usize);
    for i in 0..super_list.len() {
        superclasses.push(u64_list_element(&super_list, i));
    }

    Ok(InterfaceNode { methods, superclasses })
}

fn u64_list_element(list: &ListReader<'_>, index: u32) -> u64 {
    let bytes = list.into_raw_bytes();
    let start = index as usize * 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[start..start + 8]);
    u64::from_le_bytes(buf)
}

fn parse_const_node(s: &StructReader<'_>) -> Result<ConstNode> {
    let ty = parse_type(s.get_pointer_field(node_layout::CONST_TYPE).get_struct(None)?)?;
    let value_reader = s.get_pointer_field(node_layout::CONST_VALUE).get_struct(None)?;
    let value = parse_default_value(&value_reader, &ty)?;
    Ok(ConstNode { ty, value })
}

fn parse_annotation_node(s: &StructReader<'_>) -> Result<AnnotationNode> {
    let ty = parse_type(s.get_pointer_field(node_layout::ANNOTATION_TYPE).get_struct(None)?)?;
    let bits = s.get_data_field::<u32>(node_layout::ANNOTATION_TARGETS);
    let bit = |n: u32| bits & (1 << n) != 0;
    Ok(AnnotationNode {
        ty,
        targets: AnnotationTargets {
            file: bit(0),
            const_: bit(1),
            enum_: bit(2),
            enumerant: bit(3),
            struct_: bit(4),
            field: bit(5),
            union: bit(6),
            group: bit(7),
            interface: bit(8),
            method: bit(9),
            param: bit(10),
            annotation: bit(11),
        },
    })
}

fn parse_requested_file(s: StructReader<'_>) -> Result<RequestedFile> {
    let id = s.get_data_field::<u64>(0);
    let filename = text_field(&s, 0)?;
    let imports_list = s.get_pointer_field(1).get_list(ElementSize::InlineComposite, None)?;
    let mut imports = Vec::with_capacity(imports_list.len() as usize);
    for i in 0..imports_list.len() {
        let imp = imports_list.get_struct_element(i);
        imports.push(RequestedFileImport {
            id: imp.get_data_field::<u64>(0),
            name: text_field(&imp, 0)?,
        });
    }
    Ok(RequestedFile { id, filename, imports })
}

/// Reads a `CodeGeneratorRequest` straight out of an unpacked-framed byte
/// stream (see `capnp::serialize`), without requiring the caller to stand up
/// a `message::Reader` themselves.
pub fn read_code_generator_request<R: std::io::Read>(mut input: R) -> Result<CodeGeneratorRequest> {
    let message = capnp::serialize::read_message(&mut input, capnp::message::ReaderOptions::new())
        .map_err(|e| Error::from_kind_context(ErrorKind::Failed, format!("{e}")))?;
    let root: capnp::any_pointer::Reader<'_> = message.get_root()?;
    let root_struct = root.as_pointer_reader().get_struct(None)?;
    parse_request(root_struct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_has_no_nodes() {
        let mut message = capnp::message::Builder::new_default();
        {
            let root = message.init_root::<capnp::any_pointer::Builder<'_>>();
            let mut s = root.as_pointer_builder().init_struct(1, 2);
            s.get_pointer_field(0)
                .init_list(ElementSize::InlineComposite, 0);
            s.get_pointer_field(1)
                .init_list(ElementSize::InlineComposite, 0);
        }
        let reader = message
            .get_root_as_reader::<capnp::any_pointer::Reader<'_>>()
            .unwrap();
        let root_struct = reader.as_pointer_reader().get_struct(None).unwrap();
        let request = parse_request(root_struct).unwrap();
        assert!(request.nodes.nodes().is_empty());
        assert!(request.requested_files.is_empty());
    }
}
