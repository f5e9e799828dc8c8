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

//! The plain-data node graph that [crate::validate] and [crate::canonicalize]
//! walk, and that `capnpc`'s request parser builds from a `CodeGeneratorRequest`.
//!
//! There is deliberately no inheritance and no dynamic dispatch here: the
//! only polymorphism is [NodeKind], a tagged union over the five node kinds
//! the schema language has. Everything else is plain fields, matching the
//! way the wire format itself represents a schema (a `Node` is a union of
//! groups, not a trait object).

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// A node's 64-bit stable identity, assigned by the schema compiler from a
/// hash of its scope and name. Stable across schema evolution.
pub type NodeId = u64;

/// Sentinel written into [Field::discriminant_value] for fields that do not
/// belong to a union.
pub const NO_DISCRIMINANT: u16 = 0xffff;

/// A full schema, as reachable from one `CodeGeneratorRequest`.
///
/// Lookup by id is linear by default, matching the teacher's own
/// `schema_capnp`-adjacent tooling: schemas are small enough (hundreds of
/// nodes, not millions) that a `Vec` scan beats the bookkeeping of a side
/// table for most callers. [SchemaGraph::build_index] is available for
/// callers (e.g. the code generator driver) that will do enough lookups to
/// make an index worthwhile.
#[derive(Clone, Debug, Default)]
pub struct SchemaGraph {
    nodes: Vec<Node>,
}

impl SchemaGraph {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Builds an id -> index side table for repeated lookups. Returned as a
    /// sorted `Vec<(NodeId, usize)>` rather than a hash map so the crate
    /// doesn't need to pull in a hasher under `no_std`.
    pub fn build_index(&self) -> Vec<(NodeId, usize)> {
        let mut index: Vec<(NodeId, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();
        index.sort_unstable_by_key(|(id, _)| *id);
        index
    }

    pub fn get_with_index(&self, index: &[(NodeId, usize)], id: NodeId) -> Option<&Node> {
        let pos = index.binary_search_by_key(&id, |(k, _)| *k).ok()?;
        self.nodes.get(index[pos].1)
    }
}

/// One node in the graph: a file, struct, enum, interface, const, or
/// annotation declaration.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub display_name: String,
    /// Byte length of the prefix of `display_name` naming the file the node
    /// was declared in, as opposed to its path within that file.
    pub display_name_prefix_length: u32,
    pub scope_id: NodeId,
    pub nested_nodes: Vec<NestedNode>,
    pub kind: NodeKind,
}

/// A `name -> id` entry for a node lexically nested inside another (a
/// struct declared inside a struct, a const inside a file, etc).
#[derive(Clone, Debug)]
pub struct NestedNode {
    pub name: String,
    pub id: NodeId,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    File,
    Struct(StructNode),
    Enum(EnumNode),
    Interface(InterfaceNode),
    Const(ConstNode),
    Annotation(AnnotationNode),
}

impl Node {
    pub fn as_struct(&self) -> Option<&StructNode> {
        match &self.kind {
            NodeKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumNode> {
        match &self.kind {
            NodeKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceNode> {
        match &self.kind {
            NodeKind::Interface(i) => Some(i),
            _ => None,
        }
    }
}

/// A struct (or group: groups are structs with `is_group = true` that share
/// their enclosing struct's data and pointer sections instead of being
/// addressed through a pointer of their own).
#[derive(Clone, Debug)]
pub struct StructNode {
    pub data_word_count: u16,
    pub pointer_count: u16,
    pub is_group: bool,
    /// Number of fields that share a discriminant (0 if the struct has no
    /// top-level union).
    pub discriminant_count: u16,
    /// Offset, in 16-bit words from the start of the data section, of the
    /// union discriminant (meaningless when `discriminant_count == 0`).
    pub discriminant_offset: u32,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    /// [NO_DISCRIMINANT] for fields outside any union.
    pub discriminant_value: u16,
    pub kind: FieldKind,
}

impl Field {
    pub fn is_union_member(&self) -> bool {
        self.discriminant_value != NO_DISCRIMINANT
    }
}

#[derive(Clone, Debug)]
pub enum FieldKind {
    Slot {
        /// Offset in units of the field's own width (e.g. for a `UInt16`
        /// slot, a word index times 4; for a pointer slot, a pointer
        /// index), matching [crate::private::layout::StructReader::get_data_field]'s offset convention.
        offset: u32,
        ty: Type,
        default: DefaultValue,
    },
    /// A group field shares the enclosing struct's data/pointer sections;
    /// `type_id` names the [StructNode] (with `is_group = true`) describing
    /// its shape.
    Group { type_id: NodeId },
}

/// A schema type, mirroring `schema.capnp`'s `Type` union.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Text,
    Data,
    List(Box<Type>),
    Struct(NodeId),
    Enum(NodeId),
    Interface(NodeId),
    AnyPointer,
}

/// The default value declared for a slot or const, carried as raw wire
/// bits/bytes rather than re-parsed into a Rust value: the validator only
/// ever needs the enum-ordinal XOR mask, and the code generator only ever
/// needs to re-emit these bytes verbatim (as an XOR mask for data, or as an
/// embedded message fragment for pointers).
#[derive(Clone, Debug, Default)]
pub struct DefaultValue {
    /// Bit pattern of a data-section default (zero when none is declared;
    /// note this is indistinguishable from an explicit all-zero default,
    /// which is why the generator never needs to special-case "no default").
    pub data: u64,
    /// Serialized word content of a pointer-section default (`text`,
    /// `data`, `struct`, or `list`), or `None` for a null default.
    pub pointer: Option<Vec<u8>>,
}

impl DefaultValue {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_data(data: u64) -> Self {
        Self { data, pointer: None }
    }

    /// The enum ordinal declared as this field's default, if `ty` names an
    /// enum. Used by the validator to XOR-decode the stored ordinal (see
    /// [crate::validate]).
    pub fn enum_ordinal(&self) -> u16 {
        self.data as u16
    }
}

#[derive(Clone, Debug)]
pub struct EnumNode {
    pub enumerants: Vec<Enumerant>,
}

#[derive(Clone, Debug)]
pub struct Enumerant {
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct InterfaceNode {
    pub methods: Vec<Method>,
    pub superclasses: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Method {
    pub name: String,
    pub param_struct_type: NodeId,
    pub result_struct_type: NodeId,
    /// True for methods annotated as streaming: generated code acknowledges
    /// these with an empty result shape instead of the method's declared
    /// result struct (see `capnpc`'s interface emitter).
    pub streaming: bool,
}

#[derive(Clone, Debug)]
pub struct ConstNode {
    pub ty: Type,
    pub value: DefaultValue,
}

#[derive(Clone, Debug, Default)]
pub struct AnnotationNode {
    pub ty: Type,
    pub targets: AnnotationTargets,
}

/// Which schema constructs an annotation may be applied to. Annotations
/// have no runtime effect in this crate; this is carried only so the
/// annotation emitter doesn't silently drop a declaration (see C13).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnotationTargets {
    pub file: bool,
    pub const_: bool,
    pub enum_: bool,
    pub enumerant: bool,
    pub struct_: bool,
    pub field: bool,
    pub union: bool,
    pub group: bool,
    pub interface: bool,
    pub method: bool,
    pub param: bool,
    pub annotation: bool,
}

/// One requested output file from a `CodeGeneratorRequest`: the node id of
/// its file-kind [Node], its on-disk name, and the `(local_name, node_id)`
/// import table used to resolve cross-file type references.
#[derive(Clone, Debug)]
pub struct RequestedFile {
    pub id: NodeId,
    pub filename: String,
    pub imports: Vec<RequestedFileImport>,
}

#[derive(Clone, Debug)]
pub struct RequestedFileImport {
    pub id: NodeId,
    pub name: String,
}

/// The fully parsed form of a `CodeGeneratorRequest` (see C11): the schema
/// graph plus the subset of files this invocation was asked to emit.
#[derive(Clone, Debug, Default)]
pub struct CodeGeneratorRequest {
    pub nodes: SchemaGraph,
    pub requested_files: Vec<RequestedFile>,
    pub capnp_version: (u32, u32, u32),
}
