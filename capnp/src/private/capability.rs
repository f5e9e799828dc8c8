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

//! The extension point an external RPC implementation plugs into.
//!
//! On the wire, a capability pointer is nothing but a 32-bit index into a
//! cap table that travels alongside a message (see [crate::Error] and
//! `message::Reader`/`message::Builder`, which treat that table as an opaque
//! `Vec<Box<dyn ClientHook>>`-shaped collaborator owned by the caller). This
//! crate never calls a method on a capability itself; it only reads and
//! writes the index. An RPC layer built on top supplies the `ClientHook`
//! implementations that give that index meaning.

use alloc::boxed::Box;

/// A resolved capability, as tracked by a message's cap table.
///
/// This is intentionally thin: no method dispatch, no `Promise`/`Request`
/// machinery lives here. An external RPC crate is expected to define its own
/// richer trait and have its client objects also implement this one so that
/// `capnp::any_pointer::Reader::get_capability`/`set_capability` can move
/// them in and out of a message's cap table.
pub trait ClientHook: 'static {
    /// A value identifying which underlying capability this hook resolves
    /// to, stable for the lifetime of the hook. Two hooks backed by the same
    /// capability should return the same id; this is how `same_client`-style
    /// comparisons in generated code are implemented.
    fn hook_id(&self) -> usize;

    /// Returns a hook for the capability this one currently resolves to, if
    /// it has already settled (as opposed to being an unresolved promise).
    /// The default says "already resolved to myself".
    fn resolved(&self) -> Option<Box<dyn ClientHook>> {
        None
    }

    /// Returns a new handle to the same underlying capability. Implementors
    /// typically back this with an `Rc`/`Arc` clone rather than a deep copy;
    /// this is what makes [crate::capability::Client] cloneable despite
    /// holding a `Box<dyn ClientHook>`.
    fn add_ref(&self) -> Box<dyn ClientHook>;
}

impl PartialEq for dyn ClientHook {
    fn eq(&self, other: &Self) -> bool {
        self.hook_id() == other.hook_id()
    }
}

impl Eq for dyn ClientHook {}
