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
//! This crate only needs to be able to read and write a capability pointer's
//! cap-table index (see [crate::private::layout::PointerReader::get_capability] /
//! [crate::private::layout::PointerBuilder::set_capability]) and to carry an
//! opaque per-capability handle through a message's cap table. Everything
//! past that — method dispatch, promise pipelining, the wire RPC protocol —
//! belongs to an RPC crate built on top, not to the wire engine itself.

use alloc::boxed::Box;

pub use crate::private::capability::ClientHook;

/// An untyped client: a capability reference plus the hook an RPC
/// implementation uses to actually place calls against it.
pub struct Client {
    pub hook: Box<dyn ClientHook>,
}

impl Client {
    pub fn new(hook: Box<dyn ClientHook>) -> Self {
        Self { hook }
    }

    pub fn hook_id(&self) -> usize {
        self.hook.hook_id()
    }
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            hook: self.hook.add_ref(),
        }
    }
}

impl core::fmt::Debug for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Client(hook_id={})", self.hook.hook_id())
    }
}

/// Trait implemented (via codegen) by every generated capability client type,
/// bridging it to the untyped [Client]/[ClientHook] that the RPC layer deals
/// in.
pub trait FromClientHook {
    fn new(hook: Box<dyn ClientHook>) -> Self;
    fn into_client_hook(self) -> Box<dyn ClientHook>;
    fn as_client_hook(&self) -> &dyn ClientHook;
}

impl FromClientHook for Client {
    fn new(hook: Box<dyn ClientHook>) -> Self {
        Self { hook }
    }
    fn into_client_hook(self) -> Box<dyn ClientHook> {
        self.hook
    }
    fn as_client_hook(&self) -> &dyn ClientHook {
        &*self.hook
    }
}
