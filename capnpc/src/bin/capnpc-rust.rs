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

//! The `capnpc-rust` plugin binary: reads a `CodeGeneratorRequest` from
//! stdin (fed by `capnp compile -ocapnpc-rust:<out-dir>`), runs the request
//! parser and code generator, and writes one `_capnp.rs` file per requested
//! file into the output directory named on the command line.
//!
//! Exit code is 0 on success, 1 on any error. Errors print a single line to
//! stderr, prefixed with the failing stage's category tag (`schema`, `wire`,
//! `io`, `internal`) so a caller's build log can tell a malformed schema
//! from a filesystem problem without parsing prose.

use std::io::Read;
use std::path::PathBuf;

fn category_tag(error: &capnp::Error) -> &'static str {
    error.category()
}

fn run() -> Result<(), (String, String)> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut bytes = Vec::new();
    std::io::stdin()
        .read_to_end(&mut bytes)
        .map_err(|e| ("io".to_string(), e.to_string()))?;

    let request = capnpc::request::read_code_generator_request(&bytes[..])
        .map_err(|e| (category_tag(&e).to_string(), e.to_string()))?;

    let generated = capnpc::codegen::CodeGenerationCommand::new()
        .run(&request)
        .map_err(|e| (category_tag(&e).to_string(), e.to_string()))?;

    for file in generated {
        let path = out_dir.join(&file.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ("io".to_string(), e.to_string()))?;
        }
        std::fs::write(&path, file.text).map_err(|e| ("io".to_string(), e.to_string()))?;
    }

    Ok(())
}

fn main() {
    if let Err((category, message)) = run() {
        eprintln!("{category}: {message}");
        std::process::exit(1);
    }
}
