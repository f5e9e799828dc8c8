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

//! # Cap'n Proto Schema Compiler Plugin Library
//!
//! This library does
//! [Cap'n Proto code generation](https://capnproto.org/otherlang.html#how-to-write-compiler-plugins)
//! within a Cargo build. It shells out to the `capnp` schema compiler
//! (`capnp compile -o-`) to parse and resolve `.capnp` files into a
//! `CodeGeneratorRequest`, then does the request-to-Rust translation itself
//! in-process, via [request] and [codegen].
//!
//! In your Cargo.toml:
//!
//! ```ignore
//! [dependencies]
//! capnp = "0.18" # Note this is a different library than capnp*c*
//!
//! [build-dependencies]
//! capnpc = "0.18"
//! ```
//!
//! In your build.rs:
//!
//! ```ignore
//! fn main() {
//!     capnpc::CompilerCommand::new()
//!         .src_prefix("schema")
//!         .file("schema/foo.capnp")
//!         .file("schema/bar.capnp")
//!         .run().expect("schema compiler command");
//! }
//! ```
//!
//! In your lib.rs:
//!
//! ```ignore
//! mod foo_capnp {
//!     include!(concat!(env!("OUT_DIR"), "/foo_capnp.rs"));
//! }
//!
//! mod bar_capnp {
//!     include!(concat!(env!("OUT_DIR"), "/bar_capnp.rs"));
//! }
//! ```

pub mod codegen;
pub mod naming;
pub mod request;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use wax::Glob;

// Copied from capnp/src/lib.rs, where this conversion lives behind the "std" feature flag,
// which we don't want to depend on here.
pub(crate) fn convert_io_err(err: std::io::Error) -> capnp::Error {
    use std::io;
    let kind = match err.kind() {
        io::ErrorKind::TimedOut => capnp::ErrorKind::Overloaded,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => capnp::ErrorKind::Disconnected,
        _ => capnp::ErrorKind::Failed,
    };
    capnp::Error::from_kind_context(kind, format!("{err}"))
}

/// A builder object for schema compiler commands.
#[derive(Default)]
pub struct CompilerCommand {
    files: Vec<PathBuf>,
    src_prefixes: Vec<PathBuf>,
    import_paths: Vec<PathBuf>,
    no_standard_import: bool,
    output_path: Option<PathBuf>,
    default_parent_module: Vec<String>,
    raw_code_generator_request_path: Option<PathBuf>,
    crate_provides_map: HashMap<u64, String>,
    collect_file: Option<PathBuf>,
}

impl CompilerCommand {
    /// Creates a new, empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file to be compiled.
    pub fn file<P>(&mut self, path: P) -> &mut Self
    where
        P: AsRef<Path>,
    {
        self.files.push(path.as_ref().to_path_buf());
        self
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Adds a --src-prefix flag. For all files specified for compilation that start
    /// with `prefix`, removes the prefix when computing output filenames.
    pub fn src_prefix<P>(&mut self, prefix: P) -> &mut Self
    where
        P: AsRef<Path>,
    {
        self.src_prefixes.push(prefix.as_ref().to_path_buf());
        self
    }

    /// Adds an --import_path flag. Adds `dir` to the list of directories searched
    /// for absolute imports.
    pub fn import_path<P>(&mut self, dir: P) -> &mut Self
    where
        P: AsRef<Path>,
    {
        self.import_paths.push(dir.as_ref().to_path_buf());
        self
    }

    /// Specify that `crate_name` provides generated code for `files`.
    ///
    /// This means that when your schema refers to types defined in `files` we
    /// will generate Rust code that uses identifiers in `crate_name`.
    ///
    /// # Arguments
    ///
    /// - `crate_name`: The Rust identifier of the crate
    /// - `files`: the Capnp file ids the crate provides generated code for
    pub fn crate_provides(
        &mut self,
        crate_name: impl Into<String>,
        files: impl IntoIterator<Item = u64>,
    ) -> &mut Self {
        let crate_name = crate_name.into();
        for file in files.into_iter() {
            self.crate_provides_map.insert(file, crate_name.clone());
        }
        self
    }

    /// Adds the --no-standard-import flag, indicating that the default import paths of
    /// /usr/include and /usr/local/include should not bet included.
    pub fn no_standard_import(&mut self) -> &mut Self {
        self.no_standard_import = true;
        self
    }

    /// Sets the output directory of generated code. Default is OUT_DIR
    pub fn output_path<P>(&mut self, path: P) -> &mut Self
    where
        P: AsRef<Path>,
    {
        self.output_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the default parent module. This indicates the scope in your crate where you will
    /// add a module containing the generated code. For example, if you set this option to
    /// `vec!["foo".into(), "bar".into()]`, and you are generating code for `baz.capnp`, then your crate
    /// should have this structure:
    ///
    /// ```ignore
    /// pub mod foo {
    ///    pub mod bar {
    ///        pub mod baz_capnp {
    ///            include!(concat!(env!("OUT_DIR"), "/baz_capnp.rs"));
    ///        }
    ///    }
    /// }
    /// ```
    ///
    /// If this option is unset, the default is the crate root.
    pub fn default_parent_module(&mut self, default_parent_module: Vec<String>) -> &mut Self {
        self.default_parent_module = default_parent_module;
        self
    }

    /// If set, the generator will also write a file containing the raw code generator request to the
    /// specified path.
    pub fn raw_code_generator_request_path<P>(&mut self, path: P) -> &mut Self
    where
        P: AsRef<Path>,
    {
        self.raw_code_generator_request_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Runs the command.
    ///
    /// Shells out to `capnp compile -o-` to have the schema compiler parse
    /// and resolve imports, capturing the raw `CodeGeneratorRequest` it
    /// writes to stdout, then runs our own request parser and code
    /// generator over those bytes. Returns an error if `OUT_DIR` (or a
    /// custom output directory) was not set, if the `capnp` binary isn't on
    /// `PATH`, or if compilation fails.
    pub fn run(&mut self) -> ::capnp::Result<()> {
        for file in &self.files {
            std::fs::metadata(file).map_err(|error| {
                let current_dir = match std::env::current_dir() {
                    Ok(current_dir) => format!("`{}`", current_dir.display()),
                    Err(..) => "<unknown working directory>".to_string(),
                };

                ::capnp::Error::failed(format!(
                    "Unable to stat capnp input file `{}` in working directory {}: {}.  \
                     Please check that the file exists and is accessible for read.",
                    file.display(),
                    current_dir,
                    error
                ))
            })?;
        }

        let output_path = if let Some(output_path) = &self.output_path {
            output_path.clone()
        } else {
            PathBuf::from(::std::env::var("OUT_DIR").map_err(|error| {
                ::capnp::Error::failed(format!(
                    "Could not access `OUT_DIR` environment variable: {error}. \
                     You might need to set it up or instead create you own output \
                     structure using `CompilerCommand::output_path`"
                ))
            })?)
        };

        let mut command = Command::new("capnp");
        command.arg("compile").arg("-o-");
        for prefix in &self.src_prefixes {
            command.arg(format!("--src-prefix={}", prefix.display()));
        }
        for import in &self.import_paths {
            command.arg(format!("--import-path={}", import.display()));
        }
        if self.no_standard_import {
            command.arg("--no-standard-import");
        }
        command.args(self.files.iter().map(|p| p.display().to_string()));
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let child = command.spawn().map_err(|e| {
            ::capnp::Error::failed(format!(
                "failed to launch the `capnp` schema compiler (is it installed and on PATH?): {e}"
            ))
        })?;
        let output = child.wait_with_output().map_err(convert_io_err)?;
        if !output.status.success() {
            return Err(::capnp::Error::failed(format!(
                "`capnp compile` failed:\n{}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        if let Some(raw_path) = &self.raw_code_generator_request_path {
            std::fs::write(raw_path, &output.stdout).map_err(convert_io_err)?;
        }

        let request = crate::request::read_code_generator_request(&output.stdout[..])?;

        let mut code_generation_command = crate::codegen::CodeGenerationCommand::new();
        code_generation_command.default_parent_module(self.default_parent_module.clone());
        let generated = code_generation_command.run(&request)?;

        for file in &generated {
            let out_file = output_path.join(&file.path);
            if let Some(parent) = out_file.parent() {
                std::fs::create_dir_all(parent).map_err(convert_io_err)?;
            }
            std::fs::write(&out_file, &file.text).map_err(convert_io_err)?;
        }

        if let Some(omnibus) = self.collect_file.as_ref() {
            let mut text = String::new();
            for file in &generated {
                let stem = file
                    .path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("generated");
                text.push_str(&format!("pub mod {} {{\n", crate::naming::module_name(stem)));
                text.push_str(&file.text);
                text.push_str("\n}\n");
            }
            std::fs::write(omnibus, text).map_err(convert_io_err)?;
        }
        Ok(())
    }

    /// Automatically adds all files in `path_patterns`, either relative to the
    /// cargo manifest directory of the current project, or by looking in all
    /// searchable directories that were added via import_path().
    ///
    /// # Arguments
    ///
    /// - `path_patterns`: An array of valid wax::Glob path search patterns, as strings.
    pub fn add_paths(&mut self, path_patterns: &[impl AsRef<str>]) -> ::capnp::Result<()> {
        let manifest: [PathBuf; 1] = [PathBuf::from_str(
            &std::env::var("CARGO_MANIFEST_DIR")
                .map_err(|e| capnp::Error::failed(e.to_string()))?,
        )
        .unwrap()];

        let search_paths: &[PathBuf] = &self.import_paths;
        let glob_matches = path_patterns
            .iter()
            .map(|pattern| -> ::capnp::Result<_> {
                let pattern = pattern.as_ref();
                let (search_prefix, glob) = Glob::new(pattern.trim_start_matches('/'))
                    .map_err(|e| ::capnp::Error::failed(e.to_string()))?
                    .partition();
                Ok((pattern, search_prefix, glob))
            })
            .map(|maybe_pattern| match maybe_pattern {
                Ok((pattern, search_prefix, glob)) => {
                    let initial_paths = if pattern.starts_with('/') {
                        search_paths
                    } else {
                        &manifest
                    };
                    let mut ensure_some = initial_paths
                        .iter()
                        .flat_map(move |dir: &PathBuf| -> _ {
                            glob.walk(dir.join(&search_prefix)).into_owned().flatten()
                        })
                        .peekable();
                    if ensure_some.peek().is_none() {
                        return Err(capnp::Error::failed(format!(
                            "No capnp files found matching {pattern}, did you mean to use an absolute path instead of a relative one?
                Manifest directory for relative paths: {:#?}
                Potential directories for absolute paths: {:#?}",
                            manifest, search_paths
                        )));
                    }
                    Ok(ensure_some)
                }
                Err(err) => Err(err),
            });

        for entry in glob_matches {
            for entry in entry? {
                if entry.file_type().is_file() {
                    self.files.push(entry.path().to_path_buf());
                }
            }
        }

        if self.file_count() == 0 {
            return Err(::capnp::Error::failed(format!(
                "No capnp files found, did you mean to use an absolute path instead of a relative one?
  Manifest directory for relative paths: {:#?}
  Potential directories for absolute paths: {:#?}",
                manifest, search_paths
            )));
        }
        Ok(())
    }

    /// After compilation, collects all compiled files in the output directory
    /// into a single "omnibus" file created at the given path.
    ///
    /// # Arguments
    ///
    /// - `target`: Path where omnibus file should be created.
    pub fn omnibus<P: AsRef<Path>>(&mut self, target: P) -> &mut Self {
        self.collect_file.replace(target.as_ref().to_path_buf());
        self
    }
}

/// Generates a random 64-bit id suitable for a new `.capnp` file's `@0x...`
/// declaration: high bit always set, matching `capnp id`'s output shape.
pub fn generate_random_id() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    let id = RandomState::new().build_hasher().finish();
    id | (1 << 63)
}
