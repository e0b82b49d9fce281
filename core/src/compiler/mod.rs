//! Flow to Lua compiler
//!
//! `parser` builds the Flow AST, `semantic_validator` reports problems the
//! grammar can't catch, `transform` lowers the AST to a Lua syntax tree and
//! `lua::emit` prints it together with a source map.

pub mod ast;
pub mod lua;
pub mod lualib;
pub mod parser;
pub mod semantic_validator;
pub mod source_map;
pub mod transform;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use self::ast::{Module, Stmt};
use self::lua::ast::Chunk;
use self::lualib::LuaLibImport;
use self::parser::{parse_module, ParseError};
use self::semantic_validator::{validate_module, ValidationContext};
use self::source_map::SourceMap;
use crate::types::{Diagnostic, Severity};

pub use parser::{offset_to_line_col, parse_expression, ParseResult};

/// Fixed compiler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    pub lualib_import: LuaLibImport,
    /// Produce a Source Map v3 document next to the script
    pub source_map: bool,
    /// Prefix stripped from document URIs to form source map paths
    pub source_root: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            lualib_import: LuaLibImport::Inline,
            source_map: true,
            source_root: "inmemory://model/".to_string(),
        }
    }
}

/// Everything one compile produces for the requested file
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub script: String,
    pub ast: Chunk,
    pub source_map: String,
    /// Diagnostics for every file in the program, tagged with their file
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile `target` as part of a program made of `files` (uri, text).
///
/// Ambient declarations in any file are visible to all of them. Returns
/// `None` when `target` is not one of the files.
pub fn compile_program<'a, I>(files: I, target: &str, options: &CompilerOptions) -> Option<Compilation>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let parsed: Vec<(&str, &str, Result<Module, ParseError>)> = files
        .into_iter()
        .map(|(uri, text)| (uri, text, parse_module(text)))
        .collect();

    let globals: HashSet<String> = parsed
        .iter()
        .filter_map(|(_, _, result)| result.as_ref().ok())
        .flat_map(ambient_names)
        .collect();

    let mut diagnostics = Vec::new();
    let mut output = None;

    for (uri, text, result) in &parsed {
        match result {
            Ok(module) => {
                let ctx = ValidationContext::new(text).with_globals(globals.iter().cloned());
                diagnostics.extend(
                    validate_module(module, &ctx)
                        .iter()
                        .map(|e| e.to_diagnostic(uri)),
                );
            }
            Err(err) => diagnostics.push(syntax_diagnostic(err, uri)),
        }

        if *uri == target {
            output = Some(match result {
                Ok(module) => emit(module, uri, text, options),
                Err(_) => Compilation::default(),
            });
        }
    }

    output.map(|compilation| Compilation {
        diagnostics,
        ..compilation
    })
}

/// Compile a single standalone file
pub fn compile_source(uri: &str, source: &str, options: &CompilerOptions) -> Compilation {
    compile_program([(uri, source)], uri, options).unwrap_or_default()
}

fn ambient_names(module: &Module) -> Vec<String> {
    module
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Ambient { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn syntax_diagnostic(err: &ParseError, uri: &str) -> Diagnostic {
    let span = err.span().unwrap_or_default();
    Diagnostic {
        severity: Severity::Error,
        message: err.message().to_string(),
        start: span.start,
        length: span.len(),
        line: span.start_line,
        column: span.start_col,
        code: "syntax-error".to_string(),
        file: uri.to_string(),
    }
}

fn emit(module: &Module, uri: &str, text: &str, options: &CompilerOptions) -> Compilation {
    let chunk = transform::transform_module(module, options.lualib_import);
    let emitted = lua::emit_chunk(&chunk);

    let source_map = if options.source_map {
        let source = uri.strip_prefix(options.source_root.as_str()).unwrap_or(uri);
        let file = Path::new(source).with_extension("lua");
        SourceMap::new(
            file.to_string_lossy(),
            options.source_root.as_str(),
            source,
            &emitted.mappings,
        )
        .with_content(text)
        .to_json()
    } else {
        String::new()
    };

    Compilation {
        script: emitted.code,
        ast: chunk,
        source_map,
        diagnostics: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = "inmemory://model/main.flow";

    #[test]
    fn test_compile_source() {
        let out = compile_source(MAIN, "const x = 1\nconsole.log(x)", &CompilerOptions::default());
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.script, "local x = 1\nprint(x)\n");

        let map: serde_json::Value = serde_json::from_str(&out.source_map).unwrap();
        assert_eq!(map["file"], "main.lua");
        assert_eq!(map["sources"][0], "main.flow");
        assert_eq!(map["sourceRoot"], "inmemory://model/");
        assert_eq!(map["mappings"], "AAAA;AACA");
    }

    #[test]
    fn test_syntax_error_becomes_diagnostic() {
        let out = compile_source(MAIN, "let x = ;", &CompilerOptions::default());
        assert_eq!(out.script, "");
        assert_eq!(out.diagnostics.len(), 1);
        let diagnostic = &out.diagnostics[0];
        assert_eq!(diagnostic.code, "syntax-error");
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.file, MAIN);
        assert_eq!(diagnostic.line, 0);
    }

    #[test]
    fn test_ambient_declarations_shared_across_files() {
        let files = [
            (MAIN, "print(hostVersion)"),
            ("inmemory://model/globals.flow", "declare const hostVersion;"),
        ];
        let out = compile_program(files, MAIN, &CompilerOptions::default()).unwrap();
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    #[test]
    fn test_diagnostics_tagged_with_file() {
        let other = "inmemory://model/other.flow";
        let files = [(MAIN, "print(1)"), (other, "print(missing)")];
        let out = compile_program(files, MAIN, &CompilerOptions::default()).unwrap();
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].file, other);
    }

    #[test]
    fn test_unknown_target() {
        let files = [(MAIN, "print(1)")];
        assert!(compile_program(files, "inmemory://model/nope.flow", &CompilerOptions::default())
            .is_none());
    }

    #[test]
    fn test_source_map_disabled() {
        let options = CompilerOptions {
            source_map: false,
            ..CompilerOptions::default()
        };
        assert_eq!(compile_source(MAIN, "print(1)", &options).source_map, "");
    }
}
