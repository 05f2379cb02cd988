//! SIL compiler library.
//!
//! Compiles SIL kernel source to SPIR-V assembly text for the OpenCL
//! execution model. The pipeline:
//!
//! 1. [`preprocess`]: Mini-SIL text passes expand fixed-size arrays into
//!    scalars and unroll `for` loops; the `@cpu` host tail is split off.
//! 2. [`lexer`]: a single-pass scanner produces the token stream.
//! 3. [`parser`]: recursive descent builds the typed AST.
//! 4. [`typecheck`]: semantic checks over every statement.
//! 5. [`codegen`]: SSA-form SPIR-V assembly with structured control flow.
//!
//! The `@cpu` block's raw text is returned untouched for a host runtime;
//! this crate never interprets it. Assembling the textual output into a
//! SPIR-V binary and executing it are external concerns.
//!
//! ```
//! use silc::{CompilerOptions, compile_source};
//!
//! let source = "kernel add(a: int, b: int, out: int) { out = a + b; return; }";
//! let output = compile_source(source, &CompilerOptions::default()).unwrap();
//! let assembly = output.assembly.unwrap();
//! assert!(assembly.contains("OpEntryPoint Kernel"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod test_runner;
pub mod typecheck;

pub use ast::{Expr, Kernel, Param, Program, ScalarType, Stmt, Type};
pub use codegen::CodeGen;
pub use config::CompilerOptions;
pub use error::{CompileError, Span};
pub use lexer::{Token, tokenize};
pub use parser::Parser;
pub use test_runner::{TestRunner, TestSummary};

use std::fs;
use std::path::Path;

/// Result of compiling one source file.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// SPIR-V assembly for the kernels; `None` when the source has none.
    pub assembly: Option<String>,
    /// Raw text of the `@cpu` block, to be handed to the host unchanged.
    pub host_code: Option<String>,
}

/// Compile SIL source text. Kernels go to the generator; the `@cpu` block,
/// if any, is split off and returned verbatim.
pub fn compile_source(
    source: &str,
    options: &CompilerOptions,
) -> Result<CompileOutput, CompileError> {
    let expanded = preprocess::preprocess(source)?;
    let tokens = lexer::tokenize(&expanded)?;
    if options.dump_tokens {
        eprint!("{}", lexer::display_tokens(&tokens));
    }
    let program = Parser::new(tokens).parse()?;
    if options.dump_ast {
        eprintln!("{:#?}", program);
    }
    typecheck::check_program(&program)?;

    let mut host_code = None;
    let mut gpu_items = Vec::new();
    for item in program.items {
        match item {
            Stmt::CpuBlock { code, .. } => host_code = Some(code),
            other => gpu_items.push(other),
        }
    }

    let has_kernels = gpu_items.iter().any(|item| matches!(item, Stmt::Kernel(_)));
    let assembly = if has_kernels {
        Some(CodeGen::new().generate(&gpu_items)?)
    } else {
        None
    };

    Ok(CompileOutput {
        assembly,
        host_code,
    })
}

/// Compile `input` and write the assembly to `output`. File errors and
/// compile errors both surface as strings, ready for the CLI.
pub fn compile_file(
    input: &Path,
    output: &Path,
    options: &CompilerOptions,
) -> Result<CompileOutput, String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
    let result = compile_source(&source, options).map_err(|e| e.to_string())?;
    if let Some(assembly) = &result.assembly {
        fs::write(output, assembly)
            .map_err(|e| format!("failed to write {}: {}", output.display(), e))?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_end_to_end() {
        let output = compile_source(
            "kernel add(a: int, b: int, out: int) { var s: int = 0; s = a + b; out = s; return; }",
            &CompilerOptions::default(),
        )
        .unwrap();
        let assembly = output.assembly.unwrap();
        assert!(assembly.contains("OpEntryPoint Kernel"));
        assert!(assembly.contains("OpIAdd"));
        assert!(output.host_code.is_none());
    }

    #[test]
    fn test_cpu_block_is_split_off_verbatim() {
        let output = compile_source(
            "kernel k(out: int) { out = 1; return; }\n@cpu\nrt.run_scalar(\"k\")\nprint(\"done\")",
            &CompilerOptions::default(),
        )
        .unwrap();
        assert!(output.assembly.is_some());
        assert_eq!(
            output.host_code.as_deref(),
            Some("rt.run_scalar(\"k\")\nprint(\"done\")")
        );
    }

    #[test]
    fn test_no_kernels_means_no_assembly() {
        let output = compile_source("var x: uint = 1;", &CompilerOptions::default()).unwrap();
        assert!(output.assembly.is_none());
    }

    #[test]
    fn test_top_level_type_mismatch_fails() {
        let err = compile_source(
            "var x: uint = 0; var y: float = 0.0; x = x + y;",
            &CompilerOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
        assert!(err.to_string().contains("type mismatch in binary operation"));
    }

    #[test]
    fn test_array_kernel_through_full_pipeline() {
        let source = "\
kernel k(a: uint = array[2][2], out: uint) {
var s: uint = 0;
for i in range(0,2):
    for j in range(0,2):
        s = s + a[i][j];
out = s;
return;
}";
        let output = compile_source(source, &CompilerOptions::default()).unwrap();
        let assembly = output.assembly.unwrap();
        // four expanded parameters plus out
        assert_eq!(assembly.matches("OpFunctionParameter").count(), 5);
        // one unrolled add per array element
        assert_eq!(assembly.matches("OpIAdd").count(), 4);
    }

    #[test]
    fn test_compile_file_writes_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("k.sil");
        let output = dir.path().join("k.spvasm");
        fs::write(&input, "kernel k(out: int) { out = 2; return; }").unwrap();

        let result = compile_file(&input, &output, &CompilerOptions::default()).unwrap();
        assert!(result.assembly.is_some());
        let written = fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("; SPIR-V"));
    }

    #[test]
    fn test_compile_file_reports_missing_input() {
        let err = compile_file(
            Path::new("/nonexistent/input.sil"),
            Path::new("/nonexistent/out.spvasm"),
            &CompilerOptions::default(),
        )
        .unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn test_lex_error_surfaces() {
        let err = compile_source("kernel k(out: int) { out = $; }", &CompilerOptions::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::Lex { .. }));
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = compile_source("kernel k(out: int { }", &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }
}
