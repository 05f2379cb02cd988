//! Compiler options.

/// Options for a single compilation, builder style.
///
/// ```
/// use silc::CompilerOptions;
///
/// let options = CompilerOptions::new().with_dump_tokens(true);
/// assert!(options.dump_tokens);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Print the token stream to stderr after scanning.
    pub dump_tokens: bool,
    /// Print the parsed AST to stderr.
    pub dump_ast: bool,
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dump_tokens(mut self, on: bool) -> Self {
        self.dump_tokens = on;
        self
    }

    pub fn with_dump_ast(mut self, on: bool) -> Self {
        self.dump_ast = on;
        self
    }
}
