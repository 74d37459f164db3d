//! Compile-time error reporting.

/// Compile errors. Reported synchronously; no bytecode is produced for a
/// function that fails to compile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// A `name` reference did not resolve in any enclosing scope.
    #[error("unresolved name `{0}`")]
    UnknownName(String),
    /// Two functions share a name.
    #[error("duplicate function `{0}`")]
    DuplicateFunction(String),
    /// The AST does not have the shape the grammar promises.
    #[error("malformed AST: {0}")]
    MalformedAst(String),
    /// A node kind or operator this compiler does not lower.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),
    /// Runtime access to globals is reserved.
    #[error("global `{0}` cannot be used in an expression")]
    ReservedGlobal(String),
    /// `foreach` only iterates up to an integer-constant bound.
    #[error("foreach bound must be an integer constant")]
    ForeachBoundNotConstant,
    /// The function needs more registers than an operand can index.
    #[error("function needs more than {0} registers")]
    TooManyRegisters(usize),
}
