use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    #[error("Syntax Error: {0}")]
    SyntaxError(#[from] pest::error::Error<crate::front::Rule>),

    #[error("program not initialized")]
    ProgramNotInitialized,

    #[error("invalid instruction")]
    InvalidInstruction,

    #[error("invalid opcode")]
    InvalidOpcode,

    #[error("invalid register operand")]
    InvalidRegister,

    #[error("invalid address")]
    InvalidAddress,

    #[error("invalid label")]
    InvalidLabel,

    #[error("invalid label manager state")]
    InvalidLabelManager,

    #[error("invalid type for variable \"{0}\"")]
    InvalidType(String),

    #[error("invalid size for array \"{0}\"")]
    InvalidArraySize(String),

    #[error("variable identifier unspecified")]
    VariableIdUnspecified,

    #[error("variable \"{0}\" already declared")]
    VariableAlreadyDeclared(String),

    #[error("undeclared variable \"{0}\"")]
    SymbolTableError(String),

    #[error("register allocation failed: {0}")]
    RegisterAllocationError(String),

    #[error("control flow graph undefined")]
    CfgUndefined,

    #[error("invalid basic block in control flow graph")]
    CfgInvalidBlock,

    #[error("invalid node in control flow graph")]
    CfgInvalidNode,

    #[error("branch to unresolvable label \"{0}\"")]
    CfgInvalidLabel(String),

    #[error("out of memory while building control flow graph")]
    CfgOutOfMemory,

    #[error("unable to open file: {0}")]
    FopenError(String),

    #[error("unable to write output file")]
    FwriteError,

    #[error("unable to close output file")]
    FcloseError,

    #[error("invalid input file")]
    InvalidInputFile,

    #[error("invalid control flow graph")]
    InvalidCflowGraph,

    #[error("invalid expression")]
    InvalidExpression,

    #[error("out of memory")]
    OutOfMemory,
}

/// Non-fatal diagnostics; the compilation proceeds with a defined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    DivisionByZero,
    InvalidShiftAmount,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DivisionByZero => write!(f, "division by zero"),
            Warning::InvalidShiftAmount => write!(f, "shift amount is negative"),
        }
    }
}
