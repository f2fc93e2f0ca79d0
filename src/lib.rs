//! TAC middle-end and fixed-point optimizer for a mini-C compiler:
//! parses source into a builder-driven three-address-code program,
//! then runs the optimization pipeline to a fixed point.

pub mod access_path;
pub mod builder;
pub mod cfg;
pub mod config;
pub mod dump;
pub mod error;
pub mod optlog;
pub mod parser;
pub mod passes;
pub mod symbol;
pub mod tac;
pub mod types;

use std::path::Path;

pub use config::PipelineConfig;
pub use error::CompileError;
pub use optlog::OptLog;
pub use tac::Program;

/// Parse and build `source`, then run the optimization pipeline with
/// `config`. Returns the optimized program and the change log.
pub fn compile_source(source: &str, config: &PipelineConfig) -> Result<(Program, OptLog), CompileError> {
    let mut prog = parser::parse_program(source)?;
    let log = passes::optimize(&mut prog, config);
    Ok((prog, log))
}

pub fn compile_file(path: &Path, config: &PipelineConfig) -> Result<(Program, OptLog), CompileError> {
    let source = std::fs::read_to_string(path)?;
    compile_source(&source, config)
}
