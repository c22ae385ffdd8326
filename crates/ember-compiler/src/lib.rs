//! Ember compiler: orchestrates the IR to bytecode pipeline.
//!
//! ```text
//! Program → pre → check → opt → size → translate → emit → object bytes
//! ```
//!
//! Front ends hand over a type-checked [`Program`]; [`compile`] runs the
//! configured target over it and returns the object, or the first fatal
//! error. [`compile_to_result`] wraps the same run in a serializable
//! [`CompileResult`] for tools.

pub mod config;
pub mod error;
pub mod logging;
pub mod output;

use ember_bc::{Driver, ZdacsTarget};
use ember_ir::{Diagnostic, Program};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use config::{CompileConfig, LogConfig, LogFormat, LogLevel, TargetKind};
pub use error::CompileError;
pub use output::{object_sha256, write_object};

/// Compile a program to an object file image.
pub fn compile(prog: Program, config: &CompileConfig) -> Result<Vec<u8>, CompileError> {
    let mut prog = prog;
    info!(
        target: "ember::compiler",
        target_kind = ?config.target,
        funcs = prog.funcs.len(),
        objs = prog.objs.len(),
        strs = prog.strs.len(),
        "compile start"
    );
    let object = match config.target {
        TargetKind::Zdacs => {
            let mut target = ZdacsTarget::new(config.zdacs.clone());
            Driver::new(&mut target).run(&mut prog)
        }
    };
    match object {
        Ok(bytes) => {
            info!(target: "ember::compiler", bytes = bytes.len(), "compile finished");
            Ok(bytes)
        }
        Err(e) => {
            warn!(target: "ember::compiler", error = %e, "compile failed");
            Err(e.into())
        }
    }
}

/// Outcome of one compilation, as reported to tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    /// Object bytes, present on success.
    pub object: Option<Vec<u8>>,
    /// Lowercase hex SHA-256 of `object`.
    pub object_sha256: Option<String>,
    /// The first fatal error, present on failure.
    pub error: Option<Diagnostic>,
}

/// Compile and package the outcome as a [`CompileResult`].
pub fn compile_to_result(prog: Program, config: &CompileConfig) -> CompileResult {
    match compile(prog, config) {
        Ok(object) => CompileResult {
            success: true,
            object_sha256: Some(object_sha256(&object)),
            object: Some(object),
            error: None,
        },
        Err(e) => CompileResult {
            success: false,
            object: None,
            object_sha256: None,
            error: Some(e.to_diagnostic()),
        },
    }
}
