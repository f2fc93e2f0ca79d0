//! Compiler error types.
//!
//! Mirrors the compiler's error kinds as a typed enum rather than a
//! bare `String`, so callers can match on kind while still getting a
//! ready-made message via `Display`. Internal optimization passes
//! never raise this — a malformed pattern is simply left unchanged or
//! logged as "not reduced".

#[derive(Debug)]
pub enum CompileError {
    /// Redeclaration of a name in the active scope.
    Redeclaration { name: String },
    /// Use of an undeclared name.
    Undeclared { name: String },
    /// Any other semantic violation: assignment to a non-variable,
    /// indexing a non-array, dimension mismatch, field access on a
    /// non-struct, unknown field, struct value used as an expression,
    /// function name reused for a non-function.
    Semantic(String),
    /// File I/O failure (cannot open source, cannot write output).
    Io(std::io::Error),
    /// Allocation failure in a table or worklist.
    Resource(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Redeclaration { name } => {
                write!(f, "redeclaration of '{}'", name)
            }
            CompileError::Undeclared { name } => write!(f, "use of undeclared name '{}'", name),
            CompileError::Semantic(s) => write!(f, "{}", s),
            CompileError::Io(e) => write!(f, "I/O error: {}", e),
            CompileError::Resource(s) => write!(f, "resource error: {}", s),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<String> for CompileError {
    fn from(s: String) -> Self {
        if let Some(name) = s.strip_prefix("redeclaration of '")
            && let Some(name) = name.strip_suffix('\'')
        {
            return CompileError::Redeclaration {
                name: name.to_string(),
            };
        }
        CompileError::Semantic(s)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaration_string_maps_to_typed_variant() {
        let err: CompileError = "redeclaration of 'x'".to_string().into();
        assert!(matches!(err, CompileError::Redeclaration { name } if name == "x"));
    }

    #[test]
    fn other_string_maps_to_semantic() {
        let err: CompileError = "indexing a non-array".to_string().into();
        assert!(matches!(err, CompileError::Semantic(_)));
    }
}
