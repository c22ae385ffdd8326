use std::fmt;
use std::sync::Arc;

/// Source location of an expression or statement.
///
/// Line and column are 1-based; `0` means "unknown". The file name is
/// shared between every origin produced from the same source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub file: Arc<str>,
    pub line: u32,
    pub col: u32,
}

impl Origin {
    /// Create a new origin.
    pub fn new(file: impl Into<Arc<str>>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }

    /// An origin for compiler-synthesized code with no source location.
    pub fn builtin() -> Self {
        Self::new("<builtin>", 0, 0)
    }

    /// Same file, different line.
    pub fn at_line(&self, line: u32) -> Self {
        Self {
            file: Arc::clone(&self.file),
            line,
            col: 0,
        }
    }

    /// Whether this origin points at real source text.
    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.col) {
            (0, _) => write!(f, "{}", self.file),
            (line, 0) => write!(f, "{}:{}", self.file, line),
            (line, col) => write!(f, "{}:{}:{}", self.file, line, col),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::new("a.c", 3, 7).to_string(), "a.c:3:7");
        assert_eq!(Origin::new("a.c", 3, 0).to_string(), "a.c:3");
        assert_eq!(Origin::builtin().to_string(), "<builtin>");
    }

    #[test]
    fn test_origin_at_line_shares_file() {
        let a = Origin::new("lib.asm", 1, 4);
        let b = a.at_line(9);
        assert!(Arc::ptr_eq(&a.file, &b.file));
        assert_eq!(b.line, 9);
        assert_eq!(b.col, 0);
    }

    #[test]
    fn test_origin_known() {
        assert!(Origin::new("x", 1, 1).is_known());
        assert!(!Origin::builtin().is_known());
    }
}
