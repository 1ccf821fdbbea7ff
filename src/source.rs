//! Loaded program text paired with where it came from, so diagnostics and
//! the REPL can refer back to an origin without re-reading a file.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Some source text and a label for where it came from.
#[derive(Debug, Clone)]
pub struct Source {
    pub contents: String,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    File(PathBuf),
    Repl,
    Anonymous,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File(path) => write!(f, "{}", path.display()),
            Origin::Repl => write!(f, "<repl>"),
            Origin::Anonymous => write!(f, "<anonymous>"),
        }
    }
}

impl Source {
    /// Reads a file into a `Source`.
    pub fn path<P: AsRef<Path>>(path: P) -> io::Result<Source> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Ok(Source { contents, origin: Origin::File(path.to_path_buf()) })
    }

    /// Wraps an in-memory string with no file behind it.
    pub fn anonymous(contents: impl Into<String>) -> Source {
        Source { contents: contents.into(), origin: Origin::Anonymous }
    }

    /// Wraps a single REPL line.
    pub fn repl_line(contents: impl Into<String>) -> Source {
        Source { contents: contents.into(), origin: Origin::Repl }
    }
}
