//! Open-mode vocabulary.
//!
//! Mode strings are matched exactly and case-sensitively. The empty string
//! means "lazy": the connection is created without acquiring a resource.

use std::fmt;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Lazy,
    Read,
    ReadBinary,
    Write,
    WriteBinary,
    Append,
    AppendBinary,
    ReadWrite,
    ReadWriteBinary,
    ReadWriteTrunc,
    ReadWriteTruncBinary,
    ReadAppend,
    ReadAppendBinary,
}

/// Which logical cursor a seek applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    Last,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Enquire,
    Start,
    Current,
    End,
}

impl OpenMode {
    pub fn parse(token: &str) -> Result<Self> {
        let mode = match token {
            "" => OpenMode::Lazy,
            "r" | "rt" => OpenMode::Read,
            "rb" => OpenMode::ReadBinary,
            "w" | "wt" | "wr" => OpenMode::Write,
            "wb" => OpenMode::WriteBinary,
            "a" | "at" => OpenMode::Append,
            "ab" => OpenMode::AppendBinary,
            "r+" => OpenMode::ReadWrite,
            "r+b" => OpenMode::ReadWriteBinary,
            "w+" => OpenMode::ReadWriteTrunc,
            "w+b" => OpenMode::ReadWriteTruncBinary,
            "a+" => OpenMode::ReadAppend,
            "a+b" => OpenMode::ReadAppendBinary,
            other => return Err(Error::Mode(other.to_string())),
        };
        Ok(mode)
    }

    /// Canonical token for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Lazy => "",
            OpenMode::Read => "r",
            OpenMode::ReadBinary => "rb",
            OpenMode::Write => "w",
            OpenMode::WriteBinary => "wb",
            OpenMode::Append => "a",
            OpenMode::AppendBinary => "ab",
            OpenMode::ReadWrite => "r+",
            OpenMode::ReadWriteBinary => "r+b",
            OpenMode::ReadWriteTrunc => "w+",
            OpenMode::ReadWriteTruncBinary => "w+b",
            OpenMode::ReadAppend => "a+",
            OpenMode::ReadAppendBinary => "a+b",
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, OpenMode::Lazy)
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            OpenMode::ReadBinary
                | OpenMode::WriteBinary
                | OpenMode::AppendBinary
                | OpenMode::ReadWriteBinary
                | OpenMode::ReadWriteTruncBinary
                | OpenMode::ReadAppendBinary
        )
    }

    pub fn is_text(&self) -> bool {
        !self.is_binary()
    }

    pub fn can_read(&self) -> bool {
        match self {
            OpenMode::Lazy
            | OpenMode::Read
            | OpenMode::ReadBinary
            | OpenMode::ReadWrite
            | OpenMode::ReadWriteBinary
            | OpenMode::ReadWriteTrunc
            | OpenMode::ReadWriteTruncBinary
            | OpenMode::ReadAppend
            | OpenMode::ReadAppendBinary => true,
            OpenMode::Write | OpenMode::WriteBinary | OpenMode::Append | OpenMode::AppendBinary => {
                false
            }
        }
    }

    pub fn can_write(&self) -> bool {
        !matches!(self, OpenMode::Read | OpenMode::ReadBinary)
    }

    pub fn is_append(&self) -> bool {
        matches!(
            self,
            OpenMode::Append
                | OpenMode::AppendBinary
                | OpenMode::ReadAppend
                | OpenMode::ReadAppendBinary
        )
    }

    /// Modes that discard existing content on open.
    pub fn truncates(&self) -> bool {
        matches!(
            self,
            OpenMode::Write
                | OpenMode::WriteBinary
                | OpenMode::ReadWriteTrunc
                | OpenMode::ReadWriteTruncBinary
        )
    }

    /// Modes that hold independent read and write cursors.
    pub fn is_read_write(&self) -> bool {
        self.can_read() && self.can_write() && !self.is_lazy()
    }

    /// Same access pattern, in binary.
    pub fn to_binary(self) -> Self {
        match self {
            OpenMode::Read => OpenMode::ReadBinary,
            OpenMode::Write => OpenMode::WriteBinary,
            OpenMode::Append => OpenMode::AppendBinary,
            OpenMode::ReadWrite => OpenMode::ReadWriteBinary,
            OpenMode::ReadWriteTrunc => OpenMode::ReadWriteTruncBinary,
            OpenMode::ReadAppend => OpenMode::ReadAppendBinary,
            other => other,
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OpenMode::parse(s)
    }
}
