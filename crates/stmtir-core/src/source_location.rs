use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file_id: u32,
    pub start: u32,
    pub len: u32,
}

pub const INVALID_SPAN: SourceSpan = SourceSpan {
    file_id: u32::MAX,
    start: 0,
    len: 0,
};

impl SourceSpan {
    pub fn new(file_id: u32, start: u32, len: u32) -> Self {
        Self {
            file_id,
            start,
            len,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.file_id != u32::MAX && self.len > 0
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.len)
    }

    pub fn contains(&self, other: &SourceSpan) -> bool {
        self.file_id == other.file_id && other.start >= self.start && other.end() <= self.end()
    }

    pub fn merge(&self, other: &SourceSpan) -> Option<SourceSpan> {
        if self.file_id != other.file_id {
            return None;
        }

        let start = self.start.min(other.start);
        let end = self.end().max(other.end());

        Some(SourceSpan::new(
            self.file_id,
            start,
            end.saturating_sub(start),
        ))
    }
}

impl Default for SourceSpan {
    fn default() -> Self {
        INVALID_SPAN
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "file{}:{}..{}", self.file_id, self.start, self.end())
        } else {
            write!(f, "<unknown>")
        }
    }
}
