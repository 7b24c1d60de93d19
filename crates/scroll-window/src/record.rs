use serde::{Deserialize, Serialize};
use std::fmt;

/// Feed-global ordinal position of a record.
pub type Offset = i64;

/// One row of the feed. The wire names match the records endpoint (`SRC`, `OFFSET`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "SRC", alias = "source")]
    pub source: String,
    #[serde(rename = "OFFSET", alias = "offset")]
    pub offset: Offset,
}

impl Record {
    pub fn new(source: impl Into<String>, offset: Offset) -> Self {
        Self {
            source: source.into(),
            offset,
        }
    }
}

/// End of a window that grows or shrinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Top,
    Bottom,
}

impl Edge {
    pub fn opposite(self) -> Self {
        match self {
            Edge::Top => Edge::Bottom,
            Edge::Bottom => Edge::Top,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Edge::Top => "top",
            Edge::Bottom => "bottom",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
