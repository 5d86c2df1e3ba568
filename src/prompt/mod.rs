//! Prompt Expansion Engine
//!
//! Escape-sequence prompt templates with context groups.

pub mod escapes;
pub mod expand;
pub mod git;
pub mod lexer;
pub mod parser;

pub use expand::{expand, PromptExpander, PromptGlyphs, PromptState};
pub use git::{Git2Probe, GitSnapshot, NoRepo, RepoProbe};
pub use parser::{parse_prompt, PromptNode};

/// Template used when none is configured
pub const DEFAULT_PROMPT: &str = "\\w \\(on \\B\\([\\G]\\) \\)\\(\\F\\?\\)\\$ ";
