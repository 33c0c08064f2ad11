use serde::{Deserialize, Serialize};

use super::require_non_blank;

/// Upper bound on comment body length, in characters.
pub const MAX_COMMENT_CHARS: usize = 8_192;

/// Materialized comment row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub content: String,
    pub author: String,
    pub timestamp: String,
}

/// Input for adding a comment to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub task_id: String,
    pub content: String,
    pub author: String,
}

impl NewComment {
    pub fn new(
        task_id: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            content: content.into(),
            author: author.into(),
        }
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for a blank task id, author, or
    /// content, or content longer than [`MAX_COMMENT_CHARS`].
    pub fn validate(&self) -> crate::Result<()> {
        require_non_blank("taskId", &self.task_id)?;
        require_non_blank("author", &self.author)?;
        require_non_blank("content", &self.content)?;

        let chars = self.content.chars().count();
        if chars > MAX_COMMENT_CHARS {
            return Err(crate::Error::validation(
                "content",
                format!("must be <= {MAX_COMMENT_CHARS} characters (got {chars})"),
            ));
        }
        Ok(())
    }
}
