use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Comments are disabled for this post.")]
    PostDisabled,

    #[error("Comments are closed for this post.")]
    PostClosed,

    #[error("The comment may not be empty.")]
    EmptyBody,

    #[error("This comment does not exist.")]
    CommentNotFound,

    #[error("{message}")]
    Tombstoned { status: u16, message: String },

    #[error("There was a problem saving your comment.")]
    Save(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// HTTP status code this error is reported with
    pub const fn status(&self) -> u16 {
        match self {
            Self::PostDisabled | Self::CommentNotFound => 404,
            Self::PostClosed => 403,
            Self::EmptyBody => 400,
            Self::Tombstoned { status, .. } => *status,
            Self::Save(_) | Self::Io(_) => 500,
        }
    }

    /// Message shown to the visitor
    ///
    /// Filesystem details never reach the client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Io(_) => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
