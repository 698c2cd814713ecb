use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Domain {domain} is not a valid registry")]
    InvalidRegistry { domain: String },

    #[error("Failed to fetch catalog: {0}")]
    Catalog(String),

    #[error("Failed to list tags of {repo}: {message}")]
    TagList { repo: String, message: String },

    #[error("Failed to fetch {image}: {message}")]
    Fetch { image: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn tag_list(repo: &str, message: impl ToString) -> Self {
        AppError::TagList {
            repo: repo.to_string(),
            message: message.to_string(),
        }
    }

    pub fn fetch(repo: &str, tag: &str, message: impl ToString) -> Self {
        AppError::Fetch {
            image: format!("{}:{}", repo, tag),
            message: message.to_string(),
        }
    }
}
