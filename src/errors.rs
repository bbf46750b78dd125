use thiserror::Error;

#[derive(Debug, Error)]
pub enum AndroidUseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("adb error: {0}")]
    Adb(String),

    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Action parsing error: {0}")]
    ActionParsing(String),

    #[error("Action validation error: {0}")]
    ActionValidation(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Swarm error: {0}")]
    Swarm(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Task cancelled")]
    Cancelled,
}

impl serde::Serialize for AndroidUseError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type AndroidUseResult<T> = Result<T, AndroidUseError>;
