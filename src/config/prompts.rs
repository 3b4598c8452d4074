//! System prompt templates
//!
//! The system prompt is resolved once at startup: an explicit TOML file wins,
//! otherwise a built-in persona is chosen by name.
//!
//! # Example Prompt File
//!
//! ```toml
//! [persona]
//! name = "Focus Coach"
//! description = "Short, practical answers for getting unstuck"
//!
//! [system_prompt]
//! content = """
//! You are a compassionate ADHD therapy assistant...
//! """
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use super::PromptConfig;

/// A persona/prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Persona metadata
    pub persona: PersonaInfo,

    /// The system prompt
    pub system_prompt: SystemPrompt,
}

/// Persona metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    /// Display name of the persona
    pub name: String,

    /// Brief description
    #[serde(default)]
    pub description: String,
}

/// System prompt content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// The full system prompt content
    pub content: String,
}

impl PromptTemplate {
    /// Load a template from a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PromptError> {
        let template: PromptTemplate =
            toml::from_str(content).map_err(|e| PromptError::ParseError(e.to_string()))?;

        if template.system_prompt.content.trim().is_empty() {
            return Err(PromptError::ParseError(
                "system_prompt.content is empty".to_string(),
            ));
        }
        Ok(template)
    }
}

/// Errors from prompt loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),
}

/// Resolve the system prompt: prompt file > persona name
pub async fn resolve_system_prompt(config: &PromptConfig) -> Result<String, PromptError> {
    if let Some(ref path) = config.file {
        let template = PromptTemplate::load_from_file(path).await?;
        tracing::info!(persona = %template.persona.name, "Loaded system prompt from {}", path.display());
        return Ok(template.system_prompt.content);
    }

    builtin::by_name(&config.persona)
        .map(str::to_string)
        .ok_or_else(|| PromptError::UnknownPersona(config.persona.clone()))
}

/// Built-in prompts that don't require files
pub mod builtin {
    /// One-line persona
    pub const BRIEF: &str =
        "You are a compassionate ADHD therapy assistant trained in cognitive behavioral techniques.";

    /// Persona with explicit tone and style guidance
    pub const GUIDED: &str = r#"You are a compassionate ADHD therapy assistant trained in cognitive behavioral techniques.
You should:
    - Provide clear, concise, and direct responses. Avoid jargon and overly complex explanations.
    - Use a friendly, empathetic, and conversational tone. Respond in a way that feels natural and human-like.
    - Be patient, supportive, and encouraging in your tone, especially when discussing behavioral techniques.
    - Always ask if the user would like to talk more about a topic if the conversation feels incomplete.
    - Offer actionable advice and insights that the user can apply immediately in their daily life.
    - Keep responses at a practical level, avoiding theoretical over-explanation unless specifically asked for it.
    - If the user shows signs of frustration or confusion, acknowledge it empathetically and offer help."#;

    pub fn by_name(name: &str) -> Option<&'static str> {
        match name.to_lowercase().as_str() {
            "brief" | "short" => Some(BRIEF),
            "guided" | "default" => Some(GUIDED),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_template() {
        let toml_content = r#"
[persona]
name = "Test Persona"
description = "A test persona"

[system_prompt]
content = "You are a test assistant."
"#;

        let template = PromptTemplate::parse(toml_content).unwrap();
        assert_eq!(template.persona.name, "Test Persona");
        assert_eq!(template.system_prompt.content, "You are a test assistant.");
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let toml_content = r#"
[persona]
name = "Minimal"

[system_prompt]
content = "  "
"#;

        assert!(matches!(
            PromptTemplate::parse(toml_content),
            Err(PromptError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_builtin_persona() {
        let config = PromptConfig {
            file: None,
            persona: "Brief".into(),
        };
        assert_eq!(resolve_system_prompt(&config).await.unwrap(), builtin::BRIEF);

        let unknown = PromptConfig {
            file: None,
            persona: "pirate".into(),
        };
        assert!(matches!(
            resolve_system_prompt(&unknown).await,
            Err(PromptError::UnknownPersona(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_file_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[persona]\nname = \"Coach\"\n\n[system_prompt]\ncontent = \"Keep it short.\""
        )
        .unwrap();

        let config = PromptConfig {
            file: Some(file.path().to_path_buf()),
            persona: "brief".into(),
        };
        assert_eq!(resolve_system_prompt(&config).await.unwrap(), "Keep it short.");
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let config = PromptConfig {
            file: Some("/nonexistent/prompt.toml".into()),
            persona: "brief".into(),
        };
        assert!(matches!(
            resolve_system_prompt(&config).await,
            Err(PromptError::IoError(_))
        ));
    }
}
