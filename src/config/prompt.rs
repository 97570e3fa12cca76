use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;

#[derive(Debug)]
pub enum PromptError {
    UnknownPlaceholder(String),
    UnclosedPlaceholder(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::UnknownPlaceholder(key) => write!(f, "Unknown template placeholder '{{{}}}'", key),
            PromptError::UnclosedPlaceholder(template) => write!(f, "Unclosed placeholder in template '{}'", template),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

pub const SUMMARIZE_TEMPLATE: &str = "Please summarize the following text:\n\n{text}";
pub const SUGGEST_TEMPLATE: &str = "Please provide suggestions to improve the following text:\n\n{text}";
pub const COMPLETE_TEMPLATE: &str = "Please continue the following text in the same style:\n\n{text}";
pub const EDIT_TEMPLATE: &str = "Please edit the following text to improve clarity, grammar and flow:\n\n{text}";
pub const TRANSLATE_TEMPLATE: &str = "Please translate the following text to {language}:\n\n{text}";
pub const REWRITE_TEMPLATE: &str = "Please rewrite the following text {style}:\n\n{text}";
pub const CUSTOM_TEMPLATE: &str = "{instruction}\n\n{text}";

/// Editing prompt templates. Any template missing from a prompts file keeps
/// its built-in text.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PromptTemplates {
    pub summarize: String,
    pub suggest: String,
    pub complete: String,
    pub edit: String,
    pub translate: String,
    pub rewrite: String,
    pub custom: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            summarize: SUMMARIZE_TEMPLATE.to_string(),
            suggest: SUGGEST_TEMPLATE.to_string(),
            complete: COMPLETE_TEMPLATE.to_string(),
            edit: EDIT_TEMPLATE.to_string(),
            translate: TRANSLATE_TEMPLATE.to_string(),
            rewrite: REWRITE_TEMPLATE.to_string(),
            custom: CUSTOM_TEMPLATE.to_string(),
        }
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptTemplates>, PromptError> {
    let file_content = fs::read_to_string(path.as_ref())?;
    let templates: PromptTemplates = serde_json::from_str(&file_content)?;
    // Each template may only use the placeholders its operation fills in.
    for (template, extra) in [
        (&templates.summarize, None),
        (&templates.suggest, None),
        (&templates.complete, None),
        (&templates.edit, None),
        (&templates.translate, Some("language")),
        (&templates.rewrite, Some("style")),
        (&templates.custom, Some("instruction")),
    ] {
        match extra {
            Some(name) => render(template, &[("text", ""), (name, "")])?,
            None => render(template, &[("text", "")])?,
        };
    }
    info!("Loaded prompt templates from {}", path.as_ref().display());
    Ok(Arc::new(templates))
}

/// Substitutes `{name}` placeholders in one pass, so values that themselves
/// contain braces are inserted literally. `{{` and `}}` escape a brace.
pub fn render(template: &str, values: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
        } else {
            let end = tail
                .find('}')
                .ok_or_else(|| PromptError::UnclosedPlaceholder(template.to_string()))?;
            let key = &tail[1..end];
            let value = values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| *value)
                .ok_or_else(|| PromptError::UnknownPlaceholder(key.to_string()))?;
            out.push_str(value);
            rest = &tail[end + 1..];
        }
    }
    out.push_str(rest);

    Ok(out)
}
