use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

/// Prompt templates for each stage. Placeholders: `{text}` (translation
/// only), `{title}`, `{description}`, `{language}`, `{categories}` and
/// `{max_chars}` (AI title only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub translate: String,
    pub summarize: String,
    pub ai_title: String,
    pub categorize: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            translate: "Translate the following text into {language}. \
                Respond with only the translation, no additional text.\n\n{text}"
                .to_string(),
            summarize: "Please provide a brief, one-paragraph summary in {language} \
                of the following article:\nTitle: {title}\nContent: {description}\n\n\
                Keep the summary concise and focused on the key points."
                .to_string(),
            ai_title: "Create a concise, engaging title (maximum {max_chars} characters) in {language} \
                for this article that captures its main point:\nOriginal Title: {title}\n\
                Content: {description}\n\nRespond with only the new title, no additional text."
                .to_string(),
            categorize: "Classify the following article into exactly one of these \
                categories: {categories}.\nTitle: {title}\nContent: {description}\n\n\
                Respond with only the category name."
                .to_string(),
        }
    }
}

/// Substitute `{name}` placeholders in a single pass. Unknown placeholders
/// are left as written, and substituted values are never re-expanded.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
