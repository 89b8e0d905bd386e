//! Language to container mapping.
//!
//! Every supported language resolves to an image, a source file extension and
//! the argv that runs `/code/solution.<ext>` inside the container. Compiled
//! languages build and run in one shell pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::JamError;

/// Mount point of the host working directory inside the sandbox
pub const CODE_MOUNT: &str = "/code";
pub const INPUT_FILE: &str = "input.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::Javascript, Language::Cpp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Cpp => "cpp",
        }
    }

    pub fn default_image(&self) -> &'static str {
        match self {
            Language::Python => "python:3.11-slim",
            Language::Javascript => "node:20-slim",
            Language::Cpp => "gcc:13",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Javascript => "js",
            Language::Cpp => "cpp",
        }
    }

    pub fn source_file(&self) -> String {
        format!("solution.{}", self.extension())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = JamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Language::Javascript),
            "cpp" | "c++" => Ok(Language::Cpp),
            other => Err(JamError::UnsupportedLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSpec {
    pub image: String,
    pub extension: &'static str,
    pub command: Vec<String>,
}

/// Pure mapping from a language to its sandbox spec, with optional image overrides.
#[derive(Debug, Clone, Default)]
pub struct CommandResolver {
    images: HashMap<Language, String>,
}

impl CommandResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_images(images: HashMap<Language, String>) -> Self {
        Self { images }
    }

    pub fn resolve(&self, language: Language) -> LanguageSpec {
        let image = self
            .images
            .get(&language)
            .cloned()
            .unwrap_or_else(|| language.default_image().to_string());

        LanguageSpec {
            image,
            extension: language.extension(),
            command: Self::command(language),
        }
    }

    fn command(language: Language) -> Vec<String> {
        let source = format!("{}/{}", CODE_MOUNT, language.source_file());
        match language {
            Language::Python => vec!["python".to_string(), source],
            Language::Javascript => vec!["node".to_string(), source],
            Language::Cpp => {
                let binary = format!("{}/solution", CODE_MOUNT);
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("g++ -o {} {} && {}", binary, source, binary),
                ]
            }
        }
    }
}

/// Wraps `command` so the file at `input_path` is piped into its stdin.
pub fn pipe_input(command: &[String], input_path: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("cat {} | {}", input_path, shell_words::join(command)),
    ]
}

pub fn test_input_path() -> String {
    format!("{}/{}", CODE_MOUNT, INPUT_FILE)
}
