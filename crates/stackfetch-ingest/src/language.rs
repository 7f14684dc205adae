//! Supported languages and their per-dataset names

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use stackfetch_common::StackError;

/// Language selector accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Typescript,
    Java,
    C,
    Cpp,
    Csharp,
    Go,
    Ruby,
    Rust,
    Scala,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::Python,
        Language::Javascript,
        Language::Typescript,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Csharp,
        Language::Go,
        Language::Ruby,
        Language::Rust,
        Language::Scala,
    ];

    /// Key used on the command line and in default artifact names
    pub fn key(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Csharp => "csharp",
            Language::Go => "go",
            Language::Ruby => "ruby",
            Language::Rust => "rust",
            Language::Scala => "scala",
        }
    }

    /// Config name in the deduplicated dataset
    pub fn subset(self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Javascript => "JavaScript",
            Language::Typescript => "TypeScript",
            Language::Java => "Java",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Csharp => "C-Sharp",
            Language::Go => "Go",
            Language::Ruby => "Ruby",
            Language::Rust => "Rust",
            Language::Scala => "Scala",
        }
    }

    /// Data folder in the inline-content mirror
    pub fn folder(self) -> &'static str {
        match self {
            Language::Python => "Python_Files",
            Language::Javascript => "JavaScript_Files",
            Language::Typescript => "TypeScript_Files",
            Language::Java => "Java_Files",
            Language::C => "C_Files",
            Language::Cpp => "CPP_Files",
            Language::Csharp => "C-Sharp_Files",
            Language::Go => "Go_Files",
            Language::Ruby => "Ruby_Files",
            Language::Rust => "Rust_Files",
            Language::Scala => "Scala_Files",
        }
    }

    /// Extension (with leading dot) for exported sample files
    pub fn extension(self) -> &'static str {
        match self {
            Language::Python => ".py",
            Language::Javascript => ".js",
            Language::Typescript => ".ts",
            Language::Java => ".java",
            Language::C => ".c",
            Language::Cpp => ".cpp",
            Language::Csharp => ".cs",
            Language::Go => ".go",
            Language::Ruby => ".rb",
            Language::Rust => ".rs",
            Language::Scala => ".scala",
        }
    }

    fn available() -> String {
        Self::ALL
            .iter()
            .map(|l| l.key())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::str::FromStr for Language {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.key() == s)
            .ok_or_else(|| StackError::UnsupportedLanguage {
                language: s.to_string(),
                available: Self::available(),
            })
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
