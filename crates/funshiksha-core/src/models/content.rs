//! Localized quiz content.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subject category of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Math,
    Science,
    Technology,
    Engineering,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Math,
        Category::Science,
        Category::Technology,
        Category::Engineering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Math => "math",
            Category::Science => "science",
            Category::Technology => "technology",
            Category::Engineering => "engineering",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("unknown difficulty: {}", s)),
        }
    }
}

/// Supported content locales: English, Hindi, Odia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Hi,
    Or,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::En, Locale::Hi, Locale::Or];

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Hi => "hi",
            Locale::Or => "or",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown locale: {}", s))
    }
}

/// A string in every supported locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub en: String,
    pub hi: String,
    pub or: String,
}

impl LocalizedText {
    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::En => &self.en,
            Locale::Hi => &self.hi,
            Locale::Or => &self.or,
        }
    }
}

/// Option lists in every supported locale. The lists are parallel arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedOptions {
    pub en: Vec<String>,
    pub hi: Vec<String>,
    pub or: Vec<String>,
}

impl LocalizedOptions {
    pub fn get(&self, locale: Locale) -> &[String] {
        match locale {
            Locale::En => &self.en,
            Locale::Hi => &self.hi,
            Locale::Or => &self.or,
        }
    }

    /// Number of options, or `None` if the locales disagree.
    pub fn len(&self) -> Option<usize> {
        let n = self.en.len();
        (self.hi.len() == n && self.or.len() == n).then_some(n)
    }
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub prompt: LocalizedText,
    pub options: LocalizedOptions,
    pub correct_option: usize,
    pub explanation: Option<LocalizedText>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ContentItem {
    /// Check that option lists are parallel and the correct index is in range.
    pub fn validate(&self) -> Result<(), String> {
        let count = self
            .options
            .len()
            .ok_or_else(|| format!("{}: option lists differ in length across locales", self.id))?;
        if count == 0 {
            return Err(format!("{}: no options", self.id));
        }
        if self.correct_option >= count {
            return Err(format!(
                "{}: correct option {} out of range for {} options",
                self.id, self.correct_option, count
            ));
        }
        Ok(())
    }

    pub fn option_count(&self) -> usize {
        self.options.en.len()
    }

    pub fn is_correct(&self, selected: usize) -> bool {
        selected == self.correct_option
    }
}
