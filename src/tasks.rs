//! The three classification tasks, their prompts and their answer formats.
//!
//! An [`Item`] is one article prepared for one task: correlation key, prompt
//! messages and the parser that reads the model's answer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::articles::{CorrelationKey, SourceArticle};
use crate::batch::types::ChatBody;
use crate::batch::{Message, RequestLine};
use crate::config::TaskSettings;
use crate::error::{PipelineError, ScoreParseError};

/// Lower end of the lean scale (left).
pub const LEAN_MIN: f64 = -42.0;
/// Upper end of the lean scale (right).
pub const LEAN_MAX: f64 = 42.0;
/// Rating substituted for answers that cannot be read.
pub const NEUTRAL_LEAN: f64 = 0.0;

const SYSTEM_PROMPT: &str = "You are an intelligent political scientist.";

pub const PRESET_TOPICS: &[&str] = &[
    "education reform",
    "geopolitics",
    "Russia-Ukraine War",
    "Israel-Hamas War",
    "diversity & inclusion",
    "democracy",
    "humanitarian",
    "LGTBQ",
    "feminism",
    "death penalty",
    "religion",
    "human rights",
    "economy",
    "cost of living",
    "consumerism",
    "health care",
    "abortion",
    "climate change",
    "environmental issues",
    "racism",
    "renewable energy",
    "cyber security",
    "technology & innovation",
    "crime",
    "mental health",
    "cultural critique",
    "gun control",
    "drugs",
    "terrorism",
    "immigration",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Is the article about social or political topics at all (Y/N).
    Screen,
    /// Political lean score on [-42, 42].
    Lean,
    /// One category from [`PRESET_TOPICS`].
    Topic,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Screen, TaskKind::Lean, TaskKind::Topic];

    /// Batch metadata description.
    pub fn description(self) -> &'static str {
        match self {
            TaskKind::Screen => "Black-white political screening of articles",
            TaskKind::Lean => "Political lean evaluation of articles",
            TaskKind::Topic => "Categorical topic sorting of articles",
        }
    }

    pub fn parser(self) -> ResponseParser {
        match self {
            TaskKind::Screen => ResponseParser::YesNo,
            TaskKind::Lean => ResponseParser::LeanScore,
            TaskKind::Topic => ResponseParser::Category,
        }
    }

    pub fn prompt(self, headline: &str, body: &str) -> Vec<Message> {
        let question = match self {
            TaskKind::Screen => format!(
                "Take into account this article with headline '{headline}' and body text '{body}', \
                 Is this article related to any social or political stances/ideas/topics at all? \
                 Answer with strictly Y or N"
            ),
            TaskKind::Lean => format!(
                "Assign a political lean score on scale of -42 (left) to 42 (right) to this article, \
                 HEADLINE:'{headline}' and BODY TEXT: '{body}' Try not 0.0, specific and precise, \
                 one sig. fig. Format: number | 1-word justification"
            ),
            TaskKind::Topic => format!(
                "Sort this article into a category, HEADLINE:'{headline}' and BODY TEXT: '{body}' \
                 | Category List: {} | Respond with ONLY ONE category in this list, nothing more.",
                PRESET_TOPICS.join(",")
            ),
        };
        vec![Message::system(SYSTEM_PROMPT), Message::user(question)]
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Screen => write!(f, "screen"),
            TaskKind::Lean => write!(f, "lean"),
            TaskKind::Topic => write!(f, "topic"),
        }
    }
}

/// A model answer read according to its task.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Political(bool),
    Lean(f64),
    Topic(String),
}

/// How the raw answer text of a task is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseParser {
    YesNo,
    LeanScore,
    Category,
}

impl ResponseParser {
    pub fn parse(self, text: &str) -> Result<Verdict, ScoreParseError> {
        match self {
            ResponseParser::YesNo => Ok(Verdict::Political(is_political(text))),
            ResponseParser::LeanScore => parse_lean(text).map(Verdict::Lean),
            ResponseParser::Category => parse_topic(text).map(Verdict::Topic),
        }
    }
}

/// `Y`, `Yes`, `y.`, `**Y**` and `"Y"` are political; anything else is not.
/// Quoting and markdown around the answer are ignored.
pub fn is_political(text: &str) -> bool {
    text.trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
        .starts_with('y')
}

/// Read `number | justification`.
pub fn parse_lean(text: &str) -> Result<f64, ScoreParseError> {
    let head = text.split('|').next().unwrap_or("").trim();
    if head.is_empty() {
        return Err(ScoreParseError::Empty);
    }
    let value = head
        .parse::<f64>()
        .map_err(|_| ScoreParseError::NotANumber(head.to_string()))?;
    if !(LEAN_MIN..=LEAN_MAX).contains(&value) {
        return Err(ScoreParseError::OutOfRange(value));
    }
    Ok(value)
}

/// Lean rating with unreadable answers mapped to [`NEUTRAL_LEAN`].
pub fn lean_or_neutral(text: &str) -> f64 {
    match parse_lean(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, answer = %text, "unreadable lean answer; using neutral");
            NEUTRAL_LEAN
        }
    }
}

pub fn parse_topic(text: &str) -> Result<String, ScoreParseError> {
    let topic = text.trim().trim_end_matches('.').trim();
    if topic.is_empty() {
        return Err(ScoreParseError::Empty);
    }
    Ok(topic.to_string())
}

/// One article prepared for one task.
#[derive(Debug, Clone)]
pub struct Item {
    pub kind: TaskKind,
    pub key: CorrelationKey,
    pub messages: Vec<Message>,
}

impl Item {
    pub fn new(kind: TaskKind, article: &SourceArticle) -> Result<Self, PipelineError> {
        Ok(Self {
            kind,
            key: article.key()?,
            messages: kind.prompt(&article.headline, &article.body),
        })
    }

    pub fn parser(&self) -> ResponseParser {
        self.kind.parser()
    }

    /// Characters of prompt content, the unit chunk budgets are measured in.
    pub fn weight(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    pub fn request_line(&self, settings: &TaskSettings) -> RequestLine {
        RequestLine::chat(
            self.key.to_string(),
            ChatBody {
                model: settings.model.clone(),
                messages: self.messages.clone(),
                max_tokens: settings.max_tokens,
            },
        )
    }
}
