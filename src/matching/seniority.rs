//! Seniority labelling for finalists.
//!
//! Keyword rules first, checked in a fixed precedence; the completion model
//! is consulted only when no rule fires. Classification never fails a match:
//! anything unusable becomes `Mid`.

use serde::{Deserialize, Serialize};

use crate::llm::{CompletionClient, CompletionRequest, Message};
use crate::matching::prompts::seniority_prompt;
use crate::vacancies::Vacancy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Seniority {
    Intern,
    Entry,
    Mid,
    Advanced,
    Expert,
    Head,
}

/// Rule order. The first level whose keywords occur wins.
const PRECEDENCE: [Seniority; 6] = [
    Seniority::Intern,
    Seniority::Head,
    Seniority::Expert,
    Seniority::Advanced,
    Seniority::Mid,
    Seniority::Entry,
];

impl Seniority {
    pub const ALL: [Seniority; 6] = [
        Seniority::Intern,
        Seniority::Entry,
        Seniority::Mid,
        Seniority::Advanced,
        Seniority::Expert,
        Seniority::Head,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Seniority::Intern => "Intern",
            Seniority::Entry => "Entry",
            Seniority::Mid => "Mid",
            Seniority::Advanced => "Advanced",
            Seniority::Expert => "Expert",
            Seniority::Head => "Head",
        }
    }

    /// The label the completion prompt offers.
    pub fn russian_label(&self) -> &'static str {
        match self {
            Seniority::Intern => "Стажер",
            Seniority::Entry => "Начальный",
            Seniority::Mid => "Средний",
            Seniority::Advanced => "Продвинутый",
            Seniority::Expert => "Эксперт",
            Seniority::Head => "Руководитель",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Seniority::Intern => &["стажер", "intern", "trainee", "без опыта", "обучение"],
            Seniority::Head => &[
                "руководитель",
                "директор",
                "head",
                "director",
                "chief",
                "cfo",
                "ceo",
                "cdo",
                "lead",
            ],
            Seniority::Expert => &["эксперт", "expert", "principal", "staff"],
            Seniority::Advanced => &["senior", "старший", "ведущий", "опыт от 3", "опыт от 5"],
            Seniority::Mid => &["middle", "средний", "опыт от 1", "опыт от 2"],
            Seniority::Entry => &["junior", "младший", "начальный", "entry"],
        }
    }
}

impl std::fmt::Display for Seniority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Keyword match over title, description, experience and skills.
pub fn classify_by_keywords(vacancy: &Vacancy) -> Option<Seniority> {
    let text = format!(
        "{} {} {} {}",
        vacancy.title, vacancy.description, vacancy.experience, vacancy.key_skills
    )
    .to_lowercase();

    PRECEDENCE
        .into_iter()
        .find(|level| level.keywords().iter().any(|kw| text.contains(kw)))
}

/// Finds the first level (in [`Seniority::ALL`] order) whose English or
/// Russian label occurs in `answer`, ignoring case.
pub fn parse_label(answer: &str) -> Option<Seniority> {
    let answer = answer.to_lowercase();
    Seniority::ALL.into_iter().find(|level| {
        answer.contains(&level.russian_label().to_lowercase())
            || answer.contains(&level.label().to_lowercase())
    })
}

pub struct SeniorityClassifier<'a> {
    client: &'a dyn CompletionClient,
}

impl<'a> SeniorityClassifier<'a> {
    pub fn new(client: &'a dyn CompletionClient) -> Self {
        Self { client }
    }

    pub fn classify(&self, vacancy: &Vacancy) -> Seniority {
        if let Some(level) = classify_by_keywords(vacancy) {
            return level;
        }

        let request = CompletionRequest::new(vec![Message::system(seniority_prompt(vacancy))]);
        match self.client.complete(&request) {
            Ok(answer) => parse_label(&answer).unwrap_or_else(|| {
                log::warn!(
                    "seniority degraded for {}: unrecognised answer {:?}",
                    vacancy.idx,
                    answer.trim()
                );
                Seniority::Mid
            }),
            Err(err) => {
                log::warn!("seniority degraded for {}: {err}", vacancy.idx);
                Seniority::Mid
            }
        }
    }
}
