pub mod provider;
pub mod registry;
pub mod session;
pub mod shuffle;
pub mod timer;
pub mod view;

/// A trivia question with entity-decoded text. Never changes once fetched.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub prompt: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
}

impl Question {
    pub fn new(prompt: String, correct_answer: String, incorrect_answers: Vec<String>) -> Self {
        Self {
            prompt,
            correct_answer,
            incorrect_answers,
            category: None,
            difficulty: None,
        }
    }

    /// Incorrect answers followed by the correct one, before shuffling.
    pub fn answers(&self) -> Vec<String> {
        let mut answers = self.incorrect_answers.clone();
        answers.push(self.correct_answer.clone());
        answers
    }

    /// Exactly one answer can match the correct one: the wrong answers
    /// neither repeat it nor each other.
    pub fn is_well_formed(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        !self.incorrect_answers.is_empty()
            && self
                .incorrect_answers
                .iter()
                .all(|answer| *answer != self.correct_answer && seen.insert(answer))
    }

    pub fn is_correct(&self, answer: &str) -> bool {
        self.correct_answer == answer
    }
}

/// One answer as displayed, at its shuffled position.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnswerOption {
    pub display_index: usize,
    pub text: String,
}

impl AnswerOption {
    pub fn new(display_index: usize, text: String) -> Self {
        Self {
            display_index,
            text,
        }
    }

    pub fn letter(&self) -> char {
        view::letter(self.display_index)
    }
}
