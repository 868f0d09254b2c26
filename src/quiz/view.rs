use teloxide::types::{KeyboardButton, KeyboardMarkup};

use crate::quiz::session::{Phase, QuizSession, Reveal};
use crate::quiz::AnswerOption;

pub const START_QUIZ: &str = "Start quiz";
pub const RESTART_QUIZ: &str = "Restart the quiz";
pub const NEW_QUESTIONS: &str = "New questions";
pub const RETRY: &str = "Retry";
pub const HOME: &str = "Home";
pub const LOADING: &str = "Loading questions...";

pub const RULES: [&str; 3] = [
    "No negative scoring",
    "1 point per question",
    "Difficulty from easy to difficult",
];

const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Label letter of the option at `index`; past `D` falls back to '?'.
pub fn letter(index: usize) -> char {
    LETTERS.get(index).copied().unwrap_or('?')
}

pub fn option_label(option: &AnswerOption) -> String {
    format!("{}. {}", option.letter(), option.text)
}

/// Reads the user's reply as an option index: a full button label
/// ("B. Paris"), a bare letter ("b") or a 1-based number ("2").
/// Letters beyond the answer set still map to an index so the session can
/// reject them as out of bounds.
pub fn parse_option(text: &str) -> Option<usize> {
    let text = text.trim();
    let head = match text.split_once('.') {
        Some((head, _)) => head.trim(),
        None => text,
    };

    if let Ok(number) = head.parse::<usize>() {
        return number.checked_sub(1);
    }

    let mut chars = head.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Some((c.to_ascii_uppercase() as u8 - b'A') as usize)
        }
        _ => None,
    }
}

pub fn home_text() -> String {
    let rules = RULES
        .iter()
        .map(|rule| format!("• {}", rule))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Welcome to Quizzy!\n\nGame Rules\n{}", rules)
}

pub fn home_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(START_QUIZ)]])
}

/// The current question with its lettered options, or `None` when the
/// session has no question on screen.
pub fn question_text(session: &QuizSession) -> Option<String> {
    let question = session.current_question()?;
    let options = session.current_answers()?;

    let mut header = format!("{} questions left", session.questions_left());
    let tags = [question.category.as_deref(), question.difficulty.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    if !tags.is_empty() {
        header = format!("{}\n{}", header, tags.join(" · "));
    }

    let options = options
        .iter()
        .map(option_label)
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "{}\n\nQuestion {}/{}\n{}\n\n{}",
        header,
        session.current_index() + 1,
        session.amount(),
        question.prompt,
        options
    ))
}

pub fn question_keyboard(session: &QuizSession) -> Option<KeyboardMarkup> {
    let rows = session
        .current_answers()?
        .iter()
        .map(|option| vec![KeyboardButton::new(option_label(option))])
        .collect::<Vec<_>>();
    Some(KeyboardMarkup::new(rows))
}

pub fn reveal_text(reveal: &Reveal) -> String {
    let verdict = if reveal.is_correct {
        "CORRECT !"
    } else {
        "INCORRECT !"
    };
    format!("{}\nCorrect Answer: {}", verdict, reveal.correct_answer)
}

pub fn final_text(session: &QuizSession) -> String {
    format!(
        "Quiz Over\n\nYour Score: {}/{}",
        session.score(),
        session.amount()
    )
}

pub fn final_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(RESTART_QUIZ)],
        vec![KeyboardButton::new(NEW_QUESTIONS)],
        vec![KeyboardButton::new(HOME)],
    ])
}

pub fn failure_keyboard(retryable: bool) -> KeyboardMarkup {
    let mut rows = Vec::new();
    if retryable {
        rows.push(vec![KeyboardButton::new(RETRY)]);
    }
    rows.push(vec![KeyboardButton::new(HOME)]);
    KeyboardMarkup::new(rows)
}

pub fn failure_text(session: &QuizSession) -> String {
    match session.error() {
        Some(err) if err.is_retryable() => {
            format!("Could not load the questions ({}). Try again?", err)
        }
        Some(err) => format!("The quiz could not be prepared ({}).", err),
        None => "The quiz could not be prepared.".to_string(),
    }
}

/// Text for whatever the session currently shows.
pub fn session_text(session: &QuizSession) -> String {
    match session.phase() {
        Phase::Loading => LOADING.to_string(),
        Phase::Failed => failure_text(session),
        Phase::Complete => final_text(session),
        Phase::Active | Phase::Revealing | Phase::Advancing => {
            question_text(session).unwrap_or_default()
        }
    }
}
