/// Where a chat currently is. `Quiz` carries the index its session starts
/// from; it is read once, when the quiz is mounted.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Home,
    Quiz {
        question_index: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct QuizParams {
    pub question_index: usize,
}

impl State {
    /// The only way out of `Home`.
    pub fn start_quiz(params: QuizParams) -> Self {
        State::Quiz {
            question_index: params.question_index,
        }
    }
}
