use log::{debug, warn};
use rand::Rng;
use thiserror::Error;

use crate::quiz::provider::{ProviderError, QuestionProvider};
use crate::quiz::shuffle::shuffle;
use crate::quiz::{AnswerOption, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    /// The fetch failed; the session waits for the user to retry or leave.
    Failed,
    Active,
    Revealing,
    Advancing,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("answer option {index} does not exist, the question has {len} options")]
    OptionOutOfBounds { index: usize, len: usize },
}

/// Identifies one pending timed transition. A timer that fires with a
/// ticket the session no longer matches must not touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub session: u64,
    pub round: u32,
    pub index: usize,
}

/// What the user gets to see right after answering.
#[derive(Debug, Clone, PartialEq)]
pub struct Reveal {
    pub selected: AnswerOption,
    pub is_correct: bool,
    pub correct_answer: String,
    pub ticket: Ticket,
}

/// One run of the quiz, from loading the questions to the final score.
#[derive(Debug, Clone)]
pub struct QuizSession {
    id: u64,
    round: u32,
    start_index: usize,
    requested_amount: usize,
    questions: Vec<Question>,
    answer_sets: Vec<Vec<AnswerOption>>,
    current_index: usize,
    score: usize,
    selected: Option<AnswerOption>,
    is_correct: Option<bool>,
    phase: Phase,
    error: Option<ProviderError>,
}

impl QuizSession {
    pub fn new(id: u64, start_index: usize, requested_amount: usize) -> Self {
        Self {
            id,
            round: 0,
            start_index,
            requested_amount,
            questions: Vec::new(),
            answer_sets: Vec::new(),
            current_index: 0,
            score: 0,
            selected: None,
            is_correct: None,
            phase: Phase::Loading,
            error: None,
        }
    }

    /// Fetches the questions and moves to `Active`, or to `Failed` with the
    /// provider error kept for display.
    pub async fn initialize<P, R>(&mut self, provider: &P, rng: &mut R) -> Result<(), ProviderError>
    where
        P: QuestionProvider + ?Sized,
        R: Rng + ?Sized,
    {
        self.phase = Phase::Loading;
        self.error = None;
        let fetched = provider.fetch_questions(self.requested_amount).await;
        self.load(fetched, rng)
    }

    /// Applies the outcome of a fetch. Outside `Loading` the outcome is
    /// dropped and the session keeps its state.
    pub fn load<R: Rng + ?Sized>(
        &mut self,
        fetched: Result<Vec<Question>, ProviderError>,
        rng: &mut R,
    ) -> Result<(), ProviderError> {
        if self.phase != Phase::Loading {
            warn!(
                "Session {} got questions in phase {:?}, ignoring them",
                self.id, self.phase
            );
            return Ok(());
        }

        let mut questions: Vec<Question> = match fetched {
            Ok(questions) => questions
                .into_iter()
                .filter(Question::is_well_formed)
                .collect(),
            Err(err) => return self.fail(err),
        };
        if questions.is_empty() {
            return self.fail(ProviderError::Malformed(
                "provider returned no usable questions".to_string(),
            ));
        }
        questions.truncate(self.requested_amount);

        if self.start_index >= questions.len() {
            warn!(
                "Start index {} is past the {} fetched questions, starting from the first",
                self.start_index,
                questions.len()
            );
            self.start_index = 0;
        }

        self.answer_sets = questions.iter().map(|q| shuffle_answers(q, rng)).collect();
        self.questions = questions;
        self.current_index = self.start_index;
        self.score = 0;
        self.selected = None;
        self.is_correct = None;
        self.error = None;
        self.phase = Phase::Active;
        debug!(
            "Session {} active with {} questions from index {}",
            self.id,
            self.questions.len(),
            self.current_index
        );
        self.check_invariants();
        Ok(())
    }

    /// Puts a failed session back into `Loading` so it can be fetched again.
    pub fn retry(&mut self) -> bool {
        if self.phase != Phase::Failed {
            return false;
        }
        self.phase = Phase::Loading;
        self.error = None;
        true
    }

    fn fail(&mut self, err: ProviderError) -> Result<(), ProviderError> {
        warn!("Session {} failed to load: {}", self.id, err);
        self.phase = Phase::Failed;
        self.error = Some(err.clone());
        Err(err)
    }

    /// Answers the current question.
    ///
    /// Outside `Active` this is a no-op and returns `Ok(None)`, so a second
    /// tap while the answer is being revealed changes nothing. An index past
    /// the answer set fails without touching the session.
    pub fn select_answer(&mut self, option_index: usize) -> Result<Option<Reveal>, SessionError> {
        if self.phase != Phase::Active {
            debug!(
                "Session {} ignores answer {} in phase {:?}",
                self.id, option_index, self.phase
            );
            return Ok(None);
        }

        let options = &self.answer_sets[self.current_index];
        let selected = options
            .get(option_index)
            .cloned()
            .ok_or(SessionError::OptionOutOfBounds {
                index: option_index,
                len: options.len(),
            })?;

        let question = &self.questions[self.current_index];
        let is_correct = question.is_correct(&selected.text);
        if is_correct {
            self.score += 1;
        }
        let correct_answer = question.correct_answer.clone();

        self.selected = Some(selected.clone());
        self.is_correct = Some(is_correct);
        self.phase = Phase::Revealing;
        debug!(
            "Session {} question {} answered {} ({})",
            self.id,
            self.current_index,
            selected.letter(),
            if is_correct { "correct" } else { "incorrect" }
        );
        self.check_invariants();

        Ok(Some(Reveal {
            selected,
            is_correct,
            correct_answer,
            ticket: self.ticket(),
        }))
    }

    /// The timed transition out of `Revealing`. Returns the phase reached,
    /// or `None` when there was nothing to advance.
    pub fn advance(&mut self) -> Option<Phase> {
        if self.phase != Phase::Revealing {
            return None;
        }

        if self.current_index + 1 == self.questions.len() {
            self.selected = None;
            self.is_correct = None;
            self.phase = Phase::Complete;
            debug!(
                "Session {} complete with {}/{}",
                self.id,
                self.score,
                self.amount()
            );
        } else {
            self.phase = Phase::Advancing;
            self.current_index += 1;
            self.selected = None;
            self.is_correct = None;
            self.phase = Phase::Active;
            debug!("Session {} moves to question {}", self.id, self.current_index);
        }
        self.check_invariants();
        Some(self.phase)
    }

    /// Replays the same questions from the first one with freshly shuffled
    /// answers. Only valid once the quiz is over.
    pub fn restart<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.phase != Phase::Complete {
            return false;
        }
        self.round += 1;
        self.answer_sets = self
            .questions
            .iter()
            .map(|q| shuffle_answers(q, rng))
            .collect();
        self.current_index = 0;
        self.score = 0;
        self.selected = None;
        self.is_correct = None;
        self.phase = Phase::Active;
        debug!("Session {} restarted, round {}", self.id, self.round);
        self.check_invariants();
        true
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            session: self.id,
            round: self.round,
            index: self.current_index,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn error(&self) -> Option<&ProviderError> {
        self.error.as_ref()
    }

    pub fn score(&self) -> usize {
        self.score
    }

    /// Questions actually in play; may differ from what was requested.
    pub fn amount(&self) -> usize {
        self.questions.len()
    }

    pub fn requested_amount(&self) -> usize {
        self.requested_amount
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn questions_left(&self) -> usize {
        self.amount().saturating_sub(self.current_index)
    }

    pub fn selected(&self) -> Option<&AnswerOption> {
        self.selected.as_ref()
    }

    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answer_sets(&self) -> &[Vec<AnswerOption>] {
        &self.answer_sets
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            Phase::Active | Phase::Revealing | Phase::Advancing => {
                self.questions.get(self.current_index)
            }
            _ => None,
        }
    }

    pub fn current_answers(&self) -> Option<&[AnswerOption]> {
        self.current_question()?;
        self.answer_sets.get(self.current_index).map(Vec::as_slice)
    }

    fn check_invariants(&self) {
        debug_assert!(self.score <= self.questions.len());
        debug_assert_eq!(self.answer_sets.len(), self.questions.len());
        if self.phase != Phase::Complete && !self.questions.is_empty() {
            debug_assert!(self.current_index < self.questions.len());
        }
        if !matches!(self.phase, Phase::Revealing | Phase::Advancing) {
            debug_assert!(self.selected.is_none());
        }
    }
}

fn shuffle_answers<R: Rng + ?Sized>(question: &Question, rng: &mut R) -> Vec<AnswerOption> {
    shuffle(&question.answers(), rng)
        .into_iter()
        .enumerate()
        .map(|(index, text)| AnswerOption::new(index, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct FakeProvider {
        questions: Result<Vec<Question>, ProviderError>,
    }

    #[async_trait]
    impl QuestionProvider for FakeProvider {
        async fn fetch_questions(&self, amount: usize) -> Result<Vec<Question>, ProviderError> {
            self.questions
                .clone()
                .map(|qs| qs.into_iter().take(amount).collect())
        }
    }

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    format!("Question {}", i),
                    format!("right {}", i),
                    vec![
                        format!("wrong {}a", i),
                        format!("wrong {}b", i),
                        format!("wrong {}c", i),
                    ],
                )
            })
            .collect()
    }

    fn active_session(n: usize) -> QuizSession {
        let mut session = QuizSession::new(1, 0, n);
        session
            .load(Ok(questions(n)), &mut StdRng::seed_from_u64(5))
            .unwrap();
        session
    }

    fn correct_index(session: &QuizSession) -> usize {
        let question = session.current_question().unwrap();
        session
            .current_answers()
            .unwrap()
            .iter()
            .position(|o| o.text == question.correct_answer)
            .unwrap()
    }

    fn wrong_index(session: &QuizSession) -> usize {
        (correct_index(session) + 1) % 4
    }

    #[tokio::test]
    async fn initialize_shuffles_one_set_per_question() {
        let provider = FakeProvider {
            questions: Ok(questions(10)),
        };
        let mut session = QuizSession::new(9, 0, 10);
        session
            .initialize(&provider, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.score(), 0);
        for (question, options) in session.questions().iter().zip(session.answer_sets()) {
            assert_eq!(options.len(), 4);
            let correct = options
                .iter()
                .filter(|o| o.text == question.correct_answer)
                .count();
            assert_eq!(correct, 1);
            for (i, option) in options.iter().enumerate() {
                assert_eq!(option.display_index, i);
            }
        }
    }

    #[tokio::test]
    async fn no_questions_leaves_session_failed() {
        let provider = FakeProvider {
            questions: Ok(Vec::new()),
        };
        let mut session = QuizSession::new(1, 0, 10);
        let err = session
            .initialize(&provider, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Malformed(_)));
        assert_eq!(session.phase(), Phase::Failed);
        assert_eq!(session.error(), Some(&err));
        assert_eq!(session.select_answer(0), Ok(None));
        assert_eq!(session.advance(), None);
        assert_eq!(session.score(), 0);
    }

    #[tokio::test]
    async fn network_failure_can_be_retried() {
        let failing = FakeProvider {
            questions: Err(ProviderError::Network("timed out".to_string())),
        };
        let mut session = QuizSession::new(1, 0, 2);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(session.initialize(&failing, &mut rng).await.is_err());
        assert_eq!(session.phase(), Phase::Failed);

        assert!(session.retry());
        assert_eq!(session.phase(), Phase::Loading);
        let working = FakeProvider {
            questions: Ok(questions(2)),
        };
        session.initialize(&working, &mut rng).await.unwrap();
        assert_eq!(session.phase(), Phase::Active);
        assert!(session.error().is_none());
    }

    #[test]
    fn load_outside_loading_keeps_the_session() {
        let mut session = active_session(3);
        let pick = correct_index(&session);
        session.select_answer(pick).unwrap();

        let replacement = questions(5);
        assert_eq!(
            session.load(Ok(replacement), &mut StdRng::seed_from_u64(9)),
            Ok(())
        );
        assert_eq!(session.phase(), Phase::Revealing);
        assert_eq!(session.amount(), 3);
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn ambiguous_questions_never_reach_the_answer_sets() {
        let mut clash = questions(1).remove(0);
        clash.incorrect_answers[0] = clash.correct_answer.clone();
        let mut delivered = vec![clash];
        delivered.extend(questions(2));

        let mut session = QuizSession::new(1, 0, 10);
        session
            .load(Ok(delivered), &mut StdRng::seed_from_u64(4))
            .unwrap();
        assert_eq!(session.amount(), 2);
        for (question, options) in session.questions().iter().zip(session.answer_sets()) {
            let matching = options
                .iter()
                .filter(|o| o.text == question.correct_answer)
                .count();
            assert_eq!(matching, 1);
        }
    }

    #[test]
    fn only_ambiguous_questions_is_malformed() {
        let mut clash = questions(1).remove(0);
        clash.incorrect_answers[1] = clash.correct_answer.clone();
        let mut session = QuizSession::new(1, 0, 10);
        let err = session
            .load(Ok(vec![clash]), &mut StdRng::seed_from_u64(4))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
        assert_eq!(session.phase(), Phase::Failed);
    }

    #[test]
    fn loading_rejects_answers() {
        let mut session = QuizSession::new(1, 0, 10);
        assert_eq!(session.select_answer(0), Ok(None));
        assert_eq!(session.phase(), Phase::Loading);
        assert!(session.current_answers().is_none());
    }

    #[test]
    fn one_right_one_wrong_scores_one_of_two() {
        let mut session = active_session(2);

        let first = correct_index(&session);
        let reveal = session.select_answer(first).unwrap().unwrap();
        assert!(reveal.is_correct);
        assert_eq!(session.phase(), Phase::Revealing);
        assert_eq!(session.advance(), Some(Phase::Active));
        assert_eq!(session.current_index(), 1);
        assert!(session.selected().is_none());
        assert!(session.is_correct().is_none());

        let second = wrong_index(&session);
        let reveal = session.select_answer(second).unwrap().unwrap();
        assert!(!reveal.is_correct);
        assert_eq!(reveal.correct_answer, "right 1");
        assert_eq!(session.advance(), Some(Phase::Complete));

        assert_eq!(session.score(), 1);
        assert_eq!(session.amount(), 2);
        assert!(session.selected().is_none());
    }

    #[test]
    fn second_answer_during_reveal_is_ignored() {
        let mut session = active_session(3);
        let right = correct_index(&session);
        session.select_answer(right).unwrap();
        let selected = session.selected().cloned();

        assert_eq!(session.select_answer(right), Ok(None));
        assert_eq!(session.select_answer(wrong_index(&session)), Ok(None));
        assert_eq!(session.score(), 1);
        assert_eq!(session.selected().cloned(), selected);
    }

    #[test]
    fn out_of_bounds_option_mutates_nothing() {
        let mut session = active_session(2);
        let err = session.select_answer(4).unwrap_err();
        assert_eq!(err, SessionError::OptionOutOfBounds { index: 4, len: 4 });
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.score(), 0);
        assert!(session.selected().is_none());
    }

    #[test]
    fn restart_from_seven_of_ten() {
        let mut session = active_session(10);
        for i in 0..10 {
            let pick = if i < 7 {
                correct_index(&session)
            } else {
                wrong_index(&session)
            };
            session.select_answer(pick).unwrap();
            session.advance();
        }
        assert_eq!(session.phase(), Phase::Complete);
        assert_eq!(session.score(), 7);
        let before = session.ticket();

        assert!(session.restart(&mut StdRng::seed_from_u64(8)));
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.score(), 0);
        assert_eq!(session.phase(), Phase::Active);
        assert_ne!(session.ticket(), before);
        assert_eq!(session.questions().len(), 10);
    }

    #[test]
    fn restart_is_ignored_while_playing() {
        let mut session = active_session(3);
        assert!(!session.restart(&mut StdRng::seed_from_u64(8)));
        let pick = correct_index(&session);
        session.select_answer(pick).unwrap();
        assert!(!session.restart(&mut StdRng::seed_from_u64(8)));
        assert_eq!(session.phase(), Phase::Revealing);
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn short_delivery_changes_amount_not_requested_amount() {
        let mut session = QuizSession::new(1, 0, 10);
        session
            .load(Ok(questions(4)), &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(session.amount(), 4);
        assert_eq!(session.requested_amount(), 10);
        assert_eq!(session.questions_left(), 4);
    }

    #[test]
    fn starts_at_requested_index() {
        let mut session = QuizSession::new(1, 2, 5);
        session
            .load(Ok(questions(5)), &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(session.current_index(), 2);
        assert_eq!(session.questions_left(), 3);
    }

    #[test]
    fn start_index_past_the_end_falls_back_to_first() {
        let mut session = QuizSession::new(1, 12, 5);
        session
            .load(Ok(questions(5)), &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn score_stays_within_bounds_at_every_step() {
        let mut session = active_session(5);
        let mut last = 0;
        while session.phase() != Phase::Complete {
            let pick = correct_index(&session);
            session.select_answer(pick).unwrap();
            assert!(session.score() >= last && session.score() <= session.amount());
            last = session.score();
            session.advance();
            assert!(session.score() <= session.amount());
        }
        assert_eq!(session.score(), 5);
        assert_eq!(session.advance(), None);
    }
}
