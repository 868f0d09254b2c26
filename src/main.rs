use std::sync::Arc;

use dotenv::dotenv;
use log::{debug, error, info};
use quizzy_bot::config::Config;
use quizzy_bot::navigation::{QuizParams, State};
use quizzy_bot::quiz::{
    provider::{OpenTriviaProvider, QuestionProvider},
    registry::SessionRegistry,
    session::{Phase, QuizSession, SessionError, Ticket},
    view,
};
use teloxide::{
    dispatching::dialogue::{ErasedStorage, InMemStorage, Storage},
    prelude::*,
    types::KeyboardRemove,
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type NavigationStorage = Arc<ErasedStorage<State>>;

/// Everything the handlers share besides the bot and the dialogue.
struct QuizApp {
    config: Config,
    provider: Arc<dyn QuestionProvider>,
    sessions: Arc<SessionRegistry<ChatId>>,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting quiz bot...");

    let config = Config::from_env().expect("Invalid quiz configuration");
    info!(
        "Using {} with {} questions per quiz",
        config.api_url, config.amount
    );
    let provider = OpenTriviaProvider::new(config.api_url.clone(), config.request_timeout)
        .expect("Unable to build the HTTP client");

    let app = Arc::new(QuizApp {
        config,
        provider: Arc::new(provider),
        sessions: Arc::new(SessionRegistry::new()),
    });

    let bot = Bot::from_env();
    let storage: NavigationStorage = InMemStorage::<State>::new().erase();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Home].endpoint(home))
            .branch(dptree::case![State::Quiz { question_index }].endpoint(quiz_screen)),
    )
    .dependencies(dptree::deps![storage, app])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

async fn home(bot: Bot, dialogue: QuizDialogue, app: Arc<QuizApp>, msg: Message) -> HandlerResult {
    match msg.text() {
        Some(view::START_QUIZ) => {
            let params = QuizParams::default();
            dialogue.update(State::start_quiz(params)).await?;
            mount_quiz(bot, app, msg.chat.id, params.question_index).await
        }
        _ => show_home(&bot, msg.chat.id).await,
    }
}

async fn show_home(bot: &Bot, chat: ChatId) -> HandlerResult {
    bot.send_message(chat, view::home_text())
        .reply_markup(view::home_keyboard())
        .await?;
    Ok(())
}

async fn quiz_screen(
    bot: Bot,
    dialogue: QuizDialogue,
    question_index: usize,
    app: Arc<QuizApp>,
    msg: Message,
) -> HandlerResult {
    let chat = msg.chat.id;
    let text = msg.text().unwrap_or_default();

    if text == "/start" || text == view::HOME {
        app.sessions.close(&chat);
        dialogue.update(State::Home).await?;
        return show_home(&bot, chat).await;
    }

    let session = match app.sessions.snapshot(&chat) {
        Some(session) => session,
        // Navigation survived but the session did not; mount it again.
        None => return mount_quiz(bot, app, chat, question_index).await,
    };

    match text {
        view::RESTART_QUIZ => match app.sessions.restart(&chat) {
            Some(restarted) => show_session(&bot, chat, &restarted).await,
            None => {
                debug!("Restart ignored for {:?} in phase {:?}", chat, session.phase());
                Ok(())
            }
        },
        view::NEW_QUESTIONS if session.phase() == Phase::Complete => {
            mount_quiz(bot, app, chat, question_index).await
        }
        view::RETRY => match app.sessions.retry(&chat) {
            Some(id) => {
                let sent = bot
                    .send_message(chat, view::LOADING)
                    .reply_markup(KeyboardRemove::new())
                    .await;
                spawn_load(bot, app, chat, id);
                sent?;
                Ok(())
            }
            None => Ok(()),
        },
        _ => answer(bot, app, chat, &session, text).await,
    }
}

async fn answer(
    bot: Bot,
    app: Arc<QuizApp>,
    chat: ChatId,
    session: &QuizSession,
    text: &str,
) -> HandlerResult {
    let selection = view::parse_option(text).map(|index| app.sessions.select_answer(&chat, index));

    match selection {
        Some(Some(Ok(Some(reveal)))) => {
            let sent = bot
                .send_message(chat, view::reveal_text(&reveal))
                .reply_markup(KeyboardRemove::new())
                .await;
            // Armed whatever the send did, or the session would stay revealing.
            schedule_advance(bot, &app, chat, reveal.ticket);
            sent?;
        }
        Some(Some(Ok(None))) => {
            debug!("Answer from {:?} ignored in phase {:?}", chat, session.phase());
        }
        Some(Some(Err(SessionError::OptionOutOfBounds { .. }))) | None
            if session.phase() == Phase::Active =>
        {
            bot.send_message(chat, "Please pick one of the options").await?;
        }
        _ => debug!("Nothing to do with {:?} from {:?}", text, chat),
    }
    Ok(())
}

/// Mounts the quiz screen: a fresh session starting at `start_index`, with
/// the questions fetched in the background so input arriving meanwhile hits
/// a loading session.
async fn mount_quiz(bot: Bot, app: Arc<QuizApp>, chat: ChatId, start_index: usize) -> HandlerResult {
    let id = app.sessions.open(chat, start_index, app.config.amount);
    let sent = bot
        .send_message(chat, view::LOADING)
        .reply_markup(KeyboardRemove::new())
        .await;
    // The fetch starts even if the notice failed to go out.
    spawn_load(bot, app, chat, id);
    sent?;
    Ok(())
}

fn spawn_load(bot: Bot, app: Arc<QuizApp>, chat: ChatId, id: u64) {
    tokio::spawn(async move {
        let fetched = app.provider.fetch_questions(app.config.amount).await;
        if app.sessions.load(&chat, id, fetched).is_none() {
            debug!("Session {} was replaced before its questions arrived", id);
            return;
        }
        if let Some(session) = app.sessions.snapshot(&chat) {
            if let Err(err) = show_session(&bot, chat, &session).await {
                error!("Could not show session {} to {:?}: {}", id, chat, err);
            }
        }
    });
}

/// Arms the timed transition out of the reveal.
fn schedule_advance(bot: Bot, app: &QuizApp, chat: ChatId, ticket: Ticket) {
    app.sessions
        .schedule_advance(chat, ticket, app.config.reveal_delay, move |session| async move {
            if let Err(err) = show_session(&bot, chat, &session).await {
                error!("Could not send the next step to {:?}: {}", chat, err);
            }
        });
}

async fn show_session(bot: &Bot, chat: ChatId, session: &QuizSession) -> HandlerResult {
    let text = view::session_text(session);
    match session.phase() {
        Phase::Active => match view::question_keyboard(session) {
            Some(keyboard) => bot.send_message(chat, text).reply_markup(keyboard).await?,
            None => bot.send_message(chat, text).await?,
        },
        Phase::Complete => {
            info!(
                "{:?} finished with {}/{}",
                chat,
                session.score(),
                session.amount()
            );
            bot.send_message(chat, text)
                .reply_markup(view::final_keyboard())
                .await?
        }
        Phase::Failed => {
            let retryable = session.error().map_or(false, |err| err.is_retryable());
            bot.send_message(chat, text)
                .reply_markup(view::failure_keyboard(retryable))
                .await?
        }
        Phase::Loading | Phase::Revealing | Phase::Advancing => {
            bot.send_message(chat, text).await?
        }
    };
    Ok(())
}
