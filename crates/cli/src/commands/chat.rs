use std::io::{BufRead, Write};
use std::sync::Arc;

use boulanger_agent::{
    KeywordInterruptionDetector, LuisRecognizer, OrderOrchestrator, OrderRecognizer, Turn,
    TurnController, TurnReply, UnconfiguredRecognizer,
};
use boulanger_core::config::{AppConfig, LoadOptions};
use boulanger_db::repositories::{
    ConversationRepository, InMemoryConversationRepository, InMemoryOrderRepository,
    OrderRepository, SqlConversationRepository, SqlOrderRepository,
};
use boulanger_db::{connect_with_settings, migrations};
use uuid::Uuid;

use crate::commands::CommandResult;

const EXIT_WORDS: [&str; 3] = ["exit", "bye", "/q"];

#[derive(Clone, Debug, Default)]
pub struct ChatOptions {
    pub conversation_id: Option<String>,
    pub ephemeral: bool,
}

type ChatFailure = (&'static str, String, u8);

pub fn run(options: ChatOptions, input: &mut dyn BufRead, output: &mut dyn Write) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    crate::init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(converse(&config, options, input, output)) {
        Ok(result) => result,
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

async fn converse(
    config: &AppConfig,
    options: ChatOptions,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<CommandResult, ChatFailure> {
    let (conversations, orders) = repositories(config, options.ephemeral).await?;

    let recognizer: Arc<dyn OrderRecognizer> = match LuisRecognizer::from_config(&config.nlu)
        .map_err(|error| ("nlu_client", error.to_string(), 7u8))?
    {
        Some(recognizer) => Arc::new(recognizer),
        None => Arc::new(UnconfiguredRecognizer),
    };
    let controller = TurnController::new(
        OrderOrchestrator::new(recognizer, KeywordInterruptionDetector::default()),
        conversations.clone(),
        orders,
    );

    let conversation_id =
        options.conversation_id.unwrap_or_else(|| format!("console-{}", Uuid::new_v4()));
    tracing::info!(
        event_name = "cli.chat.started",
        correlation_id = "cli",
        conversation_id = %conversation_id,
        ephemeral = options.ephemeral,
        degraded = controller.orchestrator().is_degraded(),
        "console chat started"
    );

    let resumed = conversations
        .load(&conversation_id)
        .await
        .map_err(|error| ("persistence", error.to_string(), 5u8))?
        .is_some();

    // A fresh conversation opens with an empty turn so the greeting is shown first.
    let mut next = if resumed {
        write_line(output, &format!("Resuming conversation `{conversation_id}`."))?;
        read_utterance(input, output)?
    } else {
        Some(String::new())
    };

    let mut turns = 0usize;
    let mut placed = 0usize;
    while let Some(text) = next {
        let turn = Turn::text(text).with_correlation_id(format!("cli-{turns}"));
        match controller.resume_or_start(&conversation_id, &turn).await {
            Ok(reply) => {
                turns += 1;
                if reply.placed_order.is_some() {
                    placed += 1;
                }
                render(output, &reply)?;
            }
            Err(error) => {
                let error = error.into_interface(turn.correlation_id.clone());
                write_line(output, &format!("! {}", error.user_message()))?;
            }
        }
        next = read_utterance(input, output)?;
    }

    Ok(CommandResult::success(
        "chat",
        format!(
            "conversation `{conversation_id}` ended after {turns} turns with {placed} orders placed"
        ),
    ))
}

async fn repositories(
    config: &AppConfig,
    ephemeral: bool,
) -> Result<(Arc<dyn ConversationRepository>, Arc<dyn OrderRepository>), ChatFailure> {
    if ephemeral {
        return Ok((
            Arc::new(InMemoryConversationRepository::default()),
            Arc::new(InMemoryOrderRepository::default()),
        ));
    }

    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;

    Ok((
        Arc::new(SqlConversationRepository::new(pool.clone())),
        Arc::new(SqlOrderRepository::new(pool)),
    ))
}

fn render(output: &mut dyn Write, reply: &TurnReply) -> Result<(), ChatFailure> {
    for message in &reply.messages {
        write_line(output, &message.text)?;
        if !message.choices.is_empty() {
            write_line(output, &format!("  options: {}", message.choices.join(" | ")))?;
        }
    }
    Ok(())
}

/// `None` on end of input or an exit word.
fn read_utterance(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<Option<String>, ChatFailure> {
    write!(output, "> ").and_then(|_| output.flush()).map_err(io_failure)?;

    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(io_failure)?;
    let utterance = line.trim();
    if read == 0 || EXIT_WORDS.iter().any(|word| utterance.eq_ignore_ascii_case(word)) {
        return Ok(None);
    }
    Ok(Some(utterance.to_string()))
}

fn write_line(output: &mut dyn Write, text: &str) -> Result<(), ChatFailure> {
    writeln!(output, "{text}").map_err(io_failure)
}

fn io_failure(error: std::io::Error) -> ChatFailure {
    ("io", error.to_string(), 9)
}
