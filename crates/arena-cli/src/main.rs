use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arena_stream::{
    Difficulty, MatchRequest, StreamConfig, StreamEvent, StreamEventHandler, StreamManager,
    StreamOutcome, TurnView,
};
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliDifficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl From<CliDifficulty> for Difficulty {
    fn from(value: CliDifficulty) -> Self {
        match value {
            CliDifficulty::Easy => Difficulty::Easy,
            CliDifficulty::Medium => Difficulty::Medium,
            CliDifficulty::Hard => Difficulty::Hard,
            CliDifficulty::Expert => Difficulty::Expert,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "arena",
    about = "Streams a live debate-arena match and reconstructs the transcript",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "ARENA_ENDPOINT",
        default_value = "http://127.0.0.1:8000/api/tournament/match/stream",
        help = "Stream endpoint of the arena server"
    )]
    endpoint: String,

    #[arg(long, help = "Debate topic (at least 3 characters)")]
    topic: String,

    #[arg(long, value_enum, default_value = "medium", help = "Topic difficulty")]
    difficulty: CliDifficulty,

    #[arg(long, help = "Model arguing the proponent side")]
    proponent: String,

    #[arg(long, help = "Model arguing the opponent side")]
    opponent: String,

    #[arg(long, default_value = "", help = "Personality tag for the proponent")]
    proponent_personality: String,

    #[arg(long, default_value = "", help = "Personality tag for the opponent")]
    opponent_personality: String,

    #[arg(long, default_value_t = 3, help = "Number of debate rounds")]
    rounds: u32,

    #[arg(
        long,
        value_delimiter = ',',
        default_value = "gpt-4o,gpt-4o-mini",
        help = "Judge model identifiers (at least 2, comma separated)"
    )]
    judges: Vec<String>,

    #[arg(
        long = "tool",
        value_delimiter = ',',
        help = "Tool identifiers the debaters may use (comma separated)"
    )]
    tools: Vec<String>,

    #[arg(
        long,
        default_value_t = 900,
        help = "Wall-clock stream timeout in seconds"
    )]
    timeout_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_event(event: &StreamEvent) {
    match event {
        StreamEvent::Status { content } => eprintln!("· {content}"),
        StreamEvent::TurnDelta { delta, .. } => {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
        StreamEvent::TurnComplete { turn } => {
            println!();
            println!(
                "--- {} / round {} complete ({} chars) ---",
                turn.speaker_role,
                turn.round_number,
                turn.content.chars().count()
            );
        }
        StreamEvent::TurnToolCall { speaker, .. } => eprintln!("· {speaker} invoked a tool"),
        StreamEvent::JudgeProgress {
            current, total, ..
        } => eprintln!("· judging {current}/{total}"),
        StreamEvent::Timeout { content } => eprintln!("! {content}"),
        StreamEvent::Error { content } => {
            eprintln!("! server error: {}", content.as_deref().unwrap_or("unknown"))
        }
        _ => {}
    }
}

fn print_turn(turn: &TurnView) {
    let marker = if turn.is_streaming { " (in progress)" } else { "" };
    println!(
        "\n[round {} · {}{}]",
        turn.round_number, turn.speaker_role, marker
    );
    println!("{}", turn.content);
    for call in &turn.tool_calls {
        let state = if call.result.is_some() {
            "resolved"
        } else {
            "pending"
        };
        println!("  tool {} ({state})", call.tool_name);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut request = MatchRequest::new(
        cli.topic,
        cli.proponent,
        cli.opponent,
        cli.judges,
    );
    request.topic_difficulty = cli.difficulty.into();
    request.proponent_personality = cli.proponent_personality;
    request.opponent_personality = cli.opponent_personality;
    request.rounds = cli.rounds;
    request.enabled_tools = cli.tools;
    request.validate().context("invalid match request")?;

    if request.is_exhibition() {
        tracing::info!(model = %request.proponent_model, "same model on both sides, no rating stakes");
    }

    let handler: StreamEventHandler = Arc::new(print_event);
    let manager = StreamManager::new(
        StreamConfig::new(cli.endpoint).with_timeout(Duration::from_secs(cli.timeout_secs)),
    )?
    .with_event_handler(handler);

    let outcome = manager
        .connect(&request)
        .await
        .context("match stream failed")?;

    let snapshot = manager.snapshot();
    match outcome {
        StreamOutcome::Completed => tracing::info!("stream ended"),
        StreamOutcome::TimedOut => tracing::warn!("stream timed out, showing partial transcript"),
        StreamOutcome::Disconnected => tracing::info!("stream disconnected"),
    }

    println!("\n================ transcript ================");
    for turn in &snapshot.view.turns {
        print_turn(turn);
    }

    if let Some(result) = &snapshot.view.result {
        println!("\n================ result ================");
        println!(
            "winner: {}  (proponent {:.1} / opponent {:.1})",
            result.winner, result.final_scores.proponent, result.final_scores.opponent
        );
        println!("{}", result.reasoning);
    }

    if let Some(elo) = &snapshot.view.elo {
        println!(
            "ratings: proponent {} -> {} ({:+}), opponent {} -> {} ({:+})",
            elo.proponent.old_rating,
            elo.proponent.new_rating,
            elo.proponent.change,
            elo.opponent.old_rating,
            elo.opponent.new_rating,
            elo.opponent.change
        );
    }

    Ok(())
}
