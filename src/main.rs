use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use party_hub::game::GameCategory;
use party_hub::round::BannerStage;
use party_hub::sim::{ScriptedHost, SimulatedAudio};
use party_hub::{
    Capabilities, Catalog, Config, GameController, HostBreadcrumb, HostToolCallDecoder, Judgement,
    RoundEvent, RoundHandle, Scenario, SessionStatus, SystemClock, TalkMode, TranscriptAggregator,
};

/// Party Hub - voice-driven party mini-games
#[derive(Parser)]
#[command(name = "partyhub", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the game catalog
    List {
        /// Only show games in this category (e.g. "social")
        #[arg(short, long)]
        category: Option<GameCategory>,
    },
    /// Play one round offline against a scripted host
    Play {
        /// Game id (see `partyhub list`)
        game: String,
        /// What the player says; repeat for games with several questions
        #[arg(short, long)]
        say: Vec<String>,
        /// Round timer length in seconds
        #[arg(short, long, env = "PARTY_HUB_ROUND_SECS")]
        duration: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,party_hub=info",
        1 => "info,party_hub=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::List { category } => {
            cmd_list(category);
            Ok(())
        }
        Command::Play {
            game,
            say,
            duration,
        } => cmd_play(&game, say, duration).await,
    }
}

fn cmd_list(category: Option<GameCategory>) {
    let catalog = Catalog::builtin();

    for game in catalog.all() {
        if category.is_some_and(|c| c != game.category) {
            continue;
        }

        let status = if catalog.is_implemented(&game.id) {
            "playable"
        } else {
            "planned"
        };
        println!(
            "{:<24} {:<28} {:<16} difficulty {}  ~{}s  {status}",
            game.id, game.name, game.category, game.difficulty, game.estimated_duration_secs
        );
    }
}

async fn cmd_play(id: &str, says: Vec<String>, duration: Option<u32>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let catalog = Catalog::builtin();

    let (mut game, rules) = catalog.build(id, &config.round)?;
    if let Some(secs) = duration {
        game.duration_secs = secs;
    }

    tracing::info!(
        game = %game.id,
        duration_secs = game.duration_secs,
        "starting offline round"
    );

    let clock = Arc::new(SystemClock);
    let transcript = Arc::new(TranscriptAggregator::new());
    let audio = Arc::new(
        SimulatedAudio::new(config.audio.readiness_grace)
            .with_transcript(Arc::clone(&transcript), clock.clone()),
    );
    audio.set_status(SessionStatus::Connected);
    let host = Arc::new(ScriptedHost::new(demo_scenario(&game.id)?));

    let handle = GameController::spawn(
        game.clone(),
        rules,
        Capabilities {
            host: host.clone(),
            audio: audio.clone(),
            transcript,
            clock,
        },
    )?;

    handle.ptt().set_mode(config.audio.talk_mode).await?;

    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                RoundEvent::CountdownTick { remaining } => tracing::info!("{}...", remaining + 1),
                RoundEvent::RoundBegins { announcement } => tracing::info!("{announcement}"),
                RoundEvent::TalkWindowOpened => tracing::info!("hold to talk!"),
                RoundEvent::HintShown { hint } => tracing::info!("hint: {hint}"),
                RoundEvent::BannerShown { success, score } => {
                    tracing::info!(success, score, "banner");
                }
                other => tracing::debug!(event = ?other, "round event"),
            }
        }
    });

    let heard = play_turns(&handle, &audio, says).await?;
    if !heard.is_empty() && handle.view().talk_window_open {
        send_offline_verdict(&handle, &game.id, &heard).await?;
    }

    let result = handle.wait_finished().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    tracing::debug!(sent = ?host.sent_texts(), "text sent to host");

    handle.shutdown().await;
    Ok(())
}

/// Hold the talk button once per line, until the round stops listening
///
/// Returns the lines the rules left for the host to judge.
async fn play_turns(
    handle: &RoundHandle,
    audio: &SimulatedAudio,
    says: Vec<String>,
) -> anyhow::Result<Vec<String>> {
    let mut view = handle.watch_view();
    let mut heard = Vec::new();

    for text in says {
        let listening = view
            .wait_for(|v| {
                v.talk_window_open || v.state.phase.is_terminal() || v.banner != BannerStage::Hidden
            })
            .await?
            .talk_window_open;
        if !listening {
            break;
        }

        if handle.ptt().mode() == TalkMode::HandsFree {
            tracing::info!(said = %text, "hands-free, leaving it to the host");
            heard.push(text);
            continue;
        }

        // Wait out the audio session's readiness grace
        while !handle.ptt().can_open() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        audio.queue_utterance(text.clone());
        handle.open_talk().await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        let turn = handle.close_talk().await?;
        tracing::info!(said = %text, judgement = ?turn.judgement, "talk turn");

        match turn.judgement {
            Judgement::Finish(_) => break,
            Judgement::Undecided => heard.push(text),
            Judgement::Progress { .. } => {}
        }
    }

    Ok(heard)
}

/// Offline stand-in for the host's own evaluation
///
/// Delivered the way the real host reports it: as a `finish_*` tool call
/// breadcrumb.
async fn send_offline_verdict(handle: &RoundHandle, game_id: &str, heard: &[String]) -> anyhow::Result<()> {
    let words: usize = heard.iter().map(|t| t.split_whitespace().count()).sum();
    let score = u32::try_from(words.saturating_mul(10)).unwrap_or(u32::MAX).min(100);
    let success = score >= 50;
    let message = if success {
        "The host is convinced!"
    } else {
        "The host wanted more."
    };

    let crumb = HostBreadcrumb::tool_result(
        "offline-finish",
        &format!("finish_{}", game_id.replace('-', "_")),
        json!({ "success": success, "score": score, "message": message }),
    );

    let mut decoder = HostToolCallDecoder::new();
    for notification in decoder.decode_all([&crumb]) {
        handle.notify(notification).await?;
    }
    Ok(())
}

fn demo_scenario(game_id: &str) -> anyhow::Result<Scenario> {
    let scenario = match game_id {
        "name-that-capital" => json!({
            "id": "france",
            "problem": "What is the capital of France?",
            "subject": "France",
            "capital": "Paris",
            "hint": "City of Light",
        }),
        "advise-the-child" => json!({
            "id": "lost-teddy",
            "problem": "I left my teddy bear at the park and now it's dark outside.",
            "childQuote": "Can you help me? I can't sleep without Mr. Buttons!",
        }),
        "puh-lease-officer" => json!({
            "id": "noise-complaint",
            "problem": "Your neighbours called about the karaoke. The officer is knocking.",
            "subject": "Officer Dan",
        }),
        _ => json!({
            "id": format!("{game_id}-demo"),
            "problem": "Let's play!",
        }),
    };

    Ok(serde_json::from_value(scenario)?)
}
