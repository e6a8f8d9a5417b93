use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use colloquy::config::DEFAULT_SCENARIO_ID;
use colloquy::providers::{ChatCompletionsGenerator, ConsoleSynthesizer, LineRecognizer};
use colloquy::session::MemorySessionStore;
use colloquy::{
    Config, EngineEvent, EngineParts, Persona, ResponseGenerator, SessionContext, Speaker,
    SpeechCaptureController, SpeechSynthesisController, TurnEngine, analyze,
};

/// Colloquy - Spoken conversation practice with a synthetic partner
#[derive(Parser)]
#[command(name = "colloquy", version, about)]
struct Cli {
    /// Scenario to practice (e.g., "cafe-order")
    #[arg(short, long, env = "COLLOQUY_SCENARIO", default_value = DEFAULT_SCENARIO_ID)]
    scenario: String,

    /// Persona to talk with; defaults to the scenario's persona
    #[arg(short, long, env = "COLLOQUY_PERSONA")]
    persona: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Hold a conversation in the terminal (default)
    Chat,
    /// Classify a message the way the engine does
    Analyze {
        /// Message to classify
        text: String,
    },
    /// Show the voice each persona speaks with
    Voices,
    /// List the built-in scenarios
    Scenarios,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,colloquy=info",
        1 => "info,colloquy=debug",
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
    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&cli.scenario, cli.persona.as_deref()).await,
        Command::Analyze { text } => {
            cmd_analyze(&text);
            Ok(())
        }
        Command::Voices => cmd_voices(),
        Command::Scenarios => cmd_scenarios(),
    }
}

/// Run a console session until the user ends it
async fn chat(scenario_id: &str, persona_id: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let scenario = Config::load_scenario(scenario_id)?;
    let persona_id = persona_id
        .map(ToString::to_string)
        .or_else(|| scenario.persona_id.clone())
        .unwrap_or_else(|| Persona::default().id().to_string());
    let persona = Config::load_persona(&persona_id)?;

    let backend = Arc::new(ChatCompletionsGenerator::new(&config.generation)?);
    let generator = Arc::new(ResponseGenerator::new(
        backend,
        config.response_cache(),
        config.generator_config(),
    ));

    let parts = EngineParts {
        capture: SpeechCaptureController::new(
            Box::new(LineRecognizer::stdin()),
            config.capture.clone(),
        ),
        synthesis: SpeechSynthesisController::new(
            Arc::new(ConsoleSynthesizer::stdout()),
            config.voices.clone(),
        ),
        generator,
        store: Arc::new(MemorySessionStore::new()),
    };

    println!("{} with {}", scenario.title, persona.name());
    if !scenario.description.is_empty() {
        println!("{}", scenario.description);
    }
    println!("Type what you would say. Ctrl-D or Ctrl-C ends the session.\n");

    let session = SessionContext::new(
        scenario,
        persona,
        config.engine.history_limit,
        config.engine.memory_capacity,
    );
    tracing::info!(session_id = %session.session_id, "starting session");

    let (engine, mut events) = TurnEngine::start(session, parts, config.machine_config());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            result = &mut ctrl_c, if !interrupted => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                }
                interrupted = true;
                engine.end();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    EngineEvent::StateChanged(state) => tracing::debug!(%state, "turn state"),
                    EngineEvent::InterimTranscript(text) => tracing::debug!(%text, "hearing"),
                    EngineEvent::MessageAppended(message) => {
                        if message.speaker == Speaker::User {
                            println!("you: {}", message.text);
                        }
                    }
                    EngineEvent::CaptureFailed(e) => {
                        tracing::debug!(code = %e.code, "capture stopped");
                    }
                    EngineEvent::SynthesisFailed(reason) => {
                        eprintln!("(could not speak the reply: {reason})");
                    }
                    EngineEvent::Ended { summary, .. } => {
                        println!("\n{summary}");
                        break;
                    }
                }
            }
        }
    }

    engine.join().await?;
    Ok(())
}

fn cmd_analyze(text: &str) {
    let analysis = analyze(text, &[]);
    println!("topic:  {:?}", analysis.topic_continuity);
    println!("tone:   {}", analysis.emotional_tone);
    println!("intent: {}", analysis.intent);
    println!("tags:   {}", analysis.tags().join(", "));
}

fn cmd_voices() -> anyhow::Result<()> {
    let config = Config::load()?;
    for (id, _) in Config::embedded_personas() {
        let persona = Config::load_persona(id)?;
        let profile = config.voices.resolve(&persona);
        println!(
            "{:<10} {:<10} rate {:.2} pitch {:.2} volume {:.2}",
            persona.id(),
            profile.voice,
            profile.rate,
            profile.pitch,
            profile.volume
        );
    }
    Ok(())
}

fn cmd_scenarios() -> anyhow::Result<()> {
    for (id, _) in Config::embedded_scenarios() {
        let scenario = Config::load_scenario(id)?;
        println!(
            "{:<14} {:<24} {}",
            scenario.id,
            scenario.title,
            scenario.persona_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
