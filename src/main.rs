use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use murmur::bootstrap::bootstrap;
use murmur::config::Overrides;
use murmur::session::write_banner;
use murmur::{AudioPlayer, Config, OllamaClient, Session, SpeechOutput, VoiceSelection};

/// Murmur - talk to a local LLM and hear it answer
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Model to chat with (e.g. "llama3.2")
    #[arg(long, env = "MURMUR_MODEL")]
    model: Option<String>,

    /// Voice quality
    #[arg(long, value_enum, env = "MURMUR_VOICE")]
    voice: Option<VoiceSelection>,

    /// Inference server base URL
    #[arg(long, env = "MURMUR_URL")]
    url: Option<String>,

    /// Directory containing the Piper voice files
    #[arg(long, env = "MURMUR_VOICES_DIR")]
    voices_dir: Option<PathBuf>,

    /// Path to the Piper executable
    #[arg(long, env = "MURMUR_PIPER")]
    piper: Option<PathBuf>,

    /// Start `ollama serve` if the server is not running
    #[arg(long)]
    start_server: bool,

    /// Download missing voice files before starting
    #[arg(long)]
    download_voices: bool,

    /// Print replies without speaking them
    #[arg(long)]
    no_speech: bool,

    /// Config file (defaults to ~/.config/murmur/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,murmur=info",
        1 => "warn,murmur=debug",
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
            eprintln!("Error: {e}");
            let startup = e.downcast_ref::<murmur::Error>().filter(|err| err.is_fatal());
            if let Some(hint) = startup.and_then(murmur::Error::hint) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        url: cli.url,
        model: cli.model,
        voice: cli.voice,
        voices_dir: cli.voices_dir,
        piper: cli.piper,
        start_server: cli.start_server,
        download_voices: cli.download_voices,
        no_speech: cli.no_speech,
    };

    let config = Config::load(overrides, cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = std::io::stdout();
    writeln!(stdout, "Initializing murmur...")?;
    writeln!(stdout, "Model: {}", config.model)?;
    writeln!(stdout, "Voice: {}", config.voice)?;

    let client = OllamaClient::new(&config.url)?.with_chat_timeout(config.chat_timeout);
    let ready = bootstrap(&config, &client, &mut stdout).await?;
    writeln!(stdout, "Ready!\n")?;

    tracing::info!(
        model = %ready.model,
        voice = %config.voice,
        speech = ready.synthesizer.is_some(),
        "starting conversation"
    );

    let mut session = Session::new(Box::new(client), ready.model, config.voice);
    if let Some(synthesizer) = ready.synthesizer {
        let speech = SpeechOutput::new(synthesizer, AudioPlayer::new(), config.voices_dir.clone());
        session = session.with_speaker(Box::new(speech));
    }

    write_banner(&mut stdout)?;
    session
        .run(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await?;

    Ok(())
}
