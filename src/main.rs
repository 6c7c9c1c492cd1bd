use clap::{Parser, Subcommand};
use hitster_player_lib::commands::{
    auth_commands, diagnostic_commands, playback_commands, Output,
};
use hitster_player_lib::error::AppResult;
use hitster_player_lib::AppState;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "hitster-player",
    about = "Scan a mystery-track QR card and play it on Spotify",
    long_about = "Hitster Player - play mystery tracks from QR cards on a Spotify Connect device

WORKFLOW:
  1. Login with your Spotify Premium account
  2. Start the player and scan a card (or type/paste its link)
  3. Press enter to play or pause without seeing the title

QUICK START:
  hitster-player login                  # Sign in through the browser
  hitster-player check                  # Diagnose account and player access
  hitster-player play                   # Start the player and scan cards",
    version,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.hitster-player/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with Spotify (PKCE, through the browser)
    Login,

    /// Sign out and end the Spotify web session
    Logout,

    /// Show who is signed in and whether the account can play
    #[command(aliases = &["st"])]
    Status,

    /// Run the account and player diagnostics
    Check {
        /// Skip the player SDK probe
        #[arg(long)]
        no_sdk: bool,
    },

    /// Remove every stored credential and flag
    Clear,

    /// Show what a scanned payload resolves to
    Resolve {
        /// QR payload: card link, spotify:track URI or open.spotify.com URL
        text: String,
    },

    /// Build the card link for a Spotify track URL
    Card {
        track_url: String,
    },

    /// Start the interactive player
    Play {
        /// Load this payload before the first scan
        #[arg(short, long)]
        track: Option<String>,

        /// Platform string used for mobile detection
        #[arg(long)]
        platform: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    hitster_player_lib::init_logging(cli.verbose);

    let out = Output::new(cli.json);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            out.error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let out = Output::new(cli.json);

    // Payload checks need no account or storage.
    if let Commands::Resolve { text } = &cli.command {
        return diagnostic_commands::resolve(text, out);
    }

    let state = AppState::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Login => auth_commands::login(&state, out).await,
        Commands::Logout => auth_commands::logout(&state, out).await,
        Commands::Status => auth_commands::status(&state, out).await,
        Commands::Check { no_sdk } => {
            diagnostic_commands::check(&state, out, no_sdk).await?;
            Ok(())
        }
        Commands::Clear => auth_commands::clear(&state, out),
        Commands::Resolve { text } => diagnostic_commands::resolve(&text, out),
        Commands::Card { track_url } => diagnostic_commands::card(&state, &track_url, out),
        Commands::Play { track, platform } => {
            playback_commands::play(&state, out, track, platform).await
        }
    }
}
