use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use whatsweb_rust::{
    media::MediaPreprocessor,
    session::{self, storage},
    MediaPayload, SendOptions, SessionOptions,
};

/// Media preprocessing and session storage tools.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON file with session options.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the ffmpeg binary.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Choose a command to run.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the 64-bar voice waveform of an audio file.
    Waveform { input: PathBuf },
    /// Convert an audio file to an Opus voice note.
    Voice { input: PathBuf, output: PathBuf },
    /// Turn a video or WebP into a sticker, optionally with pack metadata.
    Sticker {
        input: PathBuf,
        output: PathBuf,
        /// Sticker pack name.
        #[arg(long)]
        name: Option<String>,
        /// Sticker pack publisher.
        #[arg(long)]
        author: Option<String>,
        /// Emoji category, may be repeated.
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// Render a QR payload in the terminal.
    Qr { data: String },
    /// Delete the persisted session directory.
    ClearSession,
    /// Print the effective options.
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut options = match &cli.config {
        Some(path) => SessionOptions::from_json_file(path)?,
        None => SessionOptions::from_env(),
    };
    if let Some(ffmpeg) = cli.ffmpeg {
        options = options.with_ffmpeg_path(ffmpeg);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let preprocessor = MediaPreprocessor::from_options(&options);

    match cli.command {
        Commands::Waveform { input } => {
            let audio = fs::read(&input)?;
            match preprocessor.generate_waveform(&audio, &cancel).await {
                Some(waveform) => println!("{}", serde_json::to_string(&waveform.to_vec())?),
                None => eprintln!("Could not compute a waveform for {}.", input.display()),
            }
        }
        Commands::Voice { input, output } => {
            let media = MediaPayload::from_file_path(&input)?;
            let prepared = preprocessor
                .prepare(media, &SendOptions::voice(), &cancel)
                .await;
            fs::write(&output, prepared.media.decode()?)?;
            println!("Wrote {} ({})", output.display(), prepared.media.mime_type);
            if let Some(waveform) = prepared.waveform {
                println!("Waveform: {}", serde_json::to_string(&waveform)?);
            }
        }
        Commands::Sticker {
            input,
            output,
            name,
            author,
            categories,
        } => {
            let media = MediaPayload::from_file_path(&input)?;
            let mut send_options = SendOptions::sticker();
            if let Some(name) = name {
                send_options = send_options.with_sticker_name(name);
            }
            if let Some(author) = author {
                send_options = send_options.with_sticker_author(author);
            }
            if !categories.is_empty() {
                send_options = send_options.with_sticker_categories(categories);
            }

            let prepared = preprocessor.prepare(media, &send_options, &cancel).await;
            fs::write(&output, prepared.media.decode()?)?;
            println!("Wrote {} ({})", output.display(), prepared.media.mime_type);
        }
        Commands::Qr { data } => {
            println!("{}", session::render_qr_ascii(&data)?);
        }
        Commands::ClearSession => {
            storage::clear_session(&options.session_path).await?;
            println!("Cleared {}", options.session_path.display());
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
    }

    Ok(())
}
