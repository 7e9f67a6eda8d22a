//! `filemail`: send and fetch Filemail transfers from the command line.

mod config;
mod progress;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use filemail_client::{
    Client, ClientConfig, Contact, DownloadOptions, DownloadOutcome, SendOptions, TransferSummary,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::{API_KEY_ENV, FileConfig, config_path};
use progress::{ProgressPrinter, format_bytes};

#[derive(Parser)]
#[command(name = "filemail")]
#[command(author, version, about = "Send and fetch Filemail transfers", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: $FILEMAIL_CONFIG_PATH or ~/.config/filemail/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// No progress output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files and folders to one or more recipients
    Send {
        /// Files or folders to send
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Recipients, comma separated or repeated
        #[arg(short, long, required = true)]
        to: Vec<String>,

        #[arg(short, long, default_value = "")]
        subject: String,

        #[arg(short, long, default_value = "")]
        message: String,

        /// Days the transfer stays available (1-90)
        #[arg(short, long)]
        days: Option<u32>,

        /// Maximum number of downloads
        #[arg(long)]
        downloads: Option<u32>,

        /// Password recipients must enter
        #[arg(long)]
        password: Option<String>,

        /// Email me when recipients download
        #[arg(long)]
        notify: bool,

        /// Email me when the upload is complete
        #[arg(long)]
        confirmation: bool,

        /// Send without logging in
        #[arg(long)]
        anonymous: bool,

        /// Pack everything into one zip archive before uploading
        #[arg(long)]
        compress: bool,

        /// Skip md5 checksums
        #[arg(long = "no-checksum")]
        no_checksum: bool,
    },

    /// Download the files of a transfer
    Download {
        transfer_id: String,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// List sent transfers
    Sent {
        /// Include expired transfers
        #[arg(long)]
        all: bool,
    },

    /// List received transfers
    Received {
        /// Only the last N days (0-90, 0 = all)
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        age: i64,

        /// Every user of the company account
        #[arg(long)]
        all_users: bool,
    },

    /// Show the account
    User,

    /// Manage contacts
    #[command(subcommand)]
    Contacts(ContactCommands),
}

#[derive(Subcommand)]
enum ContactCommands {
    List,
    Add { name: String, email: String },
    Delete { contact_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if cli.verbose { "debug" } else { "info" })
        }))
        .init();

    let path = config_path(cli.config.clone());
    let file = FileConfig::load(&path)?.with_api_key_override(std::env::var(API_KEY_ENV).ok());
    let mut config = file.client_config()?;
    apply_overrides(&mut config, &cli.command);
    let client = Client::new(config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping after the current chunk");
                cancel.cancel();
            }
        }
    });

    let anonymous = matches!(cli.command, Commands::Send { anonymous: true, .. });
    if !anonymous {
        client.login().await.context("login failed")?;
    }

    let result = run(&client, cli.command, cli.quiet, cancel).await;

    if client.is_logged_in()
        && let Err(e) = client.logout().await
    {
        tracing::warn!(error = %e, "logout failed");
    }
    result
}

/// Command-line flags that change the client configuration.
fn apply_overrides(config: &mut ClientConfig, command: &Commands) {
    if let Commands::Send {
        no_checksum: true, ..
    } = command
    {
        config.checksum = false;
    }
}

async fn run(
    client: &Client,
    command: Commands,
    quiet: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Commands::Send {
            paths,
            to,
            subject,
            message,
            days,
            downloads,
            password,
            notify,
            confirmation,
            compress,
            ..
        } => {
            let mut meta = client.transfer_metadata(to).subject(subject).message(message);
            if let Some(days) = days {
                meta.days = days;
            }
            if downloads.is_some() {
                meta.downloads = downloads;
            }
            meta.password = password;
            meta.notify |= notify;
            meta.confirmation |= confirmation;

            let mut transfer = client.new_transfer(meta).await?;
            let added = if compress {
                transfer.add_archive(&paths).await?
            } else {
                transfer.add_files(&paths).await?
            };
            if added == 0 {
                transfer.cancel().await?;
                bail!("nothing to send");
            }

            let mut printer = ProgressPrinter::new(quiet);
            let options = SendOptions {
                cancel: Some(cancel),
                ..SendOptions::default()
            };
            if let Err(e) = transfer.send(options, |p| printer.update(p)).await {
                if e.is_cancelled() {
                    transfer.cancel().await?;
                }
                return Err(e.into());
            }
            let url = transfer
                .info()
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            println!("sent {added} file(s) as transfer {} {url}", transfer.transfer_id());
        }

        Commands::Download {
            transfer_id,
            output,
            overwrite,
        } => {
            let summary = TransferSummary {
                transferid: transfer_id,
                ..TransferSummary::default()
            };
            let mut transfer = client.open_transfer(&summary);
            let files = transfer.get_files().await?.to_vec();
            for file in &files {
                let mut printer = ProgressPrinter::new(quiet);
                let options = DownloadOptions {
                    overwrite,
                    cancel: Some(cancel.clone()),
                };
                match transfer
                    .download(file, &output, options, |p| printer.update(p))
                    .await?
                {
                    DownloadOutcome::Downloaded(path) => println!("{}", path.display()),
                    DownloadOutcome::Skipped(path) => {
                        println!("{} exists, skipped", path.display())
                    }
                }
            }
        }

        Commands::Sent { all } => print_transfers(&client.sent_transfers(all).await?),

        Commands::Received { age, all_users } => {
            print_transfers(&client.received_transfers(age, all_users).await?)
        }

        Commands::User => {
            let user = client.user_info().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }

        Commands::Contacts(ContactCommands::List) => {
            for c in client.contacts().await? {
                println!("{}\t{}\t{}", c.contactid, c.name, c.email);
            }
        }

        Commands::Contacts(ContactCommands::Add { name, email }) => {
            let contact = client.add_contact(&name, &email).await?;
            println!("added {}", contact.contactid);
        }

        Commands::Contacts(ContactCommands::Delete { contact_id }) => {
            let contact = Contact {
                contactid: contact_id,
                ..Contact::default()
            };
            client.delete_contact(&contact).await?;
        }
    }
    Ok(())
}

fn print_transfers(list: &[TransferSummary]) {
    for t in list {
        let size = t
            .extra
            .get("size")
            .and_then(|v| v.as_u64())
            .map(format_bytes)
            .unwrap_or_default();
        println!("{}\t{}\t{}\t{}\t{size}", t.transferid, t.status, t.to, t.subject);
    }
}
