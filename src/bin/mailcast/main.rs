#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Command-line mail merge

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand};
use mailcast::{
    domain::{
        dispatch::{DispatchConfig, Dispatcher, Report},
        specification::schema,
    },
    infrastructure::{
        documents::read_document,
        smtp::{SmtpMailer, SmtpOptions},
    },
};
use serde_json::json;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
#[command(name = "mailcast", version, about = "Mail merge driven by a YAML document")]
pub struct Args {
    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a specification document and deliver one message per recipient
    Send {
        /// Path to the specification document
        spec: PathBuf,

        /// Refuse to send messages that still contain unresolved placeholders
        #[clap(long, env = "MAILCAST_STRICT", default_value_t = true, action = ArgAction::Set)]
        strict: bool,

        /// SMTP settings
        #[clap(flatten)]
        smtp: SmtpOptions,
    },

    /// Print the JSON Schema of specification documents
    Schema,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = check_environment(dotenvy::dotenv()) {
        eprintln!("Failed to load environment: {}", e);

        return Err(e);
    }

    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();

    match args.command {
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&schema::json_schema())?);

            Ok(())
        }
        Command::Send { spec, strict, smtp } => {
            let document = read_document(&spec)?;
            let dispatcher =
                Dispatcher::new(Arc::new(SmtpMailer::new(smtp)), DispatchConfig { strict });

            match dispatcher.run(document).await {
                Ok(report) => {
                    print_summary(&report)?;

                    let summary = report.summary();
                    if !summary.all_sent() {
                        bail!(
                            "{} of {} recipients did not get their message",
                            summary.failed,
                            report.outcomes.len()
                        );
                    }

                    Ok(())
                }
                Err(err) => {
                    if let Some(report) = err.report() {
                        print_summary(report)?;
                    }

                    Err(err.into())
                }
            }
        }
    }
}

/// A missing `.env` file is fine; one that exists but cannot be read or parsed is not.
fn check_environment(loaded: dotenvy::Result<PathBuf>) -> Result<()> {
    match loaded {
        Err(e) if !e.not_found() => Err(e.into()),
        _ => Ok(()),
    }
}

fn print_summary(report: &Report) -> Result<()> {
    let output = json!({
        "batch_id": report.batch_id,
        "started_at": report.started_at,
        "finished_at": report.finished_at,
        "summary": report.summary(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
