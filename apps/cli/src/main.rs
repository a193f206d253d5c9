//! Markup CLI - command-line client for the image markup server
//!
//! Provides a `markup` command that sends local images to the server, follows
//! the streamed progress of agentic edits and saves the results.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use markup_cli::MarkupClient;
use markup_cli::client::DEFAULT_SERVER;
use tracing_subscriber::EnvFilter;

use commands::edit::{EditArgs, ReferencePoint, parse_point};
use commands::{OutputOptions, edit, generate, health, inpaint, logs};

/// Image markup AI client
#[derive(Parser, Debug)]
#[command(name = "markup", author, version, about = "Image markup AI client")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Server base URL
    #[arg(short, long, env = "MARKUP_SERVER", default_value = DEFAULT_SERVER, global = true)]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Edit an image with the agentic plan, generate and self-check loop
    Edit {
        /// Source image file
        image: PathBuf,

        /// What to change
        #[arg(short, long)]
        prompt: String,

        /// Mask image (white = area to edit)
        #[arg(short, long)]
        mask: Option<PathBuf>,

        /// Generation attempts (1-5)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Reference point as `label@x,y`; repeatable
        #[arg(long = "point", value_parser = parse_point)]
        points: Vec<ReferencePoint>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Inpaint the masked region of an image
    Inpaint {
        /// Source image file
        image: PathBuf,

        /// Mask image (white = area to edit)
        #[arg(short, long)]
        mask: PathBuf,

        /// What to change inside the mask
        #[arg(short, long)]
        prompt: String,

        /// Planning thinking budget in tokens
        #[arg(long)]
        thinking_budget: Option<u32>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Generate an edited image in a single call
    Generate {
        /// Source image file
        image: PathBuf,

        /// What to change
        #[arg(short, long)]
        prompt: String,

        /// Image model
        #[arg(long, default_value = "gemini-3-pro-image-preview")]
        model: String,

        /// Output file (defaults to <image>-edited.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the server is up
    Health {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge two exported activity logs
    MergeLogs {
        first: PathBuf,
        second: PathBuf,

        /// Write the merged log here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Output file (defaults to <image>-edited.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export the activity log as JSON
    #[arg(long)]
    log: Option<PathBuf>,

    /// Echo streamed thinking text
    #[arg(short, long)]
    verbose: bool,
}

impl OutputArgs {
    fn into_options(self, input: PathBuf) -> OutputOptions {
        OutputOptions { input, output: self.output, log: self.log, verbose: self.verbose }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(err) = run(args).await {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let client = MarkupClient::new(args.server);
    match args.command {
        Command::Edit { image, prompt, mask, max_iterations, points, output } => {
            let options = output.into_options(image.clone());
            let args = EditArgs { image, prompt, mask, max_iterations, points };
            edit::execute(&client, args, options).await
        }
        Command::Inpaint { image, mask, prompt, thinking_budget, output } => {
            let options = output.into_options(image.clone());
            inpaint::execute(&client, image, mask, prompt, thinking_budget, options).await
        }
        Command::Generate { image, prompt, model, output } => {
            generate::execute(&client, image, prompt, model, output).await
        }
        Command::Health { json } => health::execute(&client, json).await,
        Command::MergeLogs { first, second, output } => logs::execute(&first, &second, output),
    }
}
