mod auth;
mod config;
mod error;
mod filter;
mod message;
mod update;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use log::{debug, info};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::Submission;
use crate::message::Message;

/// Read an email on stdin and append its body as a comment to the Jira
/// tickets named in its Subject, then pass the message on to stdout.
#[derive(Parser, Debug)]
#[command(name = "jiramail", disable_version_flag = true)]
struct Args {
    /// Read config file (default: ~/.jiramailrc)
    #[arg(short = 'c', value_name = "file")]
    config: Option<PathBuf>,

    /// Don't do anything: parse the message but make no network calls
    #[arg(short = 'd')]
    dry_run: bool,

    /// Don't print the message, swallowing it
    #[arg(short = 's')]
    swallow: bool,

    /// Be verbose (repeat for more detail)
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            process::exit(code);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(args.verbose)))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(&args, io::stdin().lock(), io::stdout().lock()) {
        eprintln!("jiramail: {}", e);
        process::exit(1);
    }
}

fn log_filter(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,jiramail={}", level)
}

fn run<R: Read, W: Write>(args: &Args, mut input: R, output: W) -> Result<()> {
    let path = args.config.clone().unwrap_or_else(config::default_path);
    let mut config = Config::load(&path)?;
    config.dry_run |= args.dry_run;
    config.swallow |= args.swallow;

    let mut raw = Vec::new();
    input.read_to_end(&mut raw).map_err(Error::Input)?;
    info!("[main] read message from stdin ({} bytes)", raw.len());

    let mut msg = Message::parse(raw)?;
    match filter::process(&mut msg, &config)? {
        Some(submission) if submission.is_actionable() => submit(&config, &submission)?,
        Some(_) => debug!("[main] no comment or no tickets, nothing to update"),
        None => {}
    }

    if msg.is_modified() {
        debug!("[main] recipient headers were rewritten");
    }
    if config.swallow {
        info!("[main] swallowing message");
        return Ok(());
    }
    msg.write_to(output).map_err(Error::Output)
}

fn submit(config: &Config, submission: &Submission) -> Result<()> {
    let username = config
        .sender
        .as_deref()
        .or(submission.sender.as_deref())
        .ok_or(Error::MissingUser)?;

    let session = auth::login(config, username)?;
    update::update_tickets(&session, &config.api_path, &submission.tickets, &submission.comment)
}
