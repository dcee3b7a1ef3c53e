//! CLI tool to validate and play dialogue scripts.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use yarnbound_rs::{
    Dialogue, DialogueOption, DialogueOptions, DialogueResult, Error, RuntimeError,
};

/// Validate and play Yarn-style dialogue scripts
#[derive(Parser, Debug)]
#[command(name = "yarnbound", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that every node of each script loads and parses
    Check {
        /// Script files to check
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Run a script interactively on stdin/stdout
    Play {
        /// Script file to run
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Node to start at
        #[arg(long, default_value = "Start")]
        start: String,
        /// Locale for plural and ordinal markup
        #[arg(long, default_value = "en")]
        locale: String,
        /// Show a line together with the options that follow it
        #[arg(long)]
        combine: bool,
    },
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();

    match Cli::parse().command {
        Command::Check { files } => check(&files),
        Command::Play {
            file,
            start,
            locale,
            combine,
        } => {
            let options = DialogueOptions::new()
                .start_at(start)
                .locale(locale)
                .combine_text_and_options(combine)
                .handle_command(|command| println!("<<{}>>", command.command));
            play(&file, options)
        }
    }
}

fn check(files: &[PathBuf]) -> ExitCode {
    let mut had_error = false;

    for file in files {
        let path = file.display();
        let content = match fs::read_to_string(file) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{path}: {e}");
                had_error = true;
                continue;
            }
        };

        match yarnbound_rs::parse_str(&content) {
            Ok(nodes) => eprintln!("{path}: valid ({} node(s))", nodes.len()),
            Err(e) => {
                eprintln!("{path}: {e}");
                had_error = true;
            }
        }
    }

    if had_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn play(path: &Path, options: DialogueOptions) -> ExitCode {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let mut dialogue = match Dialogue::from_source(&content, options) {
        Ok(dialogue) => dialogue,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();
    while let Some(result) = dialogue.current() {
        let selection = match result {
            DialogueResult::Text(text) => {
                println!("{}", text.text);
                None
            }
            DialogueResult::Options(options) => {
                if let Some(text) = &options.text {
                    println!("{text}");
                }
                match read_choice(&mut input, &options.options) {
                    Ok(Some(index)) => Some(index),
                    Ok(None) => return ExitCode::SUCCESS,
                    Err(e) => {
                        eprintln!("stdin: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
            DialogueResult::Command(command) => {
                println!("<<{}>>", command.command);
                None
            }
        };
        if dialogue.is_finished() {
            break;
        }

        match dialogue.advance(selection) {
            Ok(()) => {}
            Err(
                e @ Error::Runtime(
                    RuntimeError::OptionOutOfRange { .. } | RuntimeError::NoOptionSelected,
                ),
            ) => eprintln!("{e}"),
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Prompt until a valid, available option is chosen. `None` on end of input.
fn read_choice(
    input: &mut impl BufRead,
    options: &[DialogueOption],
) -> io::Result<Option<usize>> {
    for (i, option) in options.iter().enumerate() {
        let marker = if option.is_available { "" } else { " (unavailable)" };
        println!("  {}. {}{marker}", i + 1, option.text);
    }

    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) && options[n - 1].is_available => {
                return Ok(Some(n - 1));
            }
            _ => eprintln!("choose an available option between 1 and {}", options.len()),
        }
    }
}
