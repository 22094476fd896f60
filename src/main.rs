//! The `objsh` binary: an interactive REPL around `parse` + `execute`.

use anyhow::Result;
use clap::Parser;
use objsh::{execute, render, Object, Service};
use rustyline::error::ReadlineError;
use std::io::BufRead;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "objsh", version, about = "A shell whose pipelines carry structured objects")]
struct Cli {
    /// Execute a single pipeline and exit.
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    command: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = Service::new();

    if let Some(line) = cli.command {
        let objects = execute(&service, &line).await?;
        print_json_lines(&objects);
        return Ok(());
    }

    if atty::is(atty::Stream::Stdin) {
        repl(&service).await
    } else {
        batch(&service).await
    }
}

/// Interactive loop: prompt, pretty-print, keep going on errors.
async fn repl(service: &Service) -> Result<()> {
    let mut editor = rustyline::DefaultEditor::new()?;
    loop {
        match editor.readline("vsh> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" {
                    break;
                }
                let _ = editor.add_history_entry(line);
                match execute(service, line).await {
                    Ok(objects) => render::print_objects(&objects),
                    Err(err) => eprintln!("error: {err}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Non-interactive loop: one pipeline per stdin line, JSON output.
async fn batch(service: &Service) -> Result<()> {
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }
        match execute(service, line).await {
            Ok(objects) => print_json_lines(&objects),
            Err(err) => eprintln!("error: {err}"),
        }
    }
    Ok(())
}

fn print_json_lines(objects: &[Object]) {
    for obj in objects {
        println!("{}", serde_json::Value::Object(obj.clone()));
    }
}
