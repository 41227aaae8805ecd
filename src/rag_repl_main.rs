//! Non-interactive RAG entry point: loads the configured table, builds the
//! embedding index once, then answers stdin questions until exit/quit.

use std::io::{BufRead, Write};

use anyhow::{bail, Context};

use tablechat_backend::core::logging;
use tablechat_backend::pipeline::AnswerMode;
use tablechat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    let csv_path = match std::env::args().nth(1) {
        Some(path) => std::path::PathBuf::from(path),
        None => match &state.config.data.csv_path {
            Some(path) => path.clone(),
            None => bail!("no input file: pass a path or set data.csv_path in config.yml"),
        },
    };

    let issues = state
        .tables
        .load_from_path(&csv_path)
        .with_context(|| format!("failed to load {}", csv_path.display()))?;
    for issue in &issues {
        eprintln!("skipped line {}: {}", issue.line, issue.reason);
    }

    let table = state.tables.snapshot()?;
    println!("loaded {} rows from {}", table.row_count(), csv_path.display());

    let indexed = state.qa.ensure_index().await?;
    println!("indexed {} documents; ask away (exit to quit)", indexed);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }

        match state.qa.answer(question, AnswerMode::Rag).await {
            Ok(answer) => println!("\n{answer}\n"),
            Err(err) => eprintln!("error: {err}"),
        }
    }

    Ok(())
}
