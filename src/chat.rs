//! `ask` and `chat` commands.
//!
//! `ask` answers one question with empty memory. `chat` is a line-oriented
//! REPL over a single [`ChatSession`]:
//!
//! | Input | Effect |
//! |-------|--------|
//! | `exit`, `quit`, `salir` | leave |
//! | `clear`, `borrar` | forget the conversation so far |
//! | blank line | ignored |
//! | anything else | one turn; answer then sources |
//!
//! A failed turn is reported and the loop continues with memory unchanged.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::error;

use medirag_core::chat::{AnswerKind, ChatAnswer, ChatSession};

use crate::config::Config;
use crate::llm::create_generator;
use crate::search::{build_retriever, preview};

/// Build a session from config. Fails before any turn if the LLM
/// credential is missing.
pub fn build_session(config: &Config) -> Result<ChatSession> {
    let generator = create_generator(config)?;
    let retriever = build_retriever(config)?;
    Ok(ChatSession::new(retriever, generator, config.chat_settings()))
}

pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let mut session = build_session(config)?;
    let answer = session.ask(question).await?;
    print_answer(&mut std::io::stdout(), &answer)?;
    Ok(())
}

pub async fn run_chat(config: &Config) -> Result<()> {
    let mut session = build_session(config)?;
    let mut stdout = std::io::stdout();
    writeln!(
        stdout,
        "MediRAG chat. Type 'exit' to leave, 'clear' to reset the conversation."
    )?;
    run_repl(&mut session, BufReader::new(tokio::io::stdin()), &mut stdout).await
}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Exit,
    Clear,
    Skip,
    Ask(&'a str),
}

fn parse_line(line: &str) -> ReplCommand<'_> {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => ReplCommand::Skip,
        "exit" | "quit" | "salir" => ReplCommand::Exit,
        "clear" | "borrar" => ReplCommand::Clear,
        _ => ReplCommand::Ask(trimmed),
    }
}

pub async fn run_repl<R, W>(session: &mut ChatSession, reader: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();
    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_line(&line) {
            ReplCommand::Exit => break,
            ReplCommand::Skip => continue,
            ReplCommand::Clear => {
                session.clear_memory();
                writeln!(out, "Conversation cleared.")?;
            }
            ReplCommand::Ask(question) => match session.ask(question).await {
                Ok(answer) => print_answer(out, &answer)?,
                Err(e) => {
                    error!(error = %e, "turn failed");
                    writeln!(out, "Error: {}", e)?;
                }
            },
        }
    }
    Ok(())
}

pub fn print_answer<W: Write>(out: &mut W, answer: &ChatAnswer) -> Result<()> {
    writeln!(out, "{}", answer.text.trim())?;
    if answer.kind != AnswerKind::Answered || answer.sources.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Sources:")?;
    for (i, source) in answer.sources.iter().enumerate() {
        writeln!(
            out,
            "  {}. {} [{:.3}] \"{}\"",
            i + 1,
            source.locator(),
            source.relevance_score.unwrap_or(0.0),
            preview(&source.content, 80)
        )?;
    }
    Ok(())
}
