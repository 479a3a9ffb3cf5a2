use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromptAnswer {
    Affirmed,
    Declined,
}

/// `y`/`Y` affirms, everything else declines.
pub(crate) fn confirm_yes_no(question: &str) -> Result<PromptAnswer> {
    ask(question, is_affirmative_yes)
}

/// Final destructive confirmation: only a literal `yes` affirms.
pub(crate) fn confirm_typed_yes(question: &str) -> Result<PromptAnswer> {
    ask(question, is_affirmative_typed_yes)
}

pub(crate) fn is_affirmative_yes(reply: &str) -> bool {
    reply.trim().eq_ignore_ascii_case("y")
}

pub(crate) fn is_affirmative_typed_yes(reply: &str) -> bool {
    reply.trim().eq_ignore_ascii_case("yes")
}

fn ask(question: &str, affirmative: impl Fn(&str) -> bool) -> Result<PromptAnswer> {
    print!("{question} ");
    io::stdout().flush().context("failed to flush prompt")?;

    let mut reply = String::new();
    let bytes = io::stdin()
        .lock()
        .read_line(&mut reply)
        .context("failed to read confirmation")?;
    // closed stdin counts as a decline, never as consent
    if bytes == 0 {
        println!();
        return Ok(PromptAnswer::Declined);
    }

    Ok(if affirmative(&reply) {
        PromptAnswer::Affirmed
    } else {
        PromptAnswer::Declined
    })
}
