//! Terminal rendering: markdown skin and incremental stream printing

use crate::chat::StreamSnapshot;
use crossterm::style::Stylize;
use std::io::{self, Write};
use termimad::{MadSkin, crossterm::style::Color};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub fn create_markdown_skin() -> MadSkin {
    let mut skin = MadSkin::default();

    // Headers
    skin.headers[0].set_fg(Color::Cyan);
    skin.headers[1].set_fg(Color::Blue);
    skin.headers[2].set_fg(Color::Green);

    // Code blocks
    skin.code_block.set_fg(Color::Yellow);
    skin.inline_code.set_fg(Color::Yellow);

    // Bold and italic
    skin.bold.set_fg(Color::White);
    skin.italic.set_fg(Color::Magenta);

    skin
}

/// Prints only the part of each snapshot not yet on screen.
///
/// Reasoning is printed dimmed, content in the normal style.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    reasoning_shown: String,
    content_shown: String,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, snapshot: &StreamSnapshot<'_>) -> io::Result<()> {
        let mut out = io::stdout().lock();

        if let Some(new) = unseen(&self.reasoning_shown, snapshot.reasoning) {
            write!(out, "{}", new.dim())?;
            self.reasoning_shown = snapshot.reasoning.to_string();
        }

        if let Some(new) = unseen(&self.content_shown, snapshot.content) {
            if self.content_shown.is_empty() && !self.reasoning_shown.is_empty() {
                writeln!(out, "\n")?;
            }
            write!(out, "{new}")?;
            self.content_shown = snapshot.content.to_string();
        }

        out.flush()
    }
}

/// Reads REPL input; Ctrl-C at the prompt ends input like EOF
pub struct LineReader {
    lines: Lines<BufReader<Stdin>>,
}

impl LineReader {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Show `prompt` and wait for a trimmed line, `None` on EOF or Ctrl-C
    pub async fn read(&mut self, prompt: &str) -> io::Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;

        tokio::select! {
            line = self.lines.next_line() => Ok(line?.map(|l| l.trim().to_string())),
            _ = tokio::signal::ctrl_c() => {
                println!();
                Ok(None)
            }
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of `current` past what was already shown; a replaced value is shown whole
fn unseen<'a>(shown: &str, current: &'a str) -> Option<&'a str> {
    match current.strip_prefix(shown) {
        Some(rest) if !rest.is_empty() => Some(rest),
        Some(_) => None,
        None => Some(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_suffix() {
        assert_eq!(unseen("Hel", "Hello"), Some("lo"));
        assert_eq!(unseen("Hello", "Hello"), None);
        assert_eq!(unseen("", "Hi"), Some("Hi"));
    }

    #[test]
    fn test_unseen_replaced_text_shown_whole() {
        assert_eq!(unseen("*notice*", "real trace"), Some("real trace"));
    }
}
