//! Conversation output on stdout.
//!
//! This is product output, independent of `RUST_LOG`.

use std::io::Write;

use crate::core::types::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleStyle {
    #[default]
    Plain,
    /// Boxed headers per message.
    Rich,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    style: ConsoleStyle,
}

impl Console {
    pub fn new(style: ConsoleStyle) -> Self {
        Self { style }
    }

    pub fn format_message(&self, message: &Message) -> String {
        match self.style {
            ConsoleStyle::Plain => format!(
                "---------- {} ----------\n{}\n",
                message.source,
                message.content.trim_end()
            ),
            ConsoleStyle::Rich => {
                let title = format!(" {} ", message.source);
                let width = title.chars().count().max(40);
                let rule = "─".repeat(width);
                format!(
                    "╭{rule}╮\n│{title:<width$}│\n╰{rule}╯\n{}\n",
                    message.content.trim_end()
                )
            }
        }
    }

    pub fn print_message(&self, message: &Message) {
        let mut stdout = std::io::stdout().lock();
        // Write errors on a closed stdout are ignored.
        let _ = stdout.write_all(self.format_message(message).as_bytes());
        let _ = stdout.flush();
    }
}
