//! Where a reply goes while it is being generated.
use std::io::Write;

/// Appended to partial replies while more text is on the way.
pub const CURSOR: &str = "▌";

/// A surface that displays the assistant's reply for the current turn.
pub trait Renderer: Send {
    /// Show the reply received so far. `text` ends with `CURSOR`.
    fn partial(&mut self, text: &str);

    /// Show the final reply, replacing anything shown by `partial`.
    fn complete(&mut self, text: &str);

    /// Show a transient message that is not part of the transcript,
    /// e.g. why a request failed.
    fn notice(&mut self, message: &str);
}

/// Discards everything. For events that don't produce a reply.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn partial(&mut self, _text: &str) {}
    fn complete(&mut self, _text: &str) {}
    fn notice(&mut self, _message: &str) {}
}

const BACKSPACE_AND_CLEAR: &str = "\u{8}\x1b[K";

/// Prints replies to a terminal. Text is written incrementally and the
/// cursor glyph is erased with a backspace before more text follows,
/// so the output reads like the reply is being typed out.
pub struct TerminalRenderer<W: Write> {
    out: W,
    printed: String,
    cursor_visible: bool,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: String::new(),
            cursor_visible: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_progress(&mut self, text: &str, show_cursor: bool) -> std::io::Result<()> {
        if self.cursor_visible {
            write!(self.out, "{}", BACKSPACE_AND_CLEAR)?;
            self.cursor_visible = false;
        }
        match text.strip_prefix(self.printed.as_str()) {
            Some(rest) => write!(self.out, "{}", rest)?,
            // The reply was replaced, e.g. by the fallback after a
            // failure mid-stream
            None => write!(self.out, "\n{}", text)?,
        }
        self.printed = text.to_string();
        if show_cursor {
            write!(self.out, "{}", CURSOR)?;
            self.cursor_visible = true;
        }
        self.out.flush()
    }

    fn write_line(&mut self, message: &str) -> std::io::Result<()> {
        if self.cursor_visible {
            write!(self.out, "{}", BACKSPACE_AND_CLEAR)?;
            self.cursor_visible = false;
        }
        if !self.printed.is_empty() {
            writeln!(self.out)?;
            self.printed.clear();
        }
        writeln!(self.out, "{}", message)?;
        self.out.flush()
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn partial(&mut self, text: &str) {
        let text = text.strip_suffix(CURSOR).unwrap_or(text);
        if let Err(e) = self.write_progress(text, true) {
            tracing::warn!("Writing to terminal failed: {}", e);
        }
    }

    fn complete(&mut self, text: &str) {
        let result = self
            .write_progress(text, false)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());
        self.printed.clear();
        if let Err(e) = result {
            tracing::warn!("Writing to terminal failed: {}", e);
        }
    }

    fn notice(&mut self, message: &str) {
        if let Err(e) = self.write_line(message) {
            tracing::warn!("Writing to terminal failed: {}", e);
        }
    }
}
