//! Splits long replies into parts that fit Telegram's message limit.
//!
//! Splitting happens on line boundaries. A fenced code block that straddles a
//! split is closed at the end of one part and reopened at the start of the
//! next, so every part renders as valid Markdown on its own. A line that cannot
//! fit even into an empty part is cut at a character boundary.
//!
//! Lengths are counted in `char`s.

/// Fence marker that opens and closes a Markdown code block.
pub const FENCE: &str = "```";

/// Default size budget, a little under Telegram's 4096-character hard limit.
pub const DEFAULT_MAX_LEN: usize = 4090;

/// Position of the scanner relative to fenced code blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Prose,
    Code,
}

impl FenceState {
    /// State after consuming a line.
    fn after(self, is_fence_line: bool) -> Self {
        match (self, is_fence_line) {
            (state, false) => state,
            (Self::Prose, true) => Self::Code,
            (Self::Code, true) => Self::Prose,
        }
    }

    /// Characters kept free so an open block can always be closed (`\n` + fence).
    fn reserve(self) -> usize {
        match self {
            Self::Prose => 0,
            Self::Code => FENCE.len() + 1,
        }
    }
}

/// A line toggles the fence state when, trimmed, it starts with the marker.
pub fn is_fence_line(line: &str) -> bool {
    line.trim().starts_with(FENCE)
}

/// Split `text` into parts of at most `max_len` characters.
///
/// Empty input yields no parts. An unterminated fence at the end of the
/// input is left unterminated. For `max_len` below 8 a part may exceed the
/// budget because no progress is possible otherwise.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut builder = PartBuilder::new(max_len);
    for line in text.split('\n') {
        builder.add_line(line);
    }
    builder.finish()
}

/// [`chunk_message`] with [`DEFAULT_MAX_LEN`].
pub fn split_message(text: &str) -> Vec<String> {
    chunk_message(text, DEFAULT_MAX_LEN)
}

struct PartBuilder {
    max_len: usize,
    parts: Vec<String>,
    current: String,
    current_len: usize,
    lines: usize,
    /// Current part holds nothing beyond a leading fence line.
    fresh: bool,
    /// Current part is only the fence reopened by the last split.
    synthetic: bool,
    /// Byte offset of a block opener that ends a non-empty part.
    dangling_opener: Option<usize>,
    state: FenceState,
}

impl PartBuilder {
    fn new(max_len: usize) -> Self {
        Self {
            max_len,
            parts: Vec::new(),
            current: String::new(),
            current_len: 0,
            lines: 0,
            fresh: true,
            synthetic: false,
            dangling_opener: None,
            state: FenceState::Prose,
        }
    }

    fn separator(&self) -> usize {
        usize::from(self.lines > 0)
    }

    fn add_line(&mut self, line: &str) {
        let fence = is_fence_line(line);
        let opens_block = fence && self.state == FenceState::Prose;
        // Reserve for the state the line leaves behind, so a part that just
        // opened a block can still be closed.
        let budget = self
            .max_len
            .saturating_sub(self.state.after(fence).reserve());

        let mut rest = line;
        let mut toggled = false;
        loop {
            let len = rest.chars().count();
            if self.current_len + self.separator() + len <= budget {
                self.push_line(rest, len, opens_block && !toggled);
                break;
            }
            if !self.fresh {
                match self.dangling_opener.take() {
                    Some(byte_at) => self.carry_opener(byte_at),
                    None => self.seal(),
                }
                continue;
            }

            let room = budget.saturating_sub(self.current_len + self.separator());
            if room == 0 {
                self.push_line(rest, len, false);
                break;
            }
            // A fence line being cut takes effect with its first piece, so the
            // seal below closes or reopens the block. The rest of its info
            // string continues as ordinary lines.
            if fence && !toggled {
                self.state = self.state.after(fence);
                toggled = true;
            }
            let cut = rest
                .char_indices()
                .nth(room)
                .map_or(rest.len(), |(idx, _)| idx);
            let (head, tail) = rest.split_at(cut);
            self.push_line(head, room, false);
            self.seal();
            rest = tail;
        }

        if !toggled {
            self.state = self.state.after(fence);
        }
    }

    fn push_line(&mut self, line: &str, len: usize, opens_block: bool) {
        let byte_at = self.current.len();
        let was_empty = self.lines == 0;

        if self.lines > 0 {
            self.current.push('\n');
            self.current_len += 1;
        }
        self.current.push_str(line);
        self.current_len += len;
        self.lines += 1;
        self.synthetic = false;
        self.dangling_opener = None;

        if opens_block && was_empty {
            self.fresh = true;
        } else if opens_block {
            self.fresh = false;
            self.dangling_opener = Some(byte_at);
        } else {
            self.fresh = false;
        }
    }

    /// Seal the part without its trailing block opener and start the next
    /// part with that opener, instead of emitting an empty block.
    fn carry_opener(&mut self, byte_at: usize) {
        let moved = self.current.split_off(byte_at);
        let opener = moved.strip_prefix('\n').unwrap_or(&moved).to_string();

        self.parts.push(std::mem::take(&mut self.current));
        self.current_len = opener.chars().count();
        self.current = opener;
        self.lines = 1;
        self.fresh = true;
        self.synthetic = false;
    }

    fn seal(&mut self) {
        if self.state == FenceState::Code {
            self.current.push('\n');
            self.current.push_str(FENCE);
        }
        self.parts.push(std::mem::take(&mut self.current));
        self.current_len = 0;
        self.lines = 0;
        self.dangling_opener = None;

        if self.state == FenceState::Code {
            self.current.push_str(FENCE);
            self.current_len = FENCE.len();
            self.lines = 1;
            self.synthetic = true;
        }
        self.fresh = true;
    }

    fn finish(mut self) -> Vec<String> {
        if self.lines > 0 && !self.synthetic {
            self.parts.push(self.current);
        }
        self.parts
    }
}
