//! Conversation history with a sliding read window.
//!
//! The log itself is append-only and unbounded. Only the *read view* handed
//! to the provider is windowed: the preamble followed by the last `K`
//! messages, in append order.
//!
//! Appends made while a completion is in flight go through a [`Turn`], which
//! stages them on top of the log and only commits them once the turn
//! succeeds. Dropping an uncommitted turn leaves the log untouched.

use crate::message::Message;

/// Default number of history messages exposed to the provider.
pub const DEFAULT_BUFFER_SIZE: usize = 6;

/// Append-only message log with a windowed read-out.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    log: Vec<Message>,
    window: usize,
}

impl HistoryBuffer {
    /// Create an empty history that exposes at most `window` messages.
    pub fn new(window: usize) -> Self {
        Self {
            log: Vec::new(),
            window,
        }
    }

    /// Append a message to the end of the log.
    pub fn append(&mut self, message: Message) {
        self.log.push(message);
    }

    /// The full, unwindowed log.
    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// The configured window size `K`.
    pub fn window_size(&self) -> usize {
        self.window
    }

    /// The preamble followed by the last `min(K, len)` messages.
    pub fn windowed_view(&self, preamble: Message) -> Vec<Message> {
        window_of(preamble, &self.log, &[], self.window)
    }

    /// Start staging the appends of one orchestration invocation.
    pub fn begin_turn(&mut self) -> Turn<'_> {
        Turn {
            history: self,
            staged: Vec::new(),
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Appends of a single in-flight invocation, layered over the committed log.
#[derive(Debug)]
pub struct Turn<'a> {
    history: &'a mut HistoryBuffer,
    staged: Vec<Message>,
}

impl Turn<'_> {
    /// Stage a message. It becomes visible to [`Turn::windowed_view`] immediately.
    pub fn append(&mut self, message: Message) {
        self.staged.push(message);
    }

    /// Messages staged so far, in order.
    pub fn staged(&self) -> &[Message] {
        &self.staged
    }

    /// Same windowing as [`HistoryBuffer::windowed_view`], over log + staged.
    pub fn windowed_view(&self, preamble: Message) -> Vec<Message> {
        window_of(preamble, &self.history.log, &self.staged, self.history.window)
    }

    /// Move every staged message into the log. Returns how many were committed.
    pub fn commit(self) -> usize {
        let count = self.staged.len();
        self.history.log.extend(self.staged);
        count
    }
}

fn window_of(preamble: Message, log: &[Message], staged: &[Message], window: usize) -> Vec<Message> {
    let total = log.len() + staged.len();
    let skip = total.saturating_sub(window);
    std::iter::once(preamble)
        .chain(log.iter().chain(staged.iter()).skip(skip).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn filled(window: usize, n: usize) -> HistoryBuffer {
        let mut history = HistoryBuffer::new(window);
        for i in 0..n {
            history.append(Message::user(format!("m{i}")));
        }
        history
    }

    #[test]
    fn view_length_is_min_of_window_and_log_plus_preamble() {
        for window in 0..5 {
            for n in 0..8 {
                let view = filled(window, n).windowed_view(Message::system("p"));
                assert_eq!(view.len(), window.min(n) + 1, "window={window} n={n}");
            }
        }
    }

    #[test]
    fn view_preserves_append_order() {
        let view = filled(3, 6).windowed_view(Message::system("p"));
        let contents: Vec<_> = view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["p", "m3", "m4", "m5"]);
    }

    #[test]
    fn window_of_two_over_five_turns() {
        let mut history = HistoryBuffer::new(2);
        for i in 0..5 {
            history.append(Message::user(format!("q{i}")));
            history.append(Message::assistant(format!("a{i}")));
        }
        let view = history.windowed_view(Message::system("preamble"));
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].role, Role::System);
        assert_eq!(view[1].content, "q4");
        assert_eq!(view[2].content, "a4");
        // The log itself keeps everything.
        assert_eq!(history.len(), 10);
    }

    #[test]
    fn preamble_is_not_stored() {
        let history = filled(6, 2);
        let _ = history.windowed_view(Message::system("p"));
        assert_eq!(history.len(), 2);
        assert!(history.messages().iter().all(|m| m.role == Role::User));
    }

    #[test]
    fn turn_view_includes_staged_messages() {
        let mut history = filled(3, 3);
        let mut turn = history.begin_turn();
        turn.append(Message::user("new"));
        let view = turn.windowed_view(Message::system("p"));
        let contents: Vec<_> = view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["p", "m1", "m2", "new"]);
    }

    #[test]
    fn committed_turn_extends_log() {
        let mut history = filled(6, 1);
        let mut turn = history.begin_turn();
        turn.append(Message::user("q"));
        turn.append(Message::assistant("a"));
        assert_eq!(turn.commit(), 2);
        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[2].content, "a");
    }

    #[test]
    fn dropped_turn_leaves_log_untouched() {
        let mut history = filled(6, 2);
        {
            let mut turn = history.begin_turn();
            turn.append(Message::user("discarded"));
        }
        assert_eq!(history.len(), 2);
    }
}
