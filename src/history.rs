//! Execution trace used in context representations.

use std::fmt;

/// Indented trace of the steps and substories one invocation went through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    indent: usize,
    lines: Vec<String>,
}

impl History {
    /// Create an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub(crate) fn before_call(&mut self, name: &str) {
        self.lines.push(format!("{}{name}", "  ".repeat(self.indent)));
    }

    pub(crate) fn on_result(&mut self, value: &str) {
        self.annotate(&format!(" (returned: {value})"));
    }

    pub(crate) fn on_failure(&mut self, reason: Option<&str>) {
        match reason {
            Some(reason) => self.annotate(&format!(" (failed: {reason})")),
            None => self.annotate(" (failed)"),
        }
    }

    /// The enclosing substory is left, so the indent goes back one level.
    pub(crate) fn on_skip(&mut self) {
        self.annotate(" (skipped)");
        self.indent = self.indent.saturating_sub(1);
    }

    pub(crate) fn on_error(&mut self, name: &str) {
        self.annotate(&format!(" (errored: {name})"));
    }

    pub(crate) fn on_substory_start(&mut self, label: &str) {
        self.before_call(label);
        self.indent += 1;
    }

    pub(crate) fn on_substory_end(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    fn annotate(&mut self, suffix: &str) {
        if let Some(last) = self.lines.last_mut() {
            last.push_str(suffix);
        }
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substories_are_indented() {
        let mut history = History::new();
        history.on_substory_start("Parent.y");
        history.before_call("start");
        history.on_substory_start("x (Simple.x)");
        history.before_call("one");
        history.before_call("two");
        history.on_failure(None);

        assert_eq!(
            history.to_string(),
            "Parent.y\n  start\n  x (Simple.x)\n    one\n    two (failed)"
        );
    }

    #[test]
    fn skip_leaves_substory() {
        let mut history = History::new();
        history.on_substory_start("A.a");
        history.on_substory_start("b");
        history.before_call("one");
        history.on_skip();
        history.before_call("after");
        history.before_call("last");
        history.on_result("1");

        assert_eq!(
            history.lines(),
            ["A.a", "  b", "    one (skipped)", "  after", "  last (returned: 1)"]
        );
    }

    #[test]
    fn error_annotates_last_line() {
        let mut history = History::new();
        history.before_call("one");
        history.on_error("ExpectedError");
        assert_eq!(history.to_string(), "one (errored: ExpectedError)");
    }
}
