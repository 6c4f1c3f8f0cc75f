//! Monitoring snapshot
//!
//! A read-only view of the published process state plus the tail of the
//! log file, rendered as a small HTML page. Passwords never reach the page.

use std::fmt::Write as _;

use crate::state::ProcessState;

/// Number of trailing log lines shown
pub const LOG_TAIL_LINES: usize = 50;

const REDACTED: &str = "********";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDocument {
    pub base_folder: String,
    pub usernames: Vec<String>,
    pub port_range: String,
    pub log_tail: Vec<String>,
}

impl SnapshotDocument {
    /// Capture the state; a missing log renders as an empty tail
    pub fn render(state: &ProcessState, log_content: Option<&str>) -> Self {
        let secrets: Vec<&str> = state
            .users()
            .iter()
            .map(|u| u.password.as_str())
            .filter(|p| !p.is_empty())
            .collect();

        let lines: Vec<&str> = log_content.unwrap_or_default().lines().collect();
        let start = lines.len().saturating_sub(LOG_TAIL_LINES);
        let log_tail = lines[start..]
            .iter()
            .map(|line| scrub(line, &secrets))
            .collect();

        Self {
            base_folder: state.base_folder().display().to_string(),
            usernames: state.usernames().map(str::to_string).collect(),
            port_range: state.port_range().to_string(),
            log_tail,
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>RAX FTP Server</title></head>\n<body>\n<h1>RAX FTP Server</h1>\n",
        );

        let _ = writeln!(
            html,
            "<p><strong>Base folder:</strong> {}</p>",
            escape_html(&self.base_folder)
        );
        let _ = writeln!(
            html,
            "<p><strong>Passive ports:</strong> {}</p>",
            escape_html(&self.port_range)
        );
        let _ = writeln!(
            html,
            "<h2>Users ({})</h2>\n<ul>",
            self.usernames.len()
        );
        for name in &self.usernames {
            let _ = writeln!(html, "<li>{}</li>", escape_html(name));
        }
        html.push_str("</ul>\n<h2>Recent log</h2>\n<pre>");
        for line in &self.log_tail {
            html.push_str(&escape_html(line));
            html.push('\n');
        }
        html.push_str("</pre>\n</body>\n</html>\n");
        html
    }
}

/// Mask each password where it stands as a whole token.
///
/// A match must not touch a letter or digit on either side, so a short
/// password such as `ab` leaves words like `cabin` alone. A password that
/// was logged glued to other alphanumerics is not masked.
fn scrub(line: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .fold(line.to_string(), |acc, secret| mask_token(&acc, secret))
}

fn mask_token(line: &str, secret: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find(secret) {
        let end = pos + secret.len();
        let before = rest[..pos].chars().next_back().or_else(|| out.chars().next_back());
        let after = rest[end..].chars().next();
        let bounded = !before.is_some_and(char::is_alphanumeric)
            && !after.is_some_and(char::is_alphanumeric);

        if bounded {
            out.push_str(&rest[..pos]);
            out.push_str(REDACTED);
            rest = &rest[end..];
        } else {
            // Step past one character and keep looking
            let step = rest[pos..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&rest[..pos + step]);
            rest = &rest[pos + step..];
        }
    }
    out.push_str(rest);
    out
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserCredential;
    use crate::config::{ServerConfig, Settings};
    use std::path::PathBuf;

    fn state() -> std::sync::Arc<ProcessState> {
        let config = ServerConfig::new(
            2121,
            false,
            vec![
                UserCredential::new("alice", "s3cret-pw"),
                UserCredential::new("<bob>", "hunter2"),
            ],
            PathBuf::from("/srv/ftp"),
            false,
            &Settings::default(),
        );
        ProcessState::publish(&config).unwrap()
    }

    #[test]
    fn lists_users_without_passwords() {
        let doc = SnapshotDocument::render(&state(), None);
        let html = doc.to_html();

        assert_eq!(doc.usernames, vec!["alice", "<bob>"]);
        assert!(html.contains("<li>alice</li>"));
        assert!(html.contains("&lt;bob&gt;"));
        assert!(html.contains("50000-50100"));
        assert!(!html.contains("s3cret-pw"));
        assert!(!html.contains("hunter2"));
    }

    #[test]
    fn keeps_only_the_last_fifty_log_lines() {
        let log: String = (1..=80).map(|i| format!("line {}\n", i)).collect();
        let doc = SnapshotDocument::render(&state(), Some(&log));

        assert_eq!(doc.log_tail.len(), LOG_TAIL_LINES);
        assert_eq!(doc.log_tail.first().unwrap(), "line 31");
        assert_eq!(doc.log_tail.last().unwrap(), "line 80");
    }

    #[test]
    fn scrubs_passwords_from_the_log_tail() {
        let log = "2026-01-01 10:00:00 - INFO - oops: alice used s3cret-pw\n";
        let doc = SnapshotDocument::render(&state(), Some(log));

        assert_eq!(doc.log_tail, vec!["2026-01-01 10:00:00 - INFO - oops: alice used ********"]);
    }

    #[test]
    fn short_passwords_only_mask_whole_tokens() {
        let config = ServerConfig::new(
            2121,
            false,
            vec![UserCredential::new("carol", "ab")],
            PathBuf::from("/srv/ftp"),
            false,
            &Settings::default(),
        );
        let state = ProcessState::publish(&config).unwrap();
        let log = "carol stored cabin.txt, password=ab, then ab\n";
        let doc = SnapshotDocument::render(&state, Some(log));

        assert_eq!(
            doc.log_tail,
            vec!["carol stored cabin.txt, password=********, then ********"]
        );
    }

    #[test]
    fn log_lines_are_escaped() {
        let doc = SnapshotDocument::render(&state(), Some("<script>alert(1)</script>"));
        let html = doc.to_html();

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
