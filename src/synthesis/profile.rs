//! Structured view over a generated ideal-customer-profile document.
//!
//! The completion service is asked for numbered sections such as
//! `1. Customer Snapshot:`. Text before the first heading is discarded.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IcpSection {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IcpProfile {
    pub sections: Vec<IcpSection>,
}

impl IcpProfile {
    pub fn parse(document: &str) -> Self {
        let mut sections = Vec::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in document.lines() {
            if let Some(title) = section_heading(line) {
                if let Some((title, body)) = current.take() {
                    sections.push(finish_section(title, &body));
                }
                current = Some((title, Vec::new()));
            } else if let Some((_, body)) = current.as_mut() {
                body.push(line);
            }
        }
        if let Some((title, body)) = current {
            sections.push(finish_section(title, &body));
        }

        Self { sections }
    }

    pub fn section(&self, title: &str) -> Option<&IcpSection> {
        self.sections
            .iter()
            .find(|s| s.title.eq_ignore_ascii_case(title))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Each body line loses its own indentation; blank lines at either end are dropped.
fn finish_section(title: String, body: &[&str]) -> IcpSection {
    let lines: Vec<&str> = body.iter().map(|line| line.trim()).collect();
    IcpSection {
        title,
        body: lines.join("\n").trim().to_string(),
    }
}

/// Recognise `N. Title:` headings, tolerating markdown emphasis and `#` prefixes.
fn section_heading(line: &str) -> Option<String> {
    let line = line.trim().trim_start_matches('#').trim();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    let title = rest
        .trim()
        .trim_matches('*')
        .trim()
        .strip_suffix(':')?
        .trim_matches('*')
        .trim();

    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}
