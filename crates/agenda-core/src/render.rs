use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use chrono::Duration;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_project_datetime;
use crate::focus::Focus;
use crate::groups::GroupDirectory;
use crate::model::{Event, Participant};
use crate::session::Session;
use crate::visibility::Facet;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color }
    }

    /// `in_window` is the number of events in the window before visibility
    /// filtering.
    #[tracing::instrument(skip(self, out, events), fields(count = events.len()))]
    pub fn print_event_table<W: Write>(
        &self,
        out: &mut W,
        events: &[&Event],
        in_window: usize,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Start".to_string(),
            "End".to_string(),
            "Title".to_string(),
            "Color".to_string(),
            "Participants".to_string(),
            "Presenter".to_string(),
        ];

        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let id = self.paint(&event.id.to_string(), "33");
            let colors = event.colors().collect::<Vec<_>>().join(" ");
            rows.push(vec![
                id,
                format_project_datetime(event.start),
                format_project_datetime(event.end),
                event.title.clone(),
                colors,
                format_participants(&event.participants),
                event.presenter.clone().unwrap_or_default(),
            ]);
        }

        write_table(&mut *out, headers, rows)?;
        writeln!(out, "{} of {in_window} event(s) shown", events.len())?;
        Ok(())
    }

    /// Toggle list for each facet: checkbox, id, in-window event count, and a
    /// marker on the focus target.
    #[tracing::instrument(skip(self, out, session))]
    pub fn print_items<W: Write>(
        &self,
        out: &mut W,
        session: &Session,
        facets: &[Facet],
    ) -> anyhow::Result<()> {
        let items = session.referenced_items();
        let counts = session.counts();
        let focus = session.store().focus();

        for (idx, facet) in facets.iter().copied().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            writeln!(out, "{}", self.paint(facet_heading(facet), "1"))?;

            let headers = vec![
                " ".to_string(),
                "ID".to_string(),
                "Events".to_string(),
                " ".to_string(),
            ];
            let rows = items
                .ids(facet)
                .iter()
                .map(|id| {
                    let checkbox = if session.item_visible(facet, id) {
                        "[x]".to_string()
                    } else {
                        self.paint("[ ]", "2")
                    };
                    let marker = if focus.is_target(facet, id) {
                        self.paint("focus", "36")
                    } else {
                        String::new()
                    };
                    vec![checkbox, id.clone(), counts.count(facet, id).to_string(), marker]
                })
                .collect();
            write_table(&mut *out, headers, rows)?;
        }

        self.print_focus_line(out, focus)
    }

    pub fn print_focus_line<W: Write>(&self, out: &mut W, focus: &Focus) -> anyhow::Result<()> {
        match focus.target() {
            Some(target) => writeln!(
                out,
                "focus: {} {}",
                target.facet,
                self.paint(&target.id, "36")
            )?,
            None => writeln!(out, "focus: off")?,
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, groups), fields(count = groups.len()))]
    pub fn print_groups<W: Write>(&self, out: &mut W, groups: &GroupDirectory) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Members".to_string(),
            "Nested".to_string(),
            "People".to_string(),
        ];

        let rows = groups
            .iter()
            .map(|group| {
                let nested = groups
                    .nested_groups(&group.id)
                    .into_iter()
                    .map(|id| format!("@{id}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let people = groups
                    .resolve_people(&group.id)
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![
                    self.paint(&group.id, "33"),
                    group.name.clone(),
                    format_participants(&group.members),
                    nested,
                    people,
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn print_hours<W: Write>(
        &self,
        out: &mut W,
        hours: &BTreeMap<String, Duration>,
    ) -> anyhow::Result<()> {
        let headers = vec!["Actor".to_string(), "Hours".to_string()];
        let rows = hours
            .iter()
            .map(|(actor, total)| {
                let hours = total.num_minutes() as f64 / 60.0;
                vec![actor.clone(), format!("{hours:.2}")]
            })
            .collect();
        write_table(out, headers, rows)
    }

    pub fn print_by_actor<W: Write>(
        &self,
        out: &mut W,
        by_actor: &BTreeMap<String, Vec<u64>>,
    ) -> anyhow::Result<()> {
        let headers = vec!["Actor".to_string(), "Count".to_string(), "Events".to_string()];
        let rows = by_actor
            .iter()
            .map(|(actor, ids)| {
                let list = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(" ");
                vec![actor.clone(), ids.len().to_string(), list]
            })
            .collect();
        write_table(out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn facet_heading(facet: Facet) -> &'static str {
    match facet {
        Facet::Actor => "Actors",
        Facet::Group => "Groups",
        Facet::Color => "Colors",
    }
}

/// Persons as-is, groups prefixed with `@`.
fn format_participants(participants: &[Participant]) -> String {
    participants
        .iter()
        .map(|p| match p {
            Participant::Person(id) => id.clone(),
            Participant::Group(id) => format!("@{id}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:width$}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{}", header_line.trim_end())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in rows {
        let mut line = String::new();
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            if idx > 0 {
                line.push(' ');
            }
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            line.push_str(cell);
            line.push_str(&" ".repeat(widths[idx].saturating_sub(visible_width)));
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{Renderer, strip_ansi, write_table};
    use crate::config::Config;
    use crate::groups::GroupDirectory;
    use crate::model::{Group, Participant};

    #[test]
    fn groups_view_lists_nested_groups_and_people() {
        let groups = GroupDirectory::from_groups(vec![
            Group::new("staff", vec![Participant::person("ana"), Participant::group("nurses")]),
            Group::new("nurses", vec![Participant::person("ben"), Participant::group("night")]),
            Group::new("night", vec![Participant::person("cy")]),
        ]);
        let mut cfg = Config::default();
        cfg.color = false;
        let mut buf = Vec::new();
        Renderer::new(&cfg).print_groups(&mut buf, &groups).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let staff = text.lines().find(|l| l.starts_with("staff")).unwrap();
        assert!(staff.contains("@night, @nurses"), "{staff}");
        assert!(staff.ends_with("ana, ben, cy"), "{staff}");
        let night = text.lines().find(|l| l.starts_with("night")).unwrap();
        assert!(night.ends_with("cy"), "{night}");
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[33m7\x1b[0m".to_string(), "Réunion".to_string()],
                vec!["12".to_string(), "Sync".to_string()],
            ],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();
        assert_eq!(lines[0], "ID Title");
        assert_eq!(lines[1], "-- -------");
        assert_eq!(strip_ansi(lines[2]), "7  Réunion");
        assert_eq!(lines[3], "12 Sync");
    }
}
