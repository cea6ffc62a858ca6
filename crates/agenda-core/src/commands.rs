use std::io::{self, BufRead, Read, Write};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::{DataStore, parse_records};
use crate::groups::GroupDirectory;
use crate::model::{Event, Group};
use crate::ops::Op;
use crate::render::Renderer;
use crate::session::Session;
use crate::views::{events_by_actor, hours_by_actor};
use crate::visibility::Facet;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list",
        "items",
        "groups",
        "hours",
        "byactor",
        "session",
        "import",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();

    debug!(
        command,
        ops = ?inv.op_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    match command {
        "import" => return cmd_import(store, &inv.command_args, io::stdin().lock()),
        "_commands" => return cmd_commands(),
        "_show" => return cmd_show(cfg),
        "help" => return cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let mut session = load_session(store, cfg, now)?;
    let ops = parse_ops(&inv.op_terms, now)?;
    session.apply_all(&ops)?;

    let mut out = io::stdout().lock();
    match command {
        "session" => run_session(&mut session, cfg, renderer, io::stdin().lock(), &mut out, now),
        other => run_view(&session, renderer, other, &inv.command_args, &mut out),
    }
}

/// Loads both snapshots and seeds a session over the configured window.
#[instrument(skip(store, cfg, now))]
pub fn load_session(
    store: &DataStore,
    cfg: &Config,
    now: DateTime<Utc>,
) -> anyhow::Result<Session> {
    let events = store.load_events()?;
    let groups = store.load_groups()?;
    let window = cfg.default_window(now)?;
    info!(
        events = events.len(),
        groups = groups.len(),
        windowed = window.is_some(),
        "loaded snapshots"
    );
    Ok(Session::with_snapshots(
        events,
        GroupDirectory::from_groups(groups),
        window,
    ))
}

/// Parses every term before any is applied. Together with the rollback in
/// `Session::apply_all`, a bad batch leaves the session untouched.
pub fn parse_ops(terms: &[String], now: DateTime<Utc>) -> anyhow::Result<Vec<Op>> {
    terms
        .iter()
        .map(|term| Op::parse(term, now).with_context(|| format!("bad op term '{term}'")))
        .collect()
}

#[instrument(skip(session, renderer, args, out))]
fn run_view<W: Write>(
    session: &Session,
    renderer: &Renderer,
    command: &str,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        "list" => {
            let visible = session.visible_events();
            renderer.print_event_table(out, &visible, session.in_window_events().len())
        }
        "items" => {
            let facets = parse_facet_args(args)?;
            renderer.print_items(out, session, &facets)
        }
        "groups" => renderer.print_groups(out, session.groups()),
        "hours" => {
            let visible = session.visible_events();
            renderer.print_hours(out, &hours_by_actor(&visible, session.groups()))
        }
        "byactor" => {
            let visible = session.visible_events();
            renderer.print_by_actor(out, &events_by_actor(&visible, session.groups()))
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn parse_facet_args(args: &[String]) -> anyhow::Result<Vec<Facet>> {
    if args.is_empty() {
        return Ok(Facet::ALL.to_vec());
    }
    args.iter().map(|arg| arg.parse::<Facet>()).collect()
}

/// Line-oriented session: each line holds op terms and an optional view
/// command. A failing line is reported and the session carries on.
#[instrument(skip_all)]
pub fn run_session<R: BufRead, W: Write>(
    session: &mut Session,
    cfg: &Config,
    renderer: &Renderer,
    input: R,
    out: &mut W,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("session started");
    for line in input.lines() {
        let line = line.context("failed reading session input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if matches!(trimmed, "quit" | "exit") {
            break;
        }

        let tokens: Vec<String> = trimmed.split_whitespace().map(str::to_string).collect();
        let inv = Invocation::from_tokens(cfg, &tokens);
        if let Err(err) = run_session_line(session, renderer, &inv, out, now) {
            warn!(line = trimmed, error = %format!("{err:#}"), "session line failed");
            writeln!(out, "error: {err:#}")?;
        }
    }
    info!("session ended");
    Ok(())
}

fn run_session_line<W: Write>(
    session: &mut Session,
    renderer: &Renderer,
    inv: &Invocation,
    out: &mut W,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let ops = parse_ops(&inv.op_terms, now)?;
    session.apply_all(&ops)?;

    if !inv.explicit_command {
        let visible = session.visible_events().len();
        writeln!(out, "{visible} visible event(s)")?;
        return renderer.print_focus_line(out, session.store().focus());
    }

    match inv.command.as_str() {
        "session" | "import" | "_commands" | "_show" | "help" | "version" => Err(anyhow!(
            "command '{}' is not available inside a session",
            inv.command
        )),
        other => run_view(session, renderer, other, &inv.command_args, out),
    }
}

#[instrument(skip(store, args, input))]
fn cmd_import<R: Read>(store: &mut DataStore, args: &[String], mut input: R) -> anyhow::Result<()> {
    info!("command import");
    let kind = args
        .first()
        .map(|arg| arg.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("import: expected 'events' or 'groups'"))?;

    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .context("failed reading stdin")?;
    if raw.trim().is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    match kind.as_str() {
        "event" | "events" => {
            let events: Vec<Event> = parse_records(&raw)?;
            for event in events.iter().filter(|event| event.end < event.start) {
                warn!(id = event.id, "event ends before it starts; it will never be in a window");
            }
            store.save_events(&events)?;
            println!("Imported {} event(s).", events.len());
        }
        "group" | "groups" => {
            let groups: Vec<Group> = parse_records(&raw)?;
            store.save_groups(&groups)?;
            println!("Imported {} group(s).", groups.len());
        }
        other => return Err(anyhow!("import: unknown kind '{other}'")),
    }
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (key, value) in cfg.entries() {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: agenda [op terms..] [command] [args..]");
    println!();
    println!("op terms: hide|show|toggle|only:<actor|group|color>:<id>, unfocus,");
    println!("          all:<facet>:on|off, from:<date>, to:<date>");
    println!("commands: list, items [facet], groups, hours, byactor, session,");
    println!("          import events|groups, _commands, _show, help, version");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::{Duration, TimeZone, Utc};

    use super::{expand_command_abbrev, known_command_names, parse_ops, run_session};
    use crate::config::Config;
    use crate::groups::GroupDirectory;
    use crate::model::{Event, Group, Participant};
    use crate::render::Renderer;
    use crate::session::Session;
    use crate::visibility::Facet;

    fn session() -> Session {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut review = Event::new(1, start, start + Duration::hours(2));
        review.participants = vec![Participant::person("ana")];
        let mut sync = Event::new(2, start, start + Duration::hours(1));
        sync.participants = vec![Participant::group("ops")];
        let groups = GroupDirectory::from_groups(vec![Group::new(
            "ops",
            vec![Participant::person("ben")],
        )]);
        Session::with_snapshots(vec![review, sync], groups, None)
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("by", &known), Some("byactor"));
        assert_eq!(expand_command_abbrev("h", &known), None);
        assert_eq!(expand_command_abbrev("ho", &known), Some("hours"));
    }

    #[test]
    fn one_bad_term_rejects_the_batch() {
        let now = Utc::now();
        let terms = vec!["hide:actor:ana".to_string(), "hide:planet:x".to_string()];
        assert!(parse_ops(&terms, now).is_err());
    }

    #[test]
    fn session_survives_bad_lines_and_stops_on_quit() {
        let mut session = session();
        let cfg = Config::default();
        let renderer = Renderer::new(&cfg);
        let input = Cursor::new(
            "hide:actor:ana\nhide:weather:x\nonly:group:ops byactor\nquit\nunfocus\n",
        );
        let mut out = Vec::new();
        run_session(&mut session, &cfg, &renderer, input, &mut out, Utc::now()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 visible event(s)"));
        assert!(text.contains("error: bad op term 'hide:weather:x'"));
        assert!(text.contains("ben"));
        assert!(session.store().focus().is_target(Facet::Group, "ops"));
    }

    #[test]
    fn window_error_mid_line_keeps_earlier_terms_out() {
        let mut session = session();
        let cfg = Config::default();
        let renderer = Renderer::new(&cfg);
        let input = Cursor::new("hide:actor:ana to:2020-01-01 from:2021-01-01\n\n");
        let mut out = Vec::new();
        run_session(&mut session, &cfg, &renderer, input, &mut out, Utc::now()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("error:"));
        assert!(session.item_visible(Facet::Actor, "ana"));
        assert!(session.window().is_none());
        assert_eq!(session.visible_events().len(), 2);
    }

    #[test]
    fn session_refuses_nested_commands() {
        let mut session = session();
        let cfg = Config::default();
        let renderer = Renderer::new(&cfg);
        let mut out = Vec::new();
        run_session(
            &mut session,
            &cfg,
            &renderer,
            Cursor::new("import events\n"),
            &mut out,
            Utc::now(),
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("not available inside a session"));
    }
}
