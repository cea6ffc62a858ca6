use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::datetime::{DateWindow, parse_date_expr};

const RC_ENV_VAR: &str = "AGENDARC";
const RC_FILE_NAME: &str = ".agendarc";

/// Settings from the agendarc, `--rc KEY=VALUE` and positional `rc.` terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_location: String,
    pub default_command: String,
    pub color: bool,
    pub window_from: Option<String>,
    pub window_to: Option<String>,
    pub timezone: Option<String>,
    /// Every rc file read, includes after the file that named them.
    pub sources: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_location: "~/.agenda".to_string(),
            default_command: "list".to_string(),
            color: true,
            window_from: None,
            window_to: None,
            timezone: None,
            sources: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RcLine<'a> {
    Blank,
    Include(&'a str),
    Setting(&'a str, &'a str),
}

fn parse_rc_line(raw: &str) -> anyhow::Result<RcLine<'_>> {
    let line = match raw.split_once(" #") {
        Some((before, _)) => before,
        None => raw,
    }
    .trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(RcLine::Blank);
    }
    if let Some(path) = line.strip_prefix("include ") {
        let path = path.trim();
        if path.is_empty() {
            return Err(anyhow!("include needs a path"));
        }
        return Ok(RcLine::Include(path));
    }
    let (key, value) = line
        .split_once('=')
        .ok_or_else(|| anyhow!("expected 'key = value' or 'include <path>'"))?;
    Ok(RcLine::Setting(key.trim(), value.trim()))
}

fn parse_switch(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("expected on or off, got '{other}'")),
    }
}

fn optional(value: &str) -> Option<String> {
    Some(value.to_string()).filter(|v| !v.is_empty())
}

impl Config {
    /// Defaults, then the agendarc if one is found.
    #[tracing::instrument]
    pub fn load(explicit_rc: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        match rc_location(explicit_rc) {
            Some(path) => {
                info!(agendarc = %path.display(), "loading agendarc");
                cfg.read_rc(&path)?;
            }
            None => debug!("no agendarc; using defaults"),
        }
        Ok(cfg)
    }

    /// Sets one key. A leading `rc.` is accepted so overrides can be passed
    /// through unchanged. Unknown keys are ignored with a warning.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let key = key.strip_prefix("rc.").unwrap_or(key);
        let value = value.trim();
        trace!(key, value, "config setting");
        match key {
            "data.location" => self.data_location = value.to_string(),
            "default.command" => self.default_command = value.to_string(),
            "color" => self.color = parse_switch(value).context("color")?,
            "window.from" => self.window_from = optional(value),
            "window.to" => self.window_to = optional(value),
            "timezone" => self.timezone = optional(value),
            other => warn!(key = other, "unknown config key ignored"),
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn apply_overrides<I>(&mut self, overrides: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in overrides {
            debug!(key = %key, value = %value, "applying override");
            self.set(&key, &value)
                .with_context(|| format!("bad override {key}={value}"))?;
        }
        Ok(())
    }

    /// Effective settings as `key=value` pairs, in key order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let on_off = if self.color { "on" } else { "off" };
        vec![
            ("color", on_off.to_string()),
            ("data.location", self.data_location.clone()),
            ("default.command", self.default_command.clone()),
            ("timezone", self.timezone.clone().unwrap_or_default()),
            ("window.from", self.window_from.clone().unwrap_or_default()),
            ("window.to", self.window_to.clone().unwrap_or_default()),
        ]
    }

    /// Window from `window.from` / `window.to`. Either bound alone is
    /// open-ended on the other side.
    #[tracing::instrument(skip(self, now))]
    pub fn default_window(&self, now: DateTime<Utc>) -> anyhow::Result<Option<DateWindow>> {
        if self.window_from.is_none() && self.window_to.is_none() {
            return Ok(None);
        }
        let bound = |expr: &Option<String>, key: &str, open: DateTime<Utc>| match expr {
            Some(expr) => parse_date_expr(expr, now).with_context(|| format!("invalid {key}")),
            None => Ok(open),
        };
        let start = bound(&self.window_from, "window.from", DateTime::<Utc>::MIN_UTC)?;
        let end = bound(&self.window_to, "window.to", DateTime::<Utc>::MAX_UTC)?;
        if end <= start {
            return Err(anyhow!("window.to must be after window.from"));
        }
        Ok(Some(DateWindow::new(start, end)))
    }

    fn read_rc(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.sources.iter().any(|seen| seen == path) {
            warn!(file = %path.display(), "agendarc included twice; skipping");
            return Ok(());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.sources.push(path.to_path_buf());

        for (idx, raw) in text.lines().enumerate() {
            let at = || format!("{}:{}", path.display(), idx + 1);
            match parse_rc_line(raw).with_context(at)? {
                RcLine::Blank => {}
                RcLine::Include(target) => {
                    let target = expand_home(target)?;
                    let target = match path.parent() {
                        Some(dir) if target.is_relative() => dir.join(target),
                        _ => target,
                    };
                    if target.exists() {
                        self.read_rc(&target)?;
                    } else {
                        warn!(include = %target.display(), "missing include skipped");
                    }
                }
                RcLine::Setting(key, value) => self.set(key, value).with_context(at)?,
            }
        }
        Ok(())
    }
}

/// `--agendarc`, then `$AGENDARC` (`/dev/null` turns the rc off), then
/// `~/.agendarc` when it exists.
fn rc_location(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(value) = std::env::var(RC_ENV_VAR) {
        return (value != "/dev/null").then(|| PathBuf::from(value));
    }
    dirs::home_dir()
        .map(|home| home.join(RC_FILE_NAME))
        .filter(|candidate| candidate.exists())
}

fn expand_home(raw: &str) -> anyhow::Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| anyhow!("cannot expand '{raw}': no home directory")),
        None => Ok(PathBuf::from(raw)),
    }
}

/// `--data` if given, else `data.location`. Created when missing.
#[tracing::instrument(skip(cfg))]
pub fn resolve_data_dir(cfg: &Config, explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match explicit {
        Some(path) => path.to_path_buf(),
        None => expand_home(&cfg.data_location)?,
    };
    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::{Config, RcLine, parse_rc_line, resolve_data_dir};

    #[test]
    fn rc_lines_strip_trailing_comments() {
        assert_eq!(parse_rc_line("  # note").unwrap(), RcLine::Blank);
        assert_eq!(
            parse_rc_line("window.from = sow # monday").unwrap(),
            RcLine::Setting("window.from", "sow")
        );
        assert_eq!(
            parse_rc_line("include ~/shared.rc").unwrap(),
            RcLine::Include("~/shared.rc")
        );
        assert!(parse_rc_line("include ").is_err());
        assert!(parse_rc_line("color off").is_err());
    }

    #[test]
    fn loads_rc_with_includes_and_comments() {
        let dir = tempdir().expect("tempdir");
        let extra = dir.path().join("extra.rc");
        fs::write(&extra, "color = off\ninclude agendarc\n").expect("write extra");
        let main = dir.path().join("agendarc");
        fs::write(
            &main,
            "# calendar defaults\n\
             default.command = items\n\
             window.from = 2026-03-01 # march\n\
             include extra.rc\n",
        )
        .expect("write main");

        let cfg = Config::load(Some(&main)).expect("load config");
        assert_eq!(cfg.default_command, "items");
        assert!(!cfg.color);
        assert_eq!(cfg.window_from.as_deref(), Some("2026-03-01"));
        assert_eq!(cfg.sources, vec![main, extra]);
    }

    #[test]
    fn bad_rc_value_names_the_line() {
        let dir = tempdir().expect("tempdir");
        let rc = dir.path().join("agendarc");
        fs::write(&rc, "color = off\ncolor = purple\n").expect("write rc");
        let err = Config::load(Some(&rc)).expect_err("bad color");
        assert!(format!("{err:#}").contains("agendarc:2"));
    }

    #[test]
    fn overrides_strip_rc_prefix() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![(
            "rc.window.to".to_string(),
            "2026-04-01T00:00:00Z".to_string(),
        )])
        .expect("override");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let window = cfg.default_window(now).expect("window").expect("some window");
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
        assert!(Config::default().default_window(now).expect("no window").is_none());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut cfg = Config::default();
        cfg.set("window.from", "2026-04-01").expect("from");
        cfg.set("window.to", "2026-03-01").expect("to");
        assert!(cfg.default_window(Utc::now()).is_err());
    }

    #[test]
    fn data_dir_is_created() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("nested").join("agenda");
        let mut cfg = Config::default();
        cfg.set("data.location", &target.to_string_lossy()).expect("set");
        let resolved = resolve_data_dir(&cfg, None).expect("resolve");
        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }
}
