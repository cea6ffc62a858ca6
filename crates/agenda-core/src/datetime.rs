use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Months,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use tracing::{
  debug,
  info,
  warn
};

pub const TIMEZONE_ENV_VAR: &str =
  "AGENDA_TIMEZONE";

static PROJECT_TZ: OnceLock<Tz> =
  OnceLock::new();

/// Fixes the zone used to read date expressions and print event times.
/// `AGENDA_TIMEZONE` beats the rc `timezone` key; with neither the zone is
/// UTC. The first call wins for the life of the process.
#[tracing::instrument]
pub fn init_project_timezone(
  configured: Option<&str>
) -> anyhow::Result<Tz> {
  let from_env =
    std::env::var(TIMEZONE_ENV_VAR)
      .ok()
      .filter(|v| !v.trim().is_empty());
  let requested = match (
    from_env.as_deref(),
    configured
      .filter(|v| !v.trim().is_empty())
  ) {
    | (Some(name), _) => {
      Some((TIMEZONE_ENV_VAR, name))
    }
    | (None, Some(name)) => {
      Some(("rc timezone", name))
    }
    | (None, None) => None
  };

  let tz = match requested {
    | Some((source, name)) => {
      name.trim().parse::<Tz>().map_err(
        |err| {
          anyhow!(
            "invalid timezone '{name}' \
             from {source}: {err}"
          )
        }
      )?
    }
    | None => {
      debug!(
        "no timezone configured; using \
         UTC"
      );
      Tz::UTC
    }
  };

  let active =
    *PROJECT_TZ.get_or_init(|| tz);
  if active != tz {
    warn!(
      requested = %tz,
      active = %active,
      "project timezone already fixed"
    );
  } else {
    info!(timezone = %active, "project timezone");
  }
  Ok(active)
}

pub fn project_timezone() -> Tz {
  PROJECT_TZ
    .get()
    .copied()
    .unwrap_or(Tz::UTC)
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(&project_timezone())
    .date_naive()
}

#[must_use]
pub fn format_project_datetime(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(&project_timezone())
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

/// Wall-clock time in the project zone. A time repeated by a DST fall-back
/// takes the earlier instant; one skipped by spring-forward is an error.
fn project_local_to_utc(
  local: NaiveDateTime
) -> anyhow::Result<DateTime<Utc>> {
  let tz = project_timezone();
  tz.from_local_datetime(&local)
    .earliest()
    .map(|dt| dt.with_timezone(&Utc))
    .ok_or_else(|| {
      anyhow!("{local} does not exist in {tz}")
    })
}

fn midnight(
  date: NaiveDate
) -> anyhow::Result<DateTime<Utc>> {
  project_local_to_utc(
    date.and_time(NaiveTime::MIN)
  )
}

fn start_of_week(
  date: NaiveDate
) -> NaiveDate {
  let back = i64::from(
    date
      .weekday()
      .num_days_from_monday()
  );
  date
    .checked_sub_signed(Duration::days(
      back
    ))
    .unwrap_or(date)
}

fn start_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

/// Calendar anchors that resolve to a local midnight.
fn anchor_date(
  word: &str,
  today: NaiveDate
) -> anyhow::Result<Option<NaiveDate>> {
  let date = match word {
    | "today" => today,
    | "tomorrow" => {
      today + Duration::days(1)
    }
    | "yesterday" => {
      today - Duration::days(1)
    }
    | "sow" => start_of_week(today),
    | "eow" => {
      start_of_week(today)
        + Duration::days(7)
    }
    | "som" => start_of_month(today),
    | "eom" => {
      start_of_month(today)
        .checked_add_months(Months::new(1))
        .ok_or_else(|| {
          anyhow!("no month after {today}")
        })?
    }
    | other => {
      match parse_weekday_name(other) {
        | Some(day) => {
          next_weekday_date(today, day)
        }
        | None => return Ok(None)
      }
    }
  };
  Ok(Some(date))
}

/// `+3d`, `-2w`, `+12h` relative to `now`.
fn relative_offset(
  word: &str,
  now: DateTime<Utc>
) -> anyhow::Result<Option<DateTime<Utc>>>
{
  let re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dwh])$"
  )
  .context("relative offset pattern")?;
  let Some(caps) = re.captures(word)
  else {
    return Ok(None);
  };

  let num: i64 = caps["num"]
    .parse()
    .context("invalid relative number")?;
  let step = match &caps["unit"] {
    | "d" => Duration::days(num),
    | "w" => Duration::weeks(num),
    | _ => Duration::hours(num)
  };
  Ok(Some(if &caps["sign"] == "-" {
    now - step
  } else {
    now + step
  }))
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  if lower == "now" {
    return Ok(now);
  }
  if let Some(date) = anchor_date(
    &lower,
    to_project_date(now)
  )? {
    return midnight(date);
  }
  if let Some(at) =
    relative_offset(&lower, now)?
  {
    return Ok(at);
  }
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return midnight(date);
  }
  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(local) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return project_local_to_utc(local);
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .context(
    "expected now, today, tomorrow, \
     yesterday, sow, eow, som, eom, a \
     weekday, +Nd/+Nw/+Nh, RFC 3339, \
     YYYY-MM-DD or YYYY-MM-DD HH:MM"
  )
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = i64::from(
    from.weekday().num_days_from_monday()
  );
  let target_idx = i64::from(
    target.num_days_from_monday()
  );
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

/// The calendar's visible range. Overlap is half-open: an event touching
/// the window only at an edge is outside it.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct DateWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>
}

impl DateWindow {
  pub fn new(
    start: DateTime<Utc>,
    end: DateTime<Utc>
  ) -> Self {
    Self {
      start,
      end
    }
  }

  #[tracing::instrument(skip(now))]
  pub fn parse(
    from: &str,
    to: &str,
    now: DateTime<Utc>
  ) -> anyhow::Result<Self> {
    let start = parse_date_expr(from, now)
      .with_context(|| {
        format!(
          "invalid window start: {from}"
        )
      })?;
    let end = parse_date_expr(to, now)
      .with_context(|| {
        format!(
          "invalid window end: {to}"
        )
      })?;
    if end <= start {
      return Err(anyhow!(
        "window end {end} must be \
         after start {start}"
      ));
    }
    Ok(Self::new(start, end))
  }

  pub fn overlaps(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>
  ) -> bool {
    start < self.end && end > self.start
  }

  #[must_use]
  pub fn with_start(
    self,
    start: DateTime<Utc>
  ) -> Self {
    Self {
      start,
      ..self
    }
  }

  #[must_use]
  pub fn with_end(
    self,
    end: DateTime<Utc>
  ) -> Self {
    Self {
      end,
      ..self
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    DateWindow,
    TIMEZONE_ENV_VAR,
    init_project_timezone,
    parse_date_expr,
    to_project_date
  };

  fn now() -> chrono::DateTime<Utc> {
    // a Tuesday
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn date_of(expr: &str) -> String {
    to_project_date(
      parse_date_expr(expr, now())
        .expect("parse"),
    )
    .format("%Y-%m-%d")
    .to_string()
  }

  #[test]
  fn parses_named_days() {
    assert_eq!(date_of("today"), "2026-02-17");
    assert_eq!(date_of("tomorrow"), "2026-02-18");
    assert_eq!(date_of("wednesday"), "2026-02-18");
    assert_eq!(date_of("tuesday"), "2026-02-24");
  }

  #[test]
  fn parses_week_and_month_anchors() {
    assert_eq!(date_of("sow"), "2026-02-16");
    assert_eq!(date_of("eow"), "2026-02-23");
    assert_eq!(date_of("som"), "2026-02-01");
    assert_eq!(date_of("eom"), "2026-03-01");
  }

  #[test]
  fn parses_relative_offsets() {
    let parsed = parse_date_expr("+2w", now())
      .expect("relative");
    assert_eq!(parsed, now() + Duration::weeks(2));
    let parsed = parse_date_expr("-3h", now())
      .expect("relative");
    assert_eq!(parsed, now() - Duration::hours(3));
  }

  #[test]
  fn unknown_timezone_is_an_error() {
    if std::env::var(TIMEZONE_ENV_VAR)
      .is_ok()
    {
      return;
    }
    let err = init_project_timezone(
      Some("Mars/Olympus_Mons")
    )
    .expect_err("bad zone");
    assert!(
      err
        .to_string()
        .contains("Mars/Olympus_Mons")
    );
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_date_expr("someday", now())
        .is_err()
    );
  }

  #[test]
  fn window_requires_increasing_bounds()
  {
    assert!(
      DateWindow::parse("today", "yesterday", now())
        .is_err()
    );
    let window = DateWindow::parse(
      "2026-03-01T00:00:00Z",
      "2026-04-01T00:00:00Z",
      now()
    )
    .expect("window");
    let edge = window.start;
    assert!(!window.overlaps(
      edge - Duration::hours(1),
      edge
    ));
    assert!(window.overlaps(
      edge - Duration::hours(1),
      edge + Duration::minutes(1)
    ));
  }
}
