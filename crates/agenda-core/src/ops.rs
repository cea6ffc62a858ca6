use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};

use crate::datetime::parse_date_expr;
use crate::visibility::Facet;

/// A single visibility or window change, as typed on the command line or in
/// an interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
  Show(Facet, String),
  Hide(Facet, String),
  Toggle(Facet, String),
  Focus(Facet, String),
  Unfocus,
  All(Facet, bool),
  From(DateTime<Utc>),
  To(DateTime<Utc>)
}

const ITEM_PREFIXES: [&str; 5] =
  ["show", "hide", "toggle", "only", "focus"];

/// True when the term is meant as an op, even if it turns out malformed.
pub fn looks_like_op(term: &str) -> bool {
  let lower = term.to_ascii_lowercase();
  if lower == "unfocus" {
    return true;
  }
  let Some((head, _)) =
    lower.split_once(':')
  else {
    return false;
  };
  ITEM_PREFIXES.contains(&head)
    || matches!(head, "all" | "from" | "to")
}

impl Op {
  #[tracing::instrument(skip(now))]
  pub fn parse(
    term: &str,
    now: DateTime<Utc>
  ) -> anyhow::Result<Self> {
    let term = term.trim();
    if term.eq_ignore_ascii_case("unfocus")
    {
      return Ok(Op::Unfocus);
    }

    let (head, rest) = term
      .split_once(':')
      .ok_or_else(|| {
        anyhow!(
          "expected <op>:<facet>:<id>, \
           got: {term}"
        )
      })?;
    let head = head.to_ascii_lowercase();

    match head.as_str() {
      | "from" => {
        return Ok(Op::From(
          parse_date_expr(rest, now)?
        ));
      }
      | "to" => {
        return Ok(Op::To(
          parse_date_expr(rest, now)?
        ));
      }
      | _ => {}
    }

    let (facet, value) = rest
      .split_once(':')
      .ok_or_else(|| {
        anyhow!(
          "missing id in op term: \
           {term}"
        )
      })?;
    let facet: Facet = facet.parse()?;
    if value.trim().is_empty() {
      return Err(anyhow!(
        "empty id in op term: {term}"
      ));
    }
    let id = value.to_string();

    match head.as_str() {
      | "show" => Ok(Op::Show(facet, id)),
      | "hide" => Ok(Op::Hide(facet, id)),
      | "toggle" => {
        Ok(Op::Toggle(facet, id))
      }
      | "only" | "focus" => {
        Ok(Op::Focus(facet, id))
      }
      | "all" => {
        let on = match value
          .trim()
          .to_ascii_lowercase()
          .as_str()
        {
          | "on" | "show" | "yes"
          | "true" | "1" => true,
          | "off" | "hide" | "no"
          | "false" | "0" => false,
          | other => {
            return Err(anyhow!(
              "expected on/off for \
               all:{facet}, got: {other}"
            ));
          }
        };
        Ok(Op::All(facet, on))
      }
      | other => Err(anyhow!(
        "unknown op '{other}' in term: \
         {term}"
      ))
    }
  }
}
