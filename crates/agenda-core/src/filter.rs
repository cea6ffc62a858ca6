use std::collections::{
  BTreeMap,
  BTreeSet
};

use tracing::{
  debug,
  trace
};

use crate::datetime::DateWindow;
use crate::focus::FocusTarget;
use crate::groups::GroupDirectory;
use crate::model::{
  Event,
  Participant,
  is_blank
};
use crate::visibility::{
  Facet,
  VisibilityState
};

/// Distinct items referenced by a set of events.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ReferencedItems {
  pub actor_ids: BTreeSet<String>,
  pub group_ids: BTreeSet<String>,
  pub color_ids: BTreeSet<String>
}

impl ReferencedItems {
  pub fn ids(
    &self,
    facet: Facet
  ) -> &BTreeSet<String> {
    match facet {
      | Facet::Actor => &self.actor_ids,
      | Facet::Group => &self.group_ids,
      | Facet::Color => &self.color_ids
    }
  }

  pub fn contains(
    &self,
    facet: Facet,
    id: &str
  ) -> bool {
    self.ids(facet).contains(id)
  }

  pub fn is_empty(&self) -> bool {
    self.actor_ids.is_empty()
      && self.group_ids.is_empty()
      && self.color_ids.is_empty()
  }

  fn insert(
    &mut self,
    facet: Facet,
    id: &str
  ) {
    if is_blank(id) {
      return;
    }
    let set = match facet {
      | Facet::Actor => {
        &mut self.actor_ids
      }
      | Facet::Group => {
        &mut self.group_ids
      }
      | Facet::Color => {
        &mut self.color_ids
      }
    };
    if !set.contains(id) {
      set.insert(id.to_string());
    }
  }
}

/// Per-item count of in-window events referencing it.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FacetCounts {
  pub actors: BTreeMap<String, usize>,
  pub groups: BTreeMap<String, usize>,
  pub colors: BTreeMap<String, usize>
}

impl FacetCounts {
  pub fn facet(
    &self,
    facet: Facet
  ) -> &BTreeMap<String, usize> {
    match facet {
      | Facet::Actor => &self.actors,
      | Facet::Group => &self.groups,
      | Facet::Color => &self.colors
    }
  }

  pub fn count(
    &self,
    facet: Facet,
    id: &str
  ) -> usize {
    self
      .facet(facet)
      .get(id)
      .copied()
      .unwrap_or(0)
  }
}

pub fn in_window<'a>(
  events: &'a [Event],
  window: Option<&'a DateWindow>
) -> impl Iterator<Item = &'a Event> {
  events.iter().filter(move |event| {
    window.is_none_or(|w| {
      w.overlaps(event.start, event.end)
    })
  })
}

#[tracing::instrument(
  skip_all,
  fields(
    events = events.len(),
    windowed = window.is_some()
  )
)]
pub fn extract_referenced_items(
  events: &[Event],
  groups: &GroupDirectory,
  window: Option<&DateWindow>
) -> ReferencedItems {
  let mut items =
    ReferencedItems::default();
  for event in in_window(events, window)
  {
    collect_event_items(
      event, groups, &mut items
    );
  }

  debug!(
    actors = items.actor_ids.len(),
    groups = items.group_ids.len(),
    colors = items.color_ids.len(),
    "extracted referenced items"
  );
  items
}

#[tracing::instrument(
  skip_all,
  fields(events = events.len())
)]
pub fn facet_counts(
  events: &[Event],
  groups: &GroupDirectory,
  window: Option<&DateWindow>
) -> FacetCounts {
  let mut counts =
    FacetCounts::default();
  for event in in_window(events, window)
  {
    let mut items =
      ReferencedItems::default();
    collect_event_items(
      event, groups, &mut items
    );
    for (ids, out) in [
      (
        &items.actor_ids,
        &mut counts.actors
      ),
      (
        &items.group_ids,
        &mut counts.groups
      ),
      (
        &items.color_ids,
        &mut counts.colors
      )
    ] {
      for id in ids {
        *out
          .entry(id.clone())
          .or_insert(0_usize) += 1;
      }
    }
  }
  counts
}

fn collect_event_items(
  event: &Event,
  groups: &GroupDirectory,
  items: &mut ReferencedItems
) {
  for color in event.colors() {
    items.insert(Facet::Color, color);
  }

  for participant in &event.participants
  {
    match participant {
      | Participant::Person(id) => {
        items.insert(Facet::Actor, id);
      }
      | Participant::Group(id) => {
        items.insert(Facet::Group, id);
        for member in
          groups.direct_people(id)
        {
          items.insert(
            Facet::Actor,
            member
          );
        }
      }
    }
  }

  if let Some(presenter) =
    event.presenter.as_deref()
  {
    items.insert(
      Facet::Actor,
      presenter
    );
  }
}

pub fn is_event_visible(
  event: &Event,
  state: &VisibilityState,
  groups: &GroupDirectory
) -> bool {
  if let Some(target) =
    state.focus.target()
  {
    let ok =
      references_target(event, target);
    trace!(
      id = event.id,
      facet = %target.facet,
      target = %target.id,
      ok,
      "focus visibility"
    );
    return ok;
  }

  let color_ok =
    event.colors().all(|color| {
      state
        .is_visible(Facet::Color, color)
    });
  if !color_ok {
    trace!(
      id = event.id,
      "hidden by color"
    );
    return false;
  }

  if !event.participants.is_empty()
    && !participants_visible(
      event, state, groups
    )
  {
    trace!(
      id = event.id,
      "hidden by participants"
    );
    return false;
  }

  if let Some(presenter) = event
    .presenter
    .as_deref()
    .filter(|p| !is_blank(p))
    && !state
      .is_visible(Facet::Actor, presenter)
  {
    trace!(
      id = event.id,
      presenter,
      "hidden by presenter"
    );
    return false;
  }

  true
}

/// A visible direct person or a visible participant group lets the event
/// through. Members of a visible group ride on the group's flag; a member
/// reached only through a hidden group does not count.
fn participants_visible(
  event: &Event,
  state: &VisibilityState,
  groups: &GroupDirectory
) -> bool {
  event.participants.iter().any(
    |participant| match participant {
      | Participant::Person(id) => {
        state
          .is_visible(Facet::Actor, id)
      }
      | Participant::Group(id) => {
        let ok = state
          .is_visible(Facet::Group, id);
        trace!(
          id = event.id,
          group = %id,
          members = groups
            .direct_people(id)
            .count(),
          ok,
          "group participant"
        );
        ok
      }
    }
  )
}

fn references_target(
  event: &Event,
  target: &FocusTarget
) -> bool {
  let id = target.id.as_str();
  match target.facet {
    | Facet::Actor => {
      event.people().any(|p| p == id)
        || event.presenter.as_deref()
          == Some(id)
    }
    | Facet::Group => {
      event.groups().any(|g| g == id)
    }
    | Facet::Color => {
      event.has_color(id)
    }
  }
}

#[tracing::instrument(
  skip_all,
  fields(events = events.len())
)]
pub fn filter_events<'a>(
  events: &'a [Event],
  state: &VisibilityState,
  groups: &GroupDirectory
) -> Vec<&'a Event> {
  let out: Vec<&Event> = events
    .iter()
    .filter(|event| {
      is_event_visible(
        event, state, groups
      )
    })
    .collect();
  debug!(
    visible = out.len(),
    "filtered events"
  );
  out
}
