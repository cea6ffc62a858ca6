use std::collections::{
  BTreeMap,
  BTreeSet
};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  trace
};

use crate::filter::ReferencedItems;
use crate::focus::{
  self,
  Focus,
  FocusTarget,
  FocusTransition
};
use crate::model::is_blank;

/// One of the three independent visibility dimensions.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
  Actor,
  Group,
  Color
}

impl Facet {
  pub const ALL: [Facet; 3] = [
    Facet::Actor,
    Facet::Group,
    Facet::Color
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | Facet::Actor => "actor",
      | Facet::Group => "group",
      | Facet::Color => "color"
    }
  }
}

impl fmt::Display for Facet {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Facet {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "actor" | "actors"
      | "person" | "people" => {
        Ok(Facet::Actor)
      }
      | "group" | "groups" => {
        Ok(Facet::Group)
      }
      | "color" | "colors"
      | "colour" | "colours" => {
        Ok(Facet::Color)
      }
      | other => Err(anyhow!(
        "unknown facet '{other}' \
         (expected actor, group or \
         color)"
      ))
    }
  }
}

/// Sparse id -> visible mapping. A missing key means visible.
pub type VisibilityMap =
  BTreeMap<String, bool>;

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct VisibilitySnapshot {
  #[serde(default)]
  pub actors: VisibilityMap,
  #[serde(default)]
  pub groups: VisibilityMap,
  #[serde(default)]
  pub colors: VisibilityMap
}

impl VisibilitySnapshot {
  pub fn facet(
    &self,
    facet: Facet
  ) -> &VisibilityMap {
    match facet {
      | Facet::Actor => &self.actors,
      | Facet::Group => &self.groups,
      | Facet::Color => &self.colors
    }
  }

  pub fn facet_mut(
    &mut self,
    facet: Facet
  ) -> &mut VisibilityMap {
    match facet {
      | Facet::Actor => {
        &mut self.actors
      }
      | Facet::Group => {
        &mut self.groups
      }
      | Facet::Color => {
        &mut self.colors
      }
    }
  }

  pub fn is_visible(
    &self,
    facet: Facet,
    id: &str
  ) -> bool {
    self
      .facet(facet)
      .get(id)
      .copied()
      .unwrap_or(true)
  }

  pub(crate) fn reseed(
    &mut self,
    actor_ids: &BTreeSet<String>,
    group_ids: &BTreeSet<String>,
    color_ids: &BTreeSet<String>
  ) {
    reseed_map(
      &mut self.actors,
      actor_ids
    );
    reseed_map(
      &mut self.groups,
      group_ids
    );
    reseed_map(
      &mut self.colors,
      color_ids
    );
  }
}

/// The whole filtering configuration: the three facet mappings plus focus.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct VisibilityState {
  #[serde(flatten)]
  pub flags: VisibilitySnapshot,
  #[serde(default)]
  pub focus: Focus
}

impl VisibilityState {
  pub fn mapping(
    &self,
    facet: Facet
  ) -> &VisibilityMap {
    self.flags.facet(facet)
  }

  pub fn is_visible(
    &self,
    facet: Facet,
    id: &str
  ) -> bool {
    self.flags.is_visible(facet, id)
  }

  pub fn focus(&self) -> &Focus {
    &self.focus
  }
}

/// Owner of the session's [`VisibilityState`]; every mutation goes through
/// one of its methods.
#[derive(Debug, Clone, Default)]
pub struct VisibilityStore {
  state:    VisibilityState,
  revision: u64
}

impl VisibilityStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(
    &self
  ) -> &VisibilityState {
    &self.state
  }

  pub fn mapping(
    &self,
    facet: Facet
  ) -> &VisibilityMap {
    self.state.mapping(facet)
  }

  pub fn is_visible(
    &self,
    facet: Facet,
    id: &str
  ) -> bool {
    self.state.is_visible(facet, id)
  }

  pub fn focus(&self) -> &Focus {
    &self.state.focus
  }

  /// Bumped on every mutation; callers use it as a memoization key.
  pub fn revision(&self) -> u64 {
    self.revision
  }

  #[tracing::instrument(
    skip_all,
    fields(
      actors = actor_ids.len(),
      groups = group_ids.len(),
      colors = color_ids.len()
    )
  )]
  pub fn seed_from_events(
    &mut self,
    actor_ids: &BTreeSet<String>,
    group_ids: &BTreeSet<String>,
    color_ids: &BTreeSet<String>
  ) -> FocusTransition {
    self.state.flags.reseed(
      actor_ids, group_ids, color_ids
    );
    self.revision += 1;

    let ids_for = |facet: Facet| {
      match facet {
        | Facet::Actor => actor_ids,
        | Facet::Group => group_ids,
        | Facet::Color => color_ids
      }
    };

    let still_present = match &self
      .state
      .focus
    {
      | Focus::Inactive => {
        return FocusTransition::Unchanged;
      }
      | Focus::Active {
        target,
        ..
      } => {
        ids_for(target.facet)
          .contains(&target.id)
      }
    };

    if still_present {
      if let Focus::Active {
        saved,
        ..
      } = &mut self.state.focus
      {
        saved.reseed(
          actor_ids, group_ids,
          color_ids
        );
      }
      debug!(
        "focus target still \
         referenced after reseed"
      );
      FocusTransition::Unchanged
    } else {
      let transition = focus::force_exit(
        &mut self.state.focus
      );
      info!(
        ?transition,
        "focus target no longer \
         referenced; focus dropped"
      );
      transition
    }
  }

  pub fn reseed(
    &mut self,
    items: &ReferencedItems
  ) -> FocusTransition {
    self.seed_from_events(
      &items.actor_ids,
      &items.group_ids,
      &items.color_ids
    )
  }

  #[tracing::instrument(skip(self))]
  pub fn toggle_visibility(
    &mut self,
    facet: Facet,
    id: &str
  ) {
    if is_blank(id) {
      debug!(
        "ignoring toggle for blank id"
      );
      return;
    }
    let next =
      !self.state.is_visible(facet, id);
    self
      .state
      .flags
      .facet_mut(facet)
      .insert(id.to_string(), next);
    self.revision += 1;
    trace!(visible = next, "toggled");
  }

  #[tracing::instrument(skip(self))]
  pub fn set_visibility(
    &mut self,
    facet: Facet,
    id: &str,
    value: bool
  ) {
    if is_blank(id) {
      debug!(
        "ignoring set for blank id"
      );
      return;
    }
    self
      .state
      .flags
      .facet_mut(facet)
      .insert(id.to_string(), value);
    self.revision += 1;
  }

  /// Bulk select/deselect over every id currently known to the facet.
  #[tracing::instrument(skip(self))]
  pub fn set_all(
    &mut self,
    facet: Facet,
    value: bool
  ) {
    let map =
      self.state.flags.facet_mut(facet);
    for flag in map.values_mut() {
      *flag = value;
    }
    debug!(
      count = map.len(),
      "bulk visibility update"
    );
    self.revision += 1;
  }

  /// Focus on `id`; focusing the current target again leaves focus mode.
  #[tracing::instrument(skip(self))]
  pub fn focus_on(
    &mut self,
    facet: Facet,
    id: &str
  ) -> FocusTransition {
    if is_blank(id) {
      debug!(
        "ignoring focus on blank id"
      );
      return FocusTransition::Unchanged;
    }
    let transition = focus::focus_on(
      &mut self.state.focus,
      &mut self.state.flags,
      FocusTarget::new(facet, id)
    );
    self.revision += 1;
    info!(?transition, "focus changed");
    transition
  }

  #[tracing::instrument(skip(self))]
  pub fn exit_focus(
    &mut self
  ) -> FocusTransition {
    let transition = focus::exit(
      &mut self.state.focus,
      &mut self.state.flags
    );
    if transition
      != FocusTransition::Unchanged
    {
      self.revision += 1;
      info!(
        ?transition,
        "focus exited"
      );
    }
    transition
  }
}

fn reseed_map(
  map: &mut VisibilityMap,
  ids: &BTreeSet<String>
) {
  let previous = std::mem::take(map);
  *map = ids
    .iter()
    .filter(|id| !is_blank(id))
    .map(|id| {
      let visible = previous
        .get(id)
        .copied()
        .unwrap_or(true);
      (id.clone(), visible)
    })
    .collect();
}
