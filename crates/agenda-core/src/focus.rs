use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::visibility::{
  Facet,
  VisibilitySnapshot
};

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
pub struct FocusTarget {
  pub facet: Facet,
  pub id:    String
}

impl FocusTarget {
  pub fn new(
    facet: Facet,
    id: impl Into<String>
  ) -> Self {
    Self {
      facet,
      id: id.into()
    }
  }
}

/// Focus mode. `saved` holds the three mappings as they were before focus
/// was first entered, and survives retargeting.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(
  tag = "state",
  rename_all = "lowercase"
)]
pub enum Focus {
  #[default]
  Inactive,
  Active {
    target: FocusTarget,
    saved:  VisibilitySnapshot
  }
}

impl Focus {
  pub fn is_active(&self) -> bool {
    matches!(self, Focus::Active { .. })
  }

  pub fn target(
    &self
  ) -> Option<&FocusTarget> {
    match self {
      | Focus::Inactive => None,
      | Focus::Active {
        target,
        ..
      } => Some(target)
    }
  }

  pub fn target_id(
    &self
  ) -> Option<&str> {
    self
      .target()
      .map(|t| t.id.as_str())
  }

  pub fn target_facet(
    &self
  ) -> Option<Facet> {
    self.target().map(|t| t.facet)
  }

  pub fn saved(
    &self
  ) -> Option<&VisibilitySnapshot> {
    match self {
      | Focus::Inactive => None,
      | Focus::Active {
        saved,
        ..
      } => Some(saved)
    }
  }

  pub fn is_target(
    &self,
    facet: Facet,
    id: &str
  ) -> bool {
    self.target().is_some_and(|t| {
      t.facet == facet && t.id == id
    })
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum FocusTransition {
  /// Inactive -> Active; snapshot taken.
  Activated,
  /// Active -> Active on another item; snapshot kept.
  Retargeted,
  /// Active -> Inactive; mappings restored from the snapshot.
  Restored,
  /// Active -> Inactive because the target vanished; snapshot discarded.
  Forced,
  Unchanged
}

pub(crate) fn focus_on(
  focus: &mut Focus,
  flags: &mut VisibilitySnapshot,
  target: FocusTarget
) -> FocusTransition {
  match std::mem::take(focus) {
    | Focus::Inactive => {
      let saved = flags.clone();
      collapse(flags, &target);
      *focus = Focus::Active {
        target,
        saved
      };
      FocusTransition::Activated
    }
    | Focus::Active {
      target: current,
      saved
    } if current == target => {
      *flags = saved;
      FocusTransition::Restored
    }
    | Focus::Active {
      saved,
      ..
    } => {
      *flags = saved.clone();
      collapse(flags, &target);
      *focus = Focus::Active {
        target,
        saved
      };
      FocusTransition::Retargeted
    }
  }
}

pub(crate) fn exit(
  focus: &mut Focus,
  flags: &mut VisibilitySnapshot
) -> FocusTransition {
  match std::mem::take(focus) {
    | Focus::Inactive => {
      FocusTransition::Unchanged
    }
    | Focus::Active {
      saved,
      ..
    } => {
      *flags = saved;
      FocusTransition::Restored
    }
  }
}

pub(crate) fn force_exit(
  focus: &mut Focus
) -> FocusTransition {
  match std::mem::take(focus) {
    | Focus::Inactive => {
      FocusTransition::Unchanged
    }
    | Focus::Active {
      ..
    } => FocusTransition::Forced
  }
}

/// Only the target stays visible inside its facet; other facets untouched.
fn collapse(
  flags: &mut VisibilitySnapshot,
  target: &FocusTarget
) {
  let map = flags.facet_mut(target.facet);
  for (id, visible) in map.iter_mut() {
    *visible = *id == target.id;
  }
  map.insert(target.id.clone(), true);
  trace!(
    facet = %target.facet,
    id = %target.id,
    known = map.len(),
    "collapsed facet to focus target"
  );
}
