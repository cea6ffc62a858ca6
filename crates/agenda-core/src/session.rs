use std::cell::RefCell;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::datetime::DateWindow;
use crate::filter::{
    FacetCounts, ReferencedItems, extract_referenced_items, facet_counts, in_window,
    is_event_visible,
};
use crate::focus::FocusTransition;
use crate::groups::GroupDirectory;
use crate::model::{Event, Group};
use crate::ops::Op;
use crate::visibility::{Facet, VisibilityState, VisibilityStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    events: u64,
    groups: u64,
    window: u64,
    store: u64,
}

#[derive(Debug, Clone)]
struct VisibleCache {
    key: CacheKey,
    indices: Vec<usize>,
}

/// Application-level container: the loaded event and group snapshots, the
/// visible date window, and the single [`VisibilityStore`] of the session.
///
/// Any change to the events, the groups or the window reseeds the store.
#[derive(Debug, Clone, Default)]
pub struct Session {
    events: Vec<Event>,
    groups: GroupDirectory,
    window: Option<DateWindow>,
    store: VisibilityStore,
    events_rev: u64,
    groups_rev: u64,
    window_rev: u64,
    cache: RefCell<Option<VisibleCache>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(events, groups), fields(events = events.len(), groups = groups.len()))]
    pub fn with_snapshots(
        events: Vec<Event>,
        groups: GroupDirectory,
        window: Option<DateWindow>,
    ) -> Self {
        let mut session = Self {
            events,
            groups,
            window,
            ..Self::default()
        };
        session.reseed();
        session
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn groups(&self) -> &GroupDirectory {
        &self.groups
    }

    pub fn window(&self) -> Option<&DateWindow> {
        self.window.as_ref()
    }

    pub fn store(&self) -> &VisibilityStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut VisibilityStore {
        &mut self.store
    }

    pub fn state(&self) -> &VisibilityState {
        self.store.state()
    }

    #[instrument(skip(self, events), fields(count = events.len()))]
    pub fn replace_events(&mut self, events: Vec<Event>) -> FocusTransition {
        self.events = events;
        self.events_rev += 1;
        self.reseed()
    }

    #[instrument(skip(self, groups))]
    pub fn replace_groups<I>(&mut self, groups: I) -> FocusTransition
    where
        I: IntoIterator<Item = Group>,
    {
        self.groups = GroupDirectory::from_groups(groups);
        self.groups_rev += 1;
        self.reseed()
    }

    #[instrument(skip(self))]
    pub fn set_window(&mut self, window: Option<DateWindow>) -> FocusTransition {
        self.window = window;
        self.window_rev += 1;
        self.reseed()
    }

    pub fn referenced_items(&self) -> ReferencedItems {
        extract_referenced_items(&self.events, &self.groups, self.window.as_ref())
    }

    pub fn counts(&self) -> FacetCounts {
        facet_counts(&self.events, &self.groups, self.window.as_ref())
    }

    fn reseed(&mut self) -> FocusTransition {
        let items = self.referenced_items();
        let transition = self.store.reseed(&items);
        debug!(?transition, "session reseeded");
        transition
    }

    /// In-window events that pass the current visibility rules, in load order.
    ///
    /// The result is memoized until the events, groups, window or store
    /// change.
    pub fn visible_events(&self) -> Vec<&Event> {
        let key = self.cache_key();
        let fresh = self
            .cache
            .borrow()
            .as_ref()
            .is_some_and(|cache| cache.key == key);
        if !fresh {
            let indices = self.compute_visible_indices();
            debug!(visible = indices.len(), "recomputed visible events");
            self.cache.replace(Some(VisibleCache { key, indices }));
        }

        match self.cache.borrow().as_ref() {
            Some(cache) => cache.indices.iter().map(|&idx| &self.events[idx]).collect(),
            None => vec![],
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            events: self.events_rev,
            groups: self.groups_rev,
            window: self.window_rev,
            store: self.store.revision(),
        }
    }

    fn compute_visible_indices(&self) -> Vec<usize> {
        let state = self.store.state();
        self.events
            .iter()
            .enumerate()
            .filter(|(_, event)| {
                self.window
                    .as_ref()
                    .is_none_or(|w| w.overlaps(event.start, event.end))
            })
            .filter(|(_, event)| is_event_visible(event, state, &self.groups))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn in_window_events(&self) -> Vec<&Event> {
        in_window(&self.events, self.window.as_ref()).collect()
    }

    #[instrument(skip(self))]
    pub fn apply(&mut self, op: &Op) -> anyhow::Result<()> {
        match op {
            Op::Show(facet, id) => self.store.set_visibility(*facet, id, true),
            Op::Hide(facet, id) => self.store.set_visibility(*facet, id, false),
            Op::Toggle(facet, id) => self.store.toggle_visibility(*facet, id),
            Op::Focus(facet, id) => {
                self.store.focus_on(*facet, id);
            }
            Op::Unfocus => {
                if self.store.exit_focus() == FocusTransition::Unchanged {
                    warn!("unfocus requested but focus mode is not active");
                }
            }
            Op::All(facet, on) => self.store.set_all(*facet, *on),
            Op::From(start) => {
                let window = self
                    .window
                    .map_or_else(
                        || DateWindow::new(*start, DateTime::<Utc>::MAX_UTC),
                        |w| w.with_start(*start),
                    );
                self.set_window(Some(checked_window(window)?));
            }
            Op::To(end) => {
                let window = self
                    .window
                    .map_or_else(
                        || DateWindow::new(DateTime::<Utc>::MIN_UTC, *end),
                        |w| w.with_end(*end),
                    );
                self.set_window(Some(checked_window(window)?));
            }
        }
        Ok(())
    }

    /// All or nothing: when an op fails the store and window go back to
    /// where they were before the batch.
    #[instrument(skip(self, ops))]
    pub fn apply_all(&mut self, ops: &[Op]) -> anyhow::Result<()> {
        let store = self.store.clone();
        let window = (self.window, self.window_rev);
        for (idx, op) in ops.iter().enumerate() {
            if let Err(err) = self.apply(op) {
                warn!(failed = idx, count = ops.len(), "op batch rolled back");
                self.store = store;
                (self.window, self.window_rev) = window;
                return Err(err);
            }
        }
        info!(
            count = ops.len(),
            focus = self.store.focus().is_active(),
            "applied ops"
        );
        Ok(())
    }

    /// Visibility flag for an item as shown in the toggle list. While focus
    /// is active this reports the collapsed mapping, not the saved one.
    pub fn item_visible(&self, facet: Facet, id: &str) -> bool {
        self.store.is_visible(facet, id)
    }
}

fn checked_window(window: DateWindow) -> anyhow::Result<DateWindow> {
    if window.end <= window.start {
        return Err(anyhow!(
            "window end {} must be after start {}",
            window.end,
            window.start
        ));
    }
    Ok(window)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::Session;
    use crate::focus::FocusTransition;
    use crate::groups::GroupDirectory;
    use crate::model::{Event, Group, Participant};
    use crate::ops::Op;
    use crate::visibility::Facet;

    fn sample() -> Session {
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut a = Event::new(1, day, day + Duration::hours(1));
        a.participants = vec![Participant::person("ana")];
        let mut b = Event::new(2, day + Duration::days(7), day + Duration::days(7) + Duration::hours(1));
        b.participants = vec![Participant::group("team")];
        let groups = GroupDirectory::from_groups(vec![Group::new(
            "team",
            vec![Participant::person("ben")],
        )]);
        Session::with_snapshots(vec![a, b], groups, None)
    }

    #[test]
    fn seeding_discovers_members() {
        let session = sample();
        assert!(session.state().mapping(Facet::Actor).contains_key("ben"));
        assert!(session.state().mapping(Facet::Group).contains_key("team"));
    }

    #[test]
    fn window_change_reseeds_and_drops_focus() {
        let mut session = sample();
        session.apply(&Op::Focus(Facet::Group, "team".to_string())).unwrap();
        assert!(session.store().focus().is_active());

        let week_one_end = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        session.apply(&Op::To(week_one_end)).unwrap();

        assert!(!session.store().focus().is_active());
        assert!(!session.state().mapping(Facet::Group).contains_key("team"));
        let ids: Vec<u64> = session.visible_events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn inverted_window_is_rejected_without_change() {
        let mut session = sample();
        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        session.apply(&Op::To(early + Duration::days(1))).unwrap();
        assert!(session.apply(&Op::From(early + Duration::days(2))).is_err());
        assert_eq!(session.window().map(|w| w.end), Some(early + Duration::days(1)));
    }

    #[test]
    fn failed_batch_leaves_session_untouched() {
        let mut session = sample();
        assert_eq!(session.visible_events().len(), 2);
        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let batch = vec![
            Op::Hide(Facet::Actor, "ana".to_string()),
            Op::Focus(Facet::Group, "team".to_string()),
            Op::To(early + Duration::days(1)),
            Op::From(early + Duration::days(2)),
        ];

        assert!(session.apply_all(&batch).is_err());
        assert_eq!(session.state().mapping(Facet::Actor).get("ana"), Some(&true));
        assert!(!session.store().focus().is_active());
        assert!(session.window().is_none());
        assert_eq!(session.visible_events().len(), 2);
    }

    #[test]
    fn visible_cache_tracks_store_revisions() {
        let mut session = sample();
        assert_eq!(session.visible_events().len(), 2);
        session.apply(&Op::Hide(Facet::Actor, "ana".to_string())).unwrap();
        assert_eq!(session.visible_events().len(), 1);
        session.store_mut().toggle_visibility(Facet::Actor, "ana");
        assert_eq!(session.visible_events().len(), 2);
    }

    #[test]
    fn replacing_events_reports_forced_focus_exit() {
        let mut session = sample();
        session.apply(&Op::Focus(Facet::Actor, "ana".to_string())).unwrap();
        let transition = session.replace_events(vec![]);
        assert_eq!(transition, FocusTransition::Forced);
        assert!(session.visible_events().is_empty());
    }
}
