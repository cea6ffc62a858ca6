use std::collections::BTreeSet;

use agenda_core::datastore::DataStore;
use agenda_core::filter::{extract_referenced_items, filter_events};
use agenda_core::focus::FocusTransition;
use agenda_core::groups::GroupDirectory;
use agenda_core::model::{Event, Group, Participant};
use agenda_core::ops::Op;
use agenda_core::session::Session;
use agenda_core::visibility::{Facet, VisibilityStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::tempdir;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|id| id.to_string()).collect()
}

#[test]
fn datastore_roundtrip_and_filtering() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    assert!(store.load_events().expect("empty events").is_empty());

    let mut review = Event::new(1, at(2, 9), at(2, 10));
    review.title = "Design review".to_string();
    review.background_color = Some("#f00".to_string());
    review.participants = vec![Participant::person("ana"), Participant::group("ops")];
    let mut demo = Event::new(2, at(3, 14), at(3, 15));
    demo.presenter = Some("ben".to_string());

    store
        .save_events(&[review.clone(), demo.clone()])
        .expect("save events");
    store
        .save_groups(&[Group::new("ops", vec![Participant::person("cy")])])
        .expect("save groups");

    let events = store.load_events().expect("load events");
    assert_eq!(events, vec![review, demo]);
    let groups = GroupDirectory::from_groups(store.load_groups().expect("load groups"));

    let mut session = Session::with_snapshots(events, groups, None);
    session
        .apply_all(&[
            Op::parse("hide:color:#f00", Utc::now()).expect("parse op"),
            Op::Hide(Facet::Actor, "ben".to_string()),
        ])
        .expect("apply ops");
    assert!(session.visible_events().is_empty());

    session
        .apply(&Op::Show(Facet::Actor, "ben".to_string()))
        .expect("show");
    let visible: Vec<u64> = session.visible_events().iter().map(|e| e.id).collect();
    assert_eq!(visible, vec![2]);
}

#[test]
fn session_reseeds_when_snapshots_change() {
    let mut first = Event::new(1, at(2, 9), at(2, 10));
    first.participants = vec![Participant::person("ana")];
    let mut session = Session::with_snapshots(vec![first.clone()], GroupDirectory::new(), None);

    session
        .apply(&Op::Hide(Facet::Actor, "ana".to_string()))
        .expect("hide");
    let mut second = Event::new(2, at(2, 11), at(2, 12));
    second.participants = vec![Participant::person("ben")];
    session.replace_events(vec![first, second]);

    let actors = session.state().mapping(Facet::Actor);
    assert_eq!(actors.get("ana"), Some(&false));
    assert_eq!(actors.get("ben"), Some(&true));

    session.replace_groups(vec![Group::new("crew", vec![Participant::person("ben")])]);
    assert!(session.state().mapping(Facet::Group).is_empty());
}

#[test]
fn scenario_a_hidden_color_rejects_event() {
    let mut event = Event::new(1, at(2, 9), at(2, 10));
    event.background_color = Some("#f00".to_string());
    event.participants = vec![Participant::person("p1")];
    let events = vec![event];
    let groups = GroupDirectory::new();

    let mut store = VisibilityStore::new();
    store.reseed(&extract_referenced_items(&events, &groups, None));
    store.set_visibility(Facet::Color, "#f00", false);

    assert!(filter_events(&events, store.state(), &groups).is_empty());
}

#[test]
fn scenario_b_group_flag_admits_hidden_member() {
    let mut event = Event::new(2, at(2, 9), at(2, 10));
    event.participants = vec![Participant::group("g1")];
    let events = vec![event];
    let groups = GroupDirectory::from_groups(vec![Group::new("g1", vec![Participant::person("p2")])]);

    let mut store = VisibilityStore::new();
    store.reseed(&extract_referenced_items(&events, &groups, None));
    store.set_visibility(Facet::Group, "g1", true);
    store.set_visibility(Facet::Actor, "p2", false);

    let visible: Vec<u64> = filter_events(&events, store.state(), &groups)
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(visible, vec![2]);
}

#[test]
fn hiding_the_only_group_hides_the_event() {
    let mut event = Event::new(2, at(2, 9), at(2, 10));
    event.participants = vec![Participant::group("g1")];
    let events = vec![event];
    let groups = GroupDirectory::from_groups(vec![Group::new("g1", vec![Participant::person("p2")])]);

    let mut store = VisibilityStore::new();
    store.reseed(&extract_referenced_items(&events, &groups, None));
    store.toggle_visibility(Facet::Group, "g1");

    assert!(!store.is_visible(Facet::Group, "g1"));
    assert!(store.is_visible(Facet::Actor, "p2"));
    assert!(filter_events(&events, store.state(), &groups).is_empty());
}

#[test]
fn scenario_c_toggle_during_focus_does_not_leak() {
    let mut store = VisibilityStore::new();
    store.seed_from_events(&ids(&["p1", "p2"]), &BTreeSet::new(), &BTreeSet::new());

    assert_eq!(store.focus_on(Facet::Actor, "p1"), FocusTransition::Activated);
    store.toggle_visibility(Facet::Actor, "p1");
    assert_eq!(store.exit_focus(), FocusTransition::Restored);

    let actors = store.mapping(Facet::Actor);
    assert_eq!(actors.get("p1"), Some(&true));
    assert_eq!(actors.get("p2"), Some(&true));
    assert_eq!(actors.len(), 2);
}

#[test]
fn window_narrowing_forces_focus_off() {
    let mut early = Event::new(1, at(2, 9), at(2, 10));
    early.participants = vec![Participant::person("ana")];
    let mut late = Event::new(2, at(20, 9), at(20, 10));
    late.participants = vec![Participant::person("ben")];
    let mut session = Session::with_snapshots(vec![early, late], GroupDirectory::new(), None);

    session
        .apply(&Op::Focus(Facet::Actor, "ben".to_string()))
        .expect("focus");
    let transition = session
        .set_window(Some(agenda_core::datetime::DateWindow::new(at(1, 0), at(2, 0) + Duration::days(7))));

    assert_eq!(transition, FocusTransition::Forced);
    assert!(!session.store().focus().is_active());
    let visible: Vec<u64> = session.visible_events().iter().map(|e| e.id).collect();
    assert_eq!(visible, vec![1]);
}
