use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use tracing::debug;

use crate::groups::GroupDirectory;
use crate::model::{Event, is_blank};

/// Persons an event is attributed to: direct participants, the presenter,
/// and the direct members of participating groups.
pub fn credited_actors<'a>(event: &'a Event, groups: &'a GroupDirectory) -> BTreeSet<&'a str> {
    let mut out: BTreeSet<&str> = event.people().collect();
    if let Some(presenter) = event.presenter.as_deref() {
        out.insert(presenter);
    }
    for group_id in event.groups() {
        out.extend(groups.direct_people(group_id));
    }
    out.retain(|id| !is_blank(id));
    out
}

#[tracing::instrument(skip_all, fields(events = events.len()))]
pub fn hours_by_actor(events: &[&Event], groups: &GroupDirectory) -> BTreeMap<String, Duration> {
    let mut totals: BTreeMap<String, Duration> = BTreeMap::new();
    for event in events {
        let length = event.duration();
        for actor in credited_actors(event, groups) {
            let slot = totals.entry(actor.to_string()).or_insert_with(Duration::zero);
            *slot += length;
        }
    }
    debug!(actors = totals.len(), "computed hours by actor");
    totals
}

#[tracing::instrument(skip_all, fields(events = events.len()))]
pub fn events_by_actor(events: &[&Event], groups: &GroupDirectory) -> BTreeMap<String, Vec<u64>> {
    let mut out: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for event in events {
        for actor in credited_actors(event, groups) {
            out.entry(actor.to_string()).or_default().push(event.id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{events_by_actor, hours_by_actor};
    use crate::groups::GroupDirectory;
    use crate::model::{Event, Group, Participant};

    #[test]
    fn member_and_direct_participation_count_once() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut standup = Event::new(1, start, start + Duration::minutes(30));
        standup.participants = vec![Participant::group("team"), Participant::person("ana")];
        let mut review = Event::new(2, start, start + Duration::hours(2));
        review.presenter = Some("ana".to_string());

        let groups = GroupDirectory::from_groups(vec![Group::new(
            "team",
            vec![Participant::person("ana"), Participant::person("ben")],
        )]);

        let events = vec![&standup, &review];
        let hours = hours_by_actor(&events, &groups);
        assert_eq!(hours.get("ana"), Some(&Duration::minutes(150)));
        assert_eq!(hours.get("ben"), Some(&Duration::minutes(30)));

        let by_actor = events_by_actor(&events, &groups);
        assert_eq!(by_actor.get("ana"), Some(&vec![1, 2]));
        assert_eq!(by_actor.get("ben"), Some(&vec![1]));
    }
}
