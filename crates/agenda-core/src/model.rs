use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reference from an event (or a group) to a person or to another group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(
    tag = "type",
    content = "id",
    rename_all = "lowercase",
    from = "ParticipantRepr"
)]
pub enum Participant {
    Person(String),
    Group(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParticipantRepr {
    Bare(String),
    Tagged {
        #[serde(rename = "type")]
        kind: ParticipantKind,
        id: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ParticipantKind {
    Person,
    Group,
}

impl From<ParticipantRepr> for Participant {
    fn from(repr: ParticipantRepr) -> Self {
        match repr {
            ParticipantRepr::Bare(id) => Participant::Person(id),
            ParticipantRepr::Tagged {
                kind: ParticipantKind::Person,
                id,
            } => Participant::Person(id),
            ParticipantRepr::Tagged {
                kind: ParticipantKind::Group,
                id,
            } => Participant::Group(id),
        }
    }
}

impl Participant {
    pub fn person(id: impl Into<String>) -> Self {
        Participant::Person(id.into())
    }

    pub fn group(id: impl Into<String>) -> Self {
        Participant::Group(id.into())
    }

    pub fn id(&self) -> &str {
        match self {
            Participant::Person(id) | Participant::Group(id) => id,
        }
    }

    pub fn as_person(&self) -> Option<&str> {
        match self {
            Participant::Person(id) => Some(id),
            Participant::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&str> {
        match self {
            Participant::Group(id) => Some(id),
            Participant::Person(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: u64,

    #[serde(default)]
    pub title: String,

    pub start: DateTime<Utc>,

    pub end: DateTime<Utc>,

    #[serde(default, alias = "color")]
    pub background_color: Option<String>,

    #[serde(default)]
    pub border_color: Option<String>,

    #[serde(default)]
    pub participants: Vec<Participant>,

    #[serde(default)]
    pub presenter: Option<String>,
}

impl Event {
    pub fn new(id: u64, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id,
            title: String::new(),
            start,
            end,
            background_color: None,
            border_color: None,
            participants: vec![],
            presenter: None,
        }
    }

    /// Background color first, then the border color when it differs.
    pub fn colors(&self) -> impl Iterator<Item = &str> {
        let background = self.background_color.as_deref();
        let border = self
            .border_color
            .as_deref()
            .filter(|border| Some(*border) != background);
        background.into_iter().chain(border)
    }

    pub fn has_color(&self, color: &str) -> bool {
        self.colors().any(|c| c == color)
    }

    pub fn people(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().filter_map(Participant::as_person)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().filter_map(Participant::as_group)
    }

    pub fn duration(&self) -> chrono::Duration {
        (self.end - self.start).max(chrono::Duration::zero())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub members: Vec<Participant>,
}

impl Group {
    pub fn new(id: impl Into<String>, members: Vec<Participant>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            members,
        }
    }
}

/// Identifiers that carry no information are skipped rather than reported.
pub(crate) fn is_blank(id: &str) -> bool {
    id.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::{Event, Group, Participant};

    #[test]
    fn participants_accept_tagged_and_bare_forms() {
        let group: Group = serde_json::from_str(
            r#"{"id":"g1","members":["p2",{"type":"group","id":"g2"},{"type":"person","id":"p3"}]}"#,
        )
        .expect("group json");
        assert_eq!(
            group.members,
            vec![
                Participant::person("p2"),
                Participant::group("g2"),
                Participant::person("p3"),
            ]
        );
    }

    #[test]
    fn participant_serializes_tagged() {
        let json = serde_json::to_string(&Participant::group("g1")).expect("serialize");
        assert_eq!(json, r#"{"type":"group","id":"g1"}"#);
    }

    #[test]
    fn color_alias_and_distinct_colors() {
        let event: Event = serde_json::from_str(
            r##"{"id":1,"start":"2026-03-02T09:00:00Z","end":"2026-03-02T10:00:00Z","color":"#f00","border_color":"#f00"}"##,
        )
        .expect("event json");
        assert_eq!(event.colors().collect::<Vec<_>>(), vec!["#f00"]);

        let mut event = event;
        event.border_color = Some("#0f0".to_string());
        assert_eq!(event.colors().collect::<Vec<_>>(), vec!["#f00", "#0f0"]);
        assert!(event.has_color("#0f0"));
    }
}
