use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A single atomic instruction from the planner. The `action` tag on the wire
/// selects the variant; tags outside the built-in vocabulary are carried as
/// [`ActionStep::Plugin`] and resolved (or rejected) at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStep {
    Navigate { url: String },
    Click { selector: String },
    Input { selector: String, text: String },
    Ask { question: String },
    Terminate { reason: String },
    Plugin { name: String, args: Map<String, Value> },
}

impl ActionStep {
    pub fn tag(&self) -> &str {
        match self {
            ActionStep::Navigate { .. } => "browser.navigate",
            ActionStep::Click { .. } => "browser.click",
            ActionStep::Input { .. } => "browser.input",
            ActionStep::Ask { .. } => "ask",
            ActionStep::Terminate { .. } => "terminate",
            ActionStep::Plugin { name, .. } => name,
        }
    }

    /// Whether this step needs a live page to execute.
    pub fn needs_browser(&self) -> bool {
        matches!(
            self,
            ActionStep::Navigate { .. } | ActionStep::Click { .. } | ActionStep::Input { .. }
        )
    }
}

impl Serialize for ActionStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("action", self.tag())?;
        match self {
            ActionStep::Navigate { url } => map.serialize_entry("url", url)?,
            ActionStep::Click { selector } => map.serialize_entry("selector", selector)?,
            ActionStep::Input { selector, text } => {
                map.serialize_entry("selector", selector)?;
                map.serialize_entry("text", text)?;
            }
            ActionStep::Ask { question } => map.serialize_entry("question", question)?,
            ActionStep::Terminate { reason } => map.serialize_entry("reason", reason)?,
            ActionStep::Plugin { args, .. } => {
                for (key, value) in args {
                    map.serialize_entry(key, value)?;
                }
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ActionStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        fn take_str<E: de::Error>(
            map: &mut Map<String, Value>,
            field: &'static str,
        ) -> Result<String, E> {
            match map.remove(field) {
                Some(Value::String(s)) => Ok(s),
                Some(_) => Err(E::custom(format!("field `{field}` must be a string"))),
                None => Err(E::missing_field(field)),
            }
        }

        let mut map = Map::deserialize(deserializer)?;
        let tag = match map.remove("action") {
            Some(Value::String(tag)) => tag,
            Some(_) => return Err(de::Error::custom("field `action` must be a string")),
            None => return Err(de::Error::missing_field("action")),
        };

        Ok(match tag.as_str() {
            "browser.navigate" => ActionStep::Navigate {
                url: take_str(&mut map, "url")?,
            },
            "browser.click" => ActionStep::Click {
                selector: take_str(&mut map, "selector")?,
            },
            "browser.input" => ActionStep::Input {
                selector: take_str(&mut map, "selector")?,
                text: take_str(&mut map, "text")?,
            },
            "ask" => ActionStep::Ask {
                question: take_str(&mut map, "question")?,
            },
            "terminate" => ActionStep::Terminate {
                reason: take_str(&mut map, "reason")?,
            },
            _ => ActionStep::Plugin {
                name: tag,
                args: map,
            },
        })
    }
}

/// An [`ActionStep`] as recorded in the action log, plus the result attached
/// after execution. Rows are created by the submission API and mutated once
/// by the dispatcher; the core never deletes them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedAction {
    pub id: i64,
    pub data: ActionStep,
    pub result: Option<String>,
}

/// The single current page snapshot. Upsert semantics: at most one logical
/// instance exists, overwritten on every successful browser action.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageState {
    pub url: String,
    pub html: String,
}
