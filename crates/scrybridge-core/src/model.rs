// ── Mirror domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

/// Interface tags that mark a device as a camera.
pub const CAMERA_INTERFACES: &[&str] = &["Camera", "VideoCamera"];

const ID_FIELD: &str = "id";
const INTERFACES_FIELD: &str = "interfaces";

/// Latest known state of one hub device.
///
/// Serializes flat, exactly as the hub describes the device:
/// `{"id": …, <every property the hub sent>…}`. Capability tags are read
/// from the raw `interfaces` property and never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,

    /// Every property, untyped and verbatim.
    #[serde(flatten)]
    pub properties: Map<String, Value>,

    /// When this record last changed locally.
    #[serde(skip)]
    pub touched_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// Build a record from a hub attribute object.
    ///
    /// Any `id` inside `attributes` is ignored: the key the hub files the
    /// device under is authoritative.
    pub fn from_attributes(id: impl Into<String>, mut attributes: Map<String, Value>) -> Self {
        attributes.remove(ID_FIELD);
        Self {
            id: id.into(),
            properties: attributes,
            touched_at: Utc::now(),
        }
    }

    /// Set one property. Returns `false` for the immutable `id` field.
    pub fn set_property(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if name == ID_FIELD {
            return false;
        }
        self.properties.insert(name, value);
        self.touched_at = Utc::now();
        true
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Capability tags (`Camera`, `OnOff`, `Battery`, …).
    ///
    /// Only string entries of an array-valued `interfaces` count.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.property(INTERFACES_FIELD)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    pub fn has_interface(&self, interface: &str) -> bool {
        self.interfaces().any(|i| i == interface)
    }

    pub fn is_camera(&self) -> bool {
        CAMERA_INTERFACES.iter().any(|c| self.has_interface(c))
    }

    /// Display name, if the hub provided one.
    pub fn name(&self) -> Option<&str> {
        self.property("name").and_then(Value::as_str)
    }
}

/// Lifecycle of the hub event connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn serializes_flat() {
        let record = DeviceRecord::from_attributes(
            "cam1",
            attrs(json!({"interfaces": ["Camera"], "on": true})),
        );
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": "cam1", "interfaces": ["Camera"], "on": true})
        );
    }

    #[test]
    fn key_wins_over_embedded_id() {
        let mut record =
            DeviceRecord::from_attributes("42", attrs(json!({"id": "other", "name": "Porch"})));
        assert_eq!(record.id, "42");
        assert!(!record.set_property("id", json!("99")));
        assert_eq!(record.id, "42");
        assert_eq!(record.name(), Some("Porch"));
    }

    #[test]
    fn interfaces_property_updates_tags() {
        let mut record = DeviceRecord::from_attributes("d", attrs(json!({"interfaces": ["OnOff"]})));
        assert!(!record.is_camera());

        assert!(record.set_property("interfaces", json!(["OnOff", "VideoCamera", 7])));
        assert_eq!(record.interfaces().collect::<Vec<_>>(), vec!["OnOff", "VideoCamera"]);
        assert!(record.is_camera());
        assert_eq!(
            record.property("interfaces"),
            Some(&json!(["OnOff", "VideoCamera", 7]))
        );
    }

    #[test]
    fn hub_attributes_serialize_unchanged() {
        for attributes in [
            json!({"on": true}),
            json!({"interfaces": "Camera"}),
            json!({"interfaces": ["Camera", null, 3], "battery": {"level": 80}}),
        ] {
            let record = DeviceRecord::from_attributes("dev", attrs(attributes.clone()));
            let mut expected = attrs(attributes);
            expected.insert("id".into(), json!("dev"));
            assert_eq!(serde_json::to_value(&record).unwrap(), Value::Object(expected));
        }

        let odd = DeviceRecord::from_attributes("odd", attrs(json!({"interfaces": "Camera"})));
        assert!(!odd.is_camera());
        assert_eq!(odd.interfaces().count(), 0);
    }

    #[test]
    fn nested_values_kept_verbatim() {
        let record = DeviceRecord::from_attributes(
            "thermo",
            attrs(json!({"temperature": {"value": 21.5, "unit": "C"}, "modes": ["heat", "cool"]})),
        );
        assert_eq!(record.property("temperature"), Some(&json!({"value": 21.5, "unit": "C"})));
    }

    #[test]
    fn deserializes_round_trip_shape() {
        let record: DeviceRecord =
            serde_json::from_value(json!({"id": "x", "interfaces": ["Camera"], "on": false}))
                .unwrap();
        assert!(record.is_camera());
        assert_eq!(record.property("on"), Some(&json!(false)));
    }

    #[test]
    fn connection_state_renders_lowercase() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(
            serde_json::to_value(ConnectionState::Connected).unwrap(),
            json!("connected")
        );
        assert!(!ConnectionState::default().is_connected());
    }
}
