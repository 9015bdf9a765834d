//! mpv JSON IPC: outgoing command lines, incoming event lines, and the volume
//! curve applied before a level goes on the wire.

use serde::Deserialize;
use serde_json::json;

/// Observation id used for every `observe_property_string` we register.
pub const OBS_ID: u64 = 1;

/// The ICY stream title as exposed by mpv.
pub const ICY_TITLE_PROPERTY: &str = "metadata/by-key/icy-title";

/// Linear level → mpv `volume` percentage. The knob is linear, the ear isn't.
pub const VOLUME_CURVE: [u8; 100] = [
    0, 1, 2, 3, 4, 4, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, //
    11, 12, 12, 13, 13, 13, 14, 14, 14, 15, 15, 16, 16, 16, 17, //
    17, 17, 18, 18, 18, 19, 19, 20, 20, 20, 21, 21, 22, 22, 23, //
    23, 24, 24, 25, 25, 26, 26, 27, 27, 28, 28, 29, 30, 30, 31, //
    32, 32, 33, 34, 35, 35, 36, 37, 38, 39, 40, 41, 42, 43, 45, //
    46, 47, 49, 50, 52, 53, 55, 57, 59, 61, 63, 66, 68, 71, 74, //
    78, 81, 85, 90, 95, 100,
];

pub const VOLUME_MIN: u8 = 0;
pub const VOLUME_MAX: u8 = (VOLUME_CURVE.len() - 1) as u8;

/// Clamp a linear level into `[VOLUME_MIN, VOLUME_MAX]` and map it through
/// the curve.
pub fn volume_to_mpv(level: i32) -> u8 {
    let idx = level.clamp(VOLUME_MIN as i32, VOLUME_MAX as i32) as usize;
    VOLUME_CURVE[idx]
}

/// Commands sent to mpv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCommand {
    LoadFile(String),
    Stop,
    /// Wire value, already mapped through [`VOLUME_CURVE`].
    SetVolume(u8),
    ObserveProperty(String),
}

impl MediaCommand {
    /// Serialise to one newline-terminated protocol line.
    pub fn to_line(&self) -> anyhow::Result<String> {
        let command = match self {
            MediaCommand::LoadFile(url) => json!(["loadfile", url]),
            MediaCommand::Stop => json!(["stop"]),
            MediaCommand::SetVolume(v) => json!(["set_property", "volume", v]),
            MediaCommand::ObserveProperty(name) => {
                json!(["observe_property_string", OBS_ID, name])
            }
        };
        let mut line = serde_json::to_string(&json!({ "command": command }))?;
        line.push('\n');
        Ok(line)
    }
}

/// One unsolicited line from mpv. Replies to commands decode too; they just
/// carry `error`/`request_id` and an empty `event`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MediaEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub request_id: Option<i64>,
}

impl MediaEvent {
    /// `None` for anything that isn't a single JSON object with string
    /// fields (e.g. numeric or null `data`).
    pub fn decode(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }

    /// The ICY title when this is its property-change event.
    pub fn icy_title(&self) -> Option<&str> {
        (self.event == "property-change" && self.name == ICY_TITLE_PROPERTY)
            .then_some(self.data.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lines() {
        assert_eq!(
            MediaCommand::LoadFile("http://a/b".into()).to_line().unwrap(),
            "{\"command\":[\"loadfile\",\"http://a/b\"]}\n"
        );
        assert_eq!(
            MediaCommand::Stop.to_line().unwrap(),
            "{\"command\":[\"stop\"]}\n"
        );
        assert_eq!(
            MediaCommand::SetVolume(42).to_line().unwrap(),
            "{\"command\":[\"set_property\",\"volume\",42]}\n"
        );
        assert_eq!(
            MediaCommand::ObserveProperty(ICY_TITLE_PROPERTY.into())
                .to_line()
                .unwrap(),
            "{\"command\":[\"observe_property_string\",1,\"metadata/by-key/icy-title\"]}\n"
        );
    }

    #[test]
    fn test_volume_curve_bounds() {
        assert_eq!(VOLUME_MAX, 99);
        assert_eq!(volume_to_mpv(-5), 0);
        assert_eq!(volume_to_mpv(0), 0);
        assert_eq!(volume_to_mpv(49), 23);
        assert_eq!(volume_to_mpv(99), 100);
        assert_eq!(volume_to_mpv(1000), 100);
        assert!(VOLUME_CURVE.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_decode_property_change() {
        let evt = MediaEvent::decode(
            r#"{"event":"property-change","id":1,"name":"metadata/by-key/icy-title","data":"Artist - Song"}"#,
        )
        .unwrap();
        assert_eq!(evt.icy_title(), Some("Artist - Song"));
    }

    #[test]
    fn test_decode_reply_and_garbage() {
        let reply = MediaEvent::decode(r#"{"request_id":0,"error":"success"}"#).unwrap();
        assert_eq!(reply.error.as_deref(), Some("success"));
        assert_eq!(reply.icy_title(), None);

        assert!(MediaEvent::decode("not json").is_none());
        assert!(MediaEvent::decode(r#"{"event":"property-change","data":null}"#).is_none());
    }
}
