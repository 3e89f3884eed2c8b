//! Capture-Constraints
//!
//! Serialisiert in die Form, die Capture-Backends erwarten:
//! `{"audio": true, "video": false | {"frameRate": 30, "facingMode": "user"}}`

use serde::{Deserialize, Serialize};

/// Standard-Framerate für Videoanrufe
pub const DEFAULT_FRAME_RATE: u32 = 30;

// ============================================================================
// FACING MODE
// ============================================================================

/// Ausrichtung der Kamera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Frontkamera (zum Benutzer)
    User,
    /// Rückkamera (zur Umgebung)
    Environment,
}

impl FacingMode {
    pub fn from_front(front: bool) -> Self {
        if front {
            FacingMode::User
        } else {
            FacingMode::Environment
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }

    pub fn is_front(self) -> bool {
        self == FacingMode::User
    }
}

// ============================================================================
// CONSTRAINTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    pub facing_mode: FacingMode,
}

/// Anforderung an das Capture-Backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    /// `None` wird als `false` serialisiert
    #[serde(with = "video_or_false")]
    pub video: Option<VideoConstraints>,
}

impl MediaConstraints {
    /// Nur Mikrofon
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: None,
        }
    }

    /// Mikrofon + Kamera für einen neuen Videoanruf
    pub fn video_call(facing_mode: FacingMode, frame_rate: u32) -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                frame_rate: Some(frame_rate),
                facing_mode,
            }),
        }
    }

    /// Anforderung beim Kamerawechsel (ohne Framerate)
    pub fn camera_switch(facing_mode: FacingMode) -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                frame_rate: None,
                facing_mode,
            }),
        }
    }

    pub fn wants_video(&self) -> bool {
        self.video.is_some()
    }
}

mod video_or_false {
    use super::{FacingMode, VideoConstraints};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum VideoField {
        Flag(bool),
        Constraints(VideoConstraints),
    }

    pub fn serialize<S: Serializer>(
        video: &Option<VideoConstraints>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match video {
            Some(constraints) => constraints.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<VideoConstraints>, D::Error> {
        Ok(match VideoField::deserialize(deserializer)? {
            VideoField::Flag(false) => None,
            // `true` = beliebige Kamera, wir nehmen die Frontkamera
            VideoField::Flag(true) => Some(VideoConstraints {
                frame_rate: None,
                facing_mode: FacingMode::User,
            }),
            VideoField::Constraints(constraints) => Some(constraints),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_call_json_shape() {
        let constraints = MediaConstraints::video_call(FacingMode::User, DEFAULT_FRAME_RATE);
        let json = serde_json::to_value(&constraints).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "audio": true,
                "video": { "frameRate": 30, "facingMode": "user" }
            })
        );
    }

    #[test]
    fn test_audio_only_serializes_video_false() {
        let json = serde_json::to_value(MediaConstraints::audio_only()).unwrap();
        assert_eq!(json, serde_json::json!({ "audio": true, "video": false }));
    }

    #[test]
    fn test_camera_switch_omits_frame_rate() {
        let json = serde_json::to_value(MediaConstraints::camera_switch(FacingMode::Environment))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "audio": true,
                "video": { "facingMode": "environment" }
            })
        );
    }

    #[test]
    fn test_parse_video_flag() {
        let off: MediaConstraints =
            serde_json::from_str(r#"{"audio": true, "video": false}"#).unwrap();
        assert!(!off.wants_video());

        let any: MediaConstraints =
            serde_json::from_str(r#"{"audio": false, "video": true}"#).unwrap();
        assert_eq!(any.video.map(|v| v.facing_mode), Some(FacingMode::User));
    }

    #[test]
    fn test_facing_mode_opposite() {
        assert_eq!(FacingMode::User.opposite(), FacingMode::Environment);
        assert_eq!(FacingMode::Environment.opposite(), FacingMode::User);
        assert!(FacingMode::from_front(true).is_front());
        assert!(!FacingMode::from_front(false).is_front());
    }
}
