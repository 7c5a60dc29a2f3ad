use base64::engine::general_purpose;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Encoded video flushed from the capture stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoBlob {
    pub mime_type: String,
    /// Raw container bytes; base64 on the wire
    #[serde(serialize_with = "encode_bytes", deserialize_with = "decode_bytes")]
    pub data: Vec<u8>,
}

impl VideoBlob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.data)
        )
    }
}

fn encode_bytes<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&general_purpose::STANDARD.encode(data))
}

fn decode_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Which branch a stop took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopOutcome {
    /// No stream was ever opened
    NoStream,
    /// Encoder was not recording but had buffered data
    Salvaged,
    /// Encoder already inactive with nothing buffered
    Idle,
    /// Encoder was recording and stopped gracefully
    Finalized,
}

impl StopOutcome {
    /// Whether the worker had a session worth reporting
    pub fn had_activity(&self) -> bool {
        matches!(self, StopOutcome::Salvaged | StopOutcome::Finalized)
    }
}

/// Result of stopping the worker; never an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedVideo {
    pub outcome: StopOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoBlob>,
}

impl CapturedVideo {
    pub fn empty(outcome: StopOutcome) -> Self {
        Self {
            outcome,
            video: None,
        }
    }

    pub fn had_activity(&self) -> bool {
        self.outcome.had_activity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_bytes_travel_as_base64() {
        let blob = VideoBlob::new("video/webm", vec![0x1a, 0x45, 0xdf, 0xa3]);
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["data"], "GkXfow==");
        assert_eq!(json["mimeType"], "video/webm");
        let back: VideoBlob = serde_json::from_value(json).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn data_url_embeds_mime_type() {
        let blob = VideoBlob::new("video/webm;codecs=vp9", vec![1, 2, 3]);
        assert_eq!(blob.to_data_url(), "data:video/webm;codecs=vp9;base64,AQID");
    }
}
