use crate::processing::Detection;
use serde::{Deserialize, Serialize};

/// JSON envelope handed to consumers of a prediction.
#[derive(Debug, Serialize, Deserialize)]
struct DetectionEnvelope<D> {
    count: usize,
    detections: D,
}

pub fn encode_detections(detections: &[Detection]) -> anyhow::Result<String> {
    let envelope = DetectionEnvelope {
        count: detections.len(),
        detections,
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn decode_detections(json: &str) -> anyhow::Result<Vec<Detection>> {
    let envelope: DetectionEnvelope<Vec<Detection>> = serde_json::from_str(json)?;
    if envelope.count != envelope.detections.len() {
        anyhow::bail!(
            "envelope count {} does not match {} detections",
            envelope.count,
            envelope.detections.len()
        );
    }
    if let Some(detection) = envelope
        .detections
        .iter()
        .find(|d| d.mask.as_ref().is_some_and(|m| !m.is_consistent()))
    {
        anyhow::bail!(
            "mask of '{}' detection does not match its dimensions",
            detection.label
        );
    }
    Ok(envelope.detections)
}
