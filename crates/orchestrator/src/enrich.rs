//! Input normalization for inbound messages.
//!
//! Side-channel content with no native text (a shared location, a voice
//! note, a bare image) is folded into the message text as bracketed
//! annotations, so the classifier and personas see a single string.

use async_trait::async_trait;
use brain_core::{AudioClip, InboundMessage, SharedLocation};
use tracing::{debug, warn};

/// Reverse geocoding: coordinates to a readable address.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best-effort address, `None` when unavailable.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Option<String>;
}

/// Speech to text for voice notes.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Best-effort transcript, `None` when unavailable.
    async fn transcribe(&self, clip: &AudioClip) -> Option<String>;
}

/// Build the user text for a message: the normalized text followed by one
/// annotation per side-channel item.
pub async fn compose_user_text(
    message: &InboundMessage,
    geocoder: Option<&dyn Geocoder>,
    transcriber: Option<&dyn Transcriber>,
) -> String {
    let mut parts = Vec::new();

    let text = message.text.normalize();
    if !text.is_empty() {
        parts.push(text);
    }

    if let Some(ref clip) = message.audio {
        parts.push(annotate_audio(clip, transcriber).await);
    }

    if let Some(ref location) = message.location {
        parts.push(annotate_location(location, geocoder).await);
    }

    if message.image_url.is_some() && parts.is_empty() {
        parts.push("[user sent an image]".to_string());
    }

    parts.join("\n")
}

async fn annotate_audio(clip: &AudioClip, transcriber: Option<&dyn Transcriber>) -> String {
    let transcript = match transcriber {
        Some(t) => t.transcribe(clip).await,
        None => None,
    };

    match transcript.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => {
            debug!(chars = text.len(), "Voice note transcribed");
            format!("[voice note: {}]", text)
        }
        None => {
            warn!(content_type = %clip.content_type, "Voice note could not be transcribed");
            "[user sent a voice note that could not be transcribed]".to_string()
        }
    }
}

async fn annotate_location(location: &SharedLocation, geocoder: Option<&dyn Geocoder>) -> String {
    let provided = location
        .address
        .as_deref()
        .or(location.name.as_deref())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);

    let address = match (provided, geocoder) {
        (Some(address), _) => Some(address),
        (None, Some(g)) => g.reverse(location.latitude, location.longitude).await,
        (None, None) => None,
    };

    match address {
        Some(address) => format!("[user shared a location: {}]", address),
        None => {
            warn!("Location could not be resolved to an address");
            format!(
                "[user shared a location: {:.6}, {:.6} (address unavailable)]",
                location.latitude, location.longitude
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGeocoder(Option<&'static str>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn reverse(&self, _latitude: f64, _longitude: f64) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct FixedTranscriber(Option<&'static str>);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _clip: &AudioClip) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn voice_note() -> AudioClip {
        AudioClip {
            content_type: "audio/ogg".into(),
            url: None,
            data: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_plain_text_untouched() {
        let msg = InboundMessage::text("521", "  hola  ");
        assert_eq!(compose_user_text(&msg, None, None).await, "hola");
    }

    #[tokio::test]
    async fn test_location_resolved_by_geocoder() {
        let msg = InboundMessage::text("521", "aquí hay una fuga")
            .with_location(SharedLocation::new(20.67, -103.35));
        let geocoder = FixedGeocoder(Some("Av. Juárez 10, Guadalajara"));

        let text = compose_user_text(&msg, Some(&geocoder), None).await;
        assert_eq!(
            text,
            "aquí hay una fuga\n[user shared a location: Av. Juárez 10, Guadalajara]"
        );
    }

    #[tokio::test]
    async fn test_location_degrades_without_address() {
        let msg = InboundMessage::text("521", "").with_location(SharedLocation::new(20.5, -103.25));
        let geocoder = FixedGeocoder(None);

        let text = compose_user_text(&msg, Some(&geocoder), None).await;
        assert!(text.starts_with("[user shared a location: 20.500000, -103.250000"));
        assert!(text.contains("address unavailable"));
    }

    #[tokio::test]
    async fn test_channel_address_wins_over_geocoder() {
        let mut location = SharedLocation::new(1.0, 2.0);
        location.address = Some("Calle 5 #12".into());
        let msg = InboundMessage::text("521", "").with_location(location);
        let geocoder = FixedGeocoder(Some("elsewhere"));

        let text = compose_user_text(&msg, Some(&geocoder), None).await;
        assert_eq!(text, "[user shared a location: Calle 5 #12]");
    }

    #[tokio::test]
    async fn test_voice_note() {
        let msg = InboundMessage::text("521", "").with_audio(voice_note());

        let heard = compose_user_text(&msg, None, Some(&FixedTranscriber(Some("no tengo agua")))).await;
        assert_eq!(heard, "[voice note: no tengo agua]");

        let unheard = compose_user_text(&msg, None, None).await;
        assert_eq!(unheard, "[user sent a voice note that could not be transcribed]");
    }

    #[tokio::test]
    async fn test_bare_image_is_annotated() {
        let msg = InboundMessage::text("521", "").with_image("https://img.example/leak.jpg");
        assert_eq!(compose_user_text(&msg, None, None).await, "[user sent an image]");

        let captioned = InboundMessage::text("521", "mira").with_image("https://img.example/leak.jpg");
        assert_eq!(compose_user_text(&captioned, None, None).await, "mira");
    }
}
