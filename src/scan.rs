/// Turns a captured frame into the text encoded in its QR code, if any.
pub trait QrDecoder {
    fn decode(&self, frame: &[u8]) -> Option<String>;
}

/// For front ends that run the camera decoder themselves and forward the
/// decoded text as the frame.
pub struct TextPayloadDecoder;

impl QrDecoder for TextPayloadDecoder {
    fn decode(&self, frame: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(frame);
        let t = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    }
}

/// Camera mode toggle plus the last payload seen, so a code held in front
/// of the camera is only checked in once per presentation.
#[derive(Debug, Default)]
pub struct ScanState {
    active: bool,
    last_payload: Option<String>,
}

impl ScanState {
    pub fn start(&mut self) {
        self.active = true;
        self.last_payload = None;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Records `payload`; false when it repeats the previous one.
    pub fn accept(&mut self, payload: &str) -> bool {
        if self.last_payload.as_deref() == Some(payload) {
            return false;
        }
        self.last_payload = Some(payload.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_decoder_strips_padding() {
        let d = TextPayloadDecoder;
        assert_eq!(d.decode(b"  101\n\0").as_deref(), Some("101"));
        assert_eq!(d.decode(b" \0 \t"), None);
        assert_eq!(d.decode(b""), None);
    }

    #[test]
    fn repeated_payload_is_rejected_until_it_changes_or_restarts() {
        let mut s = ScanState::default();
        assert!(!s.is_active());
        s.start();
        assert!(s.accept("101"));
        assert!(!s.accept("101"));
        assert!(s.accept("102"));
        assert!(s.accept("101"));
        s.stop();
        s.start();
        assert!(s.accept("101"));
    }
}
