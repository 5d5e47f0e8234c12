//! Tests for the native adapter's resolution and bounding behavior

#[cfg(test)]
mod tests {
    use crate::{NativeBackend, NativeSynthBridge};
    use async_trait::async_trait;
    use novelvox_tts::{
        SegmentOutcome, SpeechBackend, SpeechParams, TtsError, TtsResult, VoiceInfo,
        SYSTEM_DEFAULT_VOICE_ID,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct SpokenCall {
        language: String,
        voice_id: Option<String>,
    }

    struct ScriptedBridge {
        installed: bool,
        available_languages: Vec<String>,
        engine_accepts: Vec<String>,
        locale: String,
        voices: Vec<VoiceInfo>,
        hang: bool,
        calls: Mutex<Vec<SpokenCall>>,
        prompts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl Default for ScriptedBridge {
        fn default() -> Self {
            Self {
                installed: true,
                available_languages: vec!["en-US".into(), "en".into()],
                engine_accepts: vec!["en-US".into(), "en".into()],
                locale: "en-US".into(),
                voices: Vec::new(),
                hang: false,
                calls: Mutex::new(Vec::new()),
                prompts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NativeSynthBridge for ScriptedBridge {
        async fn engine_installed(&self) -> bool {
            self.installed
        }

        async fn prompt_engine_install(&self) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
        }

        async fn is_language_available(&self, tag: &str) -> bool {
            self.available_languages.iter().any(|l| l == tag)
        }

        fn device_locale(&self) -> String {
            self.locale.clone()
        }

        async fn voices(&self) -> Vec<VoiceInfo> {
            self.voices.clone()
        }

        async fn speak(
            &self,
            _text: &str,
            voice_id: Option<&str>,
            language: &str,
            _rate: f32,
            _pitch: f32,
        ) -> TtsResult<SegmentOutcome> {
            self.calls.lock().push(SpokenCall {
                language: language.to_string(),
                voice_id: voice_id.map(str::to_string),
            });
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.engine_accepts.iter().any(|l| l == language) {
                Ok(SegmentOutcome::Completed)
            } else {
                Err(TtsError::LanguageNotSupported(language.to_string()))
            }
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn params(language: Option<&str>, voice_id: Option<&str>) -> SpeechParams {
        SpeechParams {
            voice_id: voice_id.map(str::to_string),
            language: language.map(str::to_string),
            ..SpeechParams::default()
        }
    }

    fn voice(id: &str, name: &str, language: &str) -> VoiceInfo {
        VoiceInfo {
            id: id.to_string(),
            name: name.to_string(),
            language: language.to_string(),
            is_on_device: true,
        }
    }

    #[tokio::test]
    async fn test_exact_language_used_when_supported() {
        let bridge = Arc::new(ScriptedBridge {
            available_languages: vec!["ja-JP".into()],
            engine_accepts: vec!["ja-JP".into()],
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge.clone());

        let outcome = backend
            .speak_segment("テスト", &params(Some("ja-JP"), None), None)
            .await
            .unwrap();
        assert_eq!(outcome, SegmentOutcome::Completed);
        assert_eq!(bridge.calls.lock()[0].language, "ja-JP");
    }

    #[tokio::test]
    async fn test_relaxed_retry_after_engine_rejection() {
        // The support check claims both tags work, the engine rejects the
        // exact tag; one relaxed retry must succeed without escalating.
        let bridge = Arc::new(ScriptedBridge {
            available_languages: vec!["pt-BR".into(), "pt".into()],
            engine_accepts: vec!["pt".into()],
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge.clone());

        let outcome = backend
            .speak_segment("olá", &params(Some("pt-BR"), None), None)
            .await
            .unwrap();
        assert_eq!(outcome, SegmentOutcome::Completed);
        let languages: Vec<_> = bridge.calls.lock().iter().map(|c| c.language.clone()).collect();
        assert_eq!(languages, vec!["pt-BR", "pt"]);
    }

    #[tokio::test]
    async fn test_unavailable_languages_skipped_before_attempting() {
        let bridge = Arc::new(ScriptedBridge {
            available_languages: vec!["en-US".into()],
            engine_accepts: vec!["en-US".into()],
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge.clone());

        backend
            .speak_segment("hi", &params(Some("xx-XX"), None), None)
            .await
            .unwrap();
        // Neither "xx-XX" nor "xx" reached the engine.
        assert_eq!(bridge.calls.lock()[0].language, "en-US");
    }

    #[tokio::test]
    async fn test_ladder_is_bounded_and_ends_in_language_error() {
        let bridge = Arc::new(ScriptedBridge {
            available_languages: vec![
                "xx-XX".into(),
                "xx".into(),
                "en-US".into(),
                "en".into(),
            ],
            engine_accepts: Vec::new(),
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge.clone());

        let err = backend
            .speak_segment("hi", &params(Some("xx-XX"), None), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::LanguageNotSupported(_)));
        assert!(bridge.calls.lock().len() <= 5);
    }

    #[tokio::test]
    async fn test_voice_resolved_by_id_not_position() {
        let bridge = Arc::new(ScriptedBridge {
            voices: vec![
                voice("v-99", "Second", "en-US"),
                voice("v-1", "First", "en-US"),
            ],
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge.clone());

        backend
            .speak_segment("hi", &params(Some("en-US"), Some("v-1")), None)
            .await
            .unwrap();
        assert_eq!(bridge.calls.lock()[0].voice_id.as_deref(), Some("v-1"));
    }

    #[tokio::test]
    async fn test_unknown_voice_falls_back_to_engine_default() {
        let bridge = Arc::new(ScriptedBridge {
            voices: vec![voice("v-1", "First", "en-US")],
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge.clone());

        backend
            .speak_segment("hi", &params(Some("en-US"), Some("gone")), None)
            .await
            .unwrap();
        assert_eq!(bridge.calls.lock()[0].voice_id, None);
    }

    #[tokio::test]
    async fn test_hung_engine_call_times_out_and_stops() {
        let bridge = Arc::new(ScriptedBridge {
            hang: true,
            ..Default::default()
        });
        let backend = NativeBackend::with_timeout(bridge.clone(), Duration::from_millis(50));

        let err = backend
            .speak_segment("hi", &params(Some("en-US"), None), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Timeout(_)));
        assert_eq!(bridge.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_engine_prompts_install_once() {
        let bridge = Arc::new(ScriptedBridge {
            installed: false,
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge.clone());

        for _ in 0..3 {
            let err = backend
                .speak_segment("hi", &params(None, None), None)
                .await
                .unwrap_err();
            assert!(matches!(err, TtsError::EngineNotInstalled(_)));
        }
        assert_eq!(bridge.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_invalid_input() {
        let backend = NativeBackend::new(Arc::new(ScriptedBridge::default()));
        let err = backend
            .speak_segment("   ", &SpeechParams::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_voice_catalog_is_normalized() {
        let bridge = Arc::new(ScriptedBridge {
            voices: vec![voice("v-1", "", "en-US")],
            ..Default::default()
        });
        let backend = NativeBackend::new(bridge);

        let voices = backend.list_voices().await.unwrap();
        assert_eq!(voices[0].id, SYSTEM_DEFAULT_VOICE_ID);
        assert_eq!(voices[1].name, "v-1");
    }
}
