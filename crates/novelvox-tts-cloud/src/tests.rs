//! Tests for the cloud adapter's fetch path and pre-fetch cache

#[cfg(test)]
mod tests {
    use crate::{AudioSink, CloudBackend, SynthFetch};
    use async_trait::async_trait;
    use novelvox_tts::{SegmentOutcome, SpeechBackend, SpeechParams, TtsError, TtsResult};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingFetch {
        fetches: AtomicUsize,
        fail: bool,
    }

    impl CountingFetch {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl SynthFetch for CountingFetch {
        async fn fetch(&self, text: &str, _params: &SpeechParams) -> TtsResult<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TtsError::Network("connection refused".into()));
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<Vec<u8>>>,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, audio: Vec<u8>) -> TtsResult<SegmentOutcome> {
            self.played.lock().push(audio);
            Ok(SegmentOutcome::Completed)
        }
        fn pause(&self) {}
        fn resume(&self) {}
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn backend() -> (CloudBackend, Arc<CountingFetch>, Arc<RecordingSink>) {
        let fetch = Arc::new(CountingFetch::new());
        let sink = Arc::new(RecordingSink::default());
        (CloudBackend::new(fetch.clone(), sink.clone()), fetch, sink)
    }

    #[tokio::test]
    async fn test_speak_fetches_and_plays() {
        let (backend, fetch, sink) = backend();
        let outcome = backend
            .speak_segment("hello", &SpeechParams::default(), None)
            .await
            .unwrap();
        assert_eq!(outcome, SegmentOutcome::Completed);
        assert_eq!(fetch.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(sink.played.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_prefetched_segment_is_not_fetched_twice() {
        let (backend, fetch, _sink) = backend();
        let params = SpeechParams::default();
        backend.prefetch("chapter two", &params).await;
        backend.prefetch("chapter two", &params).await;
        backend
            .speak_segment("chapter two", &params, None)
            .await
            .unwrap();
        assert_eq!(fetch.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prefetch_cache_evicts_oldest() {
        let (backend, fetch, _sink) = backend();
        let params = SpeechParams::default();
        for i in 0..6 {
            backend.prefetch(&format!("segment {i}"), &params).await;
        }
        assert_eq!(backend.cached_count(), 4);

        // The oldest entry was evicted, so speaking it fetches again.
        backend
            .speak_segment("segment 0", &params, None)
            .await
            .unwrap();
        assert_eq!(fetch.fetches.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_prefetch_failure_is_silent_and_playback_refetches() {
        let fetch = Arc::new(CountingFetch::failing());
        let sink = Arc::new(RecordingSink::default());
        let backend = CloudBackend::new(fetch.clone(), sink);
        let params = SpeechParams::default();

        backend.prefetch("text", &params).await;
        let err = backend
            .speak_segment("text", &params, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Network(_)));
        assert_eq!(fetch.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_segment_is_rejected_before_any_network_call() {
        let (backend, fetch, _sink) = backend();
        let text = "a".repeat(5001);
        let err = backend
            .speak_segment(&text, &SpeechParams::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)));
        assert_eq!(fetch.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_reaches_the_sink() {
        let (backend, _fetch, sink) = backend();
        backend.stop().await;
        assert_eq!(sink.stops.load(Ordering::SeqCst), 1);
    }
}
