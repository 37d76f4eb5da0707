//! Integration tests for events

#[cfg(test)]
mod tests {
    use paygen_events::*;

    #[tokio::test]
    async fn test_event_sender_emits_in_order() {
        let (tx, mut rx) = channel();

        tx.emit_download_started("gs://chromeos-releases/a.bin");
        tx.emit_cache_hit("gs://chromeos-releases/a.bin");

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.event,
            AppEvent::Download(DownloadEvent::Started { .. })
        ));

        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.event,
            AppEvent::Download(DownloadEvent::CacheHit { .. })
        ));
        assert_eq!(second.meta.source, EventSource::DOWNLOAD);
        assert_ne!(first.meta.event_id, second.meta.event_id);
    }

    struct RunEmitter {
        tx: EventSender,
        run_id: String,
    }

    impl EventEmitter for RunEmitter {
        fn event_sender(&self) -> Option<&EventSender> {
            Some(&self.tx)
        }

        fn correlation_id(&self) -> Option<&str> {
            Some(&self.run_id)
        }
    }

    #[tokio::test]
    async fn test_correlation_id_is_stamped() {
        let (tx, mut rx) = channel();
        let emitter = RunEmitter {
            tx,
            run_id: "run-42".into(),
        };

        emitter.emit_process_started("delta_generator", &["--major_version=2".into()], None);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.meta.correlation_id.as_deref(), Some("run-42"));
        assert_eq!(message.meta.level, EventLevel::Debug);
    }

    #[test]
    fn test_message_serialization() {
        let message = EventMessage::from_event(AppEvent::Signing(SigningEvent::Requested {
            signer: "local".into(),
            hashes: 2,
            keysets: vec!["update_signer".into()],
        }));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["meta"]["source"], "signing");
        assert_eq!(json["meta"]["level"], "info");
        assert_eq!(json["event"]["domain"], "signing");
        assert_eq!(json["event"]["event"]["hashes"], 2);
    }
}
