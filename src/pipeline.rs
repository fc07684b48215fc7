//! Intent-to-action dispatch pipeline
//!
//! text → classifier → gate → {executor | conversational fallback} → composer

use crate::command::ActionExecutor;
use crate::llm::{Conversationalist, IntentClassifier};
use anyhow::{Context, Result};
use homelink_shared::{
    compose, Composed, DeviceRegistry, DispatchDecision, DispatchGate, IntentResult, Resolution,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Processes one request at a time; shareable across concurrent requests
pub struct Pipeline {
    classifier: Arc<dyn IntentClassifier>,
    responder: Arc<dyn Conversationalist>,
    gate: DispatchGate,
    executor: ActionExecutor,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        responder: Arc<dyn Conversationalist>,
        gate: DispatchGate,
        executor: ActionExecutor,
    ) -> Self {
        Self {
            classifier,
            responder,
            gate,
            executor,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        self.gate.registry()
    }

    pub fn threshold(&self) -> f32 {
        self.gate.threshold()
    }

    /// Handle one message end to end
    ///
    /// Only a failing conversational fallback is returned as `Err`; every
    /// other failure is folded into the composed reply.
    pub async fn handle(&self, message: &str) -> Result<Composed> {
        let intent = match self.classifier.classify(message, self.registry()).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(
                    "Classifier {} failed, treating as no intent: {:#}",
                    self.classifier.name(),
                    e
                );
                IntentResult::none()
            }
        };

        let decision = self.gate.decide(&intent);
        info!(
            "Intent {} device={:?} confidence={:.2} -> {}",
            intent.action,
            intent.device,
            intent.confidence,
            decision.label()
        );

        let resolution = match &decision {
            DispatchDecision::Execute { device, action } => {
                Resolution::Executed(self.executor.execute(device, *action).await)
            }
            DispatchDecision::Fallback => {
                let text = self
                    .responder
                    .respond(message)
                    .await
                    .with_context(|| format!("Responder {} failed", self.responder.name()))?;
                Resolution::Conversation(text)
            }
            DispatchDecision::Reject(reason) => {
                warn!(
                    "Rejected {} on {:?}: {}",
                    intent.action, intent.device, reason
                );
                Resolution::Refused
            }
        };

        let composed = compose(&decision, &resolution, &intent);
        debug!("Reply ({:?}): {}", composed.status, composed.reply);
        Ok(composed)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use homelink_shared::{Action, ErrorCategory, ReplyStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Classifier returning canned model output
    struct CannedClassifier {
        output: Option<&'static str>,
    }

    #[async_trait]
    impl IntentClassifier for CannedClassifier {
        async fn classify(&self, _message: &str, _whitelist: &DeviceRegistry) -> Result<IntentResult> {
            match self.output {
                Some(raw) => Ok(IntentResult::from_model_output(raw)),
                None => Err(anyhow!("connection refused")),
            }
        }

        fn name(&self) -> &'static str {
            "canned"
        }
    }

    /// Responder that counts calls
    struct EchoResponder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Conversationalist for EchoResponder {
        async fn respond(&self, message: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("model offline"));
            }
            Ok(format!("You said: {}", message))
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct Fixture {
        pipeline: Pipeline,
        responder: Arc<EchoResponder>,
        _dir: tempfile::TempDir,
        marker: std::path::PathBuf,
    }

    /// Pipeline whose controller is `sh -c <script>`; the script may use
    /// `$MARKER` to prove it ran.
    fn fixture(output: Option<&'static str>, script: &str, timeout_ms: u64, fail: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch '{}'; {}", marker.display(), script);

        let registry = Arc::new(
            DeviceRegistry::from_json(
                r#"{"lights": {"payloads": {"turn_on": "3101", "turn_off": "3100"}}}"#,
            )
            .unwrap(),
        );
        let controller = ControllerConfig {
            program: "sh".into(),
            prefix_args: vec!["-c".into(), script, "controller".into()],
            timeout: Duration::from_millis(timeout_ms),
        };
        let responder = Arc::new(EchoResponder {
            calls: AtomicUsize::new(0),
            fail,
        });

        let pipeline = Pipeline::new(
            Arc::new(CannedClassifier { output }),
            responder.clone(),
            DispatchGate::new(registry.clone(), 0.65),
            ActionExecutor::new(registry, &controller),
        );

        Fixture {
            pipeline,
            responder,
            _dir: dir,
            marker,
        }
    }

    #[tokio::test]
    async fn test_turn_on_lights() {
        let f = fixture(
            Some(r#"{"intent":"turn_on","device":"lights","confidence":0.9,"reason":"asked"}"#),
            r#"echo '{"ok":true,"device":"lights"}'"#,
            5000,
            false,
        );

        let composed = f.pipeline.handle("turn on the lights").await.unwrap();
        assert_eq!(composed.status, ReplyStatus::Ok);
        assert!(composed.reply.contains("lights"));
        assert!(composed.reply.contains("on"));
        assert_eq!(composed.meta.decision, "execute");
        assert!(f.marker.exists());
        assert_eq!(f.responder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_device_rejected_without_spawning() {
        let f = fixture(
            Some(r#"{"intent":"turn_off","device":"fan","confidence":0.9,"reason":"asked"}"#),
            r#"echo '{"ok":true}'"#,
            5000,
            false,
        );

        let composed = f.pipeline.handle("turn off the fan").await.unwrap();
        assert_eq!(composed.status, ReplyStatus::Rejected);
        assert_ne!(composed.status.http_code(), 200);
        assert_eq!(composed.meta.decision, "reject");
        assert!(composed.meta.outcome.is_none());
        assert!(!f.marker.exists());
        assert_eq!(f.responder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparsable_classification_falls_back() {
        let f = fixture(Some("I think they want lights?"), "exit 0", 5000, false);

        let composed = f.pipeline.handle("hello there").await.unwrap();
        assert_eq!(composed.status, ReplyStatus::Ok);
        assert_eq!(composed.reply, "You said: hello there");
        assert_eq!(composed.meta.intent, IntentResult::none());
        assert_eq!(composed.meta.decision, "fallback");
        assert!(!f.marker.exists());
    }

    #[tokio::test]
    async fn test_low_confidence_falls_back() {
        let f = fixture(
            Some(r#"{"intent":"turn_on","device":"lights","confidence":0.4}"#),
            r#"echo '{"ok":true}'"#,
            5000,
            false,
        );

        let composed = f.pipeline.handle("lights maybe").await.unwrap();
        assert_eq!(composed.meta.decision, "fallback");
        assert_eq!(composed.meta.intent.action, Action::TurnOn);
        assert!(!f.marker.exists());
        assert_eq!(f.responder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_classifier_outage_falls_back() {
        let f = fixture(None, "exit 0", 5000, false);

        let composed = f.pipeline.handle("turn on the lights").await.unwrap();
        assert_eq!(composed.meta.decision, "fallback");
        assert_eq!(f.responder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_controller_timeout_is_reported() {
        let f = fixture(
            Some(r#"{"intent":"turn_on","device":"lights","confidence":0.9}"#),
            "exec sleep 30",
            300,
            false,
        );

        let composed = f.pipeline.handle("turn on the lights").await.unwrap();
        assert_eq!(composed.status, ReplyStatus::TimedOut);
        assert!(composed.reply.contains("TIMEOUT"));
        let outcome = composed.meta.outcome.unwrap();
        assert!(!outcome.ok);
        assert_eq!(
            outcome.failure.map(|f| f.category),
            Some(ErrorCategory::Timeout)
        );
    }

    #[tokio::test]
    async fn test_responder_failure_is_error() {
        let f = fixture(Some(r#"{"intent":"none"}"#), "exit 0", 5000, true);
        assert!(f.pipeline.handle("tell me a joke").await.is_err());
    }
}
