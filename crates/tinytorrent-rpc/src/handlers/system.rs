//! `system-*` methods backed by [`ShellIntegration`](crate::shell::ShellIntegration).

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::args::{field, request_path};
use crate::context::RpcContext;
use crate::dispatcher::Dispatcher;
use crate::error::{RpcError, RpcResult};
use crate::shell::ShellOutcome;

fn action_result(action: &'static str, outcome: ShellOutcome) -> RpcResult<Value> {
    if !outcome.success {
        let message = if outcome.message.is_empty() {
            format!("{action} failed")
        } else {
            outcome.message
        };
        return Err(RpcError::new(message)
            .with_field("action", action)
            .with_field("success", false));
    }
    let mut body = Map::new();
    body.insert("action".into(), Value::from(action));
    body.insert("success".into(), Value::Bool(true));
    if !outcome.message.is_empty() {
        body.insert("message".into(), Value::from(outcome.message));
    }
    Ok(Value::Object(body))
}

pub(super) fn register(dispatcher: &mut Dispatcher, ctx: &Arc<RpcContext>) {
    let shell_ctx = Arc::clone(ctx);
    dispatcher.register_async("system-reveal", move |arguments| {
        let shell = shell_ctx.shell();
        async move {
            let path = request_path(field(&arguments, "path"))
                .ok_or_else(|| RpcError::new("path required"))?;
            info!(path = %path.display(), "revealing path");
            action_result("system-reveal", shell.reveal(&path).await)
        }
    });

    let shell_ctx = Arc::clone(ctx);
    dispatcher.register_async("system-open", move |arguments| {
        let shell = shell_ctx.shell();
        async move {
            let path = request_path(field(&arguments, "path"))
                .ok_or_else(|| RpcError::new("path required"))?;
            info!(path = %path.display(), "opening path");
            action_result("system-open", shell.open(&path).await)
        }
    });

    let shell_ctx = Arc::clone(ctx);
    dispatcher.register_async("system-register-handler", move |_arguments| {
        let shell = shell_ctx.shell();
        async move { action_result("system-register-handler", shell.register_handler().await) }
    });
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;
    use tinytorrent_engine::InMemoryEngine;
    use tinytorrent_events::EventBus;

    use super::super::build_dispatcher;
    use super::super::test_support::harness;
    use crate::context::RpcContext;
    use crate::shell::{ShellIntegration, ShellOutcome};

    #[derive(Default)]
    struct RecordingShell {
        revealed: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl ShellIntegration for RecordingShell {
        async fn reveal(&self, path: &Path) -> ShellOutcome {
            self.revealed.lock().expect("lock").push(path.to_path_buf());
            ShellOutcome::done()
        }

        async fn open(&self, _path: &Path) -> ShellOutcome {
            ShellOutcome {
                success: true,
                message: "opened".into(),
            }
        }

        async fn register_handler(&self) -> ShellOutcome {
            ShellOutcome::failed("")
        }
    }

    #[tokio::test]
    async fn headless_shell_reports_failures() {
        let h = harness();
        let response = h.call_async("system-reveal", json!({"path": "/tmp"})).await;
        assert_eq!(
            response["arguments"],
            json!({"message": "unable to reveal path", "action": "system-reveal", "success": false})
        );
        let response = h.call_async("system-open", json!({})).await;
        assert_eq!(response["arguments"]["message"], "path required");
    }

    #[tokio::test]
    async fn shell_outcomes_become_action_objects() {
        let shell = Arc::new(RecordingShell::default());
        let ctx = Arc::new(
            RpcContext::new(Arc::new(InMemoryEngine::default()), EventBus::new())
                .with_shell(shell.clone()),
        );
        let dispatcher = build_dispatcher(ctx);
        let call = |method: &str, arguments: serde_json::Value| {
            let payload = json!({"method": method, "arguments": arguments}).to_string();
            let (tx, rx) = tokio::sync::oneshot::channel();
            dispatcher.dispatch(payload.as_bytes(), move |body| {
                let _ = tx.send(body);
            });
            async move {
                serde_json::from_str::<serde_json::Value>(&rx.await.expect("body")).expect("json")
            }
        };

        let response = call("system-reveal", json!({"path": "/srv/media"})).await;
        assert_eq!(
            response["arguments"],
            json!({"action": "system-reveal", "success": true})
        );
        assert_eq!(
            shell.revealed.lock().expect("lock").as_slice(),
            &[PathBuf::from("/srv/media")]
        );

        let response = call("system-open", json!({"path": "/srv/media/a.mkv"})).await;
        assert_eq!(response["arguments"]["message"], "opened");

        let response = call("system-register-handler", json!(null)).await;
        assert_eq!(response["result"], "error");
        assert_eq!(
            response["arguments"]["message"],
            "system-register-handler failed"
        );
    }
}
