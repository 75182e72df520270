use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Notification, Notifier};
use crate::consts::WEBHOOK_TIMEOUT;
use crate::queue::job::NotifyTarget;

/// Header carrying the caller's shared secret.
pub const SECRET_HEADER: &str = "X-Webhook-Secret";

/// Posts notifications as JSON to the job's webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(format!("scribe/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, target: &NotifyTarget, notification: &Notification) -> Result<()> {
        debug!(url = %target.url, event = notification.event_name(), "sending webhook");

        let mut req = self
            .client
            .post(&target.url)
            .header("content-type", "application/json")
            .json(notification);
        if let Some(secret) = &target.secret {
            req = req.header(SECRET_HEADER, secret);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("no response from {}", target.url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(url = %target.url, %status, "webhook rejected");
            bail!("webhook returned HTTP {status}: {body}");
        }

        debug!(url = %target.url, %status, "webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    /// Accept one request, reply with `status`, hand back the raw request.
    async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            l.to_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }
            let reply = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}/hook"), handle)
    }

    fn notification() -> Notification {
        Notification::job_completed(Uuid::nil(), 0, 0, 0, vec![])
    }

    #[tokio::test]
    async fn posts_json_with_secret_header() {
        let (url, server) = one_shot_server("200 OK").await;
        let notifier = WebhookNotifier::new().unwrap();
        let target = NotifyTarget::new(url, Some("s3cret".to_string()));

        notifier.notify(&target, &notification()).await.unwrap();

        let request = server.await.unwrap();
        let lower = request.to_lowercase();
        assert!(request.starts_with("POST /hook"));
        assert!(lower.contains("x-webhook-secret: s3cret"));
        assert!(lower.contains("content-type: application/json"));
        assert!(request.contains("\"event\":\"job.completed\""));
    }

    #[tokio::test]
    async fn no_secret_no_header() {
        let (url, server) = one_shot_server("204 No Content").await;
        let notifier = WebhookNotifier::new().unwrap();

        notifier
            .notify(&NotifyTarget::new(url, None), &notification())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(!request.to_lowercase().contains("x-webhook-secret"));
    }

    #[tokio::test]
    async fn non_2xx_is_error() {
        let (url, server) = one_shot_server("500 Internal Server Error").await;
        let notifier = WebhookNotifier::new().unwrap();

        let err = notifier
            .notify(&NotifyTarget::new(url, None), &notification())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_is_error() {
        let notifier = WebhookNotifier::new().unwrap();
        let target = NotifyTarget::new("http://127.0.0.1:1/hook", None);
        assert!(notifier.notify(&target, &notification()).await.is_err());
    }
}
