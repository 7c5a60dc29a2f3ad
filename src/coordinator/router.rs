//! Message dispatch for the coordinator context.

use tokio::task::JoinHandle;

use super::lifecycle::Coordinator;
use crate::protocol::{Envelope, ErrorCode, Inbox, Request, Response, TabId};

impl Coordinator {
    /// Answer one cross-context message
    pub async fn handle(&self, envelope: Envelope) -> Response {
        let sender_tab = envelope.sender.tab_id;
        match envelope.message {
            Request::StartSession { tab_id, mode } => match self.request_start(tab_id, mode).await {
                Ok(()) => Response::Ok,
                Err(err) => err.into(),
            },
            Request::StopSession => match self.request_stop().await {
                Ok(bundle) => Response::Stopped { bundle },
                Err(err) => err.into(),
            },
            Request::RecordAction { action } => {
                self.record_action(sender_tab, action);
                Response::Ok
            }
            Request::RecordConsoleLine { entry } => {
                self.record_console_line(sender_tab, entry);
                Response::Ok
            }
            Request::RecordPageNetworkLog { log } => {
                self.record_page_network_log(sender_tab, log);
                Response::Ok
            }
            Request::GetState => Response::State(self.get_state()),
            Request::GetSessionLogs => Response::Logs {
                logs: self.session_logs(),
            },
            Request::CaptureVisibleFrame { tab_id } => {
                let Some(tab) = self.target_tab(tab_id, sender_tab) else {
                    return no_target();
                };
                match self.deps().page.capture_visible_frame(tab).await {
                    Ok(image_data) => Response::Frame { image_data },
                    Err(err) => Response::error(ErrorCode::HostFailure, err.to_string()),
                }
            }
            Request::ExecutePageProbe { tab_id } => {
                let Some(tab) = self.target_tab(tab_id, sender_tab) else {
                    return no_target();
                };
                match self.deps().page.execute_page_probe(tab).await {
                    Ok(data) => Response::Probe { data },
                    Err(err) => Response::error(ErrorCode::HostFailure, err.to_string()),
                }
            }
            Request::SessionBundleConsumed => {
                self.session_bundle_consumed().await;
                Response::Ok
            }
            Request::CaptureConfirmed => {
                self.capture_confirmed(sender_tab).await;
                Response::Ok
            }
            Request::CaptureCancelled => {
                self.capture_cancelled(sender_tab).await;
                Response::Ok
            }
            Request::CaptureFailed { error } => {
                self.capture_failed(sender_tab, error).await;
                Response::Ok
            }
        }
    }

    /// Decode and answer a message in wire form
    pub async fn handle_raw(&self, raw: &str) -> Response {
        match Envelope::decode(raw) {
            Ok(envelope) => self.handle(envelope).await,
            Err(err) => {
                tracing::debug!(error = %err, "rejecting undecodable message");
                Response::error(ErrorCode::UnknownMessage, err.to_string())
            }
        }
    }

    /// Explicit tab, then the sender's tab, then the recording tab
    fn target_tab(&self, explicit: Option<TabId>, sender_tab: Option<TabId>) -> Option<TabId> {
        explicit
            .or(sender_tab)
            .or_else(|| self.session().tab_id())
    }

    /// Run the coordinator as a context. Long operations get their own task;
    /// record messages are applied inline so their order is preserved.
    pub fn serve(self, mut inbox: Inbox<Envelope, Response>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.restore().await;
            while let Some(incoming) = inbox.recv().await {
                let (envelope, responder) = incoming.into_parts();
                let kind = envelope.message.kind_name();
                if is_long_running(&envelope.message) {
                    let coordinator = self.clone();
                    tokio::spawn(async move {
                        let response = coordinator.handle(envelope).await;
                        if !responder.respond(response) {
                            tracing::debug!(kind, "requester went away before the response");
                        }
                    });
                } else {
                    let response = self.handle(envelope).await;
                    if !responder.respond(response) {
                        tracing::debug!(kind, "requester went away before the response");
                    }
                }
            }
            tracing::debug!("coordinator inbox closed");
        })
    }
}

fn is_long_running(request: &Request) -> bool {
    matches!(
        request,
        Request::StartSession { .. }
            | Request::StopSession
            | Request::CaptureVisibleFrame { .. }
            | Request::ExecutePageProbe { .. }
            | Request::SessionBundleConsumed
            | Request::CaptureConfirmed
            | Request::CaptureCancelled
            | Request::CaptureFailed { .. }
    )
}

fn no_target() -> Response {
    Response::error(ErrorCode::NoTargetTab, "no tab to target")
}
