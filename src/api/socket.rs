use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};

use super::messages::{ClientMessage, Record, ServerMessage};
use crate::scheduler::ChannelReporter;
use crate::server::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("WebSocket connected");
    let (mut sender, mut receiver) = socket.split();

    while let Some(incoming) = receiver.next().await {
        let text = match incoming {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive failed");
                break;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::StartEnrichment { companies }) => {
                if !run_enrichment(&state, companies, &mut sender, &mut receiver).await {
                    break;
                }
            }
            Err(e) => {
                let reply = ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                };
                if send(&mut sender, &reply).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("WebSocket disconnected");
}

/// Run one batch, streaming each outcome as it completes.
///
/// Returns `false` once the connection is gone. Leaving early for any reason
/// cancels the batch.
async fn run_enrichment<S, R>(
    state: &Arc<AppState>,
    companies: Vec<Record>,
    sender: &mut S,
    receiver: &mut R,
) -> bool
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let cancel = state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();
    let (reporter, mut events) = ChannelReporter::new(companies.len());

    let batch = {
        let state = Arc::clone(state);
        let pipeline = Arc::clone(&state.light_enrich);
        tokio::spawn(async move {
            state
                .scheduler
                .run_records(pipeline, companies, Arc::new(reporter), cancel)
                .await
        })
    };

    // The channel closes once the batch has dropped every reporter handle.
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if send(sender, &ServerMessage::ItemComplete(event)).await.is_err() {
                        tracing::info!("Client went away, cancelling batch");
                        return false;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {
                    tracing::info!("Client disconnected, cancelling batch");
                    return false;
                }
                Some(Ok(_)) => tracing::debug!("Ignoring message while a batch is running"),
            },
        }
    }

    let reply = match batch.await {
        Ok(Ok(data)) => ServerMessage::EnrichmentComplete { data },
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Batch failed");
            ServerMessage::Error {
                message: e.to_string(),
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Batch task failed");
            ServerMessage::Error {
                message: "enrichment task failed".to_string(),
            }
        }
    };
    guard.disarm();

    send(sender, &reply).await.is_ok()
}

async fn send<S>(sender: &mut S, message: &ServerMessage) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server message");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}
