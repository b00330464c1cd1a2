use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use shared::{ClientToServer, ServerToClient};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::routes::auth::verify_token;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    // Channel for frames destined for this client
    let (tx, mut rx) = mpsc::channel::<ServerToClient>(32);

    // Task to forward frames from the hub to the websocket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                break;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // The first frame must authenticate; everything else is rejected
    let user_id = match authenticate(&state, &mut receiver, &tx).await {
        Some(user_id) => user_id,
        None => {
            // Let queued frames (the failure notice) flush before hanging up
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    state.hub.register(connection_id, tx.clone());
    tracing::info!("subscriber authenticated: {} ({})", user_id, connection_id);

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        match serde_json::from_str::<ClientToServer>(&text) {
            Ok(ClientToServer::Authenticate { .. }) => {
                let _ = tx
                    .send(ServerToClient::Authenticated {
                        user_id: user_id.clone(),
                    })
                    .await;
            }
            Ok(ClientToServer::Subscribe { topic }) => {
                state.hub.subscribe(connection_id, topic.clone());
                let _ = tx.send(ServerToClient::Subscribed { topic }).await;
            }
            Ok(ClientToServer::Unsubscribe { topic }) => {
                state.hub.unsubscribe(&connection_id, &topic);
                let _ = tx.send(ServerToClient::Unsubscribed { topic }).await;
            }
            Err(err) => {
                let _ = tx
                    .send(ServerToClient::Error {
                        message: format!("invalid frame: {err}"),
                    })
                    .await;
            }
        }
    }

    // Teardown drops every subscription this connection held
    state.hub.unregister(&connection_id);
    drop(tx);
    let _ = send_task.await;
    tracing::info!("subscriber disconnected: {} ({})", user_id, connection_id);
}

async fn authenticate(
    state: &AppState,
    receiver: &mut SplitStream<WebSocket>,
    tx: &mpsc::Sender<ServerToClient>,
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        match serde_json::from_str::<ClientToServer>(&text) {
            Ok(ClientToServer::Authenticate { token }) => {
                match verify_token(&token, &state.config.auth.jwt_secret) {
                    Ok(claims) => {
                        let _ = tx
                            .send(ServerToClient::Authenticated {
                                user_id: claims.sub.clone(),
                            })
                            .await;
                        return Some(claims.sub);
                    }
                    Err(err) => {
                        let _ = tx
                            .send(ServerToClient::AuthenticationFailed {
                                reason: err.to_string(),
                            })
                            .await;
                        return None;
                    }
                }
            }
            _ => {
                let _ = tx
                    .send(ServerToClient::Error {
                        message: "authenticate first".to_string(),
                    })
                    .await;
                return None;
            }
        }
    }
    None
}
