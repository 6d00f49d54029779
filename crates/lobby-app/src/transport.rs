// Websocket transport for the notification channel.
//
// Connects to the server, fans inbound text frames out through the shared
// `NotificationChannel`, and writes queued outbound frames. When the socket
// ends for any reason the channel is closed; there is no reconnect.

use std::fmt::Display;

use anyhow::Context;
use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use lobby_core::channel::NotificationChannel;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

/// Connect to `url` and run the channel until the socket closes.
///
/// The channel is closed on every exit path, including a failed connect, so
/// listeners always observe the disconnect.
pub async fn run(
    url: &str,
    channel: NotificationChannel,
    outbound: mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<()> {
    let connected = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {url}"));
    let (ws_stream, _response) = match connected {
        Ok(ok) => ok,
        Err(e) => {
            channel.close();
            return Err(e);
        }
    };
    info!("Connected to notification channel at {url}");

    let (write, read) = ws_stream.split();
    let writer = tokio::spawn(forward_outbound(write, outbound));

    let dispatched = pump_inbound(read, &channel).await;
    info!("Notification channel ended after {dispatched} messages");

    channel.close();
    writer.abort();
    Ok(())
}

/// Dispatch every text frame from `stream` to the channel's listeners, in
/// order. Stops at a close frame, a transport error, or end of stream.
/// Returns the number of frames dispatched.
pub async fn pump_inbound<St>(mut stream: St, channel: &NotificationChannel) -> usize
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut dispatched = 0;
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                channel.dispatch(text.as_str());
                dispatched += 1;
            }
            Ok(Message::Close(_)) => {
                info!("Server sent close frame");
                break;
            }
            Err(e) => {
                warn!("Websocket error: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong and raw frames carry no notifications.
            }
        }
    }
    dispatched
}

/// Write queued outbound frames to `sink` until the queue closes or a write
/// fails.
pub async fn forward_outbound<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<String>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(text) = outbound.recv().await {
        debug!("Sending frame: {text}");
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            warn!("Failed to send frame: {e}");
            return;
        }
    }
    if let Err(e) = sink.close().await {
        debug!("Closing websocket writer failed: {e}");
    }
}
