use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{stream::SplitSink, SinkExt};
use waypost_protocol::frames::EventFrame;

pub type WsSink = SplitSink<WebSocket, Message>;

/// Serialize an event frame and send it as a WS text frame.
pub async fn event(tx: &mut WsSink, frame: &EventFrame) -> Result<(), axum::Error> {
    let text = frame.to_text().map_err(axum::Error::new)?;
    tx.send(Message::Text(text.into())).await
}

/// Send a close frame. Errors are ignored: the peer may already be gone.
pub async fn close(tx: &mut WsSink, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = tx.send(Message::Close(Some(frame))).await;
}
