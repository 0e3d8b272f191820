// Push event names sent over the live-update WebSocket.

/// First frame on every connection, once the subscription is live.
pub const HELLO: &str = "hello";

/// One published location sample.
pub const LOCATION: &str = "location";
