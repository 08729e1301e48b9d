use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use reqwest::Url;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{ChangeEvent, ChangeKind};
use crate::error::{ApiError, ClientError, ClientResult, UNKNOWN_ERROR};

const HEARTBEAT: Duration = Duration::from_secs(25);
const CLOSE_GRACE: Duration = Duration::from_secs(2);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Running change feed for one table. Dropping it aborts the feed.
pub(crate) struct SocketSubscription {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SocketSubscription {
    /// Leave the channel and wait briefly for the socket to close.
    pub(crate) async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() { let _ = tx.send(()); }
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() { abort.abort(); }
        }
    }
}

impl Drop for SocketSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() { task.abort(); }
    }
}

/// `ws(s)://host[/base]/realtime/v1/websocket?apikey=..&vsn=1.0.0` for an http(s) base.
pub(crate) fn websocket_url(base: &Url, key: &str) -> ClientResult<Url> {
    let mut ws = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    ws.set_scheme(scheme).map_err(|_| ClientError::config(format!("cannot derive websocket URL from {}", base)))?;
    let path = format!("{}/realtime/v1/websocket", base.path().trim_end_matches('/'));
    ws.set_path(&path);
    ws.query_pairs_mut().clear().append_pair("apikey", key).append_pair("vsn", "1.0.0");
    Ok(ws)
}

fn frame(topic: &str, event: &str, payload: Value, seq: u64) -> Message {
    let text = json!({ "topic": topic, "event": event, "payload": payload, "ref": seq.to_string() }).to_string();
    Message::Text(text)
}

/// Decode a pushed frame into a change event, if it carries one.
pub(crate) fn decode_change(text: &str, table: &str) -> Option<ChangeEvent> {
    let msg: Value = serde_json::from_str(text).ok()?;
    let event = msg.get("event")?.as_str()?;
    let payload = msg.get("payload")?;
    let data = if event == "postgres_changes" { payload.get("data")? } else { payload };
    let kind_text = data.get("type").or_else(|| data.get("eventType")).and_then(|t| t.as_str()).unwrap_or(event);
    let kind = ChangeKind::parse(kind_text)?;
    Some(ChangeEvent {
        table: data.get("table").and_then(|t| t.as_str()).unwrap_or(table).to_string(),
        kind,
        record: data.get("record").or_else(|| data.get("new")).cloned().unwrap_or(Value::Null),
        old_record: data.get("old_record").or_else(|| data.get("old")).cloned().unwrap_or(Value::Null),
    })
}

/// Outcome of the join sent under `join_ref`, if `text` is its reply.
pub(crate) fn join_reply(text: &str, join_ref: &str) -> Option<Result<(), ApiError>> {
    let msg: Value = serde_json::from_str(text).ok()?;
    if msg.get("event")?.as_str()? != "phx_reply" { return None; }
    let reply_ref = match msg.get("ref")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if reply_ref != join_ref { return None; }

    let payload = msg.get("payload").cloned().unwrap_or(Value::Null);
    if payload.get("status").and_then(|s| s.as_str()) == Some("ok") { return Some(Ok(())); }
    let response = payload.get("response").cloned().unwrap_or(Value::Null);
    let mut err = ApiError::from(response.clone());
    if err.message == UNKNOWN_ERROR {
        if let Some(reason) = response.get("reason").and_then(|r| r.as_str()) {
            err.message = reason.to_string();
        }
    }
    Some(Err(err))
}

/// Read until the join is acknowledged. Change events pushed before the reply are returned.
async fn await_join_reply<S>(read: &mut S, join_ref: &str, table: &str) -> ClientResult<Vec<ChangeEvent>>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut early = Vec::new();
    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };
        match join_reply(&text, join_ref) {
            Some(Ok(())) => return Ok(early),
            Some(Err(e)) => {
                warn!(target: "sexyguard::realtime", "join rejected: {}", e);
                return Err(ClientError::Realtime(e));
            }
            None => early.extend(decode_change(&text, table)),
        }
    }
    Err(ClientError::realtime("socket closed before the join was acknowledged"))
}

/// Connect, join `topic` and forward change events into `sink` until closed.
pub(crate) async fn open(
    url: Url,
    topic: String,
    join: Value,
    table: String,
    sink: mpsc::UnboundedSender<ChangeEvent>,
) -> ClientResult<SocketSubscription> {
    let (stream, _resp) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut write, mut read) = stream.split();
    let mut seq: u64 = 1;
    let join_ref = seq.to_string();
    write.send(frame(&topic, "phx_join", join, seq)).await?;
    let early = tokio::time::timeout(JOIN_TIMEOUT, await_join_reply(&mut read, &join_ref, &table))
        .await
        .map_err(|_| ClientError::realtime(format!("no reply to join of {} within {}s", topic, JOIN_TIMEOUT.as_secs())))??;
    for ev in early {
        let _ = sink.send(ev);
    }
    debug!(target: "sexyguard::realtime", "joined {}", topic);

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    seq += 1;
                    let _ = write.send(frame(&topic, "phx_leave", json!({}), seq)).await;
                    let _ = write.close().await;
                    break;
                }
                _ = heartbeat.tick() => {
                    seq += 1;
                    if write.send(frame("phoenix", "heartbeat", json!({}), seq)).await.is_err() { break; }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(ev) = decode_change(&text, &table) {
                            if sink.send(ev).is_err() { break; }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(target: "sexyguard::realtime", "change feed for {} failed: {}", topic, e);
                        break;
                    }
                }
            }
        }
        debug!(target: "sexyguard::realtime", "change feed for {} stopped", topic);
    });

    Ok(SocketSubscription { shutdown: Some(shutdown_tx), task: Some(task) })
}
