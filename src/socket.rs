#![allow(dead_code)]
//! Control socket (spec C8), grounded on `IPCServer.hpp`: a Unix domain
//! socket accepting both JSON-RPC and a legacy flat-verb protocol in the
//! same listener, dispatched on the first non-whitespace byte.
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SocketError;

pub const MAX_CLIENTS: usize = 32;

/// Every `subscribe`d connection's broadcast channel, keyed by a per-process
/// monotonic id so `unsubscribe` can remove exactly that connection's entry
/// without disturbing any other subscriber (spec.md §4.8/§5).
pub type SubscriberList = Arc<Mutex<Vec<(u64, Sender<String>)>>>;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(0);

/// Resolves the control socket path: `$XDG_CONFIG_HOME/pblank/pointblank.sock`,
/// falling back to `$HOME/.config/pblank/pointblank.sock`, then `/tmp/pblank`
/// — the same fallback chain the original constructor documents inline.
pub fn resolve_socket_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pblank").join("pointblank.sock");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("pblank").join("pointblank.sock");
    }
    PathBuf::from("/tmp/pblank").join("pointblank.sock")
}

/// A command decoded off the socket and handed to the event loop thread via
/// a channel; socket worker threads never touch WM state directly.
#[derive(Debug, Clone)]
pub struct Command {
    pub verb: String,
    pub args: Vec<String>,
    pub reply_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
    id: Value,
}

/// Parses one line of input into a `Command`. Lines beginning with `{`
/// (after trimming whitespace) are JSON-RPC; everything else is the flat
/// `verb arg1 arg2` protocol, matching `IPCServer::processCommand`.
pub fn parse_line(line: &str) -> Result<Command, SocketError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(SocketError::MalformedRequest("empty command".into()));
    }
    if trimmed.starts_with('{') {
        let req: JsonRpcRequest = serde_json::from_str(trimmed)?;
        Ok(Command {
            verb: req.method,
            args: req.params,
            reply_id: req.id,
        })
    } else {
        let mut parts = trimmed.split_whitespace();
        let verb = parts.next().ok_or_else(|| SocketError::MalformedRequest(trimmed.to_string()))?.to_string();
        let args = parts.map(str::to_string).collect();
        Ok(Command { verb, args, reply_id: None })
    }
}

/// Formats the outcome of a command back to the client in whichever
/// dialect it arrived in. The flat dialect's success line always carries
/// three pipe-delimited fields (`OK|message|json-data`, the last empty when
/// there's no structured payload); failures are `ERROR|message` (spec.md
/// §4.8/§6).
pub fn format_reply(cmd: &Command, result: Result<(String, Option<Value>), String>) -> String {
    match &cmd.reply_id {
        Some(id) => {
            let response = match result {
                Ok((message, data)) => JsonRpcResponse {
                    jsonrpc: "2.0",
                    result: Some(json!({ "message": message, "data": data })),
                    error: None,
                    id: id.clone(),
                },
                Err(message) => JsonRpcResponse {
                    jsonrpc: "2.0",
                    result: None,
                    error: Some(Value::String(message)),
                    id: id.clone(),
                },
            };
            serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string())
        }
        None => match result {
            Ok((message, Some(data))) => format!("OK|{}|{}", message, data),
            Ok((message, None)) => format!("OK|{}|", message),
            Err(message) => format!("ERROR|{}", message),
        },
    }
}

/// Listens for control connections and forwards decoded commands to `tx`,
/// bounding concurrent connections at `MAX_CLIENTS`.
pub struct ControlSocket {
    listener: UnixListener,
    path: PathBuf,
    client_count: Arc<Mutex<usize>>,
    subscribers: SubscriberList,
}

impl ControlSocket {
    pub fn bind() -> Result<Self, SocketError> {
        let path = resolve_socket_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SocketError::Bind {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).map_err(|e| SocketError::Bind {
            path: path.display().to_string(),
            source: e,
        })?;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms).map_err(|e| SocketError::Bind {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(ControlSocket {
            listener,
            path,
            client_count: Arc::new(Mutex::new(0)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Handle the window manager keeps to push broadcast event lines out to
    /// every `subscribe`d connection (spec.md §4.8/§5).
    pub fn subscribers(&self) -> SubscriberList {
        self.subscribers.clone()
    }

    /// Spawns one worker thread per accepted connection (bounded by
    /// `MAX_CLIENTS`), each forwarding decoded commands to `tx` and writing
    /// back whatever `reply_rx`-side logic produces. Connections beyond the
    /// limit are rejected immediately with a `SocketError`.
    pub fn accept_loop(&self, tx: Sender<(Command, Sender<String>)>) {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("control socket accept failed: {}", e);
                    continue;
                }
            };
            let mut count = self.client_count.lock().unwrap();
            if *count >= MAX_CLIENTS {
                log::warn!("control socket rejecting connection: client limit reached");
                drop(stream);
                continue;
            }
            *count += 1;
            drop(count);

            let tx = tx.clone();
            let client_count = self.client_count.clone();
            let subscribers = self.subscribers.clone();
            std::thread::spawn(move || {
                handle_client(stream, tx, subscribers);
                *client_count.lock().unwrap() -= 1;
            });
        }
    }
}

/// Services one connection's line protocol. `subscribe`/`unsubscribe` are
/// handled entirely here — they never reach the event loop, since they only
/// affect this socket's own bookkeeping (spec.md §4.8). A `subscribe`d
/// connection spawns a dedicated writer thread that forwards broadcast
/// lines until the client disconnects or sends `unsubscribe`; this thread
/// keeps reading requests (including that `unsubscribe`) the whole time.
fn handle_client(stream: UnixStream, tx: Sender<(Command, Sender<String>)>, subscribers: SubscriberList) {
    let peer_write = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            log::warn!("failed to clone control socket stream: {}", e);
            return;
        }
    };
    let mut writer = peer_write;
    let reader = BufReader::new(stream);
    log::debug!("control socket client connected");
    let mut subscriber_id: Option<u64> = None;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match parse_line(&line) {
            Ok(c) => c,
            Err(e) => {
                let _ = writeln!(writer, "ERROR|{}", e);
                continue;
            }
        };

        if cmd.verb.eq_ignore_ascii_case("subscribe") {
            let id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
            let (event_tx, event_rx) = std::sync::mpsc::channel::<String>();
            subscribers.lock().unwrap().push((id, event_tx));
            subscriber_id = Some(id);
            let _ = writeln!(writer, "{}", format_reply(&cmd, Ok(("subscribed".to_string(), None))));
            match writer.try_clone() {
                Ok(mut broadcast_writer) => {
                    std::thread::spawn(move || {
                        while let Ok(line) = event_rx.recv() {
                            if writeln!(broadcast_writer, "{}", line).is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => log::warn!("failed to clone stream for subscriber forwarding: {}", e),
            }
            continue;
        }
        if cmd.verb.eq_ignore_ascii_case("unsubscribe") {
            if let Some(id) = subscriber_id.take() {
                subscribers.lock().unwrap().retain(|(sid, _)| *sid != id);
            }
            let _ = writeln!(writer, "{}", format_reply(&cmd, Ok(("unsubscribed".to_string(), None))));
            continue;
        }

        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        if tx.send((cmd, reply_tx)).is_err() {
            break;
        }
        if let Ok(reply) = reply_rx.recv() {
            let _ = writeln!(writer, "{}", reply);
        }
    }
    if let Some(id) = subscriber_id {
        subscribers.lock().unwrap().retain(|(sid, _)| *sid != id);
    }
    log::debug!("control socket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_verb_command() {
        let cmd = parse_line("focus-direction left").unwrap();
        assert_eq!(cmd.verb, "focus-direction");
        assert_eq!(cmd.args, vec!["left".to_string()]);
        assert!(cmd.reply_id.is_none());
    }

    #[test]
    fn parses_json_rpc_command() {
        let cmd = parse_line(r#"{"jsonrpc":"2.0","method":"focus-direction","params":["left"],"id":1}"#).unwrap();
        assert_eq!(cmd.verb, "focus-direction");
        assert_eq!(cmd.args, vec!["left".to_string()]);
        assert_eq!(cmd.reply_id, Some(Value::from(1)));
    }

    #[test]
    fn rejects_empty_line() {
        assert!(parse_line("   ").is_err());
    }

    #[test]
    fn flat_reply_is_pipe_delimited_with_empty_data() {
        let cmd = parse_line("ping").unwrap();
        let reply = format_reply(&cmd, Ok(("pong".to_string(), None)));
        assert_eq!(reply, "OK|pong|");
    }

    #[test]
    fn flat_reply_carries_json_data_when_present() {
        let cmd = parse_line("layout").unwrap();
        let reply = format_reply(&cmd, Ok(("bsp".to_string(), Some(json!({"layout": "bsp"})))));
        assert_eq!(reply, "OK|bsp|{\"layout\":\"bsp\"}");
    }

    #[test]
    fn flat_error_reply_has_no_trailing_field() {
        let cmd = parse_line("bogus").unwrap();
        let reply = format_reply(&cmd, Err("unknown verb 'bogus'".to_string()));
        assert_eq!(reply, "ERROR|unknown verb 'bogus'");
    }

    #[test]
    fn json_rpc_reply_wraps_result() {
        let cmd = parse_line(r#"{"jsonrpc":"2.0","method":"ping","params":[],"id":7}"#).unwrap();
        let reply = format_reply(&cmd, Ok(("pong".to_string(), None)));
        assert!(reply.contains("\"message\":\"pong\""));
        assert!(reply.contains("\"id\":7"));
    }

    #[test]
    fn json_rpc_reply_wraps_error() {
        let cmd = parse_line(r#"{"jsonrpc":"2.0","method":"bogus","params":[],"id":3}"#).unwrap();
        let reply = format_reply(&cmd, Err("unknown verb 'bogus'".to_string()));
        assert!(reply.contains("\"error\":\"unknown verb 'bogus'\""));
    }
}
