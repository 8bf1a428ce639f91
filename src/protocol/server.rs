use super::{RpcError, RpcRequest, RpcResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send>>;
type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// One unit read from the stream.
#[derive(Debug)]
pub enum Message {
    Request(RpcRequest),
    /// A line that could not be decoded, with the error response it earns.
    Malformed(RpcResponse),
    EndOfStream,
}

/// Read the next non-blank line and decode it.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Message>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(Message::EndOfStream);
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                return Ok(Message::Malformed(RpcResponse::failure(
                    None,
                    &RpcError::Parse(format!("message is not valid UTF-8: {e}")),
                )));
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return Ok(match RpcRequest::decode(trimmed) {
            Ok(request) => Message::Request(request),
            Err(response) => Message::Malformed(response),
        });
    }
}

async fn write_response<W>(writer: &mut W, response: &RpcResponse) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = match serde_json::to_string(response) {
        Ok(encoded) => encoded,
        Err(e) => {
            log::error!("Failed to encode response: {}", e);
            let fallback = RpcResponse::failure(response.id.clone(), &RpcError::Internal(e.to_string()));
            serde_json::to_string(&fallback).map_err(io::Error::other)?
        }
    };
    encoded.push('\n');
    writer.write_all(encoded.as_bytes()).await?;
    writer.flush().await
}

/// Method table plus the read/dispatch/write loop.
#[derive(Default, Clone)]
pub struct RpcServer {
    handlers: HashMap<String, Handler>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method`, replacing any previous handler.
    pub fn register_handler<F, Fut>(&mut self, method: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| -> HandlerFuture { Box::pin(f(params)) });
        self.handlers.insert(method.into(), handler);
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    async fn invoke(&self, request: RpcRequest) -> Result<Value, RpcError> {
        let method = request.method.unwrap_or_default();
        let handler = self
            .handlers
            .get(&method)
            .cloned()
            .ok_or_else(|| RpcError::MethodNotFound(method.clone()))?;

        let params = request.params.unwrap_or(Value::Null);
        // A panicking handler must not take the loop down with it.
        match tokio::spawn(handler(params)).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Handler for '{}' aborted: {}", method, e);
                Err(RpcError::Internal(format!("handler aborted: {e}")))
            }
        }
    }

    /// Run the handler for `request`. Notifications execute but get no
    /// response.
    pub async fn dispatch(&self, request: RpcRequest) -> Option<RpcResponse> {
        let id = request.id.clone();
        let method = request.method.clone().unwrap_or_default();
        log::debug!("Dispatching '{}' (id {:?})", method, id);

        let outcome = self.invoke(request).await;
        if let Err(e) = &outcome {
            log::warn!("Request '{}' failed: {}", method, e);
        }
        let id = id?;
        Some(match outcome {
            Ok(result) => RpcResponse::success(Some(id), result),
            Err(e) => RpcResponse::failure(Some(id), &e),
        })
    }

    /// Decode and dispatch one line.
    pub async fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        match RpcRequest::decode(line.trim()) {
            Ok(request) => self.dispatch(request).await,
            Err(response) => Some(response),
        }
    }

    /// Serve requests from `reader` until end of stream, one at a time.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = reader;
        let mut served = 0usize;
        log::info!("RPC loop started ({} methods)", self.handlers.len());

        loop {
            let response = match read_message(&mut reader).await? {
                Message::EndOfStream => break,
                Message::Malformed(response) => {
                    log::warn!("Rejected malformed message: {:?}", response.error);
                    Some(response)
                }
                Message::Request(request) => self.dispatch(request).await,
            };
            if let Some(response) = response {
                write_response(&mut writer, &response).await?;
            }
            served += 1;
        }

        log::info!("RPC loop finished after {} messages", served);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RpcId, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_server() -> RpcServer {
        let mut server = RpcServer::new();
        server.register_handler("echo", |params| async move { Ok::<_, RpcError>(params) });
        server.register_handler("fail", |_| async {
            Err::<Value, _>(RpcError::InvalidParams("missing field `engine`".to_string()))
        });
        server.register_handler("boom", |params: Value| async move {
            if params.is_null() {
                panic!("handler exploded");
            }
            Ok::<_, RpcError>(params)
        });
        server
    }

    async fn run_lines(server: &RpcServer, input: &str) -> Vec<RpcResponse> {
        run_bytes(server, input.as_bytes()).await
    }

    async fn run_bytes(server: &RpcServer, input: &[u8]) -> Vec<RpcResponse> {
        let mut output = Vec::new();
        server.run(input, &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_each_request_in_order() {
        let input = concat!(
            r#"{"protocolVersion":"2.0","method":"echo","params":{"a":1},"id":1}"#,
            "\n\n",
            r#"{"protocolVersion":"2.0","method":"nope","id":2}"#,
            "\n",
            "{broken\n",
            r#"{"protocolVersion":"2.0","method":"fail","id":"x"}"#,
            "\n",
        );
        let responses = run_lines(&echo_server(), input).await;

        assert_eq!(responses.len(), 4);
        assert_eq!(responses[0].result, Some(json!({"a": 1})));
        assert_eq!(responses[1].error_code(), Some(METHOD_NOT_FOUND));
        assert_eq!(responses[2].error_code(), Some(PARSE_ERROR));
        assert_eq!(responses[2].id, None);
        assert_eq!(responses[3].error_code(), Some(INVALID_PARAMS));
    }

    #[tokio::test]
    async fn notifications_run_without_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut server = RpcServer::new();
        let counter = calls.clone();
        server.register_handler("tick", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RpcError>(Value::Null)
            }
        });

        let input = concat!(
            r#"{"protocolVersion":"2.0","method":"tick"}"#,
            "\n",
            r#"{"protocolVersion":"2.0","method":"tick","id":null}"#,
            "\n",
        );
        let responses = run_lines(&server, input).await;
        assert!(responses.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_handler_becomes_internal_error() {
        let server = echo_server();
        let input = concat!(
            r#"{"protocolVersion":"2.0","method":"boom","id":1}"#,
            "\n",
            r#"{"protocolVersion":"2.0","method":"echo","params":{},"id":2}"#,
            "\n",
        );
        let responses = run_lines(&server, input).await;
        assert_eq!(responses[0].error_code(), Some(INTERNAL_ERROR));
        assert!(responses[0].error.as_ref().unwrap().data.is_some());
        assert_eq!(responses[1].result, Some(json!({})));
    }

    #[tokio::test]
    async fn read_message_skips_blank_lines() {
        let mut input: &[u8] = b"\n   \n{\"protocolVersion\":\"2.0\",\"method\":\"echo\",\"id\":1}\n";
        assert!(matches!(
            read_message(&mut input).await.unwrap(),
            Message::Request(_)
        ));
        assert!(matches!(
            read_message(&mut input).await.unwrap(),
            Message::EndOfStream
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_the_loop() {
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"protocolVersion":"2.0","method":"echo","params":{},"id":1}"#);
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(br#"{"protocolVersion":"2.0","method":"echo","params":{},"id":3}"#);
        input.push(b'\n');

        let responses = run_bytes(&echo_server(), &input).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].id, Some(RpcId::from(1)));
        assert_eq!(responses[1].error_code(), Some(PARSE_ERROR));
        assert_eq!(responses[1].id, None);
        assert_eq!(responses[2].id, Some(RpcId::from(3)));
        assert!(responses[2].error.is_none());
    }

    #[test]
    fn lists_registered_methods() {
        assert_eq!(echo_server().methods(), vec!["boom", "echo", "fail"]);
    }
}
