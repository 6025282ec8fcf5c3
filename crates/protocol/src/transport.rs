//! Stdio transport for the dispatcher (C2).
//!
//! One JSON object per newline-terminated line in both directions.
//! Processing is strictly FIFO per connection — we read one line, await
//! its full dispatch, write the response, then read the next line; there
//! is never more than one in-flight call per connection (§4.2). EOF on
//! input is the shutdown signal.
//!
//! Grounded in `sa_mcp_client::transport::StdioTransport`'s line-reading
//! loop (skip blank lines, one read/write per line), adapted from a
//! client reading responses to a server reading requests.

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::registry::ToolRegistry;
use crate::wire::{JsonRpcRequest, JsonRpcResponse, RpcId, PARSE_ERROR};

/// Run the dispatcher loop over `input`/`output` until EOF. Invalid JSON
/// lines produce a `-32700` response with `id=null` and processing
/// continues (§4.2); blank/whitespace-only lines are ignored.
pub async fn serve<R, W>(registry: &ToolRegistry, input: R, mut output: W) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(req) => {
                let params = req.params.unwrap_or(serde_json::Value::Null);
                registry.dispatch(req.id, &req.method, params).await
            }
            Err(e) => {
                tracing::debug!(error = %e, line = %trimmed, "malformed JSON-RPC line");
                JsonRpcResponse::err(RpcId::Null, PARSE_ERROR, format!("parse error: {e}"))
            }
        };

        let mut out = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"parse error"}}"#.to_string());
        out.push('\n');
        output.write_all(out.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}
