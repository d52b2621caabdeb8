//! Request dispatch for the daemon
//!
//! Translates request envelopes into pool operations. Every failure is
//! converted into a failed response envelope here, so a bad request can
//! never take down the connection or the daemon.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::ipc::protocol::{RequestEnvelope, RequestKind, ResponseEnvelope};
use crate::skill;

use super::pool::ServerPool;

/// Handle one request envelope
pub async fn handle_request(pool: &Arc<ServerPool>, request: RequestEnvelope) -> ResponseEnvelope {
    let id = request.id.clone();
    match dispatch(pool, request).await {
        Ok(result) => ResponseEnvelope::success(id, result),
        Err(e) => ResponseEnvelope::failure(id, e.to_string()),
    }
}

async fn dispatch(pool: &Arc<ServerPool>, request: RequestEnvelope) -> Result<Value> {
    // A request may carry a config path; the first successful load wins and
    // is retained for the daemon's lifetime.
    if let Some(path) = &request.config_path {
        if !pool.config_loaded() {
            let loaded = skill::load_skill(Some(Path::new(path)))?;
            pool.load_config(loaded);
        }
    }

    match request.kind {
        RequestKind::Call => {
            let server = request
                .backend_name
                .ok_or(Error::MissingField("backendName"))?;
            let tool = request.tool_name.ok_or(Error::MissingField("toolName"))?;
            require_config(pool)?;

            pool.call(&server, &tool, request.arguments.unwrap_or_else(|| json!({})))
                .await
        }

        RequestKind::ListTools => {
            let server = request
                .backend_name
                .ok_or(Error::MissingField("backendName"))?;
            require_config(pool)?;

            let tools = pool.list_tools(&server).await?;
            Ok(serde_json::to_value(tools)?)
        }

        RequestKind::ListServers => {
            require_config(pool)?;
            Ok(serde_json::to_value(pool.list_servers())?)
        }

        RequestKind::Status => Ok(serde_json::to_value(pool.status())?),

        RequestKind::Shutdown => {
            pool.shutdown_all().await;
            Ok(json!({ "message": "Shutting down" }))
        }
    }
}

fn require_config(pool: &ServerPool) -> Result<()> {
    if pool.config_loaded() {
        Ok(())
    } else {
        Err(Error::ConfigNotLoaded)
    }
}
