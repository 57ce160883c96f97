//! Line-delimited JSON command surface.
//!
//! One request object per line, tagged by `op`; one response object per
//! line. Successful responses are `{"status":"ok","data":...}`. Failures are
//! `{"status":"error","kind":...,"message":...}` where `kind` is the engine's
//! error class, or `bad_request` for a line that does not parse.

use std::time::Instant;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;

/// Longest request line accepted, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Create(NewReservation),
    Update {
        id: ReservationId,
        #[serde(default)]
        patch: ReservationPatch,
    },
    Cancel {
        id: ReservationId,
    },
    CheckIn {
        id: ReservationId,
    },
    NoShow {
        id: ReservationId,
    },
    Get {
        id: ReservationId,
    },
    Available(AvailabilityQuery),
    ByCustomer {
        customer_id: CustomerId,
    },
    ForTable {
        table_id: TableId,
        date: NaiveDate,
    },
}

impl Request {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

async fn dispatch(engine: &Engine, req: Request) -> Result<Value, EngineError> {
    let data = match req {
        Request::Create(new) => json!(engine.create(new).await?),
        Request::Update { id, patch } => json!(engine.update(id, patch).await?),
        Request::Cancel { id } => json!(engine.cancel(id).await?),
        Request::CheckIn { id } => json!(engine.check_in(id).await?),
        Request::NoShow { id } => json!(engine.mark_no_show(id).await?),
        Request::Get { id } => json!(engine.get(id).await?),
        Request::Available(query) => json!(engine.find_available(&query).await?),
        Request::ByCustomer { customer_id } => json!(engine.list_by_customer(customer_id).await?),
        Request::ForTable { table_id, date } => {
            json!(engine.list_for_table(table_id, date).await?)
        }
    };
    Ok(data)
}

fn error_response(kind: &str, message: impl std::fmt::Display) -> Value {
    json!({ "status": "error", "kind": kind, "message": message.to_string() })
}

/// Run one request line and render the response line.
pub async fn handle_line(engine: &Engine, line: &str) -> String {
    let req = match Request::parse(line) {
        Ok(req) => req,
        Err(e) => {
            debug!("unparseable request: {e}");
            return error_response("bad_request", e).to_string();
        }
    };

    let op = observability::request_label(&req);
    let start = Instant::now();
    let result = dispatch(engine, req).await;
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
        .record(start.elapsed().as_secs_f64());

    let response = match result {
        Ok(data) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => "ok")
                .increment(1);
            json!({ "status": "ok", "data": data })
        }
        Err(e) => {
            let kind = e.kind().as_str();
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => kind)
                .increment(1);
            if matches!(e, EngineError::Storage(_)) {
                warn!("{op} failed: {e}");
            }
            error_response(kind, e)
        }
    };
    response.to_string()
}

/// Serve requests from `reader` until it closes, answering each on `writer`.
/// Blank lines are skipped.
pub async fn serve<R, W>(engine: &Engine, reader: R, writer: W) -> Result<(), LinesCodecError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut out = FramedWrite::new(writer, LinesCodec::new());

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                out.send(error_response("bad_request", "request line too long").to_string())
                    .await?;
                continue;
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        out.send(handle_line(engine, &line).await).await?;
    }
    Ok(())
}
