//! Inbound call dispatch.
//!
//! Runs the next handler for a call's pattern and turns its [`Outcome`] into
//! exactly one outbound message: a return of the call's kind, or a forward.
//! Handler errors and panics are contained here and answered with an empty
//! return, unless the error came from a failed session operation inside the
//! handler; that one ends the session.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};

use super::Outcome;
use crate::error::{Result, ServlinkError};
use crate::protocol::{Outbound, Request, ReturnMessage};
use crate::session::Session;

/// Dispatch one inbound call and send its answer.
pub(crate) async fn dispatch<S>(session: &mut Session<S>, request: Request) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + 'static,
{
    let handler = session
        .callbacks
        .rotate(&request.pattern)
        .ok_or_else(|| ServlinkError::HandlerNotFound(request.pattern.clone()))?;

    let call = request.clone();
    let result = AssertUnwindSafe(async { handler.call(session, request).await })
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) if session.is_failed() => return Err(e),
        Ok(Err(e)) => {
            tracing::error!(pattern = %call.pattern, "handler failed: {}", e);
            Outcome::empty()
        }
        Err(panic) => {
            tracing::error!(
                pattern = %call.pattern,
                "handler panicked: {}",
                panic_message(panic.as_ref())
            );
            Outcome::empty()
        }
    };

    let message = answer(&call, outcome)?;
    session.send_message(&message).await
}

/// Build the single outbound message answering `call`.
fn answer(call: &Request, outcome: Outcome) -> Result<Outbound> {
    if let Some(kind) = outcome.required_kind() {
        if kind != call.kind {
            return Err(ServlinkError::Protocol(format!(
                "{} outcome for {} call to {}",
                kind, call.kind, call.name
            )));
        }
    }

    Ok(match outcome {
        Outcome::Reply(response) | Outcome::Return(_, response) => {
            Outbound::Return(call.kind, ReturnMessage::reply_to(call, response))
        }
        Outcome::Forward(kind, forward) => {
            tracing::debug!(from = %call.name, to = %forward.name, "forwarding call");
            Outbound::Forward(kind, forward.into_message(call))
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
