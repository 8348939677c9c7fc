use axum::{Extension, Router, body::Bytes, http::StatusCode, routing::post};
use std::sync::Arc;
use std::time::Duration;

use super::protocol::{ENDPOINT_RPC, WorkerRequest, WorkerResponse};
use super::service::WorkerRpc;
use crate::error::ClusterError;

/// Serves `target` on [`ENDPOINT_RPC`].
pub fn router(target: Arc<dyn WorkerRpc>) -> Router {
    Router::new()
        .route(ENDPOINT_RPC, post(handle_rpc))
        .layer(Extension(target))
}

pub async fn handle_rpc(
    Extension(target): Extension<Arc<dyn WorkerRpc>>,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    let request: WorkerRequest = match bincode::deserialize(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Failed to deserialize request: {}", e);
            let error = ClusterError::communication(target.addr(), e);
            return encode(StatusCode::BAD_REQUEST, &WorkerResponse::from_error(&error));
        }
    };

    tracing::trace!("Handling {:?}", request);
    let response = dispatch(target.as_ref(), request).await;
    encode(StatusCode::OK, &response)
}

fn encode(status: StatusCode, response: &WorkerResponse) -> (StatusCode, Vec<u8>) {
    match bincode::serialize(response) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

/// Runs one decoded request against `target`.
pub async fn dispatch(target: &dyn WorkerRpc, request: WorkerRequest) -> WorkerResponse {
    let result = match request {
        WorkerRequest::Probe => target.probe().await.map(|id| WorkerResponse::Probe { id }),
        WorkerRequest::Join { member, kind } => target.join(member, kind).await.map(ack),
        WorkerRequest::ReceiveMember { member } => target.receive_member(member).await.map(ack),
        WorkerRequest::ReceiveMemberList { members } => {
            target.receive_member_list(members).await.map(ack)
        }
        WorkerRequest::SetTrackerLinks { links } => target.set_tracker_links(links).await.map(ack),
        WorkerRequest::Lifeproof { member } => target
            .lifeproof(member)
            .await
            .map(|father| WorkerResponse::Father { father }),
        WorkerRequest::WorkDone { report } => target.work_done(report).await.map(ack),
        WorkerRequest::MemberFailed { worker } => target.member_failed(worker).await.map(ack),
        WorkerRequest::SubmitJob { request } => target
            .submit_job(request)
            .await
            .map(|receipt| WorkerResponse::Receipt { receipt }),
        WorkerRequest::LoadSubmit { context } => target.load_submit(context).await.map(ack),
        WorkerRequest::LoadResume { context } => target.load_resume(context).await.map(ack),
        WorkerRequest::UpdateSubmit { update } => target.update_submit(update).await.map(ack),
        WorkerRequest::UpdateOutput { update } => target.update_output(update).await.map(ack),
        WorkerRequest::Slow { millis } => {
            target.slow(Duration::from_millis(millis)).await.map(ack)
        }
        WorkerRequest::FreezeWorker => target.freeze_worker().await.map(ack),
        WorkerRequest::UnfreezeWorker => target.unfreeze_worker().await.map(ack),
        WorkerRequest::FreezeTracker => target.freeze_tracker().await.map(ack),
        WorkerRequest::UnfreezeTracker => target.unfreeze_tracker().await.map(ack),
        WorkerRequest::Status => target
            .status()
            .await
            .map(|report| WorkerResponse::Status { report }),
        WorkerRequest::Die => target.die().await.map(ack),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Request failed: {}", e);
            WorkerResponse::from_error(&e)
        }
    }
}

fn ack(_: ()) -> WorkerResponse {
    WorkerResponse::Ack
}
