//! RPC Module Tests
//!
//! ## Test Scopes
//! - **Protocol**: error kinds survive the trip across the wire.
//! - **Dispatch**: decoded requests reach the right node operation.
//! - **Local transport**: dropped and dead nodes look unreachable.

#[cfg(test)]
mod tests {
    use crate::config::NodeConfig;
    use crate::error::ClusterError;
    use crate::job::{JobRequest, WorkerId};
    use crate::mapper::MapRegistry;
    use crate::membership::MemberInfo;
    use crate::rpc::handlers::{dispatch, handle_rpc};
    use crate::rpc::protocol::{ErrorKind, WorkerRequest, WorkerResponse};
    use crate::rpc::{Directory, LocalDirectory, LocalPeer, WorkerRpc, WorkerStatus};
    use crate::worker::WorkerNode;
    use axum::Extension;
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;

    fn lone_node() -> (Arc<LocalDirectory>, Arc<WorkerNode>) {
        let directory = LocalDirectory::new(Duration::from_millis(500));
        let node = WorkerNode::new(
            NodeConfig::new(WorkerId(1), "local://W1"),
            directory.clone(),
            MapRegistry::with_builtins(),
        );
        directory.register_node(&node);
        (directory, node)
    }

    // ============================================================
    // PROTOCOL TESTS
    // ============================================================

    #[test]
    fn test_error_kind_survives_round_trip() {
        let cases = [
            (ClusterError::Configuration("bad".into()), ErrorKind::Configuration),
            (ClusterError::State("late".into()), ErrorKind::State),
            (ClusterError::communication("local://W2", "gone"), ErrorKind::Communication),
        ];

        for (err, expected) in cases {
            let WorkerResponse::Error { kind, message } = WorkerResponse::from_error(&err) else {
                panic!("expected an error response");
            };
            assert_eq!(kind, expected);

            let rebuilt = WorkerResponse::into_error(kind, message, "local://W9");
            assert_eq!(rebuilt.is_configuration(), err.is_configuration());
            assert_eq!(rebuilt.is_communication(), err.is_communication());
        }
    }

    #[test]
    fn test_request_encodes_with_bincode() {
        let request = WorkerRequest::Join {
            member: MemberInfo::new(WorkerId(3), "http://127.0.0.1:7003"),
            kind: crate::rpc::JoinKind::Propagated,
        };
        let bytes = bincode::serialize(&request).unwrap();
        let decoded: WorkerRequest = bincode::deserialize(&bytes).unwrap();

        match decoded {
            WorkerRequest::Join { member, kind } => {
                assert_eq!(member.id, WorkerId(3));
                assert_eq!(kind, crate::rpc::JoinKind::Propagated);
            }
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn test_status_names() {
        assert_eq!(WorkerStatus::AskInput.to_string(), "ASK_INPUT");
        assert_eq!(WorkerStatus::TransferOutput.to_string(), "TRANSFER_OUTPUT");
    }

    // ============================================================
    // DISPATCH TESTS
    // ============================================================

    #[tokio::test]
    async fn test_dispatch_probe_and_status() {
        let (directory, node) = lone_node();
        let target = directory.worker("local://W1");

        let probe = dispatch(target.as_ref(), WorkerRequest::Probe).await;
        assert!(matches!(probe, WorkerResponse::Probe { id } if id == WorkerId(1)));

        let status = dispatch(target.as_ref(), WorkerRequest::Status).await;
        let WorkerResponse::Status { report } = status else {
            panic!("expected status");
        };
        assert_eq!(report.id, node.id());
        assert_eq!(report.status, WorkerStatus::Idle);
        assert_eq!(report.members, vec![WorkerId(1)]);
        assert_eq!(report.master, None);
    }

    #[tokio::test]
    async fn test_dispatch_reports_configuration_errors() {
        let (directory, _node) = lone_node();
        let target = directory.worker("local://W1");

        let response = dispatch(
            target.as_ref(),
            WorkerRequest::SubmitJob {
                request: JobRequest {
                    file_size: 10,
                    n_splits: 2,
                    client_addr: "local://client".into(),
                    map_name: "does_not_exist".into(),
                },
            },
        )
        .await;

        assert!(matches!(
            response,
            WorkerResponse::Error {
                kind: ErrorKind::Configuration,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dispatch_hooks_toggle_gates() {
        let (directory, node) = lone_node();
        let target = directory.worker("local://W1");

        for request in [WorkerRequest::FreezeWorker, WorkerRequest::FreezeTracker] {
            assert!(matches!(dispatch(target.as_ref(), request).await, WorkerResponse::Ack));
        }
        let report = node.status_report().await;
        assert!(report.worker_frozen && report.tracker_frozen);

        for request in [WorkerRequest::UnfreezeWorker, WorkerRequest::UnfreezeTracker] {
            assert!(matches!(dispatch(target.as_ref(), request).await, WorkerResponse::Ack));
        }
        let report = node.status_report().await;
        assert!(!report.worker_frozen && !report.tracker_frozen);
    }

    #[tokio::test]
    async fn test_garbage_body_is_bad_request() {
        let (directory, _node) = lone_node();
        let target = directory.worker("local://W1");

        let (status, body) = handle_rpc(Extension(target), Bytes::from_static(b"\xff\xff")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let response: WorkerResponse = bincode::deserialize(&body).unwrap();
        assert!(matches!(
            response,
            WorkerResponse::Error {
                kind: ErrorKind::Communication,
                ..
            }
        ));
    }

    // ============================================================
    // LOCAL TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_detached_peer_is_unreachable() {
        let peer = LocalPeer::detached("local://nowhere");
        let err = peer.probe().await.unwrap_err();
        assert!(err.is_communication());
    }

    #[tokio::test]
    async fn test_unregistered_address_is_unreachable() {
        let (directory, _node) = lone_node();
        let err = directory.worker("local://W42").probe().await.unwrap_err();
        assert!(err.is_communication());
        assert!(directory.sink("local://client").is_err());
    }

    #[tokio::test]
    async fn test_dropped_node_is_unreachable() {
        let (directory, node) = lone_node();
        let handle = directory.worker("local://W1");
        assert_eq!(handle.probe().await.unwrap(), WorkerId(1));

        drop(node);

        assert!(handle.probe().await.unwrap_err().is_communication());
        assert_eq!(directory.node_count(), 1);
    }
}
