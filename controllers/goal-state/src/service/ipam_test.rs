//! Unit tests for pod IP request and release

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use cns_types::{IPConfigsRequest, IPState, OrchestratorType, ResponseCode};

    fn ip_request(pod_name: &str) -> IPConfigsRequest {
        IPConfigsRequest {
            orchestrator_context: Some(pod_context(pod_name, "default")),
            ..Default::default()
        }
    }

    async fn programmed_harness(ips: &[(&str, &str, i64)]) -> Harness {
        let h = Harness::new(OrchestratorType::KubernetesCRD);
        h.save_programmed(&nc_request("nc1", "1", ips)).await;
        h
    }

    #[tokio::test]
    async fn test_request_hands_out_available_ip_with_context() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1)]).await;

        let response = h.orchestrator.request_ip_configs(&ip_request("web-0")).await;
        assert!(response.response.is_success(), "{:?}", response.response);
        assert_eq!(response.pod_ip_info.len(), 1);

        let info = &response.pod_ip_info[0];
        assert_eq!(info.pod_ip_config.ip_address, "10.0.0.5");
        assert_eq!(info.pod_ip_config.prefix_length, 24);
        assert_eq!(info.network_container_primary_ip_config.ip_subnet.ip_address, NC_PRIMARY_IP);
        assert_eq!(info.host_primary_ip_info.primary_ip, HOST_PRIMARY_IP);

        let snapshot = h.orchestrator.debug_snapshot().await;
        assert_eq!(snapshot.ip_configs["id-a"].state, IPState::Assigned);
        assert_eq!(snapshot.pod_ip_index["web-0default"], vec!["id-a".to_string()]);
    }

    #[tokio::test]
    async fn test_request_is_idempotent_per_pod() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1), ("id-b", "10.0.0.6", 1)]).await;

        let first = h.orchestrator.request_ip_configs(&ip_request("web-0")).await;
        let second = h.orchestrator.request_ip_configs(&ip_request("web-0")).await;
        assert!(second.response.is_success());
        assert_eq!(first.pod_ip_info, second.pod_ip_info);

        let snapshot = h.orchestrator.debug_snapshot().await;
        let assigned = snapshot
            .ip_configs
            .values()
            .filter(|s| s.state == IPState::Assigned)
            .count();
        assert_eq!(assigned, 1);
    }

    #[tokio::test]
    async fn test_request_desired_ip() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1), ("id-b", "10.0.0.6", 1)]).await;

        let req = IPConfigsRequest {
            desired_ip_addresses: vec!["10.0.0.6".to_string()],
            ..ip_request("web-0")
        };
        let response = h.orchestrator.request_ip_configs(&req).await;
        assert!(response.response.is_success());
        assert_eq!(response.pod_ip_info[0].pod_ip_config.ip_address, "10.0.0.6");
        assert_eq!(h.ip_state("id-b").await, Some(IPState::Assigned));

        let req = IPConfigsRequest {
            desired_ip_addresses: vec!["10.0.0.99".to_string()],
            ..ip_request("web-1")
        };
        let response = h.orchestrator.request_ip_configs(&req).await;
        assert_eq!(response.response.return_code, ResponseCode::FailedToAllocateIPConfig);
    }

    #[tokio::test]
    async fn test_failed_allocation_rolls_back_partial_assignments() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1), ("id-b", "10.0.0.6", 1)]).await;

        let req = IPConfigsRequest {
            desired_ip_addresses: vec!["10.0.0.6".to_string()],
            ..ip_request("web-0")
        };
        assert!(h.orchestrator.request_ip_configs(&req).await.response.is_success());

        let req = IPConfigsRequest {
            desired_ip_addresses: vec!["10.0.0.5".to_string(), "10.0.0.6".to_string()],
            ..ip_request("web-1")
        };
        let response = h.orchestrator.request_ip_configs(&req).await;
        assert_eq!(response.response.return_code, ResponseCode::FailedToAllocateIPConfig);
        assert_eq!(h.ip_state("id-a").await, Some(IPState::Available));
        assert_eq!(h.ip_state("id-b").await, Some(IPState::Assigned));
        assert!(!h.orchestrator.debug_snapshot().await.pod_ip_index.contains_key("web-1default"));
    }

    #[tokio::test]
    async fn test_exhausted_pool_tracks_waiting_pod() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1)]).await;

        assert!(h.orchestrator.request_ip_configs(&ip_request("web-0")).await.response.is_success());
        let response = h.orchestrator.request_ip_configs(&ip_request("web-1")).await;
        assert_eq!(response.response.return_code, ResponseCode::FailedToAllocateIPConfig);
        assert!(response.pod_ip_info.is_empty());
        assert_eq!(h.orchestrator.debug_snapshot().await.pending_assignments, 1);

        assert!(h.orchestrator.release_ip_configs(&ip_request("web-0")).await.is_success());
        let response = h.orchestrator.request_ip_configs(&ip_request("web-1")).await;
        assert!(response.response.is_success());
        assert_eq!(h.orchestrator.debug_snapshot().await.pending_assignments, 0);
    }

    #[tokio::test]
    async fn test_pending_programming_ips_are_not_handed_out() {
        let h = Harness::new(OrchestratorType::KubernetesCRD);
        assert!(h
            .orchestrator
            .create_or_update_network_container(&nc_request("nc1", "1", &[("id-a", "10.0.0.5", 1)]))
            .await
            .is_success());

        let response = h.orchestrator.request_ip_configs(&ip_request("web-0")).await;
        assert_eq!(response.response.return_code, ResponseCode::FailedToAllocateIPConfig);
        assert_eq!(h.ip_state("id-a").await, Some(IPState::PendingProgramming));
    }

    #[tokio::test]
    async fn test_release_of_pod_without_ips_succeeds() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1)]).await;
        let writes = h.store.write_count();

        assert!(h.orchestrator.release_ip_configs(&ip_request("web-0")).await.is_success());
        assert_eq!(h.store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_mark_ip_as_pending_release() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1), ("id-b", "10.0.0.6", 1)]).await;

        assert!(h.orchestrator.mark_ip_as_pending_release("id-a").await.is_success());
        assert_eq!(h.ip_state("id-a").await, Some(IPState::PendingRelease));
        let writes = h.store.write_count();
        assert!(h.orchestrator.mark_ip_as_pending_release("id-a").await.is_success());
        assert_eq!(h.store.write_count(), writes);

        let response = h.orchestrator.request_ip_configs(&ip_request("web-0")).await;
        assert_eq!(response.pod_ip_info[0].pod_ip_config.ip_address, "10.0.0.6");
        let response = h.orchestrator.mark_ip_as_pending_release("id-b").await;
        assert_eq!(response.return_code, ResponseCode::InconsistentIPConfigState);

        let response = h.orchestrator.mark_ip_as_pending_release("id-z").await;
        assert_eq!(response.return_code, ResponseCode::NotFound);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let h = Harness::new(OrchestratorType::Batch);
        let response = h.orchestrator.request_ip_configs(&ip_request("web-0")).await;
        assert_eq!(response.response.return_code, ResponseCode::UnsupportedOrchestratorType);

        let h = Harness::new(OrchestratorType::Kubernetes);
        let response = h.orchestrator.request_ip_configs(&IPConfigsRequest::default()).await;
        assert_eq!(response.response.return_code, ResponseCode::EmptyOrchestratorContext);
        let response = h.orchestrator.release_ip_configs(&IPConfigsRequest::default()).await;
        assert_eq!(response.return_code, ResponseCode::EmptyOrchestratorContext);
    }

    #[tokio::test]
    async fn test_interface_id_keys_the_pod_index() {
        let h = programmed_harness(&[("id-a", "10.0.0.5", 1)]).await;
        let req = IPConfigsRequest {
            pod_interface_id: "abc123-eth0".to_string(),
            infra_container_id: "abc123".to_string(),
            ..ip_request("web-0")
        };

        assert!(h.orchestrator.request_ip_configs(&req).await.response.is_success());
        let snapshot = h.orchestrator.debug_snapshot().await;
        assert_eq!(snapshot.pod_ip_index["abc123-eth0"], vec!["id-a".to_string()]);

        assert!(h.orchestrator.release_ip_configs(&req).await.is_success());
        assert_eq!(h.ip_state("id-a").await, Some(IPState::Available));
    }
}
