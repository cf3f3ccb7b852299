//! Unit tests for the IP configuration state machine

#[cfg(test)]
mod tests {
    use crate::error::ServiceError;
    use crate::ipconfig::IpConfigPool;
    use crate::test_utils::*;
    use cns_types::{IPState, PodInfo};
    use std::collections::BTreeMap;

    #[test]
    fn test_new_ips_pending_until_host_catches_up() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let mut configs = secondary_configs(&[("id-a", "10.0.0.5", 1), ("id-b", "10.0.0.6", 0)]);

        pool.reconcile_secondary_ips("nc1", &mut configs, &BTreeMap::new(), -1, false, &hook)
            .unwrap();

        assert_eq!(pool.get("id-a").unwrap().state, IPState::PendingProgramming);
        assert_eq!(pool.get("id-b").unwrap().state, IPState::PendingProgramming);

        let mut pool = IpConfigPool::new();
        let mut configs = secondary_configs(&[("id-a", "10.0.0.5", 1)]);
        pool.reconcile_secondary_ips("nc1", &mut configs, &BTreeMap::new(), 1, false, &hook)
            .unwrap();
        assert_eq!(pool.get("id-a").unwrap().state, IPState::Available);
    }

    #[test]
    fn test_existing_ips_keep_their_version() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let previous = secondary_configs(&[("id-a", "10.0.0.5", 1)]);
        let mut first = previous.clone();
        pool.reconcile_secondary_ips("nc1", &mut first, &BTreeMap::new(), 1, false, &hook)
            .unwrap();

        let mut update = secondary_configs(&[("id-a", "10.0.0.5", 7), ("id-b", "10.0.0.6", 7)]);
        pool.reconcile_secondary_ips("nc1", &mut update, &previous, 1, false, &hook)
            .unwrap();

        assert_eq!(update["id-a"].nc_version, 1, "tracked IP must keep its version");
        assert_eq!(update["id-b"].nc_version, 7);
        assert_eq!(pool.get("id-a").unwrap().state, IPState::Available);
        assert_eq!(pool.get("id-b").unwrap().state, IPState::PendingProgramming);
    }

    #[test]
    fn test_removing_assigned_ip_fails_and_changes_nothing() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let previous = secondary_configs(&[("id-a", "10.0.0.5", 0), ("id-b", "10.0.0.6", 0)]);
        let mut first = previous.clone();
        pool.reconcile_secondary_ips("nc1", &mut first, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        pool.assign("id-a", &PodInfo::new("web-0", "default"), &hook).unwrap();
        let before = pool.clone();

        // Drop both IPs; id-b is removable but id-a is assigned.
        let mut update = BTreeMap::new();
        let err = pool
            .reconcile_secondary_ips("nc1", &mut update, &previous, 0, false, &hook)
            .unwrap_err();

        assert!(matches!(err, ServiceError::InconsistentIPConfigState(_)));
        assert_eq!(pool, before, "validation must run before any removal");
    }

    #[test]
    fn test_skip_validation_removes_assigned_ip() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let previous = secondary_configs(&[("id-a", "10.0.0.5", 0)]);
        let mut first = previous.clone();
        pool.reconcile_secondary_ips("nc1", &mut first, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        pool.assign("id-a", &PodInfo::new("web-0", "default"), &hook).unwrap();

        let mut update = BTreeMap::new();
        pool.reconcile_secondary_ips("nc1", &mut update, &previous, 0, true, &hook)
            .unwrap();

        assert!(pool.get("id-a").is_none());
        assert!(pool.ids_for_pod("web-0default").is_empty());
    }

    #[test]
    fn test_add_then_remove_then_readd_while_assigned() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();

        // Created at version 1 with the host never having confirmed anything.
        let v1 = secondary_configs(&[("id-a", "10.0.0.5", 1)]);
        let mut req = v1.clone();
        pool.reconcile_secondary_ips("nc1", &mut req, &BTreeMap::new(), -1, false, &hook)
            .unwrap();
        assert_eq!(pool.get("id-a").unwrap().state, IPState::PendingProgramming);

        // Host catches up.
        assert_eq!(pool.promote_programmed("nc1", 1, &v1, &hook), 1);
        assert_eq!(pool.get("id-a").unwrap().state, IPState::Available);

        // A is dropped while Available.
        let mut empty = BTreeMap::new();
        pool.reconcile_secondary_ips("nc1", &mut empty, &v1, 1, false, &hook)
            .unwrap();
        assert!(pool.get("id-a").is_none());

        // A races back in as Assigned before the re-add at version 2 lands.
        let mut raced = secondary_configs(&[("id-a", "10.0.0.5", 1)]);
        pool.reconcile_secondary_ips("nc1", &mut raced, &BTreeMap::new(), 1, false, &hook)
            .unwrap();
        pool.assign("id-a", &PodInfo::new("web-0", "default"), &hook).unwrap();

        let mut v2 = secondary_configs(&[("id-a", "10.0.0.5", 2)]);
        let err = pool
            .reconcile_secondary_ips("nc1", &mut v2, &BTreeMap::new(), 1, false, &hook)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InconsistentIPConfigState(_)));
    }

    #[test]
    fn test_ip_owned_by_other_nc_is_rejected() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let mut configs = secondary_configs(&[("id-a", "10.0.0.5", 0)]);
        pool.reconcile_secondary_ips("nc1", &mut configs, &BTreeMap::new(), 0, false, &hook)
            .unwrap();

        let mut other = secondary_configs(&[("id-a", "10.0.0.5", 0)]);
        let err = pool
            .reconcile_secondary_ips("nc2", &mut other, &BTreeMap::new(), 0, false, &hook)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InconsistentIPConfigState(_)));
        assert_eq!(pool.get("id-a").unwrap().nc_id, "nc1");
    }

    #[test]
    fn test_assign_and_release() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let mut configs = secondary_configs(&[("id-a", "10.0.0.5", 0)]);
        pool.reconcile_secondary_ips("nc1", &mut configs, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        let pod = PodInfo::new("web-0", "default").with_interface("abc", "abc-eth0");

        pool.assign("id-a", &pod, &hook).unwrap();
        assert_eq!(pool.ids_for_pod("abc-eth0"), ["id-a".to_string()]);
        assert!(matches!(
            pool.assign("id-a", &pod, &hook),
            Err(ServiceError::InconsistentIPConfigState(_))
        ));

        pool.release("id-a", &hook).unwrap();
        let status = pool.get("id-a").unwrap();
        assert_eq!(status.state, IPState::Available);
        assert!(status.pod_info.is_none());
        assert!(pool.ids_for_pod("abc-eth0").is_empty());

        assert!(matches!(
            pool.release("id-a", &hook),
            Err(ServiceError::InconsistentIPConfigState(_))
        ));
        assert!(matches!(
            pool.release("missing", &hook),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_pending_release_lifecycle() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let previous = secondary_configs(&[("id-a", "10.0.0.5", 0), ("id-b", "10.0.0.6", 0)]);
        let mut configs = previous.clone();
        pool.reconcile_secondary_ips("nc1", &mut configs, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        pool.assign("id-b", &PodInfo::new("web-0", "default"), &hook).unwrap();

        assert!(pool.mark_pending_release("id-a", &hook).unwrap());
        assert!(!pool.mark_pending_release("id-a", &hook).unwrap());
        assert!(matches!(
            pool.mark_pending_release("id-b", &hook),
            Err(ServiceError::InconsistentIPConfigState(_))
        ));
        assert!(matches!(
            pool.assign("id-a", &PodInfo::new("web-1", "default"), &hook),
            Err(ServiceError::InconsistentIPConfigState(_))
        ));

        let mut scaled_down = secondary_configs(&[("id-b", "10.0.0.6", 0)]);
        pool.reconcile_secondary_ips("nc1", &mut scaled_down, &previous, 0, false, &hook)
            .unwrap();
        assert!(pool.get("id-a").is_none());
    }

    #[test]
    fn test_remove_nc_refuses_when_assigned() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let mut nc1 = secondary_configs(&[("id-a", "10.0.0.5", 0), ("id-b", "10.0.0.6", 0)]);
        let mut nc2 = secondary_configs(&[("id-c", "10.1.0.5", 0)]);
        pool.reconcile_secondary_ips("nc1", &mut nc1, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        pool.reconcile_secondary_ips("nc2", &mut nc2, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        pool.assign("id-b", &PodInfo::new("web-0", "default"), &hook).unwrap();

        assert!(pool.remove_nc("nc1", &hook).is_err());
        assert_eq!(pool.len(), 3);

        assert_eq!(pool.remove_nc("nc2", &hook).unwrap(), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_hook_sees_every_transition() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let previous = secondary_configs(&[("id-a", "10.0.0.5", 0)]);
        let mut configs = previous.clone();
        pool.reconcile_secondary_ips("nc1", &mut configs, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        pool.assign("id-a", &PodInfo::new("web-0", "default"), &hook).unwrap();
        pool.release("id-a", &hook).unwrap();
        let mut empty = BTreeMap::new();
        pool.reconcile_secondary_ips("nc1", &mut empty, &previous, 0, false, &hook)
            .unwrap();

        assert_eq!(
            hook.events(),
            vec![
                ("id-a".to_string(), None, Some(IPState::Available)),
                ("id-a".to_string(), Some(IPState::Available), Some(IPState::Assigned)),
                ("id-a".to_string(), Some(IPState::Assigned), Some(IPState::Available)),
                ("id-a".to_string(), Some(IPState::Available), None),
            ]
        );
    }

    #[test]
    fn test_pod_index_rebuilt_after_deserialize() {
        let hook = RecordingHook::default();
        let mut pool = IpConfigPool::new();
        let mut configs = secondary_configs(&[("id-a", "10.0.0.5", 0), ("id-b", "10.0.0.6", 0)]);
        pool.reconcile_secondary_ips("nc1", &mut configs, &BTreeMap::new(), 0, false, &hook)
            .unwrap();
        pool.assign("id-b", &PodInfo::new("web-0", "default"), &hook).unwrap();

        let json = serde_json::to_value(&pool).unwrap();
        assert!(json.get("id-a").is_some(), "persisted as a bare ID map");

        let restored: IpConfigPool = serde_json::from_value(json).unwrap();
        assert_eq!(restored, pool);
        assert_eq!(restored.ids_for_pod("web-0default"), ["id-b".to_string()]);
    }
}
