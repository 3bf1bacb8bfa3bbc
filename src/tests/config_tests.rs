//! tests/config_tests.rs

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::dispatch_config::{BulkSuccessPolicy, DispatchConfig, GatewayKind};

    #[test]
    fn test_defaults() {
        let cfg = DispatchConfig::default();
        assert_eq!(cfg.gateway_kind, GatewayKind::Http);
        assert_eq!(cfg.delivery.rate_per_second, 2);
        assert_eq!(cfg.delivery.burst, 1);
        assert_eq!(cfg.delivery.max_attempts, 3);
        assert_eq!(cfg.delivery.backoff_base, Duration::from_millis(500));
        assert_eq!(cfg.delivery.test_subject_prefix, "[TEST] ");
        assert_eq!(cfg.delivery.bulk_success_policy, BulkSuccessPolicy::Unconditional);
    }

    #[test]
    fn test_enums_parse_case_insensitively() {
        assert_eq!("SMTP".parse::<GatewayKind>().unwrap(), GatewayKind::Smtp);
        assert_eq!(" http ".parse::<GatewayKind>().unwrap(), GatewayKind::Http);
        assert!("carrier-pigeon".parse::<GatewayKind>().is_err());

        assert_eq!(
            "All_Delivered".parse::<BulkSuccessPolicy>().unwrap(),
            BulkSuccessPolicy::AllDelivered
        );
        assert!("sometimes".parse::<BulkSuccessPolicy>().is_err());
    }
}
