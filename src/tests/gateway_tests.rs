//! tests/gateway_tests.rs
//! HttpGateway contra un proveedor simulado con wiremock.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actix_rt::test;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::dispatch_config::ProviderConfig;
    use crate::services::gateway_service::{
        GatewayError, HttpGateway, MessageGateway, OutboundMessage,
    };

    fn gateway_for(api_url: String) -> HttpGateway {
        let config = ProviderConfig {
            api_url,
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(2),
        };
        HttpGateway::new(&config, "news@example.com".to_string()).unwrap()
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            to: "ana@example.com".to_string(),
            subject: "Hello Ana".to_string(),
            html: "<p>Hi Ana</p>".to_string(),
        }
    }

    #[test]
    async fn test_success_returns_provider_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "from": "news@example.com",
                "to": "ana@example.com",
                "subject": "Hello Ana",
                "html": "<p>Hi Ana</p>"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "prov-123" })))
            .expect(1)
            .mount(&server)
            .await;

        // barra final en la URL base no debe duplicarse
        let gateway = gateway_for(format!("{}/", server.uri()));
        let receipt = gateway.send(&message()).await.unwrap();
        assert_eq!(receipt.message_id, "prov-123");
    }

    #[test]
    async fn test_429_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = gateway_for(server.uri()).send(&message()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({ "message": "invalid `to` field" })),
            )
            .mount(&server)
            .await;

        let err = gateway_for(server.uri()).send(&message()).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Provider {
                status: 422,
                message: "invalid `to` field".to_string()
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = gateway_for(server.uri()).send(&message()).await.unwrap_err();
        match &err {
            GatewayError::Provider { status, message } => {
                assert_eq!(*status, 503);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[test]
    async fn test_malformed_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = gateway_for(server.uri()).send(&message()).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    async fn test_unreachable_provider_is_transport_error() {
        let err = gateway_for("http://127.0.0.1:1".to_string())
            .send(&message())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[test]
    async fn test_rejected_and_timeout_classification() {
        assert!(!GatewayError::Rejected("smtp 550: no such user".to_string()).is_retryable());
        assert!(GatewayError::Provider {
            status: 408,
            message: String::new()
        }
        .is_retryable());
        assert_eq!(
            GatewayError::RateLimited { retry_after: None }.retry_after(),
            None
        );
    }
}
