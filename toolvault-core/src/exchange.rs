//! Token acquisition and scope validation.

use toolvault_sdk::{ExchangeClient, SubjectTokenType, TokenExchangeRequest, TokenResponse};

use crate::config::{AuthorizerConfig, Strategy, TokenSource};
use crate::context::InFlightState;
use crate::credentials::parse_scopes;
use crate::error::Result;
use crate::interrupt::Interrupt;

/// Obtain a third-party token for one invocation.
///
/// Returns `None` when no subject token is available or the authorization
/// server refused or failed the exchange. The failure cause is logged, never
/// returned.
pub async fn fetch_token<A>(
    client: &ExchangeClient,
    config: &AuthorizerConfig<A>,
    args: &A,
) -> Option<TokenResponse> {
    let (subject_type, parameter) = match config.token_source() {
        TokenSource::RefreshToken(p) => (SubjectTokenType::RefreshToken, p),
        TokenSource::AccessToken(p) if config.strategy() == Strategy::AccessTokenExchange => {
            (SubjectTokenType::AccessToken, p)
        }
        TokenSource::AccessToken(p) => {
            let token = p.resolve(args).await?;
            log::debug!(
                "Using configured access token for connection '{}' without exchange",
                config.connection()
            );
            return Some(passthrough(token, config.scopes()));
        }
    };

    let Some(subject_token) = parameter.resolve(args).await else {
        log::debug!(
            "No subject token available for connection '{}'",
            config.connection()
        );
        return None;
    };

    let login_hint = match config.login_hint() {
        Some(hint) => hint.resolve(args).await,
        None => None,
    };

    let request = TokenExchangeRequest::new(subject_type, subject_token, config.connection())
        .with_login_hint(login_hint);

    match client.exchange(request).await {
        Ok(response) => Some(response),
        Err(e) if e.is_denial() => {
            log::warn!(
                "Token exchange for connection '{}' was refused: {}",
                config.connection(),
                e
            );
            None
        }
        Err(e) if e.is_transient() => {
            log::warn!(
                "Token exchange for connection '{}' failed temporarily: {}",
                config.connection(),
                e
            );
            None
        }
        Err(e) => {
            log::warn!(
                "Token exchange for connection '{}' failed: {}",
                config.connection(),
                e
            );
            None
        }
    }
}

/// A configured access token is trusted to carry the policy's scopes.
fn passthrough(token: String, scopes: &[String]) -> TokenResponse {
    let mut response = TokenResponse::bearer(token);
    if !scopes.is_empty() {
        response.scope = Some(scopes.join(" "));
    }
    response
}

/// Check that `token` grants every scope the active call requires.
///
/// Records the granted scopes on `state` and hands the token back. Fails
/// with an `authorization_missing` interrupt when there is no token and with
/// an `authorization_insufficient` interrupt when scopes are missing.
pub fn validate_token(
    state: &InFlightState,
    token: Option<TokenResponse>,
) -> Result<TokenResponse> {
    let Some(token) = token else {
        return Err(Interrupt::missing(
            state.connection(),
            state.scopes(),
            state.authorization_params().cloned(),
        )
        .into());
    };

    let granted = parse_scopes(token.scope.as_deref().unwrap_or(""));
    state.set_current_scopes(granted.clone());

    if state.scopes().iter().any(|s| !granted.contains(s)) {
        return Err(Interrupt::insufficient(
            state.connection(),
            state.scopes(),
            granted,
            state.authorization_params().cloned(),
        )
        .into());
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::interrupt::InterruptKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Args {
        token: Option<String>,
    }

    fn args(token: &str) -> Args {
        Args {
            token: Some(token.to_string()),
        }
    }

    fn state(scopes: &[&str]) -> InFlightState {
        InFlightState::new(
            ExecutionContext::thread("t1"),
            "google-oauth2",
            scopes.iter().map(|s| s.to_string()).collect(),
            None,
        )
    }

    fn scoped(scope: &str) -> TokenResponse {
        let mut response = TokenResponse::bearer("tok");
        response.scope = Some(scope.to_string());
        response
    }

    fn refresh_config() -> AuthorizerConfig<Args> {
        AuthorizerConfig::builder("google-oauth2")
            .scope("calendar.freebusy")
            .refresh_token(|a: &Args| {
                let token = a.token.clone();
                async move { token }
            })
            .login_hint(|_: &Args| async { Some("user@example.com".to_string()) })
            .build()
            .unwrap()
    }

    async fn client_for(server: &MockServer) -> ExchangeClient {
        ExchangeClient::builder()
            .api_base(server.uri())
            .client_id("cid")
            .client_secret("secret")
            .build()
            .unwrap()
    }

    // ===== validate_token =====

    #[test]
    fn test_validate_missing_token() {
        let state = state(&["A", "B"]);
        let err = validate_token(&state, None).unwrap_err();
        let interrupt = err.into_interrupt().unwrap();

        assert_eq!(interrupt.kind, InterruptKind::AuthorizationMissing);
        assert_eq!(interrupt.required_scopes, vec!["A", "B"]);
        assert!(interrupt.current_scopes.is_empty());
    }

    #[test]
    fn test_validate_insufficient_scopes() {
        let state = state(&["A", "B"]);
        let err = validate_token(&state, Some(scoped("A"))).unwrap_err();
        let interrupt = err.into_interrupt().unwrap();

        assert_eq!(interrupt.kind, InterruptKind::AuthorizationInsufficient);
        assert_eq!(interrupt.required_scopes, vec!["A", "B"]);
        assert_eq!(interrupt.current_scopes, vec!["A"]);
        assert_eq!(state.current_scopes(), vec!["A"]);
    }

    #[test]
    fn test_validate_sufficient_scopes() {
        let state = state(&["A", "B"]);
        assert!(validate_token(&state, Some(scoped("A B"))).is_ok());
        assert!(validate_token(&state, Some(scoped("B,A"))).is_ok());
        assert_eq!(state.current_scopes(), vec!["B", "A"]);
    }

    #[test]
    fn test_validate_no_required_scopes() {
        let state = state(&[]);
        assert!(validate_token(&state, Some(TokenResponse::bearer("tok"))).is_ok());
    }

    // ===== fetch_token =====

    #[tokio::test]
    async fn test_refresh_token_exchange() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({
                "subject_token_type": "urn:ietf:params:oauth:token-type:refresh_token",
                "subject_token": "rt-1",
                "connection": "google-oauth2",
                "login_hint": "user@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "calendar.freebusy"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = fetch_token(&client, &refresh_config(), &args("rt-1"))
            .await
            .unwrap();
        assert_eq!(response.access_token, "ya29.token");
    }

    #[tokio::test]
    async fn test_refresh_token_source_ignores_subject_token_type() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({
                "subject_token_type": "urn:ietf:params:oauth:token-type:refresh_token",
                "subject_token": "rt-2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.other",
                "scope": "calendar.freebusy"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = AuthorizerConfig::<Args>::builder("google-oauth2")
            .scope("calendar.freebusy")
            .refresh_token_value("rt-2")
            .subject_token_type(SubjectTokenType::AccessToken)
            .build()
            .unwrap();
        assert_eq!(config.strategy(), Strategy::RefreshTokenExchange);

        let client = client_for(&server).await;
        let response = fetch_token(&client, &config, &Args { token: None })
            .await
            .unwrap();
        assert_eq!(response.access_token, "ya29.other");
    }

    #[tokio::test]
    async fn test_absent_subject_token_skips_exchange() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = fetch_token(&client, &refresh_config(), &Args { token: None }).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_refused_exchange_yields_no_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "federated_connection_refresh_token_not_found",
                "error_description": "Federated connection Refresh Token not found."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(fetch_token(&client, &refresh_config(), &args("rt-1"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_server_error_yields_no_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(fetch_token(&client, &refresh_config(), &args("rt-1"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_access_token_exchange() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({
                "subject_token_type": "urn:ietf:params:oauth:token-type:access_token",
                "subject_token": "at-1",
                "client_id": "cid",
                "client_secret": "secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "gho_token",
                "scope": "repo"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = AuthorizerConfig::<Args>::builder("github")
            .scope("repo")
            .access_token(|a: &Args| {
                let token = a.token.clone();
                async move { token }
            })
            .subject_token_type(SubjectTokenType::AccessToken)
            .build()
            .unwrap();

        let client = client_for(&server).await;
        let response = fetch_token(&client, &config, &args("at-1")).await.unwrap();
        assert_eq!(response.access_token, "gho_token");
    }

    #[tokio::test]
    async fn test_passthrough_makes_no_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = AuthorizerConfig::<Args>::builder("github")
            .scopes(["repo", "read:org"])
            .access_token_value("gho_direct")
            .build()
            .unwrap();

        let client = client_for(&server).await;
        let response = fetch_token(&client, &config, &Args { token: None })
            .await
            .unwrap();

        assert_eq!(response.access_token, "gho_direct");
        assert_eq!(response.scope.as_deref(), Some("read:org repo"));
        assert!(response.expires_in.is_none());
    }
}
