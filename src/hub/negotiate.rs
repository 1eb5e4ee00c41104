// Hub negotiation: resolve the WebSocket URL for a hub endpoint.

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use super::HubError;

/// Maximum number of negotiate redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

const WEBSOCKETS_TRANSPORT: &str = "WebSockets";

/// Body of a negotiate response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub connection_token: Option<String>,
    #[serde(default)]
    pub negotiate_version: u32,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    /// Redirect target: negotiate again against this URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Token to use for the redirect target.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

/// Where to open the WebSocket, plus the token that goes with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub ws_url: String,
    pub access_token: Option<String>,
}

/// Negotiate against `hub_url`, following redirects, and return the
/// WebSocket endpoint.
pub async fn negotiate(
    http: &reqwest::Client,
    hub_url: &str,
    access_token: Option<&str>,
) -> Result<Endpoint, HubError> {
    let mut url = hub_url.to_string();
    let mut token = access_token.map(str::to_string);

    for _ in 0..=MAX_REDIRECTS {
        let negotiate_url = negotiate_url(&url)?;
        debug!("Negotiating with {negotiate_url}");

        let mut request = http.post(negotiate_url);
        if let Some(t) = &token {
            request = request.bearer_auth(t);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::Negotiate(format!("{status}: {body}")));
        }
        let body: NegotiateResponse = response.json().await?;

        match resolve(&url, body)? {
            Resolution::Redirect {
                url: next,
                access_token,
            } => {
                info!("Negotiate redirected to {next}");
                url = next;
                if access_token.is_some() {
                    token = access_token;
                }
            }
            Resolution::Connect { connection_token } => {
                let ws_url = websocket_url(&url, Some(&connection_token), token.as_deref())?;
                return Ok(Endpoint {
                    ws_url,
                    access_token: token,
                });
            }
        }
    }

    Err(HubError::Negotiate(format!(
        "more than {MAX_REDIRECTS} negotiate redirects"
    )))
}

/// Endpoint used when negotiation is skipped: the hub URL itself.
pub fn direct_endpoint(hub_url: &str, access_token: Option<&str>) -> Result<Endpoint, HubError> {
    Ok(Endpoint {
        ws_url: websocket_url(hub_url, None, access_token)?,
        access_token: access_token.map(str::to_string),
    })
}

/// Outcome of one negotiate round.
#[derive(Debug, PartialEq)]
pub enum Resolution {
    Redirect {
        url: String,
        access_token: Option<String>,
    },
    Connect {
        connection_token: String,
    },
}

/// Interpret a negotiate response body.
pub fn resolve(hub_url: &str, body: NegotiateResponse) -> Result<Resolution, HubError> {
    if let Some(error) = body.error {
        return Err(HubError::Negotiate(error));
    }
    if let Some(url) = body.url {
        return Ok(Resolution::Redirect {
            url,
            access_token: body.access_token,
        });
    }

    let offers_websockets = body
        .available_transports
        .iter()
        .any(|t| t.transport == WEBSOCKETS_TRANSPORT);
    if !offers_websockets {
        return Err(HubError::Negotiate(format!(
            "{hub_url} does not offer the WebSockets transport"
        )));
    }

    // Version 0 servers only hand out the connection id.
    let connection_token = if body.negotiate_version >= 1 {
        body.connection_token
    } else {
        body.connection_id
    };
    let connection_token = connection_token
        .ok_or_else(|| HubError::Negotiate("response has no connection token".into()))?;

    Ok(Resolution::Connect { connection_token })
}

/// `{hub_url}/negotiate?negotiateVersion=1`, keeping any existing query.
pub fn negotiate_url(hub_url: &str) -> Result<Url, HubError> {
    let mut url = parse(hub_url)?;
    let path = format!("{}/negotiate", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().append_pair("negotiateVersion", "1");
    Ok(url)
}

/// Map the hub URL onto its WebSocket form with the connection query.
pub fn websocket_url(
    hub_url: &str,
    connection_token: Option<&str>,
    access_token: Option<&str>,
) -> Result<String, HubError> {
    let mut url = parse(hub_url)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(HubError::InvalidUrl(format!("unsupported scheme `{other}`"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| HubError::InvalidUrl(format!("cannot use scheme `{scheme}`")))?;

    if connection_token.is_some() || access_token.is_some() {
        let mut query = url.query_pairs_mut();
        if let Some(id) = connection_token {
            query.append_pair("id", id);
        }
        if let Some(token) = access_token {
            query.append_pair("access_token", token);
        }
    }
    Ok(url.to_string())
}

fn parse(raw: &str) -> Result<Url, HubError> {
    Url::parse(raw).map_err(|e| HubError::InvalidUrl(format!("{raw}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn websocket_offer() -> Vec<AvailableTransport> {
        vec![AvailableTransport {
            transport: "WebSockets".into(),
            transfer_formats: vec!["Text".into(), "Binary".into()],
        }]
    }

    #[test]
    fn negotiate_url_appends_route_and_version() {
        let url = negotiate_url("https://shop.example.com/hubs/chat").unwrap();
        assert_eq!(
            url.as_str(),
            "https://shop.example.com/hubs/chat/negotiate?negotiateVersion=1"
        );
    }

    #[test]
    fn negotiate_url_keeps_existing_query_and_trailing_slash() {
        let url = negotiate_url("http://localhost:5000/hubs/chat/?tenant=7").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/hubs/chat/negotiate?tenant=7&negotiateVersion=1"
        );
    }

    #[test]
    fn websocket_url_maps_schemes() {
        assert_eq!(
            websocket_url("http://localhost:5000/hubs/chat", None, None).unwrap(),
            "ws://localhost:5000/hubs/chat"
        );
        assert_eq!(
            websocket_url("https://shop.example.com/hubs/chat", None, None).unwrap(),
            "wss://shop.example.com/hubs/chat"
        );
        assert_eq!(
            websocket_url("ws://127.0.0.1:9000/", None, None).unwrap(),
            "ws://127.0.0.1:9000/"
        );
    }

    #[test]
    fn websocket_url_adds_id_and_token() {
        let url = websocket_url(
            "https://shop.example.com/hubs/chat",
            Some("tok-123"),
            Some("secret"),
        )
        .unwrap();
        assert_eq!(
            url,
            "wss://shop.example.com/hubs/chat?id=tok-123&access_token=secret"
        );
    }

    #[test]
    fn websocket_url_rejects_other_schemes() {
        assert!(matches!(
            websocket_url("ftp://example.com/hub", None, None),
            Err(HubError::InvalidUrl(_))
        ));
    }

    #[test]
    fn resolve_uses_connection_token_for_version_one() {
        let body = NegotiateResponse {
            connection_id: Some("cid".into()),
            connection_token: Some("ctoken".into()),
            negotiate_version: 1,
            available_transports: websocket_offer(),
            ..Default::default()
        };
        assert_eq!(
            resolve("http://h/hub", body).unwrap(),
            Resolution::Connect {
                connection_token: "ctoken".into()
            }
        );
    }

    #[test]
    fn resolve_uses_connection_id_for_version_zero() {
        let body = NegotiateResponse {
            connection_id: Some("cid".into()),
            negotiate_version: 0,
            available_transports: websocket_offer(),
            ..Default::default()
        };
        assert_eq!(
            resolve("http://h/hub", body).unwrap(),
            Resolution::Connect {
                connection_token: "cid".into()
            }
        );
    }

    #[test]
    fn resolve_follows_redirect() {
        let body: NegotiateResponse = serde_json::from_str(
            r#"{"url":"https://hub.example.net/client/?hub=chat","accessToken":"redirected"}"#,
        )
        .unwrap();
        assert_eq!(
            resolve("http://h/hub", body).unwrap(),
            Resolution::Redirect {
                url: "https://hub.example.net/client/?hub=chat".into(),
                access_token: Some("redirected".into()),
            }
        );
    }

    #[test]
    fn resolve_reports_server_error() {
        let body = NegotiateResponse {
            error: Some("Unauthorized".into()),
            ..Default::default()
        };
        match resolve("http://h/hub", body) {
            Err(HubError::Negotiate(msg)) => assert_eq!(msg, "Unauthorized"),
            other => panic!("expected negotiate error, got {other:?}"),
        }
    }

    #[test]
    fn resolve_requires_websockets() {
        let body: NegotiateResponse = serde_json::from_str(
            r#"{"connectionId":"c","connectionToken":"t","negotiateVersion":1,
                "availableTransports":[{"transport":"LongPolling","transferFormats":["Text"]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            resolve("http://h/hub", body),
            Err(HubError::Negotiate(_))
        ));
    }

    #[test]
    fn direct_endpoint_skips_connection_id() {
        let endpoint = direct_endpoint("http://localhost:5000/hubs/chat", Some("tok")).unwrap();
        assert_eq!(endpoint.ws_url, "ws://localhost:5000/hubs/chat?access_token=tok");
        assert_eq!(endpoint.access_token.as_deref(), Some("tok"));
    }
}
