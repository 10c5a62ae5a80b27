//! Websocket handshake shared by the RPC transport and side-channel streams.

use super::identity::ConnectionIdentity;
use crate::config::{ConnectionConfig, TlsMode};
use crate::error::{CrescoError, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a websocket to `url`, presenting `service_key` as the credential.
///
/// Must be awaited on an event loop; the returned stream is bound to it.
pub(crate) async fn open(
    url: &Url,
    service_key: &str,
    tls: TlsMode,
) -> Result<(WsStream, ConnectionIdentity)> {
    let mut request = url.as_str().into_client_request()?;
    let key = HeaderValue::from_str(service_key).map_err(|e| CrescoError::Config {
        message: format!("Service key is not a valid header value: {}", e),
    })?;
    request
        .headers_mut()
        .insert(ConnectionConfig::SERVICE_KEY_HEADER, key);

    let connector = connector_for(tls)?;
    let (stream, response) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
            .await?;

    debug!("Websocket handshake with {} returned {}", url, response.status());

    let identity = ConnectionIdentity::from_headers(response.headers());
    Ok((stream, identity))
}

fn connector_for(tls: TlsMode) -> Result<Option<Connector>> {
    match tls {
        TlsMode::Plain => Ok(Some(Connector::Plain)),
        // Let tungstenite build its default verifying connector
        TlsMode::Verified => Ok(None),
        TlsMode::Unverified => {
            warn!("TLS certificate verification disabled");
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| CrescoError::Tls {
                    message: format!("Failed to build TLS connector: {}", e),
                })?;
            Ok(Some(Connector::NativeTls(connector)))
        }
    }
}
