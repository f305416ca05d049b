// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;

use crate::error::{Result, TransportError};
use crate::models::HttpConfig;

/// Credentials for HTTP basic authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()?;
    Ok(client)
}

/// GET a resource, failing on anything but `200 OK`.
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    log::debug!("GET {}", url);
    let response = client.get(url).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.ok();
        return Err(transport_error(Method::GET, url, status, None, body).into());
    }
    Ok(response.bytes().await?.to_vec())
}

/// Send a JSON body, failing on any non-2xx status.
pub async fn send_json<T: Serialize + ?Sized>(
    client: &Client,
    method: Method,
    url: &str,
    body: &T,
    auth: Option<&BasicAuth>,
) -> Result<()> {
    let json = serde_json::to_string(body)?;
    log::debug!("{} {}", method, url);

    let mut request = client
        .request(method.clone(), url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(json.clone());
    if let Some(auth) = auth {
        request = request.basic_auth(&auth.username, auth.password.as_ref());
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let response_body = response.text().await.ok();
        return Err(transport_error(method, url, status, Some(json), response_body).into());
    }
    Ok(())
}

fn transport_error(
    method: Method,
    url: &str,
    status: StatusCode,
    request_body: Option<String>,
    response_body: Option<String>,
) -> TransportError {
    TransportError {
        method: method.to_string(),
        uri: url.to_string(),
        status: Some(status.as_u16()),
        request_body,
        response_body: response_body.filter(|body| !body.is_empty()),
    }
}
