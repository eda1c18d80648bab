//! UniFi Network 컨트롤러 클라이언트
//!
//! [`UnifiClient`]는 UniFi 컨트롤러의 포트 포워딩 REST API를 [`ApplianceClient`]로 감쌉니다.
//!
//! # 컨트롤러 종류
//!
//! | 종류 | 감지 | 로그인 경로 | API 접두어 |
//! |------|------|-------------|-----------|
//! | UniFi OS (UDM, UCG 등) | `GET /` 가 200 | `/api/auth/login` | `/proxy/network` |
//! | 클래식 컨트롤러 | 그 외 (리다이렉트 등) | `/api/login` | 없음 |
//!
//! UniFi OS는 로그인 응답의 `X-CSRF-Token` 헤더 값을 이후 요청에 실어야 합니다.
//!
//! # 응답 형식
//!
//! ```text
//! {"meta": {"rc": "ok" | "error", "msg": "..."}, "data": [ ... ]}
//! ```

use std::time::Duration;

use portfwd_core::types::ForwardRule;
use reqwest::header::HeaderMap;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::appliance::ApplianceClient;
use crate::config::ForwardingConfig;
use crate::error::ForwardingError;

const CSRF_HEADER: &str = "x-csrf-token";
const UPDATED_CSRF_HEADER: &str = "x-updated-csrf-token";
const UNIFI_OS_PREFIX: &str = "/proxy/network";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 응답 봉투
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    meta: Meta,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    rc: String,
    #[serde(default)]
    msg: Option<String>,
}

/// 컨트롤러가 보고하는 포트 포워딩 항목
#[derive(Debug, Clone, Deserialize)]
struct PortForwardEntry {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    fwd: String,
    #[serde(default)]
    fwd_port: String,
}

impl PortForwardEntry {
    /// 범위 포트 (`8000-8001`) 항목은 `None`을 반환합니다.
    fn to_rule(&self) -> Option<Result<ForwardRule, ForwardingError>> {
        if self.fwd_port.contains('-') {
            return None;
        }
        let port = match self.fwd_port.trim().parse::<u16>() {
            Ok(port) => port,
            Err(e) => {
                return Some(Err(ForwardingError::InvalidRule {
                    name: self.name.clone(),
                    reason: format!("forward port '{}' is not a port number: {e}", self.fwd_port),
                }));
            }
        };
        Some(Ok(ForwardRule::new(
            self.name.clone(),
            self.fwd.clone(),
            port,
        )))
    }

    fn matches(&self, rule: &ForwardRule) -> bool {
        self.name == rule.name
            && self.fwd == rule.address
            && self.fwd_port.trim().parse::<u16>().ok() == Some(rule.port)
    }
}

/// 생성 요청 본문
#[derive(Debug, Serialize)]
struct NewPortForward<'a> {
    enabled: bool,
    name: &'a str,
    fwd: &'a str,
    fwd_port: String,
    dst_port: String,
    src: &'static str,
    proto: &'static str,
    pfwd_interface: &'static str,
}

impl<'a> From<&'a ForwardRule> for NewPortForward<'a> {
    fn from(rule: &'a ForwardRule) -> Self {
        Self {
            enabled: true,
            name: &rule.name,
            fwd: &rule.address,
            fwd_port: rule.port.to_string(),
            dst_port: rule.port.to_string(),
            src: "any",
            proto: "tcp_udp",
            pfwd_interface: "wan",
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// UniFi 컨트롤러 클라이언트
///
/// 세션 쿠키와 CSRF 토큰을 내부에 보관합니다. 세션이 만료되어 401을 받으면
/// 한 번 다시 로그인한 뒤 같은 요청을 재시도합니다.
pub struct UnifiClient {
    http: reqwest::Client,
    base_url: String,
    site: String,
    username: String,
    password: String,
    unifi_os: bool,
    csrf_token: RwLock<Option<String>>,
}

impl std::fmt::Debug for UnifiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiClient")
            .field("base_url", &self.base_url)
            .field("site", &self.site)
            .field("unifi_os", &self.unifi_os)
            .finish_non_exhaustive()
    }
}

impl UnifiClient {
    /// 컨트롤러 종류를 감지하고 로그인한 클라이언트를 생성합니다.
    ///
    /// # Errors
    ///
    /// - `ForwardingError::Config`: 설정이 유효하지 않음
    /// - `ForwardingError::ApplianceConnection`: 컨트롤러에 연결할 수 없음
    /// - `ForwardingError::ApplianceAuth`: 로그인 실패
    pub async fn connect(config: &ForwardingConfig) -> Result<Self, ForwardingError> {
        config.validate()?;

        if config.insecure {
            warn!(base_url = %config.base_url, "tls certificate verification is disabled");
        }

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(config.insecure)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                ForwardingError::ApplianceConnection(format!("failed to build http client: {e}"))
            })?;

        let base_url = config.base_url.trim_end_matches('/').to_owned();
        let unifi_os = detect_unifi_os(&http, &base_url).await?;

        let client = Self {
            http,
            base_url,
            site: config.site.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            unifi_os,
            csrf_token: RwLock::new(None),
        };
        client.login().await?;

        info!(
            base_url = %client.base_url,
            site = %client.site,
            unifi_os = client.unifi_os,
            "logged in to unifi controller"
        );
        Ok(client)
    }

    /// UniFi OS 콘솔인지 여부
    pub fn is_unifi_os(&self) -> bool {
        self.unifi_os
    }

    /// 사이트 이름
    pub fn site(&self) -> &str {
        &self.site
    }

    async fn login(&self) -> Result<(), ForwardingError> {
        let path = if self.unifi_os {
            "/api/auth/login"
        } else {
            "/api/login"
        };
        let url = format!("{}{path}", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| ForwardingError::ApplianceConnection(format!("login request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ForwardingError::ApplianceAuth(format!(
                "login rejected for user '{}' (HTTP {status})",
                self.username
            )));
        }
        if !status.is_success() {
            return Err(ForwardingError::ApplianceAuth(format!(
                "unexpected login response: HTTP {status}"
            )));
        }

        if let Some(token) = header_value(response.headers(), CSRF_HEADER) {
            *self.csrf_token.write().await = Some(token);
        }
        debug!(unifi_os = self.unifi_os, "unifi session established");
        Ok(())
    }

    fn portforward_path(&self) -> String {
        let prefix = if self.unifi_os { UNIFI_OS_PREFIX } else { "" };
        format!(
            "{}{prefix}/api/s/{}/rest/portforward",
            self.base_url, self.site
        )
    }

    /// API 요청을 보내고 봉투의 `data`를 반환합니다. 401이면 한 번 재로그인 후 재시도합니다.
    async fn api<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<T>, ForwardingError> {
        let mut response = self.send(method.clone(), url, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(url, "unifi session expired, logging in again");
            self.login().await?;
            response = self.send(method, url, body).await?;
        }
        decode(response).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ForwardingError> {
        let mut request = self.http.request(method.clone(), url);
        let token = self.csrf_token.read().await.clone();
        if let Some(token) = token {
            request = request.header(CSRF_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            ForwardingError::ApplianceConnection(format!("{method} {url} failed: {e}"))
        })?;

        if let Some(token) = header_value(response.headers(), UPDATED_CSRF_HEADER) {
            *self.csrf_token.write().await = Some(token);
        }
        Ok(response)
    }

    async fn list_entries(&self) -> Result<Vec<PortForwardEntry>, ForwardingError> {
        let url = self.portforward_path();
        self.api(Method::GET, &url, None).await
    }
}

impl ApplianceClient for UnifiClient {
    async fn list(&self) -> Result<Vec<ForwardRule>, ForwardingError> {
        let entries = self.list_entries().await?;
        let mut rules = Vec::with_capacity(entries.len());
        for entry in &entries {
            match entry.to_rule() {
                Some(rule) => rules.push(rule?),
                None => debug!(name = %entry.name, port = %entry.fwd_port, "skipping port range rule"),
            }
        }
        Ok(rules)
    }

    async fn create(&self, rules: &[ForwardRule]) -> Result<(), ForwardingError> {
        let url = self.portforward_path();
        for rule in rules {
            let body = serde_json::to_value(NewPortForward::from(rule)).map_err(|e| {
                ForwardingError::InvalidRule {
                    name: rule.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            self.api::<serde_json::Value>(Method::POST, &url, Some(&body))
                .await?;
            debug!(rule = %rule, "unifi port forward created");
        }
        Ok(())
    }

    async fn delete(&self, rules: &[ForwardRule]) -> Result<(), ForwardingError> {
        // 규칙 ID를 보관하지 않으므로 삭제 직전에 다시 조회합니다
        let entries = self.list_entries().await?;
        let ids: Vec<&str> = entries
            .iter()
            .filter(|entry| rules.iter().any(|rule| entry.matches(rule)))
            .map(|entry| entry.id.as_str())
            .collect();

        let base = self.portforward_path();
        for id in ids {
            let url = format!("{base}/{id}");
            self.api::<serde_json::Value>(Method::DELETE, &url, None)
                .await?;
            debug!(id, "unifi port forward deleted");
        }
        Ok(())
    }
}

/// 컨트롤러 루트가 200을 반환하면 UniFi OS로 판단합니다.
///
/// 클래식 컨트롤러는 루트 요청을 `/manage`로 리다이렉트합니다.
async fn detect_unifi_os(http: &reqwest::Client, base_url: &str) -> Result<bool, ForwardingError> {
    let response = http.get(base_url).send().await.map_err(|e| {
        ForwardingError::ApplianceConnection(format!("failed to reach {base_url}: {e}"))
    })?;
    let unifi_os = response.status() == StatusCode::OK;
    debug!(status = %response.status(), unifi_os, "detected unifi controller type");
    Ok(unifi_os)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, ForwardingError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| {
        ForwardingError::ApplianceConnection(format!("failed to read response body: {e}"))
    })?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ForwardingError::ApplianceAuth(format!(
            "request rejected (HTTP {status})"
        )));
    }

    let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
        ForwardingError::ApplianceApi(format!("unexpected response (HTTP {status}): {e}"))
    })?;

    if envelope.meta.rc != "ok" {
        let msg = envelope.meta.msg.unwrap_or(envelope.meta.rc);
        return Err(ForwardingError::ApplianceApi(msg));
    }
    if !status.is_success() {
        return Err(ForwardingError::ApplianceApi(format!("HTTP {status}")));
    }
    Ok(envelope.data)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
