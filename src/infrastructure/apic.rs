//! APIC REST session implementing [`PolicySource`].
//!
//! Queries are blocking and strictly sequential. Transient failures (connect
//! errors, timeouts, HTTP 5xx) are retried with linear backoff and then
//! surfaced; they are never reported as an empty result.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::COOKIE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::domain::ManagedObject;
use crate::infrastructure::traits::{PolicySource, PropFilter, QueryError, ScopedClassQuery};
use crate::infrastructure::{InfraError, InfraResult};

/// Retry budget for transient query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Connection parameters for one APIC.
#[derive(Debug, Clone)]
pub struct ApicConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub verify_tls: bool,
    pub retry: RetryPolicy,
}

/// Authenticated session against an APIC.
pub struct ApicSession {
    base_url: String,
    username: String,
    password: String,
    client: Client,
    retry: RetryPolicy,
    token: Mutex<Option<String>>,
}

impl ApicSession {
    pub fn new(config: ApicConfig) -> InfraResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| InfraError::Http {
                url: config.url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username,
            password: config.password,
            client,
            retry: config.retry,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn current_token(&self) -> Result<String, QueryError> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(QueryError::SessionClosed)
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    /// GET with the session cookie, decoding `imdata`.
    fn get_objects(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<ManagedObject>, QueryError> {
        let token = self.current_token()?;
        let body = self.send_with_retry(|| {
            self.client
                .get(url)
                .query(params)
                .header(COOKIE, format!("APIC-cookie={token}"))
        })?;
        parse_imdata(&body)
    }

    fn send_with_retry<F>(&self, build: F) -> Result<Value, QueryError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match send_once(build()) {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!("attempt {attempt} failed ({e}), retrying in {delay:?}");
                    thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl PolicySource for ApicSession {
    #[instrument(skip(self), fields(url = %self.base_url, user = %self.username))]
    fn login(&self) -> Result<(), QueryError> {
        let url = self.url("api/aaaLogin.json");
        let payload = json!({
            "aaaUser": { "attributes": { "name": self.username, "pwd": self.password } }
        });
        let body = self
            .send_with_retry(|| self.client.post(&url).json(&payload))
            .map_err(|e| match e {
                QueryError::Status { code, message } if code < 500 => {
                    QueryError::Authentication(format!("HTTP {code}: {message}"))
                }
                other => other,
            })?;
        let token = body
            .pointer("/imdata/0/aaaLogin/attributes/token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| QueryError::Authentication("login response carries no token".into()))?;
        self.set_token(Some(token.to_string()));
        debug!("login: session established");
        Ok(())
    }

    #[instrument(skip(self))]
    fn logout(&self) -> Result<(), QueryError> {
        let token = self.current_token()?;
        let url = self.url("api/aaaLogout.json");
        let payload = json!({ "aaaUser": { "attributes": { "name": self.username } } });
        let result = self.send_with_retry(|| {
            self.client
                .post(&url)
                .header(COOKIE, format!("APIC-cookie={token}"))
                .json(&payload)
        });
        self.set_token(None);
        result.map(|_| ())
    }

    #[instrument(skip(self, filter))]
    fn lookup_by_class(
        &self,
        class: &str,
        filter: Option<&PropFilter>,
    ) -> Result<Vec<ManagedObject>, QueryError> {
        let url = self.url(&format!("api/class/{class}.json"));
        let params: Vec<(&str, String)> = filter
            .map(|f| vec![("query-target-filter", f.to_string())])
            .unwrap_or_default();
        let objects = self.get_objects(&url, &params)?;
        debug!("lookup_by_class: {} -> {} objects", class, objects.len());
        Ok(objects)
    }

    #[instrument(skip(self, query), fields(query = %query))]
    fn query(&self, query: &ScopedClassQuery) -> Result<Vec<ManagedObject>, QueryError> {
        let url = self.url(&format!("api/mo/{}.json", query.scope));
        let params = [
            ("query-target", "subtree".to_string()),
            ("target-subtree-class", query.class.clone()),
        ];
        let objects = self.get_objects(&url, &params)?;
        debug!("query: {} -> {} objects", query, objects.len());
        Ok(objects)
    }
}

fn send_once(request: RequestBuilder) -> Result<Value, QueryError> {
    let response = request.send().map_err(transport_error)?;
    let status = response.status();
    let text = response.text().map_err(transport_error)?;
    if !status.is_success() {
        return Err(QueryError::Status {
            code: status.as_u16(),
            message: error_text(&text),
        });
    }
    serde_json::from_str(&text).map_err(|e| QueryError::Decode(e.to_string()))
}

fn transport_error(e: reqwest::Error) -> QueryError {
    QueryError::Transport {
        retryable: e.is_timeout() || e.is_connect(),
        message: e.to_string(),
    }
}

/// Extract the APIC error text from a failed response body, falling back to the raw body.
fn error_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/imdata/0/error/attributes/text")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Decode `{"imdata": [{"<class>": {"attributes": {...}}}, ...]}` into managed objects.
pub fn parse_imdata(body: &Value) -> Result<Vec<ManagedObject>, QueryError> {
    let items = body
        .get("imdata")
        .and_then(Value::as_array)
        .ok_or_else(|| QueryError::Decode("missing 'imdata' array".into()))?;

    let mut objects = Vec::with_capacity(items.len());
    for item in items {
        let Some((class, content)) = item.as_object().and_then(|o| o.iter().next()) else {
            return Err(QueryError::Decode(format!("unexpected imdata entry: {item}")));
        };
        let mut mo = ManagedObject::new(class.as_str());
        if let Some(attributes) = content.get("attributes").and_then(Value::as_object) {
            for (name, value) in attributes {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                mo.attributes.insert(name.clone(), value);
            }
        }
        objects.push(mo);
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;

    use super::*;
    use crate::domain::Dn;

    const LOGIN_OK: &str = r#"{"imdata":[{"aaaLogin":{"attributes":{"token":"tok-1"}}}]}"#;
    const ONE_TENANT: &str =
        r#"{"imdata":[{"fvTenant":{"attributes":{"name":"T1","dn":"uni/tn-T1"}}}]}"#;
    const EMPTY: &str = r#"{"imdata":[]}"#;

    /// Request line (`METHOD /path?query`) and cookie header seen by the stub.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Seen {
        request: String,
        cookie: Option<String>,
    }

    /// Serves one scripted response per connection, then stops.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        thread::spawn(move || {
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);

                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let request = line.split_whitespace().take(2).collect::<Vec<_>>().join(" ");

                let mut cookie = None;
                let mut length = 0;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    let (name, value) = header.split_once(':').unwrap();
                    match name.to_ascii_lowercase().as_str() {
                        "cookie" => cookie = Some(value.trim().to_string()),
                        "content-length" => length = value.trim().parse().unwrap(),
                        _ => {}
                    }
                }
                let mut payload = vec![0; length];
                reader.read_exact(&mut payload).unwrap();
                log.lock().unwrap().push(Seen { request, cookie });

                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let mut stream = reader.into_inner();
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        (url, seen)
    }

    fn session(url: &str) -> ApicSession {
        ApicSession::new(ApicConfig {
            url: url.to_string(),
            username: "admin".into(),
            password: "secret".into(),
            timeout: Duration::from_secs(5),
            verify_tls: false,
            retry: RetryPolicy {
                max_attempts: 3,
                base_backoff_ms: 1,
            },
        })
        .unwrap()
    }

    fn requests(seen: &Mutex<Vec<Seen>>) -> Vec<String> {
        seen.lock().unwrap().iter().map(|s| s.request.clone()).collect()
    }

    #[test]
    fn given_imdata_when_parsing_then_returns_objects_with_attributes() {
        let body = json!({
            "totalCount": "2",
            "imdata": [
                { "fvCtx": { "attributes": { "name": "V1", "dn": "uni/tn-T1/ctx-V1" } } },
                {
                    "fvCtx": {
                        "attributes": { "name": "V2", "dn": "uni/tn-T1/ctx-V2", "pcTag": 49153 }
                    }
                }
            ]
        });
        let objects = parse_imdata(&body).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].class, "fvCtx");
        assert_eq!(objects[0].attr("name"), Some("V1"));
        assert_eq!(objects[1].attr("pcTag"), Some("49153"));
    }

    #[test]
    fn given_empty_imdata_when_parsing_then_returns_no_objects() {
        let body = json!({ "totalCount": "0", "imdata": [] });
        assert!(parse_imdata(&body).unwrap().is_empty());
    }

    #[test]
    fn given_body_without_imdata_when_parsing_then_decode_error() {
        let err = parse_imdata(&json!({ "foo": 1 })).unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
    }

    #[test]
    fn given_apic_error_body_when_extracting_text_then_returns_message() {
        let body = r#"{"imdata":[{"error":{"attributes":{
            "code":"401","text":"Username or password is incorrect"}}}]}"#;
        assert_eq!(error_text(body), "Username or password is incorrect");
        assert_eq!(error_text("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn given_retry_policy_when_computing_delay_then_grows_linearly() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_backoff_ms: 100,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn given_fresh_session_when_querying_before_login_then_session_closed() {
        let session = ApicSession::new(ApicConfig {
            url: "https://apic.example.net/".into(),
            username: "admin".into(),
            password: "secret".into(),
            timeout: Duration::from_secs(1),
            verify_tls: false,
            retry: RetryPolicy::default(),
        })
        .unwrap();
        assert_eq!(
            session.url("/api/class/fvTenant.json"),
            "https://apic.example.net/api/class/fvTenant.json"
        );
        let err = session.lookup_by_class("fvTenant", None).unwrap_err();
        assert!(matches!(err, QueryError::SessionClosed));
    }

    #[test]
    fn given_transient_503s_when_looking_up_then_retries_until_success() {
        let (url, seen) = serve(vec![
            (200, LOGIN_OK),
            (503, EMPTY),
            (503, EMPTY),
            (200, ONE_TENANT),
        ]);
        let session = session(&url);

        session.login().unwrap();
        let objects = session.lookup_by_class("fvTenant", None).unwrap();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].attr("name"), Some("T1"));
        assert_eq!(
            requests(&seen),
            vec![
                "POST /api/aaaLogin.json",
                "GET /api/class/fvTenant.json",
                "GET /api/class/fvTenant.json",
                "GET /api/class/fvTenant.json",
            ]
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].cookie, None);
        assert!(seen[1..]
            .iter()
            .all(|s| s.cookie.as_deref() == Some("APIC-cookie=tok-1")));
    }

    #[test]
    fn given_persistent_503_when_looking_up_then_gives_up_after_max_attempts() {
        let (url, seen) = serve(vec![(200, LOGIN_OK), (503, EMPTY), (503, EMPTY), (503, EMPTY)]);
        let session = session(&url);
        session.login().unwrap();

        let err = session.lookup_by_class("fvTenant", None).unwrap_err();

        assert!(matches!(err, QueryError::Status { code: 503, .. }));
        assert_eq!(requests(&seen).len(), 4);
    }

    #[test]
    fn given_rejected_credentials_when_logging_in_then_authentication_error() {
        let (url, seen) = serve(vec![(
            401,
            r#"{"imdata":[{"error":{"attributes":{"code":"401","text":"bad"}}}]}"#,
        )]);
        let session = session(&url);

        let err = session.login().unwrap_err();

        assert!(matches!(&err, QueryError::Authentication(m) if m == "HTTP 401: bad"));
        assert_eq!(requests(&seen), vec!["POST /api/aaaLogin.json"]);
    }

    #[test]
    fn given_logged_out_session_when_querying_then_session_closed() {
        let (url, seen) = serve(vec![(200, LOGIN_OK), (200, EMPTY), (200, EMPTY)]);
        let session = session(&url);
        let scope = Dn::new("uni/tn-T1");

        session.login().unwrap();
        let bds = session
            .query(&ScopedClassQuery::new(&scope, "fvBD"))
            .unwrap();
        session.logout().unwrap();
        let err = session
            .query(&ScopedClassQuery::new(&scope, "fvBD"))
            .unwrap_err();

        assert!(bds.is_empty());
        assert!(matches!(err, QueryError::SessionClosed));
        assert_eq!(
            requests(&seen),
            vec![
                "POST /api/aaaLogin.json",
                "GET /api/mo/uni/tn-T1.json?query-target=subtree&target-subtree-class=fvBD",
                "POST /api/aaaLogout.json",
            ]
        );
    }
}
