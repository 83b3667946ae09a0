use log::{debug, info, trace};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use std::env;
use std::io;

use crate::config::Config;
use crate::error::{Error, Result};

/// Environment variable consulted when the config file has no JIRA_PASS.
pub const PASSWORD_ENV: &str = "JIRA_PASS";

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// An HTTP client holding the Jira session cookie for the rest of the run.
pub struct Session {
    client: Client,
    host: String,
    dry_run: bool,
}

impl Session {
    pub fn new(host: &str, dry_run: bool) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|source| Error::Request {
                url: host.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            host: host.to_string(),
            dry_run,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// POST the login endpoint; the returned cookie is kept by the client.
    pub fn login(&self, auth_path: &str, username: &str, password: &str) -> Result<()> {
        let url = format!("{}{}", self.host, auth_path);
        info!("[auth] logging into {} as {}", url, username);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        self.post_json(&url, headers, &Credentials { username, password })
    }

    /// Send `body` as JSON to `url`. In a dry run the request is built but not sent.
    pub fn post_json<T: Serialize>(&self, url: &str, headers: HeaderMap, body: &T) -> Result<()> {
        let request_error = |source: reqwest::Error| Error::Request {
            url: url.to_string(),
            source,
        };

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .headers(headers)
            .json(body)
            .build()
            .map_err(request_error)?;

        debug!("[auth] POST {}", request.url());
        for (name, value) in request.headers() {
            trace!("[auth] {}: {}", name, value.to_str().unwrap_or("<binary>"));
        }

        if self.dry_run {
            info!("[auth] dry run, not sending request to {}", url);
            return Ok(());
        }

        let response = self
            .client
            .execute(request)
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?;
        trace!("[auth] response headers: {:?}", response.headers());
        let content = response.text().map_err(request_error)?;
        trace!("[auth] response content: {}", content);
        Ok(())
    }
}

/// Pick the password: config file, then environment, then `prompt`.
/// Empty values count as unset.
pub fn resolve_password<F>(configured: Option<&str>, from_env: Option<String>, prompt: F) -> Result<String>
where
    F: FnOnce() -> io::Result<String>,
{
    debug!("[auth] getting password");
    if let Some(password) = configured.filter(|p| !p.is_empty()) {
        return Ok(password.to_string());
    }
    if let Some(password) = from_env.filter(|p| !p.is_empty()) {
        debug!("[auth] using password from ${}", PASSWORD_ENV);
        return Ok(password);
    }
    prompt().map_err(Error::Password)
}

fn password(config: &Config) -> Result<String> {
    resolve_password(config.password.as_deref(), env::var(PASSWORD_ENV).ok(), || {
        if config.dry_run {
            info!("[auth] dry run, not prompting for a password");
            return Ok(String::new());
        }
        rpassword::prompt_password("Password: ")
    })
}

/// Log into the configured Jira host as `username`.
pub fn login(config: &Config, username: &str) -> Result<Session> {
    let host = config.host.as_deref().ok_or(Error::MissingHost)?;
    info!("[auth] getting a cookie for {}", host);

    let session = Session::new(host, config.dry_run)?;
    let password = password(config)?;
    session.login(&config.auth_path, username, &password)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn configured_password_wins() {
        let password = resolve_password(Some("from-file"), Some("from-env".into()), || {
            panic!("must not prompt")
        })
        .unwrap();
        assert_eq!(password, "from-file");
    }

    #[test]
    fn environment_is_used_before_prompting() {
        let password =
            resolve_password(Some(""), Some("from-env".into()), || panic!("must not prompt"))
                .unwrap();
        assert_eq!(password, "from-env");
    }

    #[test]
    fn prompt_is_the_last_resort() {
        let password = resolve_password(None, Some(String::new()), || Ok("typed".into())).unwrap();
        assert_eq!(password, "typed");
    }

    #[test]
    fn prompt_failure_is_reported() {
        let err = resolve_password(None, None, || {
            Err(io::Error::new(io::ErrorKind::NotFound, "no tty"))
        })
        .unwrap_err();
        assert!(matches!(err, Error::Password(_)));
    }

    #[test]
    fn login_posts_json_credentials() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/rest/auth/latest/session")
            .match_header("content-type", "application/json")
            .match_header("accept", "application/json")
            .match_body(Matcher::Json(json!({
                "username": "jdoe",
                "password": "pa\"ss"
            })))
            .with_status(200)
            .with_header("set-cookie", "JSESSIONID=abc123; Path=/")
            .with_body(r#"{"session":{"name":"JSESSIONID","value":"abc123"}}"#)
            .create();

        let session = Session::new(&server.url(), false).unwrap();
        session
            .login("/rest/auth/latest/session", "jdoe", "pa\"ss")
            .unwrap();
        mock.assert();
    }

    #[test]
    fn rejected_login_names_the_url() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/rest/auth/latest/session")
            .with_status(401)
            .create();

        let session = Session::new(&server.url(), false).unwrap();
        let err = session
            .login("/rest/auth/latest/session", "jdoe", "wrong")
            .unwrap_err();
        mock.assert();
        match err {
            Error::Request { url, .. } => assert!(url.ends_with("/rest/auth/latest/session")),
            other => panic!("expected Request error, got {:?}", other),
        }
    }

    #[test]
    fn dry_run_login_sends_nothing() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create();

        let config = Config {
            host: Some(server.url()),
            password: Some("secret".into()),
            dry_run: true,
            ..Config::default()
        };
        login(&config, "jdoe").unwrap();
        mock.assert();
    }

    #[test]
    fn login_without_host_fails() {
        let config = Config {
            password: Some("secret".into()),
            ..Config::default()
        };
        assert!(matches!(login(&config, "jdoe"), Err(Error::MissingHost)));
    }
}
