use crate::error::{AppError, AppResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Marks a request produced by the forwarding page, not by the provider.
const FROM_FRAGMENT: &str = "from_fragment";

const SUCCESS_HTML: &str = r#"<!DOCTYPE html><html><head><title>Signed in</title></head><body style="background:#121212;color:#fff;font-family:sans-serif;text-align:center;padding-top:20vh;"><h1>Signed in</h1><p>You can close this window and return to the terminal.</p></body></html>"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html><html><head><title>Login failed</title></head><body style="background:#121212;color:#fff;font-family:sans-serif;text-align:center;padding-top:20vh;"><h1>Login failed</h1><p>Return to the terminal for details.</p></body></html>"#;

/// Browsers never send the fragment, so the implicit flow's token is moved
/// into the query and requested again.
const FORWARD_HTML: &str = r#"<!DOCTYPE html><html><head><title>Processing...</title></head><body style="background:#121212;color:#fff;font-family:sans-serif;text-align:center;padding-top:20vh;"><h1>Processing login...</h1><script>if (location.hash.length > 1) { location.replace(location.pathname + '?' + location.hash.substring(1) + '&from_fragment=1'); } else { document.querySelector('h1').textContent = 'Nothing to process'; }</script></body></html>"#;

/// Loopback HTTP listener at the registered redirect URI.
pub struct CallbackListener {
    listener: TcpListener,
    redirect: Url,
}

enum Callback {
    /// Redirect URL exactly as the flow should see it.
    Done(String),
    Forward,
    NotFound,
}

impl CallbackListener {
    /// Binds the host and port of `redirect_uri`. Bind before opening the
    /// browser so the redirect cannot arrive first.
    pub async fn bind(redirect_uri: &str) -> AppResult<Self> {
        let redirect = Url::parse(redirect_uri)?;
        let host = redirect
            .host_str()
            .ok_or_else(|| AppError::Config(format!("Redirect URI has no host: {}", redirect_uri)))?;
        let port = redirect
            .port_or_known_default()
            .ok_or_else(|| AppError::Config(format!("Redirect URI has no port: {}", redirect_uri)))?;

        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            log::error!("Failed to bind to {}:{}: {}", host, port, e);
            AppError::Io(e)
        })?;
        log::info!("Callback server listening on {}:{}", host, port);
        Ok(Self { listener, redirect })
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves requests until one carries a code, a token or an error, and
    /// returns it as a full redirect URL. Tokens come back in the fragment.
    pub async fn wait(self, timeout: Duration) -> AppResult<String> {
        log::info!("Waiting for OAuth callback...");
        match tokio::time::timeout(timeout, self.serve()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Auth("Login timeout - please try again".into())),
        }
    }

    async fn serve(&self) -> AppResult<String> {
        loop {
            let (mut socket, _) = self.listener.accept().await?;
            let request = match read_request(&mut socket).await {
                Ok(request) => request,
                Err(e) => {
                    log::warn!("Failed to read callback request: {}", e);
                    continue;
                }
            };

            let target = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("");
            log::debug!("Callback request for {}", target.split('?').next().unwrap_or(""));

            match self.classify(target) {
                Callback::Done(url) => {
                    let page = if url.contains("error=") {
                        ERROR_HTML
                    } else {
                        SUCCESS_HTML
                    };
                    respond(&mut socket, "200 OK", page).await;
                    return Ok(url);
                }
                Callback::Forward => respond(&mut socket, "200 OK", FORWARD_HTML).await,
                Callback::NotFound => respond(&mut socket, "404 Not Found", "").await,
            }
        }
    }

    fn classify(&self, target: &str) -> Callback {
        let Ok(url) = self.redirect.join(target) else {
            return Callback::NotFound;
        };
        if url.path() != self.redirect.path() {
            return Callback::NotFound;
        }

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let has = |key: &str| pairs.iter().any(|(k, _)| k == key);

        if has("access_token") {
            let fragment = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter().filter(|(k, _)| k != FROM_FRAGMENT))
                .finish();
            let mut callback = url.clone();
            callback.set_query(None);
            callback.set_fragment(Some(&fragment));
            return Callback::Done(callback.to_string());
        }

        if has("code") || has("error") {
            return Callback::Done(url.to_string());
        }

        Callback::Forward
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = vec![0u8; 8192];
    let n = socket.read(&mut buffer).await?;
    Ok(String::from_utf8_lossy(&buffer[..n]).into_owned())
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        log::debug!("Failed to write callback response: {}", e);
    }
}
